//! In-memory table.

use crate::column::{Column, ColumnData, ColumnWriter};
use crate::table::{check_append, Table, TableMut};
use crate::types::ScalarType;
use crate::{Error, Result};

/// A table held entirely in memory.
///
/// `commit` only moves the pending-column counter; there is nothing to flush.
#[derive(Debug, Clone)]
pub struct MemTable {
    name: String,
    rows: usize,
    columns: Vec<(String, Column)>,
    pending: usize,
    commits: usize,
}

impl MemTable {
    /// Empty table with a fixed number of rows.
    pub fn new(name: impl Into<String>, rows: usize) -> Self {
        Self { name: name.into(), rows, columns: Vec::new(), pending: 0, commits: 0 }
    }

    /// Builder-style column insertion.
    pub fn with_column(mut self, name: impl Into<String>, data: ColumnData) -> Result<Self> {
        self.insert(name.into(), Column::new(data))?;
        Ok(self)
    }

    /// Insert an already materialized column (no pending bookkeeping).
    pub fn insert(&mut self, name: String, column: Column) -> Result<()> {
        if self.has_field(&name) {
            return Err(Error::DuplicateColumn { table: self.name.clone(), column: name });
        }
        if column.len() != self.rows {
            return Err(Error::Storage(format!(
                "column '{name}' has {} rows, table '{}' has {}",
                column.len(),
                self.name,
                self.rows
            )));
        }
        self.columns.push((name, column));
        Ok(())
    }

    /// Borrow a column.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Number of successful commits.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl Table for MemTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_count(&self) -> usize {
        self.rows
    }

    fn field_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    fn field_type(&self, field: &str) -> Option<ScalarType> {
        self.column(field).map(Column::scalar_type)
    }

    fn has_field(&self, field: &str) -> bool {
        self.column(field).is_some()
    }

    fn read_column(&self, field: &str) -> Result<Column> {
        self.column(field).cloned().ok_or_else(|| Error::MissingField {
            table: self.name.clone(),
            field: field.to_string(),
        })
    }
}

impl TableMut for MemTable {
    fn append_column(&mut self, writer: ColumnWriter) -> Result<()> {
        check_append(self, &writer)?;
        let (name, column) = writer.finish();
        self.columns.push((name, column));
        self.pending += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.pending = 0;
        self.commits += 1;
        Ok(())
    }

    fn pending(&self) -> usize {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scalar;

    fn table() -> MemTable {
        MemTable::new("HTauTauTree", 3)
            .with_column("EventNumber", ColumnData::U64(vec![100, 101, 50]))
            .unwrap()
            .with_column("tauH_mass", ColumnData::F32(vec![120.0, 90.5, 130.25]))
            .unwrap()
    }

    #[test]
    fn test_declare_and_append() {
        let mut t = table();
        let mut w = t.declare_column("hbtresdnn", ScalarType::F32).unwrap();
        assert_eq!(w.rows(), 3);
        w.set(1, Scalar::F32(0.25)).unwrap();
        t.append_column(w).unwrap();
        assert_eq!(t.pending(), 1);
        assert_eq!(t.field_type("hbtresdnn"), Some(ScalarType::F32));
        assert_eq!(t.read_column("hbtresdnn").unwrap().to_f64_vec(), vec![None, Some(0.25), None]);

        t.commit().unwrap();
        assert_eq!(t.pending(), 0);
        assert_eq!(t.commits(), 1);
    }

    #[test]
    fn test_declare_existing_column_is_duplicate() {
        let mut t = table();
        assert!(matches!(
            t.declare_column("tauH_mass", ScalarType::F32),
            Err(Error::DuplicateColumn { .. })
        ));
        assert!(matches!(
            t.declare_column("bad name", ScalarType::F32),
            Err(Error::InvalidName { .. })
        ));
    }

    #[test]
    fn test_append_checks_row_count() {
        let mut t = table();
        let w = ColumnWriter::new("x", ScalarType::F64, 2);
        assert!(matches!(t.append_column(w), Err(Error::RowCountMismatch { .. })));
        assert!(!t.has_field("x"));
    }

    #[test]
    fn test_cursor_missing_field() {
        let t = table();
        assert!(matches!(t.cursor("nope", ScalarType::F32), Err(Error::MissingField { .. })));
        assert!(t.require_fields(&["EventNumber", "tauH_mass"]).is_ok());
        assert!(t.require_fields(&["EventNumber", "lumi"]).is_err());
    }
}
