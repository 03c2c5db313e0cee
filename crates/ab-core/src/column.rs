//! Materialized columns, read cursors and column writers.

use crate::types::{Scalar, ScalarType};
use crate::{Error, Result};

/// Typed values of one column (structure-of-arrays).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// 32-bit floats.
    F32(Vec<f32>),
    /// 64-bit floats.
    F64(Vec<f64>),
    /// 32-bit signed integers.
    I32(Vec<i32>),
    /// 64-bit signed integers.
    I64(Vec<i64>),
    /// 32-bit unsigned integers.
    U32(Vec<u32>),
    /// 64-bit unsigned integers.
    U64(Vec<u64>),
}

impl ColumnData {
    /// `len` zero values of type `ty`.
    pub fn zeros(ty: ScalarType, len: usize) -> Self {
        match ty {
            ScalarType::F32 => ColumnData::F32(vec![0.0; len]),
            ScalarType::F64 => ColumnData::F64(vec![0.0; len]),
            ScalarType::I32 => ColumnData::I32(vec![0; len]),
            ScalarType::I64 => ColumnData::I64(vec![0; len]),
            ScalarType::U32 => ColumnData::U32(vec![0; len]),
            ScalarType::U64 => ColumnData::U64(vec![0; len]),
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::F32(v) => v.len(),
            ColumnData::F64(v) => v.len(),
            ColumnData::I32(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::U32(v) => v.len(),
            ColumnData::U64(v) => v.len(),
        }
    }

    /// `true` when the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type tag.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ColumnData::F32(_) => ScalarType::F32,
            ColumnData::F64(_) => ScalarType::F64,
            ColumnData::I32(_) => ScalarType::I32,
            ColumnData::I64(_) => ScalarType::I64,
            ColumnData::U32(_) => ScalarType::U32,
            ColumnData::U64(_) => ScalarType::U64,
        }
    }

    /// Value at `row`, `None` when out of bounds.
    pub fn get(&self, row: usize) -> Option<Scalar> {
        match self {
            ColumnData::F32(v) => v.get(row).copied().map(Scalar::F32),
            ColumnData::F64(v) => v.get(row).copied().map(Scalar::F64),
            ColumnData::I32(v) => v.get(row).copied().map(Scalar::I32),
            ColumnData::I64(v) => v.get(row).copied().map(Scalar::I64),
            ColumnData::U32(v) => v.get(row).copied().map(Scalar::U32),
            ColumnData::U64(v) => v.get(row).copied().map(Scalar::U64),
        }
    }

    /// Overwrite `row` with `value` cast to this column's type.
    ///
    /// Panics if `row` is out of bounds.
    fn put(&mut self, row: usize, value: Scalar) {
        let value = value.cast(self.scalar_type());
        match (self, value) {
            (ColumnData::F32(v), Scalar::F32(x)) => v[row] = x,
            (ColumnData::F64(v), Scalar::F64(x)) => v[row] = x,
            (ColumnData::I32(v), Scalar::I32(x)) => v[row] = x,
            (ColumnData::I64(v), Scalar::I64(x)) => v[row] = x,
            (ColumnData::U32(v), Scalar::U32(x)) => v[row] = x,
            (ColumnData::U64(v), Scalar::U64(x)) => v[row] = x,
            _ => unreachable!("cast returns the column type"),
        }
    }
}

/// A column with an optional validity mask.
///
/// `validity[i] == false` marks row `i` as unset; a missing mask means every row is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    data: ColumnData,
    validity: Option<Vec<bool>>,
}

impl Column {
    /// Column with every row set.
    pub fn new(data: ColumnData) -> Self {
        Self { data, validity: None }
    }

    /// Column with an explicit validity mask.
    pub fn with_validity(data: ColumnData, validity: Vec<bool>) -> Result<Self> {
        if validity.len() != data.len() {
            return Err(Error::Storage(format!(
                "validity length {} does not match column length {}",
                validity.len(),
                data.len()
            )));
        }
        let validity = if validity.iter().all(|&v| v) { None } else { Some(validity) };
        Ok(Self { data, validity })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Type tag.
    pub fn scalar_type(&self) -> ScalarType {
        self.data.scalar_type()
    }

    /// Raw values (unset rows hold zero).
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Validity mask, `None` when every row is set.
    pub fn validity(&self) -> Option<&[bool]> {
        self.validity.as_deref()
    }

    /// Split into values and validity mask.
    pub fn into_parts(self) -> (ColumnData, Option<Vec<bool>>) {
        (self.data, self.validity)
    }

    /// Whether `row` holds a value.
    pub fn is_set(&self, row: usize) -> bool {
        row < self.len() && self.validity.as_ref().is_none_or(|v| v[row])
    }

    /// Value at `row`, `None` when unset or out of bounds.
    pub fn get(&self, row: usize) -> Option<Scalar> {
        if self.is_set(row) { self.data.get(row) } else { None }
    }

    /// Number of unset rows.
    pub fn null_count(&self) -> usize {
        self.validity.as_ref().map_or(0, |v| v.iter().filter(|&&b| !b).count())
    }

    /// Values as `f64`, `None` for unset rows.
    pub fn to_f64_vec(&self) -> Vec<Option<f64>> {
        (0..self.len()).map(|i| self.get(i).map(Scalar::as_f64)).collect()
    }
}

/// Sequential reader bound to one field, yielding values converted to a requested type.
#[derive(Debug, Clone)]
pub struct FieldCursor {
    column: Column,
    ty: ScalarType,
    pos: usize,
}

impl FieldCursor {
    /// Bind `column` (read from `field`) as type `ty`.
    pub fn new(field: &str, column: Column, ty: ScalarType) -> Result<Self> {
        let found = column.scalar_type();
        if !found.can_read_as(ty) {
            return Err(Error::TypeMismatch { field: field.to_string(), found, requested: ty });
        }
        Ok(Self { column, ty, pos: 0 })
    }

    /// Requested type.
    pub fn scalar_type(&self) -> ScalarType {
        self.ty
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.column.len()
    }

    /// `true` when the field has no rows.
    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    /// Random access to `row`.
    pub fn get(&self, row: usize) -> Option<Scalar> {
        self.column.get(row).map(|v| v.cast(self.ty))
    }

    /// Restart sequential reads at row 0.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for FieldCursor {
    type Item = Option<Scalar>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.column.len() {
            return None;
        }
        let v = self.get(self.pos);
        self.pos += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.column.len().saturating_sub(self.pos);
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for FieldCursor {}

/// Buffer for a newly declared column.
///
/// Created by [`crate::TableMut::declare_column`] with every row unset. Nothing reaches
/// the table until the writer is handed back through [`crate::TableMut::append_column`],
/// so dropping a writer leaves the table unchanged.
#[derive(Debug, Clone)]
pub struct ColumnWriter {
    name: String,
    data: ColumnData,
    validity: Vec<bool>,
}

impl ColumnWriter {
    /// A writer of `rows` unset values.
    pub fn new(name: impl Into<String>, ty: ScalarType, rows: usize) -> Self {
        Self { name: name.into(), data: ColumnData::zeros(ty, rows), validity: vec![false; rows] }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn scalar_type(&self) -> ScalarType {
        self.data.scalar_type()
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.data.len()
    }

    /// Number of rows that received a value.
    pub fn filled(&self) -> usize {
        self.validity.iter().filter(|&&b| b).count()
    }

    /// Store `value` (converted to the declared type) at `row`.
    pub fn set(&mut self, row: usize, value: Scalar) -> Result<()> {
        if row >= self.rows() {
            return Err(Error::Storage(format!(
                "row {row} out of range for column '{}' with {} rows",
                self.name,
                self.rows()
            )));
        }
        self.data.put(row, value);
        self.validity[row] = true;
        Ok(())
    }

    /// Split into name and finished column.
    pub fn finish(self) -> (String, Column) {
        let validity = if self.validity.iter().all(|&v| v) { None } else { Some(self.validity) };
        (self.name, Column { data: self.data, validity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_leaves_unset_rows_null() {
        let mut w = ColumnWriter::new("dnn", ScalarType::F32, 3);
        w.set(0, Scalar::F64(9.5)).unwrap();
        w.set(2, Scalar::F64(3.2)).unwrap();
        assert_eq!(w.filled(), 2);
        assert!(w.set(3, Scalar::F32(0.0)).is_err());

        let (name, col) = w.finish();
        assert_eq!(name, "dnn");
        assert_eq!(col.scalar_type(), ScalarType::F32);
        assert_eq!(col.get(0), Some(Scalar::F32(9.5)));
        assert_eq!(col.get(1), None);
        assert_eq!(col.get(2), Some(Scalar::F32(3.2)));
        assert_eq!(col.null_count(), 1);
    }

    #[test]
    fn test_fully_set_writer_drops_mask() {
        let mut w = ColumnWriter::new("x", ScalarType::I64, 2);
        w.set(0, Scalar::I32(1)).unwrap();
        w.set(1, Scalar::I32(2)).unwrap();
        let (_, col) = w.finish();
        assert!(col.validity().is_none());
        assert_eq!(col.data(), &ColumnData::I64(vec![1, 2]));
    }

    #[test]
    fn test_cursor_type_check_and_iteration() {
        let col = Column::new(ColumnData::I32(vec![4, 5, 6]));
        assert!(matches!(
            FieldCursor::new("run", col.clone(), ScalarType::U64),
            Err(Error::TypeMismatch { .. })
        ));

        let mut cur = FieldCursor::new("run", col, ScalarType::I64).unwrap();
        assert_eq!(cur.len(), 3);
        assert_eq!(cur.get(1), Some(Scalar::I64(5)));
        let all: Vec<_> = cur.by_ref().collect();
        assert_eq!(all, vec![Some(Scalar::I64(4)), Some(Scalar::I64(5)), Some(Scalar::I64(6))]);
        assert_eq!(cur.next(), None);
        cur.rewind();
        assert_eq!(cur.next(), Some(Some(Scalar::I64(4))));
    }

    #[test]
    fn test_with_validity_length_check() {
        assert!(Column::with_validity(ColumnData::F64(vec![1.0]), vec![true, false]).is_err());
        let c = Column::with_validity(ColumnData::F64(vec![1.0, 2.0]), vec![false, true]).unwrap();
        assert_eq!(c.to_f64_vec(), vec![None, Some(2.0)]);
    }
}
