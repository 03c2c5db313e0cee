//! Storage traits consumed by the merger.
//!
//! A backend only has to expose row counts, typed column reads and
//! column appends; the merge logic never touches the on-disk format.

use crate::column::{Column, ColumnWriter, FieldCursor};
use crate::types::{validate_column_name, ScalarType};
use crate::{Error, Result};

/// Read access to a table.
pub trait Table {
    /// Table name.
    fn name(&self) -> &str;

    /// Number of rows.
    fn row_count(&self) -> usize;

    /// Names of all fields, in schema order.
    fn field_names(&self) -> Vec<String>;

    /// Scalar type of `field`; `None` if the field is absent or not a numeric scalar.
    fn field_type(&self, field: &str) -> Option<ScalarType>;

    /// Whether a field called `field` exists, whatever its type.
    fn has_field(&self, field: &str) -> bool;

    /// Materialize a numeric field.
    fn read_column(&self, field: &str) -> Result<Column>;

    /// Bind a cursor to `field`, reading values as `ty`.
    fn cursor(&self, field: &str, ty: ScalarType) -> Result<FieldCursor> {
        if !self.has_field(field) {
            return Err(Error::MissingField {
                table: self.name().to_string(),
                field: field.to_string(),
            });
        }
        let column = self.read_column(field)?;
        FieldCursor::new(field, column, ty)
    }

    /// Fail with [`Error::MissingField`] unless every name in `fields` exists.
    fn require_fields(&self, fields: &[&str]) -> Result<()> {
        match fields.iter().find(|f| !self.has_field(f)) {
            Some(missing) => Err(Error::MissingField {
                table: self.name().to_string(),
                field: missing.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Schema-evolving write access to a table.
pub trait TableMut: Table {
    /// Start a new column of `rows()` unset values.
    ///
    /// Fails with [`Error::DuplicateColumn`] when the name is taken and
    /// [`Error::InvalidName`] when it is not a legal identifier.
    fn declare_column(&mut self, name: &str, ty: ScalarType) -> Result<ColumnWriter> {
        validate_column_name(name)?;
        if self.has_field(name) {
            return Err(Error::DuplicateColumn {
                table: self.name().to_string(),
                column: name.to_string(),
            });
        }
        Ok(ColumnWriter::new(name, ty, self.row_count()))
    }

    /// Attach a finished column. The column becomes visible to reads immediately
    /// and is persisted by the next [`TableMut::commit`].
    fn append_column(&mut self, writer: ColumnWriter) -> Result<()>;

    /// Persist all appended columns.
    fn commit(&mut self) -> Result<()>;

    /// Columns appended since the last commit.
    fn pending(&self) -> usize;
}

/// Shared validation for [`TableMut::append_column`] implementations.
pub fn check_append<T: Table + ?Sized>(table: &T, writer: &ColumnWriter) -> Result<()> {
    if table.has_field(writer.name()) {
        return Err(Error::DuplicateColumn {
            table: table.name().to_string(),
            column: writer.name().to_string(),
        });
    }
    if writer.rows() != table.row_count() {
        return Err(Error::RowCountMismatch {
            column: writer.name().to_string(),
            source_rows: writer.rows(),
            target_rows: table.row_count(),
        });
    }
    Ok(())
}
