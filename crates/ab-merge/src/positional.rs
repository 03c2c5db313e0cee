//! Row-by-row merge: source row `i` feeds target row `i`.

use ab_core::{Error, Result, ScalarType, Table, TableMut};

/// Outcome of one positional merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalReport {
    /// Column added to the target.
    pub column: String,
    /// Rows written (equals the target row count).
    pub rows: usize,
    /// Rows whose source value was unset.
    pub unset: usize,
}

/// Copy field `column` of `source` into a new target column of the same name.
///
/// See [`merge_by_position_as`].
pub fn merge_by_position<T, S>(
    target: &mut T,
    source: &S,
    column: &str,
    value_type: ScalarType,
) -> Result<PositionalReport>
where
    T: TableMut + ?Sized,
    S: Table + ?Sized,
{
    merge_by_position_as(target, source, column, column, value_type)
}

/// Copy field `source_field` of `source` into a new target column `new_column`.
///
/// Row counts are compared before anything is read: a difference fails with
/// [`Error::RowCountMismatch`] and the target is left without the column. The
/// column is attached only after every row was copied.
pub fn merge_by_position_as<T, S>(
    target: &mut T,
    source: &S,
    source_field: &str,
    new_column: &str,
    value_type: ScalarType,
) -> Result<PositionalReport>
where
    T: TableMut + ?Sized,
    S: Table + ?Sized,
{
    let (source_rows, target_rows) = (source.row_count(), target.row_count());
    if source_rows != target_rows {
        return Err(Error::RowCountMismatch {
            column: new_column.to_string(),
            source_rows,
            target_rows,
        });
    }

    let mut writer = target.declare_column(new_column, value_type)?;
    let cursor = source.cursor(source_field, value_type)?;

    for (row, value) in cursor.enumerate() {
        if let Some(v) = value {
            writer.set(row, v)?;
        }
    }

    let unset = target_rows - writer.filled();
    target.append_column(writer)?;

    tracing::debug!(
        column = new_column,
        source_field,
        rows = target_rows,
        unset,
        "positional merge done"
    );
    Ok(PositionalReport { column: new_column.to_string(), rows: target_rows, unset })
}
