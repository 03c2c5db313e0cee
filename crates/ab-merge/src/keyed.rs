//! Merge by composite event key `(run, event, lumi)`.
//!
//! The source keys are hashed once into a [`KeyIndex`]; every target row is
//! then resolved with one lookup. The resulting [`RowMapping`] depends only on
//! the key fields, so a batch builds it once and reuses it for every column.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use ab_core::{Error, KeyFields, RecordKey, Result, ScalarType, Table, TableMut};
use serde::Serialize;

/// Hash index from record key to the first source row carrying it.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    rows: HashMap<RecordKey, usize>,
    duplicates: usize,
    incomplete: usize,
}

impl KeyIndex {
    /// Index the key fields of `table`.
    ///
    /// Repeated keys keep their first row; rows with an unset key component are skipped.
    pub fn build<S: Table + ?Sized>(table: &S, fields: &KeyFields) -> Result<Self> {
        let keys = read_keys(table, fields)?;
        let mut index = KeyIndex { rows: HashMap::with_capacity(keys.len()), ..Default::default() };
        for (row, key) in keys.into_iter().enumerate() {
            let Some(key) = key else {
                index.incomplete += 1;
                continue;
            };
            match index.rows.entry(key) {
                Entry::Occupied(_) => index.duplicates += 1,
                Entry::Vacant(slot) => {
                    slot.insert(row);
                }
            }
        }
        if index.duplicates > 0 {
            tracing::warn!(
                table = table.name(),
                duplicates = index.duplicates,
                "repeated event keys in source, first occurrence wins"
            );
        }
        Ok(index)
    }

    /// Source row for `key`.
    pub fn get(&self, key: &RecordKey) -> Option<usize> {
        self.rows.get(key).copied()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when no key was indexed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows dropped because their key was already indexed.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Rows skipped because a key component was unset.
    pub fn incomplete(&self) -> usize {
        self.incomplete
    }
}

/// Read the key triple of every row; `None` where a component is unset.
pub fn read_keys<S: Table + ?Sized>(
    table: &S,
    fields: &KeyFields,
) -> Result<Vec<Option<RecordKey>>> {
    table.require_fields(&fields.names())?;
    let runs = table.cursor(&fields.run, ScalarType::I64)?;
    let events = table.cursor(&fields.event, ScalarType::U64)?;
    let lumis = table.cursor(&fields.lumi, ScalarType::I64)?;

    Ok(runs
        .zip(events)
        .zip(lumis)
        .map(|((run, event), lumi)| {
            Some(RecordKey::new(run?.as_i64()?, event?.as_u64()?, lumi?.as_i64()?))
        })
        .collect())
}

/// A target row that found no source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnmatchedRow {
    /// Target row index.
    pub row: usize,
    /// Its key, `None` when a key component was unset.
    pub key: Option<RecordKey>,
}

/// For every target row, the matching source row (if any).
#[derive(Debug, Clone)]
pub struct RowMapping {
    sources: Vec<Option<usize>>,
    unmatched: Vec<UnmatchedRow>,
}

impl RowMapping {
    /// Resolve every target key against the source.
    ///
    /// Each target row without a match is logged once as a warning.
    pub fn build<T, S>(target: &T, source: &S, fields: &KeyFields) -> Result<Self>
    where
        T: Table + ?Sized,
        S: Table + ?Sized,
    {
        let index = KeyIndex::build(source, fields)?;
        let keys = read_keys(target, fields)?;

        let mut sources = Vec::with_capacity(keys.len());
        let mut unmatched = Vec::new();
        for (row, key) in keys.into_iter().enumerate() {
            let hit = key.and_then(|k| index.get(&k));
            if hit.is_none() {
                match key {
                    Some(k) => tracing::warn!(
                        table = target.name(),
                        row,
                        run = k.run,
                        event = k.event,
                        lumi = k.lumi,
                        "no source row for event key"
                    ),
                    None => {
                        tracing::warn!(table = target.name(), row, "event key has unset fields")
                    }
                }
                unmatched.push(UnmatchedRow { row, key });
            }
            sources.push(hit);
        }

        tracing::info!(
            target_rows = sources.len(),
            source_keys = index.len(),
            incomplete_source_keys = index.incomplete(),
            unmatched = unmatched.len(),
            "resolved event keys"
        );
        Ok(Self { sources, unmatched })
    }

    /// Source row feeding `target_row`.
    pub fn source_row(&self, target_row: usize) -> Option<usize> {
        self.sources.get(target_row).copied().flatten()
    }

    /// Number of target rows covered.
    pub fn target_rows(&self) -> usize {
        self.sources.len()
    }

    /// Number of target rows with a source match.
    pub fn matched(&self) -> usize {
        self.sources.len() - self.unmatched.len()
    }

    /// Target rows without a source match, in row order.
    pub fn unmatched(&self) -> &[UnmatchedRow] {
        &self.unmatched
    }
}

/// Outcome of one keyed merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedReport {
    /// Column added to the target.
    pub column: String,
    /// Target row count.
    pub rows: usize,
    /// Rows that received a value.
    pub matched: usize,
    /// Rows whose key matched a source row holding no value; left unset.
    pub null_source: usize,
    /// Rows left unset because their key had no source row.
    pub unmatched: Vec<UnmatchedRow>,
}

impl KeyedReport {
    /// Number of key mismatches.
    pub fn mismatches(&self) -> usize {
        self.unmatched.len()
    }
}

/// Copy `value_field` of `source` into a new target column `new_column`, matching rows by key.
///
/// Unmatched target rows stay unset and are reported; they never fail the call.
pub fn merge_by_key<T, S>(
    target: &mut T,
    source: &S,
    new_column: &str,
    value_field: &str,
    value_type: ScalarType,
    fields: &KeyFields,
) -> Result<KeyedReport>
where
    T: TableMut + ?Sized,
    S: Table + ?Sized,
{
    let mapping = RowMapping::build(&*target, source, fields)?;
    merge_by_key_mapped(target, source, &mapping, new_column, value_field, value_type)
}

/// Keyed merge with a precomputed [`RowMapping`].
pub fn merge_by_key_mapped<T, S>(
    target: &mut T,
    source: &S,
    mapping: &RowMapping,
    new_column: &str,
    value_field: &str,
    value_type: ScalarType,
) -> Result<KeyedReport>
where
    T: TableMut + ?Sized,
    S: Table + ?Sized,
{
    let rows = target.row_count();
    if mapping.target_rows() != rows {
        return Err(Error::RowCountMismatch {
            column: new_column.to_string(),
            source_rows: mapping.target_rows(),
            target_rows: rows,
        });
    }

    let values = source.cursor(value_field, value_type)?;
    let mut writer = target.declare_column(new_column, value_type)?;

    for row in 0..rows {
        let value = mapping.source_row(row).and_then(|src| values.get(src));
        if let Some(v) = value {
            writer.set(row, v)?;
        }
    }

    let matched = writer.filled();
    let null_source = mapping.matched() - matched;
    target.append_column(writer)?;

    if null_source > 0 {
        tracing::debug!(
            column = new_column,
            value_field,
            null_source,
            "matched source rows without a value left unset"
        );
    }

    let unmatched = mapping.unmatched().to_vec();
    if unmatched.is_empty() {
        tracing::debug!(column = new_column, rows, "keyed merge done");
    } else {
        tracing::warn!(
            column = new_column,
            rows,
            unmatched = unmatched.len(),
            "keyed merge left rows without a source key unset"
        );
    }
    Ok(KeyedReport { column: new_column.to_string(), rows, matched, null_source, unmatched })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_core::{Column, ColumnData, MemTable, Scalar};

    fn keyed(name: &str, keys: &[(i32, u64, i32)]) -> MemTable {
        MemTable::new(name, keys.len())
            .with_column("RunNumber", ColumnData::I32(keys.iter().map(|k| k.0).collect()))
            .unwrap()
            .with_column("EventNumber", ColumnData::U64(keys.iter().map(|k| k.1).collect()))
            .unwrap()
            .with_column("lumi", ColumnData::I32(keys.iter().map(|k| k.2).collect()))
            .unwrap()
    }

    #[test]
    fn test_partial_match_leaves_gap() {
        let mut target = keyed("HTauTauTree", &[(1, 100, 1), (1, 101, 1), (2, 50, 1)]);
        let source = keyed("hbtres", &[(1, 100, 1), (2, 50, 1)])
            .with_column("hbtresdnn", ColumnData::F64(vec![9.5, 3.2]))
            .unwrap();

        let report = merge_by_key(
            &mut target,
            &source,
            "hbtresdnn",
            "hbtresdnn",
            ScalarType::F64,
            &KeyFields::default(),
        )
        .unwrap();

        assert_eq!(report.matched, 2);
        assert_eq!(report.mismatches(), 1);
        assert_eq!(
            report.unmatched,
            vec![UnmatchedRow { row: 1, key: Some(RecordKey::new(1, 101, 1)) }]
        );
        let col = target.column("hbtresdnn").unwrap();
        assert_eq!(col.to_f64_vec(), vec![Some(9.5), None, Some(3.2)]);
    }

    #[test]
    fn test_source_order_does_not_matter() {
        let mut target = keyed("t", &[(1, 1, 1), (1, 2, 1), (1, 3, 1)]);
        let source = keyed("s", &[(1, 3, 1), (1, 1, 1), (1, 2, 1)])
            .with_column("v", ColumnData::F32(vec![30.0, 10.0, 20.0]))
            .unwrap();
        let report =
            merge_by_key(&mut target, &source, "v", "v", ScalarType::F32, &KeyFields::default())
                .unwrap();
        assert_eq!(report.mismatches(), 0);
        assert_eq!(
            target.column("v").unwrap().data(),
            &ColumnData::F32(vec![10.0, 20.0, 30.0])
        );
    }

    #[test]
    fn test_all_three_key_fields_must_match() {
        let mut target = keyed("t", &[(1, 7, 1), (2, 7, 1), (1, 7, 2)]);
        let source =
            keyed("s", &[(1, 7, 1)]).with_column("v", ColumnData::F32(vec![1.5])).unwrap();
        let report =
            merge_by_key(&mut target, &source, "v", "v", ScalarType::F32, &KeyFields::default())
                .unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched.iter().map(|u| u.row).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_matched_key_with_null_value_is_counted() {
        let mut target = keyed("t", &[(1, 1, 1), (1, 2, 1), (1, 3, 1)]);
        let mut source = keyed("s", &[(1, 1, 1), (1, 2, 1)]);
        let values =
            Column::with_validity(ColumnData::F32(vec![0.5, 0.0]), vec![true, false]).unwrap();
        source.insert("v".to_string(), values).unwrap();

        let report =
            merge_by_key(&mut target, &source, "v", "v", ScalarType::F32, &KeyFields::default())
                .unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.matched, 1);
        assert_eq!(report.null_source, 1);
        assert_eq!(report.mismatches(), 1);
        assert_eq!(report.matched + report.null_source + report.mismatches(), report.rows);
        assert_eq!(target.column("v").unwrap().to_f64_vec(), vec![Some(0.5), None, None]);
    }

    #[test]
    fn test_duplicate_source_keys_keep_first() {
        let source = keyed("s", &[(1, 5, 1), (1, 5, 1), (1, 6, 1)]);
        let index = KeyIndex::build(&source, &KeyFields::default()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.duplicates(), 1);
        assert_eq!(index.get(&RecordKey::new(1, 5, 1)), Some(0));
    }

    #[test]
    fn test_missing_key_field_fails_fast() {
        let mut target = MemTable::new("t", 1)
            .with_column("EventNumber", ColumnData::U64(vec![1]))
            .unwrap();
        let source = keyed("s", &[(1, 1, 1)]).with_column("v", ColumnData::F32(vec![1.0])).unwrap();
        let err =
            merge_by_key(&mut target, &source, "v", "v", ScalarType::F32, &KeyFields::default())
                .unwrap_err();
        assert!(matches!(err, Error::MissingField { ref field, .. } if field == "RunNumber"));
        assert!(!target.has_field("v"));
    }

    #[test]
    fn test_custom_key_field_names() {
        let fields = KeyFields { run: "run".into(), event: "evt".into(), lumi: "ls".into() };
        let mut target = MemTable::new("t", 2)
            .with_column("run", ColumnData::I64(vec![1, 1]))
            .unwrap()
            .with_column("evt", ColumnData::U32(vec![4, 5]))
            .unwrap()
            .with_column("ls", ColumnData::I64(vec![3, 3]))
            .unwrap();
        let source = MemTable::new("s", 1)
            .with_column("run", ColumnData::I32(vec![1]))
            .unwrap()
            .with_column("evt", ColumnData::U64(vec![5]))
            .unwrap()
            .with_column("ls", ColumnData::I32(vec![3]))
            .unwrap()
            .with_column("score", ColumnData::F32(vec![0.5]))
            .unwrap();
        merge_by_key(&mut target, &source, "dnn", "score", ScalarType::F32, &fields).unwrap();
        let col = target.column("dnn").unwrap();
        assert_eq!(col.get(0), None);
        assert_eq!(col.get(1), Some(Scalar::F32(0.5)));
    }

    #[test]
    fn test_mapping_reused_across_columns() {
        let mut target = keyed("t", &[(1, 1, 1), (1, 2, 1)]);
        let source = keyed("s", &[(1, 2, 1)])
            .with_column("a", ColumnData::F32(vec![1.0]))
            .unwrap()
            .with_column("b", ColumnData::F32(vec![2.0]))
            .unwrap();
        let mapping = RowMapping::build(&target, &source, &KeyFields::default()).unwrap();
        assert_eq!(mapping.matched(), 1);
        merge_by_key_mapped(&mut target, &source, &mapping, "a", "a", ScalarType::F32).unwrap();
        merge_by_key_mapped(&mut target, &source, &mapping, "b", "b", ScalarType::F32).unwrap();
        assert_eq!(target.column("b").unwrap().to_f64_vec(), vec![None, Some(2.0)]);
    }
}
