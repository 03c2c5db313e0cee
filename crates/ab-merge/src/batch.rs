//! Batch of merges over one pair of open tables.
//!
//! Every name is an independent job: errors scoped to one column are recorded
//! and the batch moves on; process-scoped errors abort before anything is
//! committed by the batch.

use ab_core::{ErrorScope, KeyFields, Result, ScalarType, Table, TableMut};
use serde::Serialize;

use crate::keyed::{merge_by_key_mapped, RowMapping, UnmatchedRow};
use crate::positional::merge_by_position_as;

/// How target rows find their source row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeMode {
    /// Row `i` of the source feeds row `i` of the target.
    Positional,
    /// Rows are matched on the `(run, event, lumi)` key.
    Keyed(KeyFields),
}

/// When the target is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Once, after the last name.
    #[default]
    EndOfBatch,
    /// After every successfully merged column.
    EachColumn,
}

/// Settings shared by every merge of a batch.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Row correspondence.
    pub mode: MergeMode,
    /// Declared type of new columns.
    pub value_type: ScalarType,
    /// Prepended to each source field name to form the target column name.
    pub target_prefix: String,
    /// Commit policy.
    pub commit: CommitPolicy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            mode: MergeMode::Positional,
            value_type: ScalarType::F32,
            target_prefix: String::new(),
            commit: CommitPolicy::default(),
        }
    }
}

impl MergeConfig {
    /// Target column name for source field `name`.
    pub fn target_column(&self, name: &str) -> String {
        format!("{}{name}", self.target_prefix)
    }
}

/// A column added by the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedColumn {
    /// Field read from the source.
    pub source_field: String,
    /// Column added to the target.
    pub column: String,
    /// Rows left unset.
    pub unset: usize,
}

/// A name whose merge failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedColumn {
    /// Source field name.
    pub name: String,
    /// Error message.
    pub error: String,
}

/// Summary of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Target rows.
    pub target_rows: usize,
    /// Successful merges, in order.
    pub merged: Vec<MergedColumn>,
    /// Failed merges, in order.
    pub failed: Vec<FailedColumn>,
    /// Target rows without a source key (keyed mode), in row order.
    pub unmatched: Vec<UnmatchedRow>,
    /// Whether the target was written.
    pub committed: bool,
}

impl BatchReport {
    /// `true` when no merge failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Merge every name of `names` from `source` into `target`.
///
/// In keyed mode the key mapping is built once up front; a missing key field
/// aborts the batch. The target is committed if at least one column was added.
pub fn run_batch<T, S, I>(
    target: &mut T,
    source: &S,
    names: I,
    config: &MergeConfig,
) -> Result<BatchReport>
where
    T: TableMut + ?Sized,
    S: Table + ?Sized,
    I: IntoIterator<Item = Result<String>>,
{
    let mapping = match &config.mode {
        MergeMode::Positional => None,
        MergeMode::Keyed(fields) => Some(RowMapping::build(&*target, source, fields)?),
    };

    let mut report = BatchReport {
        target_rows: target.row_count(),
        unmatched: mapping.as_ref().map_or_else(Vec::new, |m| m.unmatched().to_vec()),
        ..Default::default()
    };

    for name in names {
        let name = name?;
        let column = config.target_column(&name);

        let outcome = match &mapping {
            None => merge_by_position_as(target, source, &name, &column, config.value_type)
                .map(|r| r.unset),
            Some(m) => merge_by_key_mapped(target, source, m, &column, &name, config.value_type)
                .map(|r| r.rows - r.matched),
        };

        match outcome {
            Ok(unset) => {
                tracing::info!(column = %column, unset, "merged column");
                report.merged.push(MergedColumn { source_field: name, column, unset });
                if config.commit == CommitPolicy::EachColumn {
                    target.commit()?;
                    report.committed = true;
                }
            }
            Err(e) if e.scope() == ErrorScope::Job => {
                tracing::error!(
                    column = %column,
                    error = %e,
                    "merge failed, continuing with next name"
                );
                report.failed.push(FailedColumn { name, error: e.to_string() });
            }
            Err(e) => return Err(e),
        }
    }

    if target.pending() > 0 {
        target.commit()?;
        report.committed = true;
    }

    if report.merged.is_empty() && report.failed.is_empty() {
        tracing::warn!("no column names to merge");
    }
    tracing::info!(
        merged = report.merged.len(),
        failed = report.failed.len(),
        committed = report.committed,
        "batch finished"
    );
    Ok(report)
}
