//! # ab-merge
//!
//! Copies precomputed per-event values from a source table into new columns of
//! a target table, either row by row ([`merge_by_position`]) or by matching the
//! `(run, event, lumi)` key ([`merge_by_key`]). [`generate_names`] enumerates the
//! column names of a run and [`run_batch`] drives one merge per name.
//!
//! ## Example
//!
//! ```
//! use ab_core::{ColumnData, MemTable, ScalarType};
//! use ab_merge::merge_by_position;
//!
//! let source = MemTable::new("hbtres", 2)
//!     .with_column("hbtresdnn", ColumnData::F32(vec![0.2, 0.9]))
//!     .unwrap();
//! let mut target = MemTable::new("HTauTauTree", 2);
//! merge_by_position(&mut target, &source, "hbtresdnn", ScalarType::F32).unwrap();
//! assert_eq!(target.column("hbtresdnn").unwrap().data(), &ColumnData::F32(vec![0.2, 0.9]));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod keyed;
pub mod names;
pub mod positional;

pub use batch::{
    run_batch, BatchReport, CommitPolicy, FailedColumn, MergeConfig, MergeMode, MergedColumn,
};
pub use keyed::{
    merge_by_key, merge_by_key_mapped, read_keys, KeyIndex, KeyedReport, RowMapping, UnmatchedRow,
};
pub use names::{
    generate_names, multiclass_names, parametrized_names, BranchList, NameSource, Names,
    ParameterGrid, DEFAULT_CLASSES, DEFAULT_MASSES, DEFAULT_SPINS,
};
pub use positional::{merge_by_position, merge_by_position_as, PositionalReport};
