//! # ab-core
//!
//! Core types for addbranch: the error type, scalar types and record keys,
//! materialized columns, and the [`Table`] / [`TableMut`] traits that storage
//! backends implement. [`MemTable`] is the in-memory backend.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod column;
pub mod error;
pub mod memory;
pub mod table;
pub mod types;

pub use column::{Column, ColumnData, ColumnWriter, FieldCursor};
pub use error::{Error, ErrorScope, Result};
pub use memory::MemTable;
pub use table::{check_append, Table, TableMut};
pub use types::{validate_column_name, KeyFields, RecordKey, Scalar, ScalarType};
