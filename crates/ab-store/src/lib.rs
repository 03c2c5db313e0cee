//! # ab-store
//!
//! Parquet-backed table files for addbranch.
//!
//! ## Example
//!
//! ```no_run
//! use ab_core::{Scalar, ScalarType, Table, TableMut};
//! use ab_store::TableFile;
//!
//! let file = TableFile::open_for_update("skim.parquet").unwrap();
//! let mut skim = file.table("HTauTauTree").unwrap();
//! let mut w = skim.declare_column("hbtresdnn", ScalarType::F32).unwrap();
//! w.set(0, Scalar::F32(0.7)).unwrap();
//! skim.append_column(w).unwrap();
//! skim.commit().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file;

pub use file::{write_table, OpenMode, ParquetTable, TableFile, META_KEY_TABLE};
