//! Error types for addbranch

use thiserror::Error;

use crate::types::ScalarType;

/// How far an error reaches when it happens inside a batch of merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Affects only the column being merged; the batch moves on to the next name.
    Job,
    /// Affects the whole run; nothing is committed.
    Process,
}

/// addbranch error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent run configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage backend failure (corrupt file, encoder/decoder error, read-only handle)
    #[error("storage error: {0}")]
    Storage(String),

    /// The requested table does not exist in the file
    #[error("table '{table}' not found in {path}")]
    TableNotFound {
        /// File that was searched.
        path: String,
        /// Requested table name.
        table: String,
    },

    /// Positional merge between tables of different length
    #[error(
        "row count mismatch for column '{column}': \
         source has {source_rows} rows, target has {target_rows}"
    )]
    RowCountMismatch {
        /// Column being merged.
        column: String,
        /// Rows in the source table.
        source_rows: usize,
        /// Rows in the target table.
        target_rows: usize,
    },

    /// The target already has a column with this name
    #[error("column '{column}' already exists in table '{table}'")]
    DuplicateColumn {
        /// Target table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A field required by the merge is absent
    #[error("field '{field}' not found in table '{table}'")]
    MissingField {
        /// Table that was searched.
        table: String,
        /// Missing field.
        field: String,
    },

    /// A field cannot be read as the requested scalar type
    #[error("field '{field}' has type {found}, cannot be read as {requested}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Type stored in the table.
        found: ScalarType,
        /// Type requested by the caller.
        requested: ScalarType,
    },

    /// A field exists but is not a numeric scalar the tool can read
    #[error("field '{field}' has unsupported type {found}")]
    UnsupportedType {
        /// Field name.
        field: String,
        /// Storage-level type description.
        found: String,
    },

    /// Not a legal column identifier
    #[error("invalid column name '{name}': {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl Error {
    /// Classify the error for batch processing.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Error::RowCountMismatch { .. }
            | Error::DuplicateColumn { .. }
            | Error::MissingField { .. }
            | Error::TypeMismatch { .. }
            | Error::UnsupportedType { .. }
            | Error::InvalidName { .. } => ErrorScope::Job,
            Error::Io(_)
            | Error::Configuration(_)
            | Error::Storage(_)
            | Error::TableNotFound { .. } => ErrorScope::Process,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
