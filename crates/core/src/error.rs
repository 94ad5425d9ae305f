//! Error types for Rill.
//!
//! Only recoverable conditions live here: building a pipeline from a bad plan,
//! asking for a table the host does not know, or loading a malformed config.
//! Invariant violations inside the dataflow are panics.

use thiserror::Error;

/// Result type alias for Rill operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for Rill operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The host has no source for the requested table.
    #[error("Source not found: {table}")]
    SourceNotFound { table: String },

    /// A query references a column the table does not declare.
    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    /// An ordering does not include every primary key column.
    #[error("Ordering for table {table} is missing primary key column(s): {}", missing.join(", "))]
    OrderingMissingPrimaryKey { table: String, missing: Vec<String> },

    /// A query plan is malformed.
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// Engine configuration could not be loaded.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A storage backend failed to encode or decode operator state.
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl Error {
    /// Creates a source not found error.
    pub fn source_not_found(table: impl Into<String>) -> Self {
        Error::SourceNotFound {
            table: table.into(),
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an ordering error listing the missing primary key columns.
    pub fn ordering_missing_primary_key(table: impl Into<String>, missing: Vec<String>) -> Self {
        Error::OrderingMissingPrimaryKey {
            table: table.into(),
            missing,
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Error::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }
}
