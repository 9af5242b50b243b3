//! Errors raised by row stores.

use std::io;
use thiserror::Error;

/// Result type for row-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a row store can report.
///
/// These are failures of the store itself, distinct from conflicts. The merge
/// engine never retries them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The changeset framing is invalid.
    #[error("corrupt changeset: {message}")]
    CorruptChangeset {
        /// Description of the corruption.
        message: String,
    },

    /// A record names a table the database does not have.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// Table name.
        table: String,
    },

    /// A record's column count differs from the table schema.
    #[error("column count mismatch for {table}: expected {expected}, got {actual}")]
    ColumnCountMismatch {
        /// Table name.
        table: String,
        /// Columns in the schema.
        expected: usize,
        /// Columns in the record.
        actual: usize,
    },

    /// A column name does not exist in the table.
    #[error("unknown column {column} in {table}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A local edit violated a constraint.
    #[error("constraint violation on {table}: {message}")]
    ConstraintViolation {
        /// Table name.
        table: String,
        /// Description of the violated constraint.
        message: String,
    },

    /// A local edit addressed a row that does not exist.
    #[error("row not found in {table}: {key}")]
    RowNotFound {
        /// Table name.
        table: String,
        /// Formatted primary key.
        key: String,
    },

    /// The conflict handler returned a resolution the store cannot honor.
    #[error("invalid resolution {resolution} for {cause} conflict on {table}")]
    InvalidResolution {
        /// Table name.
        table: String,
        /// Conflict cause.
        cause: String,
        /// Offending resolution.
        resolution: String,
    },

    /// The transaction was aborted.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },
}

impl StoreError {
    /// Creates a corrupt changeset error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptChangeset {
            message: message.into(),
        }
    }

    /// Creates an unknown table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::ColumnCountMismatch {
            table: "Foo".into(),
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "column count mismatch for Foo: expected 3, got 2"
        );

        let err = StoreError::corrupt("truncated record");
        assert_eq!(err.to_string(), "corrupt changeset: truncated record");
    }

    #[test]
    fn io_conversion() {
        let err: StoreError = io::Error::new(io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
