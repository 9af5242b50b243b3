//! Error types for the merge engine.

use changemerge_changeset::{ConflictCause, StoreError};
use thiserror::Error;

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Reasons a changeset apply, and with it a merge session, stops.
///
/// Conflicts settled by `Replace` or `Skip` never surface here; they are reported
/// only as diagnostics.
#[derive(Error, Debug)]
pub enum MergeError {
    /// An incoming insert collided with an existing key while local edits were pending.
    #[error("primary key collision on {table} {key} with pending local changes")]
    PrimaryKeyCollisionWithLocalEdits {
        /// Table name.
        table: String,
        /// Formatted primary key.
        key: String,
    },

    /// The changeset left foreign-key violations behind.
    #[error("foreign key integrity violation: {violations} violation(s)")]
    ForeignKeyIntegrityViolation {
        /// Outstanding violations when the conflict was raised.
        violations: usize,
    },

    /// The row store itself failed.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] StoreError),

    /// The external conflict policy chose to abort.
    #[error("{cause} conflict on {table} rejected by conflict policy")]
    RejectedByPolicy {
        /// Table name.
        table: String,
        /// Conflict cause.
        cause: ConflictCause,
    },

    /// The changeset does not follow the store's current parent changeset.
    #[error("parent changeset mismatch: briefcase is at {expected:?}, changeset follows {found:?}")]
    ParentMismatch {
        /// Parent id recorded in the store.
        expected: String,
        /// Parent id carried by the changeset.
        found: String,
    },

    /// The session was cancelled between changesets.
    #[error("merge cancelled")]
    Cancelled,
}

impl MergeError {
    /// Creates a primary key collision error.
    pub fn key_collision(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::PrimaryKeyCollisionWithLocalEdits {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Returns true if re-running the merge as is can succeed.
    ///
    /// Only cancellation qualifies. Storage failures are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MergeError::Cancelled)
    }

    /// Returns true for failures that need manual intervention.
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(MergeError::Cancelled.is_retryable());
        assert!(!MergeError::StorageFailure(StoreError::corrupt("bad")).is_retryable());
        assert!(!MergeError::key_collision("Foo", "(1)").is_retryable());
        assert!(MergeError::ForeignKeyIntegrityViolation { violations: 1 }.is_fatal());
    }

    #[test]
    fn error_display() {
        let err = MergeError::ForeignKeyIntegrityViolation { violations: 3 };
        assert_eq!(
            err.to_string(),
            "foreign key integrity violation: 3 violation(s)"
        );

        let err = MergeError::key_collision("Foo", "(1)");
        assert_eq!(
            err.to_string(),
            "primary key collision on Foo (1) with pending local changes"
        );

        let err = MergeError::RejectedByPolicy {
            table: "Foo".into(),
            cause: ConflictCause::Data,
        };
        assert_eq!(err.to_string(), "data conflict on Foo rejected by conflict policy");
    }

    #[test]
    fn store_errors_convert() {
        let err: MergeError = StoreError::unknown_table("Nope").into();
        assert!(matches!(err, MergeError::StorageFailure(_)));
        assert!(err.to_string().contains("Nope"));
    }
}
