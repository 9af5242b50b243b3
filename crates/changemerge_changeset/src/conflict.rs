//! Apply-time conflicts and their resolutions.

use crate::record::{ChangeRecord, DbOpcode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the row store could not apply a change record directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictCause {
    /// The current row disagrees with the record. On an insert this is a
    /// primary-key collision; on an update or delete the pre-image mismatches.
    Data,
    /// Applying the changeset left foreign-key violations behind.
    ForeignKey,
    /// The row addressed by an update or delete does not exist.
    NotFound,
    /// A `NOT NULL` or uniqueness constraint rejected the row.
    Constraint,
}

impl ConflictCause {
    /// Stable lower-case name used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictCause::Data => "data",
            ConflictCause::ForeignKey => "foreign_key",
            ConflictCause::NotFound => "not_found",
            ConflictCause::Constraint => "constraint",
        }
    }
}

impl fmt::Display for ConflictCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single conflict is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Discard the local row state and accept the incoming one.
    Replace,
    /// Keep the local row and drop the incoming change for this row only.
    Skip,
    /// Stop applying the changeset and roll back everything it did.
    Abort,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resolution::Replace => "replace",
            Resolution::Skip => "skip",
            Resolution::Abort => "abort",
        })
    }
}

/// A conflict reported by the row store during apply.
///
/// Lives only for the duration of one [`ConflictHandler::on_conflict`] call.
///
/// [`ConflictHandler::on_conflict`]: crate::ConflictHandler::on_conflict
#[derive(Debug, Clone, Copy)]
pub struct ConflictOccurrence<'a> {
    /// Conflict cause.
    pub cause: ConflictCause,
    /// The record being applied.
    pub record: &'a ChangeRecord,
    /// Outstanding foreign-key violations; only meaningful for
    /// [`ConflictCause::ForeignKey`], zero otherwise.
    pub foreign_key_violations: usize,
}

impl<'a> ConflictOccurrence<'a> {
    /// Creates an occurrence for a non foreign-key cause.
    pub fn new(cause: ConflictCause, record: &'a ChangeRecord) -> Self {
        Self {
            cause,
            record,
            foreign_key_violations: 0,
        }
    }

    /// Creates a foreign-key occurrence.
    pub fn foreign_key(record: &'a ChangeRecord, violations: usize) -> Self {
        Self {
            cause: ConflictCause::ForeignKey,
            record,
            foreign_key_violations: violations,
        }
    }

    /// Target table.
    pub fn table(&self) -> &'a str {
        &self.record.table
    }

    /// Mutation kind of the record.
    pub fn opcode(&self) -> DbOpcode {
        self.record.opcode
    }
}
