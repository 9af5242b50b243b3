//! The row-store boundary.

use crate::changeset::Changeset;
use crate::conflict::{ConflictOccurrence, Resolution};
use crate::error::StoreResult;

/// Callback consulted by a row store while it applies a changeset.
///
/// This is the injected replacement for overriding a conflict hook on a
/// changeset type: the caller hands a handler to [`RowStore::apply_changeset`].
pub trait ConflictHandler {
    /// Decides whether records for `table` are applied at all.
    ///
    /// Records of rejected tables are dropped without raising conflicts.
    fn filter_table(&mut self, _table: &str) -> bool {
        true
    }

    /// Decides how a conflict on one record is settled.
    fn on_conflict(&mut self, occurrence: &ConflictOccurrence<'_>) -> Resolution;
}

impl<F> ConflictHandler for F
where
    F: FnMut(&ConflictOccurrence<'_>) -> Resolution,
{
    fn on_conflict(&mut self, occurrence: &ConflictOccurrence<'_>) -> Resolution {
        self(occurrence)
    }
}

/// Outcome of [`RowStore::apply_changeset`] when the store itself did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    /// Every record was processed and the changes are committed.
    Committed {
        /// Records that were processed (applied, replaced or skipped).
        records_applied: usize,
        /// Records dropped by [`ConflictHandler::filter_table`].
        records_filtered: usize,
    },
    /// The handler returned [`Resolution::Abort`]; nothing from this changeset
    /// remains in the database.
    Aborted,
}

impl ApplyStatus {
    /// Returns true if the changeset was committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, ApplyStatus::Committed { .. })
    }
}

/// A transactional row store that can replay changesets.
///
/// # Contract
///
/// - Records are applied in changeset order.
/// - Every conflict is reported to the handler, and its resolution honored.
/// - If the handler returns [`Resolution::Abort`], or the store fails, every row
///   mutation made by this call is rolled back before it returns.
/// - Foreign-key checks are deferred to the end of the changeset and reported as
///   a single [`ConflictCause::ForeignKey`] occurrence.
///
/// The handle is used by one thread at a time; callers guarantee that no other
/// writer touches the database while a changeset is being applied.
///
/// [`ConflictCause::ForeignKey`]: crate::ConflictCause::ForeignKey
pub trait RowStore {
    /// Applies a changeset, consulting `handler` for table filtering and conflicts.
    fn apply_changeset(
        &mut self,
        changeset: &Changeset,
        handler: &mut dyn ConflictHandler,
    ) -> StoreResult<ApplyStatus>;

    /// Number of foreign-key violations currently present.
    fn foreign_key_violation_count(&self) -> StoreResult<usize>;

    /// True if the database holds local modifications not yet packaged into a changeset.
    fn has_pending_local_changes(&self) -> StoreResult<bool>;

    /// Reads a persisted briefcase-local boolean setting. Unset flags read as false.
    fn query_debug_flag(&self, name: &str) -> StoreResult<bool>;

    /// Id of the last changeset merged into (or pushed from) this database.
    fn parent_changeset_id(&self) -> StoreResult<String>;

    /// Records the id of the last merged changeset.
    fn set_parent_changeset_id(&mut self, id: &str) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeRecord, ConflictCause, Value};

    fn skip_everything(_: &ConflictOccurrence<'_>) -> Resolution {
        Resolution::Skip
    }

    #[test]
    fn functions_are_handlers() {
        let record = ChangeRecord::insert("Foo", &[0], vec![Value::Integer(1)]);
        let mut handler = skip_everything;

        assert!(handler.filter_table("Foo"));
        let occurrence = ConflictOccurrence::new(ConflictCause::Data, &record);
        assert_eq!(handler.on_conflict(&occurrence), Resolution::Skip);
    }

    #[test]
    fn status_committed() {
        assert!(ApplyStatus::Committed {
            records_applied: 1,
            records_filtered: 0
        }
        .is_committed());
        assert!(!ApplyStatus::Aborted.is_committed());
    }
}
