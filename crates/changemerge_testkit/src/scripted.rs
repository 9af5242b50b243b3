//! A row store that reports conflicts from a script.
//!
//! [`ScriptedStore`] holds no rows. For each changeset id it knows which record
//! indexes raise which conflicts, hands those to the handler, and records what the
//! handler answered. That isolates engine tests from row-store semantics.

use changemerge_changeset::{
    ApplyStatus, Changeset, ConflictCause, ConflictHandler, ConflictOccurrence, Resolution,
    RowStore, StoreError, StoreResult,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct ScriptedConflict {
    record: usize,
    cause: ConflictCause,
    violations: usize,
}

#[derive(Debug, Default)]
struct Script {
    conflicts: Vec<ScriptedConflict>,
    failure: Option<String>,
    pending_after: Option<bool>,
}

/// What happened to one changeset handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Changeset id.
    pub changeset_id: String,
    /// Resolutions returned by the handler, in order.
    pub resolutions: Vec<Resolution>,
    /// Whether the changeset was committed.
    pub committed: bool,
}

/// A scripted [`RowStore`].
#[derive(Debug, Default)]
pub struct ScriptedStore {
    scripts: HashMap<String, Script>,
    flags: HashMap<String, bool>,
    pending_local_changes: bool,
    parent_id: String,
    fail_state_queries: bool,
    attempts: Vec<Attempt>,
}

impl ScriptedStore {
    /// Creates a store with no scripted conflicts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises a conflict on record `record` of changeset `changeset_id`.
    pub fn conflict(&mut self, changeset_id: &str, record: usize, cause: ConflictCause) {
        self.script(changeset_id).conflicts.push(ScriptedConflict {
            record,
            cause,
            violations: 0,
        });
    }

    /// Raises a foreign-key conflict with `violations` outstanding violations.
    pub fn foreign_key_conflict(&mut self, changeset_id: &str, record: usize, violations: usize) {
        self.script(changeset_id).conflicts.push(ScriptedConflict {
            record,
            cause: ConflictCause::ForeignKey,
            violations,
        });
    }

    /// Makes applying `changeset_id` fail with a corrupt-changeset error.
    pub fn fail_apply(&mut self, changeset_id: &str, message: impl Into<String>) {
        self.script(changeset_id).failure = Some(message.into());
    }

    /// Sets the pending-changes flag once `changeset_id` commits.
    pub fn set_pending_after(&mut self, changeset_id: &str, pending: bool) {
        self.script(changeset_id).pending_after = Some(pending);
    }

    /// Sets the pending-changes flag.
    pub fn set_pending_local_changes(&mut self, pending: bool) {
        self.pending_local_changes = pending;
    }

    /// Sets a debug flag.
    pub fn set_debug_flag(&mut self, name: impl Into<String>, value: bool) {
        self.flags.insert(name.into(), value);
    }

    /// Makes state queries (pending changes, debug flags, parent id) fail.
    pub fn fail_state_queries(&mut self) {
        self.fail_state_queries = true;
    }

    /// Current parent changeset id.
    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    /// Every apply attempt, in order.
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Ids of every changeset handed to the store, in order.
    pub fn attempted(&self) -> Vec<String> {
        self.attempts.iter().map(|a| a.changeset_id.clone()).collect()
    }

    /// Ids of committed changesets, in order.
    pub fn committed(&self) -> Vec<String> {
        self.attempts
            .iter()
            .filter(|a| a.committed)
            .map(|a| a.changeset_id.clone())
            .collect()
    }

    /// Resolutions given for the most recent attempt of `changeset_id`.
    pub fn resolutions(&self, changeset_id: &str) -> Vec<Resolution> {
        self.attempts
            .iter()
            .rev()
            .find(|a| a.changeset_id == changeset_id)
            .map(|a| a.resolutions.clone())
            .unwrap_or_default()
    }

    fn script(&mut self, changeset_id: &str) -> &mut Script {
        self.scripts.entry(changeset_id.to_owned()).or_default()
    }

    fn check_queries(&self) -> StoreResult<()> {
        if self.fail_state_queries {
            return Err(StoreError::transaction_aborted("state query failed"));
        }
        Ok(())
    }
}

impl RowStore for ScriptedStore {
    fn apply_changeset(
        &mut self,
        changeset: &Changeset,
        handler: &mut dyn ConflictHandler,
    ) -> StoreResult<ApplyStatus> {
        let mut attempt = Attempt {
            changeset_id: changeset.id.clone(),
            resolutions: Vec::new(),
            committed: false,
        };
        let script = self.scripts.get(&changeset.id);

        if let Some(message) = script.and_then(|s| s.failure.as_ref()) {
            let err = StoreError::corrupt(message.clone());
            self.attempts.push(attempt);
            return Err(err);
        }

        let mut records_applied = 0;
        let mut records_filtered = 0;
        for (index, record) in changeset.iter().enumerate() {
            if !handler.filter_table(&record.table) {
                records_filtered += 1;
                continue;
            }
            let conflicts = script
                .map(|s| s.conflicts.as_slice())
                .unwrap_or_default()
                .iter()
                .filter(|c| c.record == index);
            for scripted in conflicts {
                let occurrence = if scripted.cause == ConflictCause::ForeignKey {
                    ConflictOccurrence::foreign_key(record, scripted.violations)
                } else {
                    ConflictOccurrence::new(scripted.cause, record)
                };
                let resolution = handler.on_conflict(&occurrence);
                attempt.resolutions.push(resolution);
                if resolution == Resolution::Abort {
                    self.attempts.push(attempt);
                    return Ok(ApplyStatus::Aborted);
                }
            }
            records_applied += 1;
        }

        if let Some(pending) = script.and_then(|s| s.pending_after) {
            self.pending_local_changes = pending;
        }
        attempt.committed = true;
        self.attempts.push(attempt);
        Ok(ApplyStatus::Committed {
            records_applied,
            records_filtered,
        })
    }

    fn foreign_key_violation_count(&self) -> StoreResult<usize> {
        self.check_queries()?;
        Ok(0)
    }

    fn has_pending_local_changes(&self) -> StoreResult<bool> {
        self.check_queries()?;
        Ok(self.pending_local_changes)
    }

    fn query_debug_flag(&self, name: &str) -> StoreResult<bool> {
        self.check_queries()?;
        Ok(self.flags.get(name).copied().unwrap_or(false))
    }

    fn parent_changeset_id(&self) -> StoreResult<String> {
        self.check_queries()?;
        Ok(self.parent_id.clone())
    }

    fn set_parent_changeset_id(&mut self, id: &str) -> StoreResult<()> {
        self.parent_id = id.to_owned();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use changemerge_changeset::{ChangeRecord, Value};

    fn changeset() -> Changeset {
        Changeset::new(
            "",
            vec![
                ChangeRecord::insert("Foo", &[0], vec![Value::Integer(1)]),
                ChangeRecord::insert("Bar", &[0], vec![Value::Integer(2)]),
            ],
        )
    }

    #[test]
    fn replays_script() {
        let cs = changeset();
        let mut store = ScriptedStore::new();
        store.conflict(&cs.id, 1, ConflictCause::Data);

        let mut seen = Vec::new();
        let mut handler = |o: &ConflictOccurrence<'_>| {
            seen.push((o.cause, o.table().to_owned()));
            Resolution::Replace
        };
        let status = store.apply_changeset(&cs, &mut handler).unwrap();

        assert!(status.is_committed());
        assert_eq!(seen, vec![(ConflictCause::Data, "Bar".to_owned())]);
        assert_eq!(store.committed(), vec![cs.id.clone()]);
        assert_eq!(store.resolutions(&cs.id), vec![Resolution::Replace]);
    }

    #[test]
    fn abort_stops_and_is_not_committed() {
        let cs = changeset();
        let mut store = ScriptedStore::new();
        store.conflict(&cs.id, 0, ConflictCause::Constraint);
        store.set_pending_after(&cs.id, true);

        let mut abort = |_: &ConflictOccurrence<'_>| Resolution::Abort;
        assert_eq!(
            store.apply_changeset(&cs, &mut abort).unwrap(),
            ApplyStatus::Aborted
        );
        assert!(store.committed().is_empty());
        assert!(!store.has_pending_local_changes().unwrap());
    }

    #[test]
    fn scripted_failure() {
        let cs = changeset();
        let mut store = ScriptedStore::new();
        store.fail_apply(&cs.id, "boom");

        let mut skip = |_: &ConflictOccurrence<'_>| Resolution::Skip;
        assert!(store.apply_changeset(&cs, &mut skip).is_err());
        assert_eq!(store.attempted(), vec![cs.id.clone()]);
    }
}
