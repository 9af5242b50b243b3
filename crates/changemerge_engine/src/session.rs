//! Merge sessions: catching a briefcase up on a sequence of changesets.

use crate::applier::{ApplyResult, ApplyStats, ChangesetApplier};
use crate::config::MergeConfig;
use crate::error::{MergeError, MergeResult};
use crate::resolver::ConflictResolver;
use crate::state::LocalDirtyState;
use changemerge_changeset::{Changeset, RowStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cancels a running merge session from another thread.
///
/// Cancellation takes effect before the next changeset starts; a changeset that
/// is already being applied runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates a handle that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears a previous cancellation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one [`MergeSession::run`].
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Changesets fully applied.
    pub applied_count: usize,
    /// Index of the changeset that stopped the session.
    pub failed_at: Option<usize>,
    /// Why the session stopped.
    pub reason: Option<MergeError>,
    /// Counters summed over the applied changesets.
    pub stats: ApplyStats,
}

impl MergeOutcome {
    /// Returns true if every changeset was applied.
    pub fn is_success(&self) -> bool {
        self.failed_at.is_none()
    }

    /// Converts into a `Result` carrying the number of applied changesets.
    pub fn into_result(self) -> MergeResult<usize> {
        match self.reason {
            Some(reason) => Err(reason),
            None => Ok(self.applied_count),
        }
    }

    fn fail(&mut self, index: usize, reason: MergeError) {
        self.failed_at = Some(index);
        self.reason = Some(reason);
    }
}

/// Applies an ordered list of changesets to one briefcase.
///
/// The session holds the store exclusively for its lifetime. Changesets are
/// applied strictly in order and the session stops at the first one that
/// aborts; changesets already applied stay applied.
pub struct MergeSession<'s, S: RowStore + ?Sized> {
    store: &'s mut S,
    config: MergeConfig,
    applier: ChangesetApplier,
    cancel: CancelHandle,
}

impl<'s, S: RowStore + ?Sized> MergeSession<'s, S> {
    /// Creates a session over `store`.
    pub fn new(store: &'s mut S, config: MergeConfig) -> Self {
        let applier = ChangesetApplier::new(&config);
        Self {
            store,
            config,
            applier,
            cancel: CancelHandle::new(),
        }
    }

    /// Replaces the conflict resolver, for a custom sink or policy.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.applier = self.applier.with_resolver(resolver);
        self
    }

    /// A handle that cancels this session between changesets.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The session configuration.
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        self.store
    }

    /// Reads the briefcase state and runs the session.
    pub fn pull(&mut self, changesets: &[Changeset]) -> MergeOutcome {
        match LocalDirtyState::query(&*self.store, &self.config) {
            Ok(state) => self.run(changesets, state),
            Err(e) => {
                let mut outcome = MergeOutcome::default();
                if !changesets.is_empty() {
                    outcome.fail(0, MergeError::StorageFailure(e));
                }
                outcome
            }
        }
    }

    /// Applies `changesets` in order, starting from `state`.
    ///
    /// `state` is used for the first changeset; before each later one the pending
    /// local changes flag is read again from the store.
    pub fn run(&mut self, changesets: &[Changeset], state: LocalDirtyState) -> MergeOutcome {
        info!(changesets = changesets.len(), "merge started");
        let mut outcome = MergeOutcome::default();
        let mut state = state;

        for (index, changeset) in changesets.iter().enumerate() {
            if let Err(reason) = self.prepare(index, changeset, &mut state) {
                warn!(index, changeset = changeset.short_id(), %reason, "merge stopped");
                outcome.fail(index, reason);
                break;
            }

            match self.applier.apply(self.store, changeset, &state) {
                ApplyResult::Success(stats) => {
                    if let Err(e) = self.store.set_parent_changeset_id(&changeset.id) {
                        outcome.fail(index, MergeError::StorageFailure(e));
                        break;
                    }
                    outcome.applied_count += 1;
                    outcome.stats.absorb(&stats);
                }
                ApplyResult::Aborted(reason) => {
                    warn!(index, changeset = changeset.short_id(), %reason, "merge aborted");
                    outcome.fail(index, reason);
                    break;
                }
            }
        }

        info!(
            applied = outcome.applied_count,
            failed_at = ?outcome.failed_at,
            conflicts = outcome.stats.conflicts,
            "merge finished"
        );
        outcome
    }

    /// Checks whether changeset `index` may start, refreshing `state`.
    fn prepare(
        &mut self,
        index: usize,
        changeset: &Changeset,
        state: &mut LocalDirtyState,
    ) -> MergeResult<()> {
        if self.cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }
        if index > 0 {
            state.has_pending_local_changes = self.store.has_pending_local_changes()?;
        }
        if self.config.verify_parent_chain {
            let expected = self.store.parent_changeset_id()?;
            if expected != changeset.parent_id {
                return Err(MergeError::ParentMismatch {
                    expected,
                    found: changeset.parent_id.clone(),
                });
            }
        }
        debug!(
            index,
            changeset = changeset.short_id(),
            pending_local_changes = state.has_pending_local_changes,
            "changeset ready"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use changemerge_changeset::{ChangeRecord, ConflictCause, Value};
    use changemerge_testkit::ScriptedStore;

    fn chain(len: usize) -> Vec<Changeset> {
        let mut parent = String::new();
        (0..len)
            .map(|i| {
                let cs = Changeset::new(
                    parent.clone(),
                    vec![ChangeRecord::insert("Foo", &[0], vec![Value::Integer(i as i64)])],
                );
                parent = cs.id.clone();
                cs
            })
            .collect()
    }

    #[test]
    fn empty_list_applies_nothing() {
        let mut store = ScriptedStore::new();
        let mut session = MergeSession::new(&mut store, MergeConfig::default());
        let outcome = session.run(&[], LocalDirtyState::clean());

        assert_eq!(outcome.applied_count, 0);
        assert!(outcome.failed_at.is_none());
        assert!(outcome.is_success());
    }

    #[test]
    fn stops_at_first_abort() {
        let changesets = chain(3);
        let mut store = ScriptedStore::new();
        store.foreign_key_conflict(&changesets[1].id, 0, 2);

        let outcome = MergeSession::new(&mut store, MergeConfig::default())
            .run(&changesets, LocalDirtyState::clean());

        assert_eq!(outcome.applied_count, 1);
        assert_eq!(outcome.failed_at, Some(1));
        assert!(matches!(
            outcome.reason,
            Some(MergeError::ForeignKeyIntegrityViolation { violations: 2 })
        ));
        assert_eq!(
            store.attempted(),
            vec![changesets[0].id.clone(), changesets[1].id.clone()]
        );
        assert_eq!(store.parent_id(), changesets[0].id);
    }

    #[test]
    fn advances_parent_id() {
        let changesets = chain(2);
        let mut store = ScriptedStore::new();
        let outcome = MergeSession::new(&mut store, MergeConfig::default())
            .run(&changesets, LocalDirtyState::clean());

        assert!(outcome.is_success());
        assert_eq!(outcome.applied_count, 2);
        assert_eq!(store.parent_id(), changesets[1].id);
    }

    #[test]
    fn rejects_broken_chain() {
        let mut changesets = chain(2);
        changesets.swap(0, 1);
        let mut store = ScriptedStore::new();
        let outcome = MergeSession::new(&mut store, MergeConfig::default())
            .run(&changesets, LocalDirtyState::clean());

        assert_eq!(outcome.failed_at, Some(0));
        assert!(matches!(outcome.reason, Some(MergeError::ParentMismatch { .. })));
        assert!(store.attempted().is_empty());

        let config = MergeConfig::new().with_verify_parent_chain(false);
        let outcome =
            MergeSession::new(&mut store, config).run(&changesets, LocalDirtyState::clean());
        assert!(outcome.is_success());
    }

    #[test]
    fn cancel_between_changesets() {
        let changesets = chain(2);
        let mut store = ScriptedStore::new();
        let mut session = MergeSession::new(&mut store, MergeConfig::default());
        session.cancel_handle().cancel();

        let outcome = session.run(&changesets, LocalDirtyState::clean());
        assert_eq!(outcome.applied_count, 0);
        assert_eq!(outcome.failed_at, Some(0));
        let reason = outcome.reason.unwrap();
        assert!(matches!(reason, MergeError::Cancelled));
        assert!(reason.is_retryable());
    }

    #[test]
    fn dirtiness_is_requeried_after_first_changeset() {
        let changesets = chain(2);
        let mut store = ScriptedStore::new();
        store.conflict(&changesets[1].id, 0, ConflictCause::Data);
        store.set_pending_after(&changesets[0].id, true);

        // Clean at the start, dirty once the first changeset lands.
        let outcome = MergeSession::new(&mut store, MergeConfig::default())
            .run(&changesets, LocalDirtyState::clean());

        assert_eq!(outcome.applied_count, 1);
        assert!(matches!(
            outcome.reason,
            Some(MergeError::PrimaryKeyCollisionWithLocalEdits { .. })
        ));
    }

    #[test]
    fn pull_reads_foreign_key_flag() {
        let changesets = chain(1);
        let mut store = ScriptedStore::new();
        store.foreign_key_conflict(&changesets[0].id, 0, 1);
        store.set_debug_flag(crate::config::FK_OVERRIDE_FLAG, true);

        let outcome = MergeSession::new(&mut store, MergeConfig::default()).pull(&changesets);
        assert!(outcome.is_success());
        assert_eq!(outcome.stats.skipped, 1);
    }

    #[test]
    fn pull_reports_state_query_failure() {
        let changesets = chain(1);
        let mut store = ScriptedStore::new();
        store.fail_state_queries();

        let outcome = MergeSession::new(&mut store, MergeConfig::default()).pull(&changesets);
        assert_eq!(outcome.failed_at, Some(0));
        assert!(matches!(outcome.reason, Some(MergeError::StorageFailure(_))));
    }
}
