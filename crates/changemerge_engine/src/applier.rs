//! Applying one changeset.

use crate::classifier::Category;
use crate::config::MergeConfig;
use crate::error::{MergeError, MergeResult};
use crate::resolver::{decide, ConflictResolver};
use crate::state::LocalDirtyState;
use changemerge_changeset::{
    ApplyStatus, Changeset, ConflictHandler, ConflictOccurrence, Resolution, RowStore, StoreError,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Counters for one or more applied changesets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Records processed by the store.
    pub records_applied: usize,
    /// Records dropped by the table filter.
    pub records_filtered: usize,
    /// Conflicts reported by the store.
    pub conflicts: usize,
    /// Conflicts resolved with `Replace`.
    pub replaced: usize,
    /// Conflicts resolved with `Skip`.
    pub skipped: usize,
    /// Conflicts per category.
    pub by_category: BTreeMap<Category, usize>,
}

impl ApplyStats {
    /// Adds another set of counters to this one.
    pub fn absorb(&mut self, other: &ApplyStats) {
        self.records_applied += other.records_applied;
        self.records_filtered += other.records_filtered;
        self.conflicts += other.conflicts;
        self.replaced += other.replaced;
        self.skipped += other.skipped;
        for (category, count) in &other.by_category {
            *self.by_category.entry(*category).or_insert(0) += count;
        }
    }

    /// Conflicts of one category.
    pub fn count(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    fn record(&mut self, category: Category, resolution: Resolution) {
        self.conflicts += 1;
        *self.by_category.entry(category).or_insert(0) += 1;
        match resolution {
            Resolution::Replace => self.replaced += 1,
            Resolution::Skip => self.skipped += 1,
            Resolution::Abort => {}
        }
    }
}

/// Result of applying one changeset.
#[derive(Debug)]
pub enum ApplyResult {
    /// Every record was processed and the changeset committed.
    Success(ApplyStats),
    /// Nothing from the changeset remains in the store.
    Aborted(MergeError),
}

impl ApplyResult {
    /// Returns true if the changeset committed.
    pub fn is_success(&self) -> bool {
        matches!(self, ApplyResult::Success(_))
    }

    /// Converts into a `Result`.
    pub fn into_result(self) -> MergeResult<ApplyStats> {
        match self {
            ApplyResult::Success(stats) => Ok(stats),
            ApplyResult::Aborted(reason) => Err(reason),
        }
    }
}

/// Replays changesets against a row store, resolving conflicts as they come.
#[derive(Debug, Clone)]
pub struct ChangesetApplier {
    resolver: ConflictResolver,
    config: MergeConfig,
}

impl ChangesetApplier {
    /// Creates an applier from a configuration, logging through `tracing`.
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            resolver: ConflictResolver::from_config(config),
            config: config.clone(),
        }
    }

    /// Replaces the resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// The resolver in use.
    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Applies one changeset all-or-nothing.
    ///
    /// On `Aborted` the store has rolled back every change from this changeset.
    /// Store failures are not retried.
    pub fn apply<S: RowStore + ?Sized>(
        &self,
        store: &mut S,
        changeset: &Changeset,
        state: &LocalDirtyState,
    ) -> ApplyResult {
        debug!(
            changeset = changeset.short_id(),
            records = changeset.len(),
            pending_local_changes = state.has_pending_local_changes,
            "applying changeset"
        );

        let mut handler = ResolvingHandler {
            resolver: &self.resolver,
            config: &self.config,
            state,
            stats: ApplyStats::default(),
            abort: None,
        };

        let status = match store.apply_changeset(changeset, &mut handler) {
            Ok(status) => status,
            Err(e) => {
                warn!(changeset = changeset.short_id(), error = %e, "row store failed");
                return ApplyResult::Aborted(MergeError::StorageFailure(e));
            }
        };

        let ResolvingHandler {
            mut stats, abort, ..
        } = handler;
        match status {
            ApplyStatus::Committed {
                records_applied,
                records_filtered,
            } => {
                stats.records_applied = records_applied;
                stats.records_filtered = records_filtered;
                if stats.count(Category::ForeignKey) > 0 {
                    // Skipped under the override; the violations are now committed.
                    match store.foreign_key_violation_count() {
                        Ok(count) => warn!(
                            changeset = changeset.short_id(),
                            violations = count,
                            "changeset committed with foreign key violations"
                        ),
                        Err(e) => return ApplyResult::Aborted(MergeError::StorageFailure(e)),
                    }
                }
                debug!(
                    changeset = changeset.short_id(),
                    conflicts = stats.conflicts,
                    "changeset applied"
                );
                ApplyResult::Success(stats)
            }
            ApplyStatus::Aborted => {
                let reason = abort.unwrap_or_else(|| {
                    MergeError::StorageFailure(StoreError::transaction_aborted(
                        "row store aborted without a conflict",
                    ))
                });
                debug!(changeset = changeset.short_id(), %reason, "changeset aborted");
                ApplyResult::Aborted(reason)
            }
        }
    }
}

/// Bridges row-store conflict callbacks to the resolver.
struct ResolvingHandler<'a> {
    resolver: &'a ConflictResolver,
    config: &'a MergeConfig,
    state: &'a LocalDirtyState,
    stats: ApplyStats,
    abort: Option<MergeError>,
}

impl ConflictHandler for ResolvingHandler<'_> {
    fn filter_table(&mut self, table: &str) -> bool {
        self.config.includes_table(table)
    }

    fn on_conflict(&mut self, occurrence: &ConflictOccurrence<'_>) -> Resolution {
        let category = self.resolver.classify(occurrence, self.state);
        let decision = self.resolver.resolve(category, occurrence, self.state);
        self.stats.record(category, decision.resolution);

        if decision.resolution == Resolution::Abort && self.abort.is_none() {
            let overridden = decision.from_policy
                && decide(category, occurrence, self.state).resolution != decision.resolution;
            self.abort = Some(abort_reason(category, occurrence, overridden));
        }
        decision.resolution
    }
}

fn abort_reason(
    category: Category,
    occurrence: &ConflictOccurrence<'_>,
    overridden: bool,
) -> MergeError {
    match category {
        Category::PrimaryKeyCollisionLocalDirty if !overridden => MergeError::key_collision(
            occurrence.table(),
            occurrence.record.format_primary_key(),
        ),
        Category::ForeignKey if !overridden => MergeError::ForeignKeyIntegrityViolation {
            violations: occurrence.foreign_key_violations,
        },
        _ => MergeError::RejectedByPolicy {
            table: occurrence.table().to_owned(),
            cause: occurrence.cause,
        },
    }
}
