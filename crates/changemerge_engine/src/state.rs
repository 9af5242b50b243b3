//! Briefcase-local state consulted while resolving conflicts.

use crate::config::{MergeConfig, FK_OVERRIDE_FLAG};
use changemerge_changeset::{RowStore, StoreResult};

/// Local state of the target briefcase.
///
/// Read fresh from the store for every merge session; a session refreshes
/// `has_pending_local_changes` again before each changeset after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalDirtyState {
    /// The briefcase has local modifications not yet packaged into a changeset.
    pub has_pending_local_changes: bool,
    /// Foreign-key conflicts are skipped instead of aborting.
    pub allow_foreign_key_violations: bool,
}

impl LocalDirtyState {
    /// A briefcase with no pending changes and no override.
    pub fn clean() -> Self {
        Self::default()
    }

    /// A briefcase with pending local changes.
    pub fn dirty() -> Self {
        Self {
            has_pending_local_changes: true,
            ..Self::default()
        }
    }

    /// Sets the foreign-key override.
    #[must_use]
    pub fn with_foreign_key_override(mut self, allow: bool) -> Self {
        self.allow_foreign_key_violations = allow;
        self
    }

    /// Reads the state from a store.
    ///
    /// An explicit override in `config` takes precedence over the store's
    /// [`FK_OVERRIDE_FLAG`] debug flag.
    pub fn query<S: RowStore + ?Sized>(store: &S, config: &MergeConfig) -> StoreResult<Self> {
        let allow_foreign_key_violations = match config.allow_foreign_key_violations {
            Some(allow) => allow,
            None => store.query_debug_flag(FK_OVERRIDE_FLAG)?,
        };
        Ok(Self {
            has_pending_local_changes: store.has_pending_local_changes()?,
            allow_foreign_key_violations,
        })
    }
}
