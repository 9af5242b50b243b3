//! Conflict resolution.
//!
//! [`decide`] is the built-in decision table: a pure function from a category and
//! the briefcase state to a resolution and a diagnostic level. [`ConflictResolver`]
//! puts an optional [`ExternalConflictPolicy`] in front of it and reports the
//! outcome to a [`DiagnosticSink`].

use crate::classifier::{classify, Category};
use crate::config::MergeConfig;
use crate::diagnostics::{Diagnostic, DiagnosticLevel, DiagnosticSink, TracingSink};
use crate::policy::ExternalConflictPolicy;
use crate::state::LocalDirtyState;
use changemerge_changeset::{ConflictOccurrence, DbOpcode, Resolution};
use std::fmt;
use std::sync::Arc;

/// A resolution and how loudly to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Resolution handed back to the row store.
    pub resolution: Resolution,
    /// Diagnostic level.
    pub level: DiagnosticLevel,
    /// The external policy made this decision.
    pub from_policy: bool,
}

impl Decision {
    fn table(resolution: Resolution, level: DiagnosticLevel) -> Self {
        Self {
            resolution,
            level,
            from_policy: false,
        }
    }
}

/// The built-in decision table.
///
/// | Category | Resolution | Level |
/// |---|---|---|
/// | key collision, clean | Replace | info |
/// | key collision, dirty | Abort | fatal |
/// | foreign key | Abort, or Skip with the override | error, or warning |
/// | cascade delete artifact | Skip | info |
/// | metadata null on delete | Skip | info |
/// | not found, update | Skip | info |
/// | not found, other | Replace | info |
/// | constraint violation | Skip | warning |
/// | generic overwrite | Replace | silent |
pub fn decide(
    category: Category,
    _occurrence: &ConflictOccurrence<'_>,
    state: &LocalDirtyState,
) -> Decision {
    use DiagnosticLevel::{Error, Fatal, Info, Silent, Warning};
    use Resolution::{Abort, Replace, Skip};

    match category {
        Category::PrimaryKeyCollisionLocalClean => Decision::table(Replace, Info),
        Category::PrimaryKeyCollisionLocalDirty => Decision::table(Abort, Fatal),
        Category::ForeignKey if state.allow_foreign_key_violations => {
            Decision::table(Skip, Warning)
        }
        Category::ForeignKey => Decision::table(Abort, Error),
        Category::CascadeDeleteArtifact | Category::MetadataNullOnDelete => {
            Decision::table(Skip, Info)
        }
        Category::NotFoundOther {
            operation: DbOpcode::Update,
        } => Decision::table(Skip, Info),
        Category::NotFoundOther { .. } => Decision::table(Replace, Info),
        Category::ConstraintViolation => Decision::table(Skip, Warning),
        Category::GenericOverwrite => Decision::table(Replace, Silent),
    }
}

/// Classifies and resolves conflicts, reporting each decision.
///
/// Never fails: every conflict gets a resolution.
#[derive(Clone)]
pub struct ConflictResolver {
    sink: Arc<dyn DiagnosticSink>,
    policy: Option<Arc<dyn ExternalConflictPolicy>>,
    verbose: bool,
    metadata_table_prefix: String,
}

impl ConflictResolver {
    /// Creates a resolver that logs through `tracing` with the default prefix.
    pub fn new() -> Self {
        Self::from_config(&MergeConfig::default())
    }

    /// Creates a resolver using the diagnostics settings of `config`.
    pub fn from_config(config: &MergeConfig) -> Self {
        Self {
            sink: Arc::new(TracingSink),
            policy: None,
            verbose: config.verbose_diagnostics,
            metadata_table_prefix: config.metadata_table_prefix.clone(),
        }
    }

    /// Sends diagnostics to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Consults `policy` before the built-in table.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn ExternalConflictPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Enables or disables info-level diagnostics.
    #[must_use]
    pub fn with_verbose_diagnostics(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns true if an external policy is installed.
    pub fn has_policy(&self) -> bool {
        self.policy.is_some()
    }

    /// Classifies a conflict against this resolver's metadata prefix.
    pub fn classify(
        &self,
        occurrence: &ConflictOccurrence<'_>,
        state: &LocalDirtyState,
    ) -> Category {
        classify(
            occurrence,
            state.has_pending_local_changes,
            &self.metadata_table_prefix,
        )
    }

    /// Decides a classified conflict and emits its diagnostic.
    pub fn resolve(
        &self,
        category: Category,
        occurrence: &ConflictOccurrence<'_>,
        state: &LocalDirtyState,
    ) -> Decision {
        let decision = self.decide(category, occurrence, state);
        self.report(category, occurrence, decision);
        decision
    }

    fn decide(
        &self,
        category: Category,
        occurrence: &ConflictOccurrence<'_>,
        state: &LocalDirtyState,
    ) -> Decision {
        let default = decide(category, occurrence, state);
        let Some(resolution) = self
            .policy
            .as_ref()
            .and_then(|policy| policy.resolve(category, occurrence))
        else {
            return default;
        };

        let level = if resolution == Resolution::Abort {
            DiagnosticLevel::Fatal
        } else if resolution == default.resolution {
            default.level
        } else {
            DiagnosticLevel::Warning
        };
        Decision {
            resolution,
            level,
            from_policy: true,
        }
    }

    fn report(
        &self,
        category: Category,
        occurrence: &ConflictOccurrence<'_>,
        decision: Decision,
    ) {
        let level = decision.level;
        if level == DiagnosticLevel::Silent || (level == DiagnosticLevel::Info && !self.verbose) {
            return;
        }

        let record = occurrence.record;
        let foreign_key_violations =
            (category == Category::ForeignKey).then_some(occurrence.foreign_key_violations);
        let message = Message {
            category,
            occurrence,
            decision,
        }
        .to_string();

        self.sink.emit(&Diagnostic {
            level,
            table: record.table.clone(),
            cause: occurrence.cause,
            category,
            resolution: decision.resolution,
            foreign_key_violations,
            record_dump: (level == DiagnosticLevel::Fatal).then(|| record.dump()),
            message,
        });
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("policy", &self.policy.is_some())
            .field("verbose", &self.verbose)
            .field("metadata_table_prefix", &self.metadata_table_prefix)
            .finish()
    }
}

/// Diagnostic message text.
struct Message<'a, 'r> {
    category: Category,
    occurrence: &'a ConflictOccurrence<'r>,
    decision: Decision,
}

impl fmt::Display for Message<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.occurrence.record;
        let key = record.format_primary_key();
        if self.decision.from_policy {
            write!(f, "conflict policy chose {} for ", self.decision.resolution)?;
        }
        match self.category {
            Category::PrimaryKeyCollisionLocalClean => {
                write!(f, "replaying insert over existing key {key}")
            }
            Category::PrimaryKeyCollisionLocalDirty => write!(
                f,
                "insert collides with key {key} while local changes are pending; \
                 identifiers were allocated without a lock"
            ),
            Category::ForeignKey => write!(
                f,
                "{} foreign key violation(s) after applying changeset",
                self.occurrence.foreign_key_violations
            ),
            Category::CascadeDeleteArtifact => {
                write!(f, "row {key} already deleted, likely by a cascade")
            }
            Category::MetadataNullOnDelete => {
                write!(f, "metadata row {key} already gone after delete")
            }
            Category::NotFoundOther { operation } => {
                write!(f, "{operation} target row {key} not found")
            }
            Category::ConstraintViolation => {
                write!(f, "incoming {} of {key} violates a constraint", record.opcode)
            }
            Category::GenericOverwrite => {
                write!(f, "local row {key} differs from incoming pre-image")
            }
        }
    }
}
