//! # changemerge Engine
//!
//! Merge engine that catches a briefcase up on changesets produced elsewhere.
//!
//! This crate provides:
//! - Conflict classification ([`classify`], [`Category`])
//! - The built-in resolution table ([`decide`]) behind a [`ConflictResolver`] that
//!   accepts an [`ExternalConflictPolicy`] and reports to a [`DiagnosticSink`]
//! - All-or-nothing application of one changeset ([`ChangesetApplier`])
//! - Ordered, cancellable application of many ([`MergeSession`])
//!
//! ## Resolution rules
//!
//! | Conflict | Resolution |
//! |---|---|
//! | insert key collision, briefcase clean | Replace |
//! | insert key collision, local changes pending | Abort |
//! | foreign key | Abort, or Skip with `allowForeignKeyViolations` |
//! | delete of a missing row | Skip |
//! | update of a missing `ec_` row | Skip |
//! | update of another missing row | Skip |
//! | constraint | Skip |
//! | stale pre-image | Replace |
//!
//! ## Key Invariants
//!
//! - Changesets are applied in the order given and never reordered
//! - An aborted changeset leaves the store exactly as it was
//! - Only key collisions with pending local changes and foreign-key failures abort
//!   by default
//! - Storage failures are reported, never retried
//!
//! ## Example
//!
//! ```
//! use changemerge_changeset::{ChangeRecord, Changeset, Value};
//! use changemerge_engine::{MergeConfig, MergeSession};
//! use changemerge_store::{MemoryDatabase, TableSchema};
//!
//! let schema = TableSchema::new("Foo").required("id").column("name").primary_key(&["id"]);
//! let mut briefcase = MemoryDatabase::with_schema([schema]).unwrap();
//!
//! let changeset = Changeset::new(
//!     "",
//!     vec![ChangeRecord::insert("Foo", &[0], vec![Value::Integer(1), "a".into()])],
//! );
//! let outcome = MergeSession::new(&mut briefcase, MergeConfig::default()).pull(&[changeset]);
//! assert!(outcome.is_success());
//! assert_eq!(outcome.applied_count, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod classifier;
mod config;
mod diagnostics;
mod error;
mod policy;
mod resolver;
mod session;
mod state;

pub use applier::{ApplyResult, ApplyStats, ChangesetApplier};
pub use classifier::{classify, Category};
pub use config::{MergeConfig, DEFAULT_METADATA_TABLE_PREFIX, FK_OVERRIDE_FLAG};
pub use diagnostics::{
    Diagnostic, DiagnosticLevel, DiagnosticSink, MemorySink, NullSink, TracingSink,
};
pub use error::{MergeError, MergeResult};
pub use policy::{ExternalConflictPolicy, TablePolicy};
pub use resolver::{decide, ConflictResolver, Decision};
pub use session::{CancelHandle, MergeOutcome, MergeSession};
pub use state::LocalDirtyState;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
