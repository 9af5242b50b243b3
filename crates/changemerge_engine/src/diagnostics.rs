//! Conflict diagnostics and where they go.
//!
//! The resolver reports every decision worth surfacing to a [`DiagnosticSink`].
//! [`TracingSink`] forwards to `tracing` and is the default; [`MemorySink`] keeps
//! diagnostics for inspection in tests and tools.

use crate::classifier::Category;
use changemerge_changeset::{ConflictCause, Resolution};
use parking_lot::Mutex;
use std::fmt;
use tracing::{error, info, warn};

/// Severity of a diagnostic, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    /// The merge stops; includes a record dump.
    Fatal,
    /// An integrity failure.
    Error,
    /// A rejected row or a downgraded integrity failure.
    Warning,
    /// A benign, expected conflict. Only emitted with verbose diagnostics.
    Info,
    /// Not reported.
    Silent,
}

impl DiagnosticLevel {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticLevel::Fatal => "fatal",
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Silent => "silent",
        }
    }
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported conflict decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Severity.
    pub level: DiagnosticLevel,
    /// Table of the conflicting record.
    pub table: String,
    /// Conflict cause reported by the row store.
    pub cause: ConflictCause,
    /// Classified category.
    pub category: Category,
    /// Resolution chosen.
    pub resolution: Resolution,
    /// Outstanding foreign-key violations, for foreign-key conflicts.
    pub foreign_key_violations: Option<usize>,
    /// Full record dump, for fatal diagnostics.
    pub record_dump: Option<String>,
    /// Human-readable summary.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} conflict, {}): {} -> {}",
            self.level, self.table, self.cause, self.category, self.message, self.resolution
        )?;
        if let Some(dump) = &self.record_dump {
            write!(f, "\n{dump}")?;
        }
        Ok(())
    }
}

/// Receives diagnostics from the resolver.
pub trait DiagnosticSink: Send + Sync {
    /// Records one diagnostic.
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to `tracing`.
///
/// `Fatal` has no `tracing` level of its own; it is logged at error level with
/// `fatal = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, d: &Diagnostic) {
        let cause = d.cause.as_str();
        let category = d.category.as_str();
        match d.level {
            DiagnosticLevel::Fatal => error!(
                fatal = true,
                table = %d.table,
                cause,
                category,
                resolution = %d.resolution,
                record = d.record_dump.as_deref().unwrap_or(""),
                "{}",
                d.message
            ),
            DiagnosticLevel::Error => error!(
                table = %d.table,
                cause,
                category,
                resolution = %d.resolution,
                violations = d.foreign_key_violations.unwrap_or(0),
                "{}",
                d.message
            ),
            DiagnosticLevel::Warning => warn!(
                table = %d.table,
                cause,
                category,
                resolution = %d.resolution,
                "{}",
                d.message
            ),
            DiagnosticLevel::Info => info!(
                table = %d.table,
                cause,
                category,
                resolution = %d.resolution,
                "{}",
                d.message
            ),
            DiagnosticLevel::Silent => {}
        }
    }
}

/// Keeps diagnostics in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All diagnostics so far, in emission order.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    /// Diagnostics at exactly `level`.
    pub fn at_level(&self, level: DiagnosticLevel) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.level == level)
            .cloned()
            .collect()
    }

    /// Number of diagnostics so far.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes and returns all diagnostics.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.entries.lock().push(diagnostic.clone());
    }
}

/// Discards diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _diagnostic: &Diagnostic) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic(level: DiagnosticLevel) -> Diagnostic {
        Diagnostic {
            level,
            table: "Foo".into(),
            cause: ConflictCause::Constraint,
            category: Category::ConstraintViolation,
            resolution: Resolution::Skip,
            foreign_key_violations: None,
            record_dump: None,
            message: "incoming row rejected".into(),
        }
    }

    #[test]
    fn memory_sink_captures() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        sink.emit(&diagnostic(DiagnosticLevel::Warning));
        sink.emit(&diagnostic(DiagnosticLevel::Info));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.at_level(DiagnosticLevel::Warning).len(), 1);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(DiagnosticLevel::Fatal < DiagnosticLevel::Error);
        assert!(DiagnosticLevel::Warning < DiagnosticLevel::Info);
        assert_eq!(DiagnosticLevel::Fatal.to_string(), "fatal");
    }

    #[test]
    fn display_includes_dump() {
        let mut d = diagnostic(DiagnosticLevel::Fatal);
        d.record_dump = Some("INSERT Foo key=(1)".into());
        let text = d.to_string();
        assert!(text.starts_with("[fatal] Foo (constraint conflict, constraint_violation)"));
        assert!(text.ends_with("\nINSERT Foo key=(1)"));
    }

    #[test]
    fn tracing_and_null_sinks_accept_everything() {
        for level in [
            DiagnosticLevel::Fatal,
            DiagnosticLevel::Error,
            DiagnosticLevel::Warning,
            DiagnosticLevel::Info,
            DiagnosticLevel::Silent,
        ] {
            TracingSink.emit(&diagnostic(level));
            NullSink.emit(&diagnostic(level));
        }
    }
}
