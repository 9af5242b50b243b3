//! Replay command implementation.

use crate::scenario::{Prepared, Scenario, ScenarioResult};
use changemerge_engine::{
    ConflictResolver, Diagnostic, DiagnosticSink, MemorySink, MergeOutcome, MergeSession,
    TracingSink,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// A finished replay.
#[derive(Debug)]
pub struct Replay {
    /// The scenario state after the merge.
    pub prepared: Prepared,
    /// Session outcome.
    pub outcome: MergeOutcome,
    /// Diagnostics emitted during the merge.
    pub diagnostics: Vec<Diagnostic>,
}

/// Replay summary for output.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    /// Changesets offered.
    pub changesets: usize,
    /// Changesets applied.
    pub applied_count: usize,
    /// Index of the failing changeset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<usize>,
    /// Why the merge stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Records applied.
    pub records_applied: usize,
    /// Records dropped by the table filter.
    pub records_filtered: usize,
    /// Conflicts seen.
    pub conflicts: usize,
    /// Conflicts resolved with replace.
    pub replaced: usize,
    /// Conflicts resolved with skip.
    pub skipped: usize,
    /// Conflicts per category.
    pub by_category: BTreeMap<String, usize>,
    /// Diagnostics in emission order.
    pub diagnostics: Vec<DiagnosticReport>,
}

/// One diagnostic for output.
#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    /// Level name.
    pub level: String,
    /// Table name.
    pub table: String,
    /// Conflict cause.
    pub cause: String,
    /// Conflict category.
    pub category: String,
    /// Resolution chosen.
    pub resolution: String,
    /// Message.
    pub message: String,
    /// Outstanding foreign-key violations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key_violations: Option<usize>,
    /// Record dump.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_dump: Option<String>,
}

impl From<&Diagnostic> for DiagnosticReport {
    fn from(d: &Diagnostic) -> Self {
        Self {
            level: d.level.to_string(),
            table: d.table.clone(),
            cause: d.cause.to_string(),
            category: d.category.to_string(),
            resolution: d.resolution.to_string(),
            message: d.message.clone(),
            foreign_key_violations: d.foreign_key_violations,
            record_dump: d.record_dump.clone(),
        }
    }
}

impl ReplayReport {
    /// Summarizes a replay.
    pub fn new(replay: &Replay) -> Self {
        let stats = &replay.outcome.stats;
        Self {
            changesets: replay.prepared.changesets.len(),
            applied_count: replay.outcome.applied_count,
            failed_at: replay.outcome.failed_at,
            reason: replay.outcome.reason.as_ref().map(ToString::to_string),
            records_applied: stats.records_applied,
            records_filtered: stats.records_filtered,
            conflicts: stats.conflicts,
            replaced: stats.replaced,
            skipped: stats.skipped,
            by_category: stats
                .by_category
                .iter()
                .map(|(category, count)| (category.to_string(), *count))
                .collect(),
            diagnostics: replay.diagnostics.iter().map(DiagnosticReport::from).collect(),
        }
    }
}

/// Forwards diagnostics to a capturing sink and to `tracing`.
struct Tee(Arc<MemorySink>);

impl DiagnosticSink for Tee {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.0.emit(diagnostic);
        TracingSink.emit(diagnostic);
    }
}

/// Prepares a scenario and pulls its changesets into the briefcase.
pub fn execute(scenario: &Scenario, verbose_diagnostics: bool) -> ScenarioResult<Replay> {
    let mut prepared = scenario.prepare()?;
    if verbose_diagnostics {
        prepared.config = prepared.config.clone().with_verbose_diagnostics(true);
    }

    let sink = Arc::new(MemorySink::new());
    let mut resolver =
        ConflictResolver::from_config(&prepared.config).with_sink(Arc::new(Tee(sink.clone())));
    if let Some(policy) = &prepared.policy {
        resolver = resolver.with_policy(Arc::new(policy.clone()));
    }

    let outcome = MergeSession::new(&mut prepared.briefcase, prepared.config.clone())
        .with_resolver(resolver)
        .pull(&prepared.changesets);

    Ok(Replay {
        prepared,
        outcome,
        diagnostics: sink.drain(),
    })
}

/// Runs the replay command.
pub fn run(
    path: &Path,
    verbose_diagnostics: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(path)?;
    let replay = execute(&scenario, verbose_diagnostics)?;
    let report = ReplayReport::new(&replay);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    match report.failed_at {
        None => Ok(()),
        Some(index) => Err(format!("merge stopped at changeset {index}").into()),
    }
}

fn print_text_output(report: &ReplayReport) {
    println!("Merge Replay");
    println!("============");
    println!();
    println!(
        "Changesets: {} applied of {}",
        report.applied_count, report.changesets
    );
    println!(
        "Records:    {} applied, {} filtered",
        report.records_applied, report.records_filtered
    );
    println!(
        "Conflicts:  {} ({} replaced, {} skipped)",
        report.conflicts, report.replaced, report.skipped
    );
    for (category, count) in &report.by_category {
        println!("  {category:<34} {count}");
    }

    if !report.diagnostics.is_empty() {
        println!();
        println!("Diagnostics:");
        for d in &report.diagnostics {
            println!(
                "  [{}] {} {} ({}): {} -> {}",
                d.level, d.table, d.cause, d.category, d.message, d.resolution
            );
            if let Some(dump) = &d.record_dump {
                for line in dump.lines() {
                    println!("      {line}");
                }
            }
        }
    }

    println!();
    match (&report.failed_at, &report.reason) {
        (Some(index), Some(reason)) => println!("✗ Merge stopped at changeset {index}: {reason}"),
        (Some(index), None) => println!("✗ Merge stopped at changeset {index}"),
        _ => println!("✓ Merge completed"),
    }
}
