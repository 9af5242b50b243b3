//! Inspect command implementation.

use super::replay;
use crate::scenario::Scenario;
use changemerge_changeset::{RowStore, Value};
use changemerge_store::MemoryDatabase;
use serde::Serialize;
use std::path::Path;

/// Briefcase inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Whether the incoming changesets were pulled first.
    pub after_merge: bool,
    /// Current parent changeset id.
    pub parent_changeset_id: String,
    /// Local change records not yet pushed.
    pub pending_records: usize,
    /// Changesets in the scenario.
    pub incoming_changesets: usize,
    /// Per-table statistics.
    pub tables: Vec<TableStats>,
    /// Dangling foreign-key references.
    pub foreign_key_violations: Vec<String>,
    /// Table rows (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<TableRows>>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: String,
    /// Number of columns.
    pub columns: usize,
    /// Number of rows.
    pub rows: usize,
}

/// Rows of a single table, rendered as text.
#[derive(Debug, Serialize)]
pub struct TableRows {
    /// Table name.
    pub name: String,
    /// Rows in key order.
    pub rows: Vec<Vec<String>>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    after_merge: bool,
    show_rows: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(path)?;
    let (briefcase, incoming) = if after_merge {
        let replay = replay::execute(&scenario, false)?;
        let count = replay.prepared.changesets.len();
        (replay.prepared.briefcase, count)
    } else {
        let prepared = scenario.prepare()?;
        let count = prepared.changesets.len();
        (prepared.briefcase, count)
    };

    let result = inspect(&briefcase, after_merge, incoming, show_rows)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn inspect(
    briefcase: &MemoryDatabase,
    after_merge: bool,
    incoming_changesets: usize,
    show_rows: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut tables = Vec::new();
    let mut rows = Vec::new();
    for schema in briefcase.schemas() {
        tables.push(TableStats {
            name: schema.name.clone(),
            columns: schema.columns.len(),
            rows: briefcase.row_count(&schema.name)?,
        });
        if show_rows {
            rows.push(TableRows {
                name: schema.name.clone(),
                rows: briefcase
                    .rows(&schema.name)?
                    .iter()
                    .map(|row| row.iter().map(Value::to_string).collect())
                    .collect(),
            });
        }
    }

    let foreign_key_violations = briefcase
        .foreign_key_violations()
        .iter()
        .map(|v| {
            format!(
                "{}{} -> {}{}",
                v.child_table,
                format_key(&v.child_key),
                v.parent_table,
                format_key(&v.parent_key)
            )
        })
        .collect();

    Ok(InspectResult {
        after_merge,
        parent_changeset_id: briefcase.parent_changeset_id()?,
        pending_records: briefcase.pending_records().len(),
        incoming_changesets,
        tables,
        foreign_key_violations,
        rows: show_rows.then_some(rows),
    })
}

fn format_key(key: &[Value]) -> String {
    let parts: Vec<String> = key.iter().map(Value::to_string).collect();
    format!("({})", parts.join(", "))
}

fn print_text_output(result: &InspectResult) {
    println!("Briefcase Inspection");
    println!("====================");
    println!();
    let parent = if result.parent_changeset_id.is_empty() {
        "(initial)"
    } else {
        &result.parent_changeset_id
    };
    println!("Parent changeset: {parent}");
    println!("Pending records:  {}", result.pending_records);
    println!(
        "Incoming:         {} changeset(s){}",
        result.incoming_changesets,
        if result.after_merge { ", pulled" } else { "" }
    );
    println!();
    println!("Tables:");
    for table in &result.tables {
        println!(
            "  {:<24} {} rows, {} columns",
            table.name, table.rows, table.columns
        );
    }

    if !result.foreign_key_violations.is_empty() {
        println!();
        println!("Foreign key violations:");
        for violation in &result.foreign_key_violations {
            println!("  {violation}");
        }
    }

    if let Some(tables) = &result.rows {
        for table in tables {
            println!();
            println!("{}:", table.name);
            for row in &table.rows {
                println!("  {}", row.join(" | "));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::tests::SCENARIO;

    #[test]
    fn before_and_after_merge() {
        let scenario = Scenario::parse(SCENARIO).unwrap();

        let before = scenario.prepare().unwrap();
        let result = inspect(&before.briefcase, false, before.changesets.len(), true).unwrap();
        assert_eq!(result.incoming_changesets, 2);
        assert_eq!(result.tables[0].name, "Child");
        assert_eq!(result.tables[0].rows, 1);
        assert_eq!(result.rows.as_ref().unwrap()[1].rows.len(), 1);

        let replay = replay::execute(&scenario, false).unwrap();
        let result = inspect(&replay.prepared.briefcase, true, 2, false).unwrap();
        assert!(result.tables.iter().all(|t| t.rows == 0));
        assert_eq!(result.parent_changeset_id, replay.prepared.changesets[1].id);
        assert!(result.rows.is_none());
        assert!(result.foreign_key_violations.is_empty());
    }
}
