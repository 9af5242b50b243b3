//! Dump changesets command implementation.

use crate::scenario::Scenario;
use changemerge_changeset::Changeset;
use std::path::Path;

/// Runs the dump command.
///
/// JSON output is the changesets themselves, in the format `incoming` accepts
/// as raw records.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(path)?;
    let prepared = scenario.prepare()?;
    let count = limit.map_or(prepared.changesets.len(), |l| l.min(prepared.changesets.len()));
    let changesets = &prepared.changesets[..count];

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(changesets)?);
        }
        _ => {
            print_text_output(changesets);
        }
    }

    Ok(())
}

fn print_text_output(changesets: &[Changeset]) {
    println!("Changesets ({} total)", changesets.len());
    println!("================");

    for (index, changeset) in changesets.iter().enumerate() {
        println!();
        let parent = if changeset.parent_id.is_empty() {
            "(initial)"
        } else {
            &changeset.parent_id[..12.min(changeset.parent_id.len())]
        };
        println!(
            "[{index}] {} parent={} records={} tables={}",
            changeset.short_id(),
            parent,
            changeset.len(),
            changeset.tables().join(",")
        );
        for record in changeset {
            let marker = if record.indirect { " (indirect)" } else { "" };
            println!(
                "  {:6} {}{}{}",
                record.opcode.as_str(),
                record.table,
                record.format_primary_key(),
                marker
            );
        }
    }
}
