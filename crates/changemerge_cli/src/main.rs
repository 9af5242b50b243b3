//! changemerge CLI
//!
//! Command-line tools for replaying changeset merges against an in-memory
//! briefcase described by a JSON scenario file.
//!
//! # Commands
//!
//! - `replay` - Pull the scenario's changesets and report conflicts
//! - `dump` - Print the scenario's incoming changesets
//! - `inspect` - Display briefcase state before or after the merge

mod commands;
mod scenario;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Changeset merge scenario tools.
#[derive(Parser)]
#[command(name = "changemerge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull the scenario's changesets into its briefcase
    Replay {
        /// Scenario file
        scenario: PathBuf,

        /// Report benign conflicts as well
        #[arg(short = 'd', long)]
        diagnostics: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the scenario's incoming changesets
    Dump {
        /// Scenario file
        scenario: PathBuf,

        /// Maximum number of changesets to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display briefcase state
    Inspect {
        /// Scenario file
        scenario: PathBuf,

        /// Pull the incoming changesets first
        #[arg(short, long)]
        after: bool,

        /// Show table rows
        #[arg(short, long)]
        rows: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            scenario,
            diagnostics,
            format,
        } => {
            commands::replay::run(&scenario, diagnostics, &format)?;
        }
        Commands::Dump {
            scenario,
            limit,
            format,
        } => {
            commands::dump::run(&scenario, limit, &format)?;
        }
        Commands::Inspect {
            scenario,
            after,
            rows,
            format,
        } => {
            commands::inspect::run(&scenario, after, rows, &format)?;
        }
        Commands::Version => {
            println!("changemerge CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("changemerge engine v{}", changemerge_engine::VERSION);
        }
    }

    Ok(())
}
