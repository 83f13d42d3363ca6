//! CLI command definitions for the `dagrun` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod artifacts;
pub mod graph;
pub mod run;
pub mod runs;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use console::style;
use dagrun_types::action::{ActionStatus, SkipReason};
use dagrun_types::run::RunStatus;

/// Run and inspect artifact-tracked pipelines.
#[derive(Parser)]
#[command(name = "dagrun", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory (store, scratch space, run reports, dagrun.toml).
    #[arg(long, global = true, env = "DAGRUN_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the housing pipeline.
    Run(RunArgs),

    /// Show the validated execution order.
    Graph {
        /// Pipeline option as key=value (repeatable).
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// List artifact names, or the versions of one artifact.
    #[command(alias = "ls")]
    Artifacts {
        /// Artifact name.
        name: Option<String>,
    },

    /// List persisted runs, newest first.
    Runs {
        /// Maximum number of runs to display.
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show one run report.
    Show {
        /// Run id or a unique prefix of it.
        run_id: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Execute every action even when cached outputs match.
    #[arg(long)]
    pub no_cache: bool,

    /// Actions running concurrently within one dependency wave.
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Per-action timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Pipeline option as key=value (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long)]
    pub otel: bool,
}

// ---------------------------------------------------------------------------
// Shared formatting
// ---------------------------------------------------------------------------

pub(crate) fn status_cell(status: &ActionStatus) -> Cell {
    match status {
        ActionStatus::Succeeded => Cell::new("succeeded").fg(Color::Green),
        ActionStatus::Failed => Cell::new("failed").fg(Color::Red),
        ActionStatus::Skipped {
            reason: SkipReason::CacheHit,
        } => Cell::new("cached").fg(Color::Cyan),
        ActionStatus::Skipped {
            reason: SkipReason::UpstreamFailed { action },
        } => Cell::new(format!("blocked ({action})")).fg(Color::Yellow),
        ActionStatus::Skipped {
            reason: SkipReason::Cancelled,
        } => Cell::new("cancelled").fg(Color::DarkGrey),
        other => Cell::new(other.label()),
    }
}

pub(crate) fn styled_run_status(status: RunStatus) -> String {
    match status {
        RunStatus::Succeeded => style(status).green().bold().to_string(),
        RunStatus::Failed => style(status).red().bold().to_string(),
        RunStatus::Cancelled => style(status).yellow().bold().to_string(),
        RunStatus::Running => style(status).to_string(),
    }
}

pub(crate) fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_run_flags() {
        let cli = Cli::parse_from([
            "dagrun",
            "--json",
            "run",
            "--no-cache",
            "--max-parallel",
            "2",
            "--set",
            "rows=100",
            "--set",
            "seed=3",
        ]);
        assert!(cli.json);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert!(args.no_cache);
        assert_eq!(args.max_parallel, Some(2));
        assert_eq!(args.set, vec!["rows=100", "seed=3"]);
    }

    #[test]
    fn test_durations() {
        assert_eq!(format_duration(15), "15ms");
        assert_eq!(format_duration(2_500), "2.5s");
    }
}
