//! dagrun CLI entry point.
//!
//! Binary name: `dagrun`
//!
//! Parses CLI arguments, initializes tracing and application state, then
//! dispatches to the appropriate command handler.

mod cli;
mod housing;
mod state;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;
use dagrun_observe::{TracingOptions, init_tracing, shutdown_tracing, verbosity_filter};
use dagrun_types::run::RunStatus;

use cli::{Cli, Commands};
use state::AppState;

/// Exit code for a run interrupted with Ctrl+C.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "dagrun", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let otel = matches!(&cli.command, Commands::Run(args) if args.otel);
    init_tracing(&TracingOptions {
        filter: verbosity_filter(cli.verbose, cli.quiet).to_string(),
        json: cli.json,
        otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let state = AppState::init(cli.data_dir).await?;

    match cli.command {
        Commands::Run(args) => {
            let report = cli::run::run(&state, &args, cli.json, cli.quiet).await?;
            return Ok(match report.status {
                RunStatus::Succeeded => ExitCode::SUCCESS,
                RunStatus::Cancelled => ExitCode::from(EXIT_CANCELLED),
                RunStatus::Failed | RunStatus::Running => ExitCode::FAILURE,
            });
        }

        Commands::Graph { set } => {
            cli::graph::show_graph(&set, cli.json)?;
        }

        Commands::Artifacts { name } => {
            cli::artifacts::list_artifacts(&state, name.as_deref(), cli.json).await?;
        }

        Commands::Runs { limit } => {
            cli::runs::list_runs(&state, limit, cli.json).await?;
        }

        Commands::Show { run_id } => {
            cli::runs::show_run(&state, &run_id, cli.json).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(ExitCode::SUCCESS)
}
