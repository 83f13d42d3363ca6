//! `dagrun run`: execute the housing pipeline and persist its report.

use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dagrun_core::graph::ActionBuilder;
use dagrun_core::run::RunOptions;
use dagrun_observe::attrs;
use dagrun_types::action::ActionStatus;
use dagrun_types::config::PipelineConfig;
use dagrun_types::event::RunEvent;
use dagrun_types::run::RunReport;
use tokio::sync::broadcast::error::RecvError;
use tracing::Instrument;

use super::{RunArgs, format_duration, status_cell, styled_run_status};
use crate::housing::{HousingPipeline, PROJECT_NAME};
use crate::state::AppState;

/// Run options after applying command-line overrides to the config.
pub fn effective_options(state: &AppState, args: &RunArgs) -> RunOptions {
    let mut options = state.run_options();
    if args.no_cache {
        options.caching = false;
    }
    if let Some(max_parallel) = args.max_parallel {
        options.max_parallel = max_parallel.max(1);
    }
    if let Some(secs) = args.timeout {
        options.action_timeout = Some(Duration::from_secs(secs));
    }
    options
}

/// Build, run and persist one pipeline run.
pub async fn execute(state: &AppState, args: &RunArgs, show_progress: bool) -> Result<RunReport> {
    let config = PipelineConfig::from_assignments(&args.set).map_err(anyhow::Error::msg)?;
    let options = effective_options(state, args);
    let (ctx, metrics_file) = state.run_context().await?;
    let runner = HousingPipeline
        .to_runner(&config, ctx)?
        .with_options(options);

    let token = runner.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("  Cancelling: waiting for running actions to finish...");
            token.cancel();
        }
    });

    let progress = show_progress.then(|| {
        let mut rx = runner.events().subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let done = matches!(event, RunEvent::RunFinished { .. });
                        print_progress(&event);
                        if done {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let span = tracing::info_span!(
        "dagrun.run",
        dagrun.project = PROJECT_NAME,
        dagrun.run.id = tracing::field::Empty,
        dagrun.run.status = tracing::field::Empty,
        dagrun.run.actions = runner.graph().len() as u64,
        dagrun.run.succeeded = tracing::field::Empty,
        dagrun.run.cached = tracing::field::Empty,
        dagrun.run.failed = tracing::field::Empty,
        dagrun.run.duration_ms = tracing::field::Empty,
    );
    let result = runner.run().instrument(span.clone()).await;
    ctrl_c.abort();
    if let Some(progress) = progress {
        // RunFinished is only published when the run got past setup.
        if result.is_ok() {
            let _ = progress.await;
        } else {
            progress.abort();
        }
    }
    if let Some(sink) = &metrics_file {
        if let Err(err) = sink.flush().await {
            tracing::warn!(path = %sink.path().display(), error = %err, "failed to flush metrics file");
        }
    }
    let report = result?;

    let counts = report.counts();
    span.record(attrs::RUN_ID, tracing::field::display(report.run_id));
    span.record(attrs::RUN_STATUS, tracing::field::display(report.status));
    span.record(attrs::RUN_SUCCEEDED, counts.succeeded as u64);
    span.record(attrs::RUN_CACHED, counts.cached as u64);
    span.record(attrs::RUN_FAILED, counts.failed as u64);
    if let Some(ms) = report.duration_ms() {
        span.record(attrs::RUN_DURATION_MS, ms);
    }

    let path = state.run_log().save(&report).await?;
    tracing::info!(run_id = %report.run_id, path = %path.display(), "run report saved");
    Ok(report)
}

/// `dagrun run`. Returns the report so the caller can pick an exit code.
pub async fn run(state: &AppState, args: &RunArgs, json: bool, quiet: bool) -> Result<RunReport> {
    let report = execute(state, args, !json && !quiet).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        print_report(&report);
    }
    Ok(report)
}

fn print_progress(event: &RunEvent) {
    match event {
        RunEvent::RunStarted { project, actions, .. } => {
            println!();
            println!(
                "  {} Running '{}' ({} actions)",
                style("*").green().bold(),
                style(project).cyan(),
                actions
            );
        }
        RunEvent::ActionStarted { action, .. } => {
            println!("    {} {}", style(">").dim(), action);
        }
        RunEvent::ArtifactPublished {
            artifact, created, ..
        } => {
            let note = if *created { "published" } else { "unchanged" };
            println!(
                "      {} {}@{} ({note})",
                style("+").green(),
                artifact.name,
                artifact.short_version()
            );
        }
        RunEvent::ActionFinished { action, status, .. } => match status {
            ActionStatus::Failed => println!("    {} {}", style("x").red().bold(), action),
            ActionStatus::Skipped { reason } => {
                println!("    {} {} ({reason})", style("-").dim(), action)
            }
            _ => {}
        },
        RunEvent::MetricsLogged { .. } | RunEvent::RunFinished { .. } => {}
    }
}

/// Per-action status table plus metrics and errors.
pub fn print_report(report: &RunReport) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Action").fg(Color::Cyan),
            Cell::new("Job type"),
            Cell::new("Status"),
            Cell::new("Duration"),
            Cell::new("Outputs"),
        ]);

    for action in &report.actions {
        let outputs = action
            .outputs
            .iter()
            .map(|o| format!("{}@{}", o.name, o.short_version()))
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(&action.name),
            Cell::new(&action.job_type),
            status_cell(&action.status),
            Cell::new(format_duration(action.duration_ms)),
            Cell::new(if outputs.is_empty() { "-".to_string() } else { outputs }),
        ]);
    }

    println!();
    println!(
        "  Run {} ({})",
        style(report.run_id).cyan(),
        styled_run_status(report.status)
    );
    println!();
    println!("{table}");

    for action in report.actions.iter().filter(|a| !a.metrics.is_empty()) {
        let metrics = action
            .metrics
            .iter()
            .map(|(k, v)| format!("{k}={v:.4}"))
            .collect::<Vec<_>>()
            .join("  ");
        println!("  {} {}: {metrics}", style("Metrics").bold(), action.name);
    }
    for action in &report.actions {
        if let Some(err) = &action.error {
            println!("  {} {}: {}", style("Error").red().bold(), action.name, err);
        }
    }

    let counts = report.counts();
    println!();
    println!(
        "  {} succeeded, {} cached, {} failed, {} blocked, {} cancelled",
        counts.succeeded, counts.cached, counts.failed, counts.blocked, counts.cancelled
    );
    println!();
}
