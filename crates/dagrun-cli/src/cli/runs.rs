//! `dagrun runs` and `dagrun show`: inspect persisted run reports.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use dagrun_types::run::RunReport;

use super::run::print_report;
use super::{format_duration, styled_run_status};
use crate::state::AppState;

pub async fn list_runs(state: &AppState, limit: usize, json: bool) -> Result<()> {
    let mut reports = state.run_log().list().await?;
    reports.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if reports.is_empty() {
        println!();
        println!("  No runs yet. Start one with: dagrun run");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("Project"),
            Cell::new("Status"),
            Cell::new("Actions"),
            Cell::new("Duration"),
            Cell::new("Started"),
        ]);
    for report in &reports {
        table.add_row(vec![
            Cell::new(report.run_id.to_string()),
            Cell::new(&report.project),
            Cell::new(styled_run_status(report.status)),
            Cell::new(summary(report)),
            Cell::new(
                report
                    .duration_ms()
                    .map(|ms| format_duration(ms.max(0) as u64))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(report.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn show_run(state: &AppState, id_or_prefix: &str, json: bool) -> Result<()> {
    let Some(report) = state.run_log().find(id_or_prefix).await? else {
        anyhow::bail!("run '{id_or_prefix}' not found");
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// "3 ok, 1 cached, 0 failed" style summary.
fn summary(report: &RunReport) -> String {
    let counts = report.counts();
    let mut parts = vec![format!("{} ok", counts.succeeded)];
    if counts.cached > 0 {
        parts.push(format!("{} cached", counts.cached));
    }
    if counts.failed > 0 {
        parts.push(format!("{} failed", counts.failed));
    }
    if counts.blocked + counts.cancelled > 0 {
        parts.push(format!("{} skipped", counts.blocked + counts.cancelled));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dagrun_types::run::RunStatus;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn report() -> RunReport {
        RunReport {
            run_id: Uuid::now_v7(),
            project: "demo".to_string(),
            status: RunStatus::Succeeded,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            actions: vec![],
        }
    }

    #[test]
    fn test_summary_of_empty_run() {
        assert_eq!(summary(&report()), "0 ok");
    }

    #[tokio::test]
    async fn test_show_by_prefix_and_missing() {
        let tmp = TempDir::new().unwrap();
        let state = AppState::init(Some(PathBuf::from(tmp.path()))).await.unwrap();
        let saved = report();
        state.run_log().save(&saved).await.unwrap();

        let full = saved.run_id.to_string();
        show_run(&state, &full, true).await.unwrap();
        show_run(&state, &full[..13], true).await.unwrap();
        assert!(show_run(&state, "ffffffff", true).await.is_err());
        list_runs(&state, 5, true).await.unwrap();
    }
}
