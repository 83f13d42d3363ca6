//! `dagrun artifacts [NAME]`: browse the local artifact store.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dagrun_core::artifact::ArtifactStore;
use dagrun_types::artifact::{ArtifactRecord, short_version};

use crate::state::AppState;

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

pub async fn list_artifacts(state: &AppState, name: Option<&str>, json: bool) -> Result<()> {
    let store = state.store();
    match name {
        None => list_names(&store, json).await,
        Some(name) => list_versions(&store, name, json).await,
    }
}

async fn list_names(store: &impl ArtifactStore, json: bool) -> Result<()> {
    let names = store.list_names().await?;
    let mut latest: Vec<ArtifactRecord> = Vec::with_capacity(names.len());
    for name in &names {
        if let Some(record) = store.latest(name).await? {
            latest.push(record);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&latest)?);
        return Ok(());
    }

    if latest.is_empty() {
        println!();
        println!("  No artifacts yet. Run a pipeline with: dagrun run");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Latest"),
            Cell::new("Producer"),
            Cell::new("Created"),
        ]);
    for record in &latest {
        table.add_row(vec![
            Cell::new(&record.name),
            Cell::new(record.artifact_type.to_string()),
            Cell::new(short_version(&record.version)),
            Cell::new(&record.producer.name),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn list_versions(store: &impl ArtifactStore, name: &str, json: bool) -> Result<()> {
    let versions = store.list_versions(name).await?;
    if versions.is_empty() {
        anyhow::bail!("artifact '{name}' not found");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Version").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Producer"),
            Cell::new("Run"),
            Cell::new("Files"),
            Cell::new("Size"),
            Cell::new("Created"),
        ]);
    // Newest first.
    for record in versions.iter().rev() {
        table.add_row(vec![
            Cell::new(short_version(&record.version)),
            Cell::new(record.artifact_type.to_string()),
            Cell::new(&record.producer.name),
            Cell::new(record.run_id.to_string()),
            Cell::new(record.files.len()),
            Cell::new(format_size(record.total_size_bytes())),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }

    println!();
    println!(
        "  {} '{}' ({} versions)",
        style("Artifact").bold(),
        style(name).cyan(),
        versions.len()
    );
    println!();
    println!("{table}");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[tokio::test]
    async fn test_unknown_artifact_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let state = AppState::init(Some(PathBuf::from(tmp.path()))).await.unwrap();
        list_artifacts(&state, None, true).await.unwrap();
        let err = list_artifacts(&state, Some("missing"), true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
