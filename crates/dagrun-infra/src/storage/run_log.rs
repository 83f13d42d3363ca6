//! Persisted run reports.
//!
//! Each finished run is written to `{root}/runs/{run_id}.json`. Run ids are
//! UUID v7, so lexical file order is also chronological order.

use std::path::{Path, PathBuf};

use dagrun_types::error::StoreError;
use dagrun_types::run::RunReport;
use uuid::Uuid;

use super::local::{read_json, write_json_atomic};

/// JSON file per run report.
#[derive(Debug, Clone)]
pub struct JsonRunLog {
    dir: PathBuf,
}

impl JsonRunLog {
    /// Log rooted at `{root}/runs/`.
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("runs"),
        }
    }

    fn path(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    pub async fn save(&self, report: &RunReport) -> Result<PathBuf, StoreError> {
        let path = self.path(report.run_id);
        write_json_atomic(&path, report).await?;
        tracing::debug!(run_id = %report.run_id, path = %path.display(), "saved run report");
        Ok(path)
    }

    pub async fn load(&self, run_id: Uuid) -> Result<Option<RunReport>, StoreError> {
        read_json(&self.path(run_id)).await
    }

    /// Every persisted run id, oldest first.
    pub async fn run_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(id) = Uuid::parse_str(stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Every persisted report, newest first.
    pub async fn list(&self) -> Result<Vec<RunReport>, StoreError> {
        let mut reports = Vec::new();
        for id in self.run_ids().await?.into_iter().rev() {
            if let Some(report) = self.load(id).await? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    pub async fn latest(&self) -> Result<Option<RunReport>, StoreError> {
        match self.run_ids().await?.pop() {
            Some(id) => self.load(id).await,
            None => Ok(None),
        }
    }

    /// Resolve a full run id or a unique prefix of one.
    pub async fn find(&self, id_or_prefix: &str) -> Result<Option<RunReport>, StoreError> {
        if let Ok(id) = Uuid::parse_str(id_or_prefix) {
            return self.load(id).await;
        }
        let prefix = id_or_prefix.to_ascii_lowercase();
        let matches: Vec<Uuid> = self
            .run_ids()
            .await?
            .into_iter()
            .filter(|id| id.to_string().starts_with(&prefix))
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [id] => self.load(*id).await,
            _ => Err(StoreError::Conflict(format!(
                "run id prefix '{id_or_prefix}' matches {} runs",
                matches.len()
            ))),
        }
    }
}
