//! Tracker: the per-action session mediating artifact I/O and metrics.
//!
//! An action never sees the store. Everything it reads or writes goes through
//! its `Tracker`, which enforces the action's resolved io, materializes
//! inputs into scratch space, publishes outputs atomically and records
//! lineage and metrics for the run report.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dagrun_types::action::ActionMeta;
use dagrun_types::artifact::{
    ArtifactFile, ArtifactRecord, ArtifactRef, ArtifactType, ObjectLocation, PublishOutcome,
};
use dagrun_types::error::StoreError;
use dagrun_types::event::RunEvent;
use thiserror::Error;
use uuid::Uuid;

use crate::action::ActionIo;
use crate::hash::artifact_version;
use crate::run::context::RunContext;

use super::keys;

// ---------------------------------------------------------------------------
// ArtifactError
// ---------------------------------------------------------------------------

/// Errors raised by `declare_input` / `declare_output`.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact '{0}' has never been published")]
    NotFound(String),

    #[error("action '{action}' may not {access} artifact '{artifact}'")]
    NotPermitted {
        action: String,
        artifact: String,
        access: &'static str,
    },

    #[error("artifact '{artifact}' was already declared in this run as version {existing}")]
    VersionConflict { artifact: String, existing: String },

    #[error("invalid output '{artifact}': {reason}")]
    InvalidOutput { artifact: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// OutputSpec
// ---------------------------------------------------------------------------

/// Description of one artifact to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub local_files: Vec<PathBuf>,
    pub destination: ObjectLocation,
    pub artifact_type: ArtifactType,
    /// Removed from each local path to form its key. Without it, keys are
    /// bare file names.
    pub strip_prefix: Option<PathBuf>,
}

impl OutputSpec {
    pub fn new(
        name: impl Into<String>,
        artifact_type: ArtifactType,
        destination: ObjectLocation,
    ) -> Self {
        Self {
            name: name.into(),
            local_files: Vec::new(),
            destination,
            artifact_type,
            strip_prefix: None,
        }
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_files.push(path.into());
        self
    }

    pub fn files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.local_files.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn strip_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// What a tracker recorded, handed back to the runner after `run`.
#[derive(Debug, Clone, Default)]
pub struct TrackerSession {
    pub inputs: Vec<ArtifactRef>,
    pub outputs: Vec<ArtifactRecord>,
    pub metrics: BTreeMap<String, f64>,
}

/// Per-action capability object passed to [`crate::action::Action::run`].
pub struct Tracker {
    ctx: RunContext,
    run_id: Uuid,
    meta: ActionMeta,
    io: ActionIo,
    /// Versions produced or propagated earlier in this run, by name.
    resolved: Arc<HashMap<String, ArtifactRecord>>,
    inputs: Vec<ArtifactRef>,
    outputs: Vec<ArtifactRecord>,
    metrics: BTreeMap<String, f64>,
}

impl Tracker {
    pub fn new(
        ctx: RunContext,
        run_id: Uuid,
        meta: ActionMeta,
        io: ActionIo,
        resolved: Arc<HashMap<String, ArtifactRecord>>,
    ) -> Self {
        Self {
            ctx,
            run_id,
            meta,
            io,
            resolved,
            inputs: Vec::new(),
            outputs: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn meta(&self) -> &ActionMeta {
        &self.meta
    }

    /// Inputs this action may declare and outputs it may publish.
    pub fn io(&self) -> &ActionIo {
        &self.io
    }

    pub fn declared_inputs(&self) -> &[ArtifactRef] {
        &self.inputs
    }

    pub fn declared_outputs(&self) -> &[ArtifactRecord] {
        &self.outputs
    }

    /// Metrics logged so far, last write wins per key.
    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    /// Private working directory for this action in this run, created on demand.
    pub async fn work_dir(&self) -> Result<PathBuf, ArtifactError> {
        let dir = self
            .ctx
            .scratch_dir()
            .join("work")
            .join(self.run_id.to_string())
            .join(&self.meta.name);
        tokio::fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;
        Ok(dir)
    }

    pub fn into_session(self) -> TrackerSession {
        TrackerSession {
            inputs: self.inputs,
            outputs: self.outputs,
            metrics: self.metrics,
        }
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Resolve a permitted input and materialize it locally.
    ///
    /// Uses the version produced earlier in this run when there is one,
    /// otherwise the store's most recent version. Files land under
    /// `{scratch}/inputs/{name}/{version}/` and are reused when already
    /// present with matching hashes. Returns paths in file order.
    pub async fn declare_input(&mut self, name: &str) -> Result<Vec<PathBuf>, ArtifactError> {
        if !self.io.permits_input(name) {
            return Err(ArtifactError::NotPermitted {
                action: self.meta.name.clone(),
                artifact: name.to_string(),
                access: "read",
            });
        }

        let record = match self.resolved.get(name) {
            Some(record) => record.clone(),
            None => {
                let store = self.ctx.store();
                self.ctx
                    .retry()
                    .run("latest", move || store.latest(name))
                    .await?
                    .ok_or_else(|| ArtifactError::NotFound(name.to_string()))?
            }
        };

        let dir = self
            .ctx
            .scratch_dir()
            .join("inputs")
            .join(&record.name)
            .join(&record.version);

        let mut paths = Vec::with_capacity(record.files.len());
        let mut fetched = 0usize;
        for file in &record.files {
            let path = keys::key_path(&dir, &file.key).ok_or_else(|| StoreError::Corrupt {
                key: file.key.clone(),
                reason: "unsafe object key".to_string(),
            })?;
            if !self.has_local_copy(&path, &file.hash).await {
                self.fetch(&record, file, &path).await?;
                fetched += 1;
            }
            paths.push(path);
        }

        let artifact = record.artifact_ref();
        tracing::debug!(
            run_id = %self.run_id,
            action = self.meta.name.as_str(),
            artifact = artifact.name.as_str(),
            version = artifact.short_version(),
            files = paths.len(),
            fetched,
            "declared input"
        );
        if !self.inputs.contains(&artifact) {
            self.inputs.push(artifact);
        }
        Ok(paths)
    }

    async fn has_local_copy(&self, path: &Path, hash: &str) -> bool {
        match tokio::fs::read(path).await {
            Ok(bytes) => self.ctx.hasher().compute_hash(&bytes) == hash,
            Err(_) => false,
        }
    }

    /// Download one file next to its final path, verify it, then rename.
    async fn fetch(
        &self,
        record: &ArtifactRecord,
        file: &ArtifactFile,
        path: &Path,
    ) -> Result<(), ArtifactError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        let tmp = path.with_extension(format!("part-{}", Uuid::now_v7().simple()));

        let store = self.ctx.store();
        let tmp_ref = tmp.as_path();
        let key = file.key.as_str();
        self.ctx
            .retry()
            .run("get", move || store.get(record, key, tmp_ref))
            .await?;

        let bytes = tokio::fs::read(&tmp).await.map_err(io_error(&tmp))?;
        if self.ctx.hasher().compute_hash(&bytes) != file.hash {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Corrupt {
                key: file.key.clone(),
                reason: "content hash mismatch".to_string(),
            }
            .into());
        }
        tokio::fs::rename(&tmp, path).await.map_err(io_error(path))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outputs
    // -----------------------------------------------------------------------

    /// Publish one of this action's outputs.
    ///
    /// Keys follow the strip-prefix rule, the version is the content hash of
    /// the files, and publication is a conditional create: identical content
    /// already in the store is not written again and its first record is
    /// returned.
    pub async fn declare_output(&mut self, spec: OutputSpec) -> Result<ArtifactRecord, ArtifactError> {
        let OutputSpec {
            name,
            local_files,
            destination,
            artifact_type,
            strip_prefix,
        } = spec;

        if !self.io.permits_output(&name) {
            return Err(ArtifactError::NotPermitted {
                action: self.meta.name.clone(),
                artifact: name,
                access: "write",
            });
        }
        if let Some(existing) = self.outputs.iter().find(|r| r.name == name) {
            return Err(ArtifactError::VersionConflict {
                artifact: name,
                existing: existing.version.clone(),
            });
        }
        let invalid = |reason: String| ArtifactError::InvalidOutput {
            artifact: name.clone(),
            reason,
        };
        if local_files.is_empty() {
            return Err(invalid("no files given".to_string()));
        }

        let mut entries: Vec<(ArtifactFile, PathBuf)> = Vec::with_capacity(local_files.len());
        for path in local_files {
            let key = keys::relative_key(&path, strip_prefix.as_deref()).map_err(invalid)?;
            if entries.iter().any(|(f, _)| f.key == key) {
                return Err(invalid(format!("duplicate key '{key}'")));
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(invalid(format!("missing file '{}'", path.display())));
                }
                Err(err) => return Err(io_error(&path)(err)),
            };
            let file = ArtifactFile {
                key,
                hash: self.ctx.hasher().compute_hash(&bytes),
                size_bytes: bytes.len() as u64,
            };
            entries.push((file, path));
        }
        entries.sort_by(|a, b| a.0.key.cmp(&b.0.key));
        let (files, sources): (Vec<ArtifactFile>, Vec<PathBuf>) = entries.into_iter().unzip();

        let record = ArtifactRecord {
            name: name.clone(),
            version: artifact_version(self.ctx.hasher(), &files),
            artifact_type,
            producer: self.meta.clone(),
            run_id: self.run_id,
            location: destination,
            files,
            created_at: Utc::now(),
            inputs: self.inputs.clone(),
        };

        let store = self.ctx.store();
        let retry = self.ctx.retry();
        let record_ref = &record;
        let sources_ref = sources.as_slice();
        let outcome = retry
            .run("put", move || store.put(record_ref, sources_ref))
            .await?;

        let committed = match outcome {
            PublishOutcome::Created => record,
            PublishOutcome::AlreadyExists => {
                let artifact = record.artifact_ref();
                let artifact_ref = &artifact;
                retry
                    .run("get_record", move || store.get_record(artifact_ref))
                    .await?
                    .unwrap_or(record)
            }
        };

        let created = outcome == PublishOutcome::Created;
        tracing::info!(
            run_id = %self.run_id,
            action = self.meta.name.as_str(),
            artifact = committed.name.as_str(),
            version = dagrun_types::artifact::short_version(&committed.version),
            files = committed.files.len(),
            created,
            "published artifact"
        );
        self.ctx.events().publish(RunEvent::ArtifactPublished {
            run_id: self.run_id,
            action: self.meta.name.clone(),
            artifact: committed.artifact_ref(),
            created,
        });
        self.outputs.push(committed.clone());
        Ok(committed)
    }

    // -----------------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------------

    /// Merge metrics into this session and forward them to the metrics sink.
    ///
    /// A repeated key overwrites its earlier value.
    pub fn log<I, K>(&mut self, metrics: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let batch: BTreeMap<String, f64> = metrics
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        if batch.is_empty() {
            return;
        }
        self.metrics
            .extend(batch.iter().map(|(k, v)| (k.clone(), *v)));

        if let Err(err) = self
            .ctx
            .metrics()
            .record(self.run_id, &self.meta.name, &batch)
        {
            tracing::warn!(
                run_id = %self.run_id,
                action = self.meta.name.as_str(),
                error = %err,
                "metrics sink rejected batch"
            );
        }
        self.ctx.events().publish(RunEvent::MetricsLogged {
            run_id: self.run_id,
            action: self.meta.name.clone(),
            metrics: batch,
        });
    }
}
