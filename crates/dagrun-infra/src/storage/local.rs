//! Local filesystem object store.
//!
//! Implements the `ArtifactStore` trait from `dagrun-core` with the same
//! semantics as an S3-compatible bucket: immutable objects addressed by
//! `bucket/key`, plus a metadata record per committed version.
//!
//! Directory layout:
//! ```text
//! {root}/
//!   objects/{bucket}/{prefix}{name}/{version}/{relative_key}
//!   meta/{name}/{version}.json       committed ArtifactRecord
//!   cache/{cache_key}.json           CacheEntry
//!   staging/put-*/                   private, removed on every exit path
//! ```
//!
//! On each publish:
//! 1. Copy every source file into a fresh staging directory
//! 2. Under the commit lock, re-check that the version is still absent
//! 3. Rename the staging directory into place under `objects/`
//! 4. Write the metadata record (temp file + rename)
//!
//! A version is visible only once step 4 completes, so readers never see a
//! partially published artifact.

use std::path::{Path, PathBuf};

use dagrun_core::artifact::ArtifactStore;
use dagrun_core::artifact::keys::key_path;
use dagrun_types::artifact::{ArtifactRecord, ArtifactRef, CacheEntry, ObjectLocation, PublishOutcome};
use dagrun_types::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Filesystem-backed `ArtifactStore`.
pub struct LocalObjectStore {
    root: PathBuf,
    commit_lock: Mutex<()>,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn meta_dir(&self, name: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("meta").join(segment(name)?))
    }

    fn meta_path(&self, artifact: &ArtifactRef) -> Result<PathBuf, StoreError> {
        let version = segment(&artifact.version)?;
        Ok(self.meta_dir(&artifact.name)?.join(format!("{version}.json")))
    }

    fn cache_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("cache").join(format!("{}.json", segment(key)?)))
    }

    /// Directory holding every object of one version.
    fn version_dir(
        &self,
        location: &ObjectLocation,
        name: &str,
        version: &str,
    ) -> Result<PathBuf, StoreError> {
        let bucket = segment(&location.bucket)?;
        let relative = format!("{}{}/{}", location.prefix, segment(name)?, segment(version)?);
        key_path(&self.root.join("objects").join(bucket), &relative)
            .ok_or_else(|| StoreError::Conflict(format!("unsafe object prefix '{relative}'")))
    }

    /// Copy sources into `staging` under their relative keys.
    async fn stage(
        &self,
        staging: &Path,
        record: &ArtifactRecord,
        sources: &[PathBuf],
    ) -> Result<(), StoreError> {
        for (file, source) in record.files.iter().zip(sources) {
            let dest = key_path(staging, &file.key)
                .ok_or_else(|| StoreError::Conflict(format!("unsafe object key '{}'", file.key)))?;
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(source, &dest).await?;
        }
        Ok(())
    }

    async fn commit(
        &self,
        record: &ArtifactRecord,
        staging: &Path,
        meta_path: &Path,
    ) -> Result<PublishOutcome, StoreError> {
        let _guard = self.commit_lock.lock().await;
        if tokio::fs::try_exists(meta_path).await? {
            return Ok(PublishOutcome::AlreadyExists);
        }

        let version_dir = self.version_dir(&record.location, &record.name, &record.version)?;
        if tokio::fs::try_exists(&version_dir).await? {
            // Objects left behind by an interrupted publish.
            tracing::warn!(
                artifact = %record.name,
                version = dagrun_types::artifact::short_version(&record.version),
                "replacing uncommitted objects"
            );
            tokio::fs::remove_dir_all(&version_dir).await?;
        }
        if let Some(parent) = version_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(staging, &version_dir).await?;
        write_json_atomic(meta_path, record).await?;
        Ok(PublishOutcome::Created)
    }

    async fn read_versions(&self, name: &str) -> Result<Vec<ArtifactRecord>, StoreError> {
        let dir = self.meta_dir(name)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            if let Some(record) = read_json::<ArtifactRecord>(&path).await? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.version.cmp(&b.version)));
        Ok(records)
    }
}

impl std::fmt::Debug for LocalObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalObjectStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ArtifactStore for LocalObjectStore {
    async fn exists(&self, artifact: &ArtifactRef) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.meta_path(artifact)?).await?)
    }

    async fn get_record(&self, artifact: &ArtifactRef) -> Result<Option<ArtifactRecord>, StoreError> {
        read_json(&self.meta_path(artifact)?).await
    }

    async fn latest(&self, name: &str) -> Result<Option<ArtifactRecord>, StoreError> {
        Ok(self.read_versions(name).await?.pop())
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<ArtifactRecord>, StoreError> {
        self.read_versions(name).await
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(self.root.join("meta")).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let mut versions = tokio::fs::read_dir(entry.path()).await?;
            while let Some(version) = versions.next_entry().await? {
                if is_record_file(&version.path()) {
                    names.push(name);
                    break;
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn put(
        &self,
        record: &ArtifactRecord,
        sources: &[PathBuf],
    ) -> Result<PublishOutcome, StoreError> {
        if sources.len() != record.files.len() {
            return Err(StoreError::Conflict(format!(
                "{} sources for {} files",
                sources.len(),
                record.files.len()
            )));
        }
        let meta_path = self.meta_path(&record.artifact_ref())?;
        if tokio::fs::try_exists(&meta_path).await? {
            return Ok(PublishOutcome::AlreadyExists);
        }

        let staging_root = self.root.join("staging");
        tokio::fs::create_dir_all(&staging_root).await?;
        // Removed on drop, including when the caller drops this future
        // mid-publish. After a successful commit the directory has already
        // been renamed away and the removal is a no-op.
        let staging = tempfile::Builder::new()
            .prefix("put-")
            .tempdir_in(&staging_root)?;

        let outcome = match self.stage(staging.path(), record, sources).await {
            Ok(()) => self.commit(record, staging.path(), &meta_path).await,
            Err(err) => Err(err),
        };
        drop(staging);

        if let Ok(outcome) = &outcome {
            tracing::debug!(
                artifact = %record.name,
                version = dagrun_types::artifact::short_version(&record.version),
                files = record.files.len(),
                created = matches!(outcome, PublishOutcome::Created),
                "put artifact"
            );
        }
        outcome
    }

    async fn get(&self, record: &ArtifactRecord, key: &str, dest: &Path) -> Result<(), StoreError> {
        let version_dir = self.version_dir(&record.location, &record.name, &record.version)?;
        let source = key_path(&version_dir, key)
            .ok_or_else(|| StoreError::Conflict(format!("unsafe object key '{key}'")))?;
        match tokio::fs::copy(&source, dest).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(
                record.location.object_key(&record.name, &record.version, key),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn lookup_cache(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        read_json(&self.cache_path(key)?).await
    }

    async fn record_cache(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        write_json_atomic(&self.cache_path(&entry.key)?, entry).await
    }
}

/// A single path segment: safe as a key and free of separators.
fn segment(value: &str) -> Result<&str, StoreError> {
    if dagrun_core::artifact::keys::is_safe_key(value) && !value.contains('/') {
        Ok(value)
    } else {
        Err(StoreError::Conflict(format!("invalid path segment '{value}'")))
    }
}

fn is_record_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !file_name.starts_with('.') && file_name.ends_with(".json")
}

/// Read and parse a JSON document; `None` when the file does not exist.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|err| StoreError::Corrupt {
            key: path.display().to_string(),
            reason: err.to_string(),
        })
}

/// Write a JSON document via a temp file and rename.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Io(format!("'{}' has no parent", path.display())))?;
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let tmp = parent.join(format!(".{file_name}.tmp-{}", Uuid::now_v7().simple()));
    let json = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(&tmp, json).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use dagrun_types::action::ActionMeta;
    use dagrun_types::artifact::{ArtifactFile, ArtifactType};
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        store: LocalObjectStore,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(tmp.path().join("store"));
        Fixture { tmp, store }
    }

    impl Fixture {
        /// Write a source file and a matching single-file record.
        async fn record(&self, name: &str, version: &str, content: &str, offset: i64) -> (ArtifactRecord, PathBuf) {
            let source = self.tmp.path().join(format!("{name}-{version}.csv"));
            tokio::fs::write(&source, content).await.unwrap();
            let record = ArtifactRecord {
                name: name.to_string(),
                version: version.to_string(),
                artifact_type: ArtifactType::Dataset,
                producer: ActionMeta::new("ingest", "ingest-dataset", "default"),
                run_id: Uuid::now_v7(),
                location: ObjectLocation::new("local", "artifacts"),
                files: vec![ArtifactFile {
                    key: "part/rows.csv".to_string(),
                    hash: format!("h-{version}"),
                    size_bytes: content.len() as u64,
                }],
                created_at: Utc::now() + Duration::seconds(offset),
                inputs: Vec::new(),
            };
            (record, source)
        }
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let f = fixture();
        let (record, source) = f.record("dataset", "v1", "a,b\n1,2\n", 0).await;

        let outcome = f.store.put(&record, &[source]).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Created);
        assert!(f.store.exists(&record.artifact_ref()).await.unwrap());
        assert_eq!(f.store.get_record(&record.artifact_ref()).await.unwrap(), Some(record.clone()));

        let dest = f.tmp.path().join("fetched.csv");
        f.store.get(&record, "part/rows.csv", &dest).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&dest).await.unwrap(), "a,b\n1,2\n");

        let object = f
            .store
            .root()
            .join("objects/local/artifacts/dataset/v1/part/rows.csv");
        assert!(object.exists());
    }

    #[tokio::test]
    async fn test_second_put_is_noop() {
        let f = fixture();
        let (record, source) = f.record("dataset", "v1", "x", 0).await;
        f.store.put(&record, &[source.clone()]).await.unwrap();

        let mut later = record.clone();
        later.run_id = Uuid::now_v7();
        let outcome = f.store.put(&later, &[source]).await.unwrap();
        assert_eq!(outcome, PublishOutcome::AlreadyExists);

        let versions = f.store.list_versions("dataset").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].run_id, record.run_id, "first publication wins");
    }

    #[tokio::test]
    async fn test_concurrent_identical_puts_commit_once() {
        let f = fixture();
        let (record, source) = f.record("dataset", "v1", "x", 0).await;
        let sources = [source];
        let (a, b) = tokio::join!(f.store.put(&record, &sources), f.store.put(&record, &sources));
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes.iter().filter(|o| **o == PublishOutcome::Created).count(),
            1
        );
        assert_eq!(f.store.list_versions("dataset").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_versions_latest_and_names() {
        let f = fixture();
        let (old, s1) = f.record("dataset", "v1", "1", -10).await;
        let (new, s2) = f.record("dataset", "v2", "2", 0).await;
        let (model, s3) = f.record("model", "m1", "3", 0).await;
        f.store.put(&new, &[s2]).await.unwrap();
        f.store.put(&old, &[s1]).await.unwrap();
        f.store.put(&model, &[s3]).await.unwrap();

        let versions: Vec<String> = f
            .store
            .list_versions("dataset")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec!["v1", "v2"]);
        assert_eq!(f.store.latest("dataset").await.unwrap().unwrap().version, "v2");
        assert!(f.store.latest("missing").await.unwrap().is_none());
        assert_eq!(f.store.list_names().await.unwrap(), vec!["dataset", "model"]);
    }

    #[tokio::test]
    async fn test_empty_store_lists_nothing() {
        let f = fixture();
        assert!(f.store.list_names().await.unwrap().is_empty());
        assert!(f.store.list_versions("dataset").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_staging_is_cleaned_after_publish() {
        let f = fixture();
        let (record, source) = f.record("dataset", "v1", "x", 0).await;
        f.store.put(&record, &[source]).await.unwrap();

        let mut staging = tokio::fs::read_dir(f.store.root().join("staging")).await.unwrap();
        assert!(staging.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_staging_leaves_nothing_visible() {
        let f = fixture();
        let (record, _) = f.record("dataset", "v1", "x", 0).await;
        let missing = f.tmp.path().join("does-not-exist.csv");

        let err = f.store.put(&record, &[missing]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!f.store.exists(&record.artifact_ref()).await.unwrap());
        assert!(f.store.list_names().await.unwrap().is_empty());
        let mut staging = tokio::fs::read_dir(f.store.root().join("staging")).await.unwrap();
        assert!(staging.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interrupted_put_removes_staging() {
        use std::future::Future;
        use std::task::Poll;

        let f = fixture();
        // Drop the publish future after a growing number of polls so it is
        // interrupted at different points of staging and commit.
        for polls in 1..30 {
            let (record, source) = f
                .record("dataset", &format!("v{polls}"), "a,b\n1,2\n", 0)
                .await;
            let sources = [source];
            let mut put = std::pin::pin!(f.store.put(&record, &sources));
            for _ in 0..polls {
                let ready =
                    std::future::poll_fn(|cx| Poll::Ready(put.as_mut().poll(cx).is_ready())).await;
                if ready {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        }

        let mut staging = tokio::fs::read_dir(f.store.root().join("staging")).await.unwrap();
        assert!(staging.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uncommitted_objects_are_replaced() {
        let f = fixture();
        let (record, source) = f.record("dataset", "v1", "fresh", 0).await;
        let stale = f
            .store
            .root()
            .join("objects/local/artifacts/dataset/v1/part/rows.csv");
        tokio::fs::create_dir_all(stale.parent().unwrap()).await.unwrap();
        tokio::fs::write(&stale, "stale").await.unwrap();

        assert_eq!(f.store.put(&record, &[source]).await.unwrap(), PublishOutcome::Created);
        assert_eq!(tokio::fs::read_to_string(&stale).await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let f = fixture();
        let (record, source) = f.record("dataset", "v1", "x", 0).await;
        f.store.put(&record, &[source]).await.unwrap();

        let dest = f.tmp.path().join("out.csv");
        let err = f.store.get(&record, "other.csv", &dest).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(key) if key.ends_with("dataset/v1/other.csv")));
    }

    #[tokio::test]
    async fn test_corrupt_record_reported() {
        let f = fixture();
        let path = f.store.root().join("meta/dataset/v1.json");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = f
            .store
            .get_record(&ArtifactRef::new("dataset", "v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_unsafe_names_rejected() {
        let f = fixture();
        let (mut record, source) = f.record("dataset", "v1", "x", 0).await;
        record.name = "../escape".to_string();
        assert!(matches!(
            f.store.put(&record, &[source]).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(f.store.latest("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_cache_entries_round_trip() {
        let f = fixture();
        assert!(f.store.lookup_cache("abc123").await.unwrap().is_none());

        let entry = CacheEntry {
            key: "abc123".to_string(),
            action: "train".to_string(),
            outputs: vec![ArtifactRef::new("model", "m1")],
            run_id: Uuid::now_v7(),
            created_at: Utc::now(),
        };
        f.store.record_cache(&entry).await.unwrap();
        assert_eq!(f.store.lookup_cache("abc123").await.unwrap(), Some(entry.clone()));

        let mut replaced = entry.clone();
        replaced.outputs = vec![ArtifactRef::new("model", "m2")];
        f.store.record_cache(&replaced).await.unwrap();
        assert_eq!(f.store.lookup_cache("abc123").await.unwrap(), Some(replaced));
    }
}
