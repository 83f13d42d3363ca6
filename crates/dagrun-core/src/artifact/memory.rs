//! In-memory artifact store.
//!
//! Keeps objects and records in `DashMap`s. Cloning shares the same
//! underlying maps, so several contexts (or a test and a runner) can observe
//! the same store. Supports injecting transient failures to exercise the
//! retry policy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dagrun_types::artifact::{ArtifactRecord, ArtifactRef, CacheEntry, PublishOutcome};
use dagrun_types::error::StoreError;
use dashmap::DashMap;

use super::store::ArtifactStore;

#[derive(Default)]
struct Inner {
    /// name -> committed versions, in commit order.
    records: DashMap<String, Vec<ArtifactRecord>>,
    /// "bucket/object_key" -> bytes.
    objects: DashMap<String, Vec<u8>>,
    cache: DashMap<String, CacheEntry>,
    fail_next: AtomicU32,
}

/// Process-local `ArtifactStore`.
#[derive(Clone, Default)]
pub struct InMemoryArtifactStore {
    inner: Arc<Inner>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` object transfers (`put`/`get`) fail with a
    /// transient error.
    pub fn fail_next_transfers(&self, count: u32) {
        self.inner.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of committed versions across all names.
    pub fn version_count(&self) -> usize {
        self.inner.records.iter().map(|e| e.value().len()).sum()
    }

    pub fn object_count(&self) -> usize {
        self.inner.objects.len()
    }

    fn object_path(record: &ArtifactRecord, key: &str) -> String {
        format!(
            "{}/{}",
            record.location.bucket,
            record.location.object_key(&record.name, &record.version, key)
        )
    }

    fn take_injected_failure(&self, op: &str) -> Result<(), StoreError> {
        let injected = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StoreError::Transient(format!("injected {op} failure"))),
            Err(_) => Ok(()),
        }
    }

    fn find(&self, artifact: &ArtifactRef) -> Option<ArtifactRecord> {
        self.inner.records.get(&artifact.name).and_then(|versions| {
            versions
                .iter()
                .find(|r| r.version == artifact.version)
                .cloned()
        })
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    async fn exists(&self, artifact: &ArtifactRef) -> Result<bool, StoreError> {
        Ok(self.find(artifact).is_some())
    }

    async fn get_record(&self, artifact: &ArtifactRef) -> Result<Option<ArtifactRecord>, StoreError> {
        Ok(self.find(artifact))
    }

    async fn latest(&self, name: &str) -> Result<Option<ArtifactRecord>, StoreError> {
        Ok(self.inner.records.get(name).and_then(|versions| {
            versions.iter().max_by_key(|r| r.created_at).cloned()
        }))
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<ArtifactRecord>, StoreError> {
        let mut versions = self
            .inner
            .records
            .get(name)
            .map(|v| v.value().clone())
            .unwrap_or_default();
        versions.sort_by_key(|r| r.created_at);
        Ok(versions)
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .inner
            .records
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect();
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
        if self.find(&record.artifact_ref()).is_some() {
            return Ok(PublishOutcome::AlreadyExists);
        }
        self.take_injected_failure("put")?;

        let mut staged = Vec::with_capacity(sources.len());
        for (file, source) in record.files.iter().zip(sources) {
            let bytes = tokio::fs::read(source).await?;
            staged.push((Self::object_path(record, &file.key), bytes));
        }

        let mut versions = self.inner.records.entry(record.name.clone()).or_default();
        if versions.iter().any(|r| r.version == record.version) {
            return Ok(PublishOutcome::AlreadyExists);
        }
        for (path, bytes) in staged {
            self.inner.objects.insert(path, bytes);
        }
        versions.push(record.clone());
        Ok(PublishOutcome::Created)
    }

    async fn get(&self, record: &ArtifactRecord, key: &str, dest: &Path) -> Result<(), StoreError> {
        self.take_injected_failure("get")?;
        let path = Self::object_path(record, key);
        let bytes = self
            .inner
            .objects
            .get(&path)
            .map(|b| b.value().clone())
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }

    async fn lookup_cache(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.inner.cache.get(key).map(|e| e.value().clone()))
    }

    async fn record_cache(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.inner.cache.insert(entry.key.clone(), entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use dagrun_types::action::ActionMeta;
    use dagrun_types::artifact::{ArtifactFile, ArtifactType, ObjectLocation};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn record(version: &str, offset_secs: i64) -> ArtifactRecord {
        ArtifactRecord {
            name: "dataset".to_string(),
            version: version.to_string(),
            artifact_type: ArtifactType::Dataset,
            producer: ActionMeta::new("ingest", "ingest-dataset", "default"),
            run_id: Uuid::now_v7(),
            location: ObjectLocation::new("bucket", "data"),
            files: vec![ArtifactFile {
                key: "rows.csv".to_string(),
                hash: "h".to_string(),
                size_bytes: 3,
            }],
            created_at: Utc::now() + Duration::seconds(offset_secs),
            inputs: vec![],
        }
    }

    #[tokio::test]
    async fn test_put_get_and_latest() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("rows.csv");
        tokio::fs::write(&source, b"a,b").await.unwrap();

        let store = InMemoryArtifactStore::new();
        let v1 = record("v1", 0);
        let v2 = record("v2", 5);
        assert_eq!(store.put(&v2, &[source.clone()]).await.unwrap(), PublishOutcome::Created);
        assert_eq!(store.put(&v1, &[source.clone()]).await.unwrap(), PublishOutcome::Created);

        assert_eq!(store.latest("dataset").await.unwrap().unwrap().version, "v2");
        let versions: Vec<String> = store
            .list_versions("dataset")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec!["v1", "v2"]);
        assert_eq!(store.list_names().await.unwrap(), vec!["dataset"]);

        let dest = tmp.path().join("out.csv");
        store.get(&v1, "rows.csv", &dest).await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"a,b");
    }

    #[tokio::test]
    async fn test_duplicate_put_keeps_first_record() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("rows.csv");
        tokio::fs::write(&source, b"a,b").await.unwrap();

        let store = InMemoryArtifactStore::new();
        let first = record("v1", 0);
        let mut second = record("v1", 10);
        second.producer.name = "other".to_string();

        store.put(&first, &[source.clone()]).await.unwrap();
        let outcome = store.put(&second, &[source]).await.unwrap();
        assert_eq!(outcome, PublishOutcome::AlreadyExists);
        assert_eq!(store.version_count(), 1);
        let kept = store.get_record(&first.artifact_ref()).await.unwrap().unwrap();
        assert_eq!(kept.producer.name, "ingest");
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("rows.csv");
        tokio::fs::write(&source, b"a,b").await.unwrap();

        let store = InMemoryArtifactStore::new();
        store.fail_next_transfers(1);
        let err = store.put(&record("v1", 0), &[source.clone()]).await.unwrap_err();
        assert!(err.is_transient());
        assert!(!store.exists(&ArtifactRef::new("dataset", "v1")).await.unwrap());
        store.put(&record("v1", 0), &[source]).await.unwrap();
        assert!(store.exists(&ArtifactRef::new("dataset", "v1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryArtifactStore::new();
        let err = store
            .get(&record("v1", 0), "rows.csv", &tmp.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cache_entries_roundtrip() {
        let store = InMemoryArtifactStore::new();
        assert!(store.lookup_cache("k").await.unwrap().is_none());
        let entry = CacheEntry {
            key: "k".to_string(),
            action: "train".to_string(),
            outputs: vec![ArtifactRef::new("model", "v1")],
            run_id: Uuid::now_v7(),
            created_at: Utc::now(),
        };
        store.record_cache(&entry).await.unwrap();
        assert_eq!(store.lookup_cache("k").await.unwrap(), Some(entry));
    }
}
