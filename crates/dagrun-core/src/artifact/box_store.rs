//! BoxArtifactStore -- object-safe dynamic dispatch wrapper for ArtifactStore.
//!
//! 1. Define an object-safe `ArtifactStoreDyn` trait with boxed futures
//! 2. Blanket-impl `ArtifactStoreDyn` for all `T: ArtifactStore`
//! 3. `BoxArtifactStore` wraps `Box<dyn ArtifactStoreDyn>` and delegates

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use dagrun_types::artifact::{ArtifactRecord, ArtifactRef, CacheEntry, PublishOutcome};
use dagrun_types::error::StoreError;

use super::store::ArtifactStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Object-safe version of [`ArtifactStore`] with boxed futures.
pub trait ArtifactStoreDyn: Send + Sync {
    fn exists_boxed<'a>(&'a self, artifact: &'a ArtifactRef) -> BoxFuture<'a, bool>;

    fn get_record_boxed<'a>(
        &'a self,
        artifact: &'a ArtifactRef,
    ) -> BoxFuture<'a, Option<ArtifactRecord>>;

    fn latest_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Option<ArtifactRecord>>;

    fn list_versions_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Vec<ArtifactRecord>>;

    fn list_names_boxed(&self) -> BoxFuture<'_, Vec<String>>;

    fn put_boxed<'a>(
        &'a self,
        record: &'a ArtifactRecord,
        sources: &'a [PathBuf],
    ) -> BoxFuture<'a, PublishOutcome>;

    fn get_boxed<'a>(
        &'a self,
        record: &'a ArtifactRecord,
        key: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, ()>;

    fn lookup_cache_boxed<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<CacheEntry>>;

    fn record_cache_boxed<'a>(&'a self, entry: &'a CacheEntry) -> BoxFuture<'a, ()>;
}

/// Blanket implementation: any `ArtifactStore` automatically implements `ArtifactStoreDyn`.
impl<T: ArtifactStore> ArtifactStoreDyn for T {
    fn exists_boxed<'a>(&'a self, artifact: &'a ArtifactRef) -> BoxFuture<'a, bool> {
        Box::pin(self.exists(artifact))
    }

    fn get_record_boxed<'a>(
        &'a self,
        artifact: &'a ArtifactRef,
    ) -> BoxFuture<'a, Option<ArtifactRecord>> {
        Box::pin(self.get_record(artifact))
    }

    fn latest_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Option<ArtifactRecord>> {
        Box::pin(self.latest(name))
    }

    fn list_versions_boxed<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Vec<ArtifactRecord>> {
        Box::pin(self.list_versions(name))
    }

    fn list_names_boxed(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(self.list_names())
    }

    fn put_boxed<'a>(
        &'a self,
        record: &'a ArtifactRecord,
        sources: &'a [PathBuf],
    ) -> BoxFuture<'a, PublishOutcome> {
        Box::pin(self.put(record, sources))
    }

    fn get_boxed<'a>(
        &'a self,
        record: &'a ArtifactRecord,
        key: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.get(record, key, dest))
    }

    fn lookup_cache_boxed<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<CacheEntry>> {
        Box::pin(self.lookup_cache(key))
    }

    fn record_cache_boxed<'a>(&'a self, entry: &'a CacheEntry) -> BoxFuture<'a, ()> {
        Box::pin(self.record_cache(entry))
    }
}

/// Type-erased artifact store for runtime backend selection.
///
/// Since `ArtifactStore` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxArtifactStore` provides equivalent methods that delegate to
/// the inner `ArtifactStoreDyn` trait object.
pub struct BoxArtifactStore {
    inner: Box<dyn ArtifactStoreDyn + Send + Sync>,
}

impl BoxArtifactStore {
    /// Wrap a concrete `ArtifactStore` in a type-erased box.
    pub fn new<T: ArtifactStore + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }

    pub async fn exists(&self, artifact: &ArtifactRef) -> Result<bool, StoreError> {
        self.inner.exists_boxed(artifact).await
    }

    pub async fn get_record(
        &self,
        artifact: &ArtifactRef,
    ) -> Result<Option<ArtifactRecord>, StoreError> {
        self.inner.get_record_boxed(artifact).await
    }

    pub async fn latest(&self, name: &str) -> Result<Option<ArtifactRecord>, StoreError> {
        self.inner.latest_boxed(name).await
    }

    pub async fn list_versions(&self, name: &str) -> Result<Vec<ArtifactRecord>, StoreError> {
        self.inner.list_versions_boxed(name).await
    }

    pub async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_names_boxed().await
    }

    pub async fn put(
        &self,
        record: &ArtifactRecord,
        sources: &[PathBuf],
    ) -> Result<PublishOutcome, StoreError> {
        self.inner.put_boxed(record, sources).await
    }

    pub async fn get(
        &self,
        record: &ArtifactRecord,
        key: &str,
        dest: &Path,
    ) -> Result<(), StoreError> {
        self.inner.get_boxed(record, key, dest).await
    }

    pub async fn lookup_cache(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        self.inner.lookup_cache_boxed(key).await
    }

    pub async fn record_cache(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.inner.record_cache_boxed(entry).await
    }
}

impl std::fmt::Debug for BoxArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxArtifactStore").finish_non_exhaustive()
    }
}
