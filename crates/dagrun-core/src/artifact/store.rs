//! Artifact store trait.
//!
//! Content-addressed persistence: an artifact version is addressed by
//! `(name, version)` where the version is a hash of its files. Implementations
//! live in dagrun-infra (local filesystem) and [`super::memory`].

use std::path::{Path, PathBuf};

use dagrun_types::artifact::{ArtifactRecord, ArtifactRef, CacheEntry, PublishOutcome};
use dagrun_types::error::StoreError;

/// Durable artifact storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
///
/// Publication must be atomic: `put` either commits every file and the
/// metadata record, or leaves nothing visible. A record is only returned by
/// the read methods once committed.
pub trait ArtifactStore: Send + Sync {
    /// Whether a committed record exists for this version.
    fn exists(
        &self,
        artifact: &ArtifactRef,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    fn get_record(
        &self,
        artifact: &ArtifactRef,
    ) -> impl std::future::Future<Output = Result<Option<ArtifactRecord>, StoreError>> + Send;

    /// Most recently committed version of an artifact name.
    fn latest(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<ArtifactRecord>, StoreError>> + Send;

    /// All committed versions of a name, oldest first.
    fn list_versions(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ArtifactRecord>, StoreError>> + Send;

    /// All artifact names with at least one committed version, sorted.
    fn list_names(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Conditionally publish a version.
    ///
    /// `sources[i]` is the local file holding `record.files[i]`. When the
    /// version already exists nothing is written and the first record wins.
    fn put(
        &self,
        record: &ArtifactRecord,
        sources: &[PathBuf],
    ) -> impl std::future::Future<Output = Result<PublishOutcome, StoreError>> + Send;

    /// Copy one file of a committed version to `dest`.
    fn get(
        &self,
        record: &ArtifactRecord,
        key: &str,
        dest: &Path,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    fn lookup_cache(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<CacheEntry>, StoreError>> + Send;

    /// Record (or replace) the outputs of an execution under its cache key.
    fn record_cache(
        &self,
        entry: &CacheEntry,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
