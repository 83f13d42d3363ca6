//! ContentHasher trait for content-addressed artifact versions.
//!
//! Defined in dagrun-core so the tracker and runner can derive versions and
//! cache keys without coupling to a specific hashing algorithm. The
//! `Sha256ContentHasher` adapter lives in dagrun-infra.

use dagrun_types::artifact::ArtifactFile;

/// Abstraction over content hashing.
///
/// Implementations must be deterministic across processes: the same bytes
/// must always produce the same lowercase hex string.
pub trait ContentHasher: Send + Sync {
    /// Compute a hex-encoded hash of the given bytes.
    fn compute_hash(&self, content: &[u8]) -> String;
}

/// Derive an artifact version from its files.
///
/// Hashes the `(key, file hash)` pairs sorted by key, so the version depends
/// only on content and relative layout, never on declaration order.
pub fn artifact_version(hasher: &dyn ContentHasher, files: &[ArtifactFile]) -> String {
    let mut pairs: Vec<(&str, &str)> = files
        .iter()
        .map(|f| (f.key.as_str(), f.hash.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut manifest = String::new();
    for (key, hash) in pairs {
        manifest.push_str(key);
        manifest.push('\0');
        manifest.push_str(hash);
        manifest.push('\n');
    }
    hasher.compute_hash(manifest.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHasher;

    fn file(key: &str, hash: &str) -> ArtifactFile {
        ArtifactFile {
            key: key.to_string(),
            hash: hash.to_string(),
            size_bytes: 1,
        }
    }

    #[test]
    fn test_version_ignores_declaration_order() {
        let hasher = TestHasher;
        let a = artifact_version(&hasher, &[file("a.csv", "1"), file("b.csv", "2")]);
        let b = artifact_version(&hasher, &[file("b.csv", "2"), file("a.csv", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_version_depends_on_keys_and_hashes() {
        let hasher = TestHasher;
        let base = artifact_version(&hasher, &[file("a.csv", "1")]);
        assert_ne!(base, artifact_version(&hasher, &[file("a.csv", "2")]));
        assert_ne!(base, artifact_version(&hasher, &[file("c.csv", "1")]));
    }
}
