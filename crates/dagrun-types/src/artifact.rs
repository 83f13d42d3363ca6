//! Artifact domain types.
//!
//! An artifact is a named, versioned, immutable set of files produced by
//! exactly one action. The version is a content hash, so publishing identical
//! files twice always lands on the same `(name, version)` pair.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionMeta;

/// Number of version characters shown in human-facing output.
pub const SHORT_VERSION_LEN: usize = 12;

// ---------------------------------------------------------------------------
// Artifact type
// ---------------------------------------------------------------------------

/// What kind of data an artifact holds.
///
/// Serialized as a plain lowercase string; unknown labels round-trip through
/// `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ArtifactType {
    Dataset,
    Model,
    Predictions,
    Report,
    Custom(String),
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactType::Dataset => write!(f, "dataset"),
            ArtifactType::Model => write!(f, "model"),
            ArtifactType::Predictions => write!(f, "predictions"),
            ArtifactType::Report => write!(f, "report"),
            ArtifactType::Custom(label) => write!(f, "{label}"),
        }
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("artifact type must not be empty".to_string());
        }
        Ok(match trimmed.to_lowercase().as_str() {
            "dataset" => ArtifactType::Dataset,
            "model" => ArtifactType::Model,
            "predictions" => ArtifactType::Predictions,
            "report" => ArtifactType::Report,
            _ => ArtifactType::Custom(trimmed.to_string()),
        })
    }
}

impl From<String> for ArtifactType {
    fn from(value: String) -> Self {
        value
            .parse()
            .unwrap_or_else(|_| ArtifactType::Custom(value))
    }
}

impl From<ArtifactType> for String {
    fn from(value: ArtifactType) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Object location
// ---------------------------------------------------------------------------

/// Destination namespace in object storage (bucket plus key prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    /// Key prefix, either empty or ending in `/`.
    pub prefix: String,
}

impl ObjectLocation {
    /// Build a location, normalizing the prefix to end with `/` when non-empty.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into().trim_start_matches('/').to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self {
            bucket: bucket.into(),
            prefix,
        }
    }

    /// Object key for one file of an artifact version.
    ///
    /// Layout: `{prefix}{name}/{version}/{relative_key}`.
    pub fn object_key(&self, name: &str, version: &str, relative_key: &str) -> String {
        format!("{}{}/{}/{}", self.prefix, name, version, relative_key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

// ---------------------------------------------------------------------------
// Artifact records
// ---------------------------------------------------------------------------

/// One file inside a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Relative key (forward slashes) after the strip-prefix rule.
    pub key: String,
    /// Lowercase hex content hash of the file bytes.
    pub hash: String,
    pub size_bytes: u64,
}

/// Reference to one immutable artifact version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
    pub version: String,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Version truncated for display.
    pub fn short_version(&self) -> &str {
        short_version(&self.version)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.short_version())
    }
}

/// Truncate a version hash for display.
pub fn short_version(version: &str) -> &str {
    match version.char_indices().nth(SHORT_VERSION_LEN) {
        Some((idx, _)) => &version[..idx],
        None => version,
    }
}

/// Committed metadata for one published artifact version.
///
/// Written last during publication; its presence is what makes the version
/// visible to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: String,
    pub version: String,
    pub artifact_type: ArtifactType,
    /// Identity of the action that produced this version.
    pub producer: ActionMeta,
    /// Run in which this version was first published.
    pub run_id: Uuid,
    pub location: ObjectLocation,
    pub files: Vec<ArtifactFile>,
    pub created_at: DateTime<Utc>,
    /// Artifacts the producer had declared as inputs when it published.
    #[serde(default)]
    pub inputs: Vec<ArtifactRef>,
}

impl ArtifactRecord {
    pub fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::new(self.name.clone(), self.version.clone())
    }

    /// Full object keys for every file, in file order.
    pub fn object_keys(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| self.location.object_key(&self.name, &self.version, &f.key))
            .collect()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Outcome of a conditional publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The version did not exist and was committed.
    Created,
    /// The version already existed; nothing was written.
    AlreadyExists,
}

/// Outputs recorded for one action execution under a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hash of (action code identity, input versions).
    pub key: String,
    pub action: String,
    pub outputs: Vec<ArtifactRef>,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_type_roundtrip() {
        for label in ["dataset", "model", "predictions", "report"] {
            let parsed: ArtifactType = label.parse().unwrap();
            assert_eq!(parsed.to_string(), label);
        }
        let custom: ArtifactType = "embeddings".parse().unwrap();
        assert_eq!(custom, ArtifactType::Custom("embeddings".to_string()));
        assert!("  ".parse::<ArtifactType>().is_err());
    }

    #[test]
    fn test_artifact_type_serializes_as_string() {
        let json = serde_json::to_string(&ArtifactType::Model).unwrap();
        assert_eq!(json, "\"model\"");
        let back: ArtifactType = serde_json::from_str("\"Dataset\"").unwrap();
        assert_eq!(back, ArtifactType::Dataset);
    }

    #[test]
    fn test_object_location_prefix_normalized() {
        assert_eq!(ObjectLocation::new("b", "datasets").prefix, "datasets/");
        assert_eq!(ObjectLocation::new("b", "/models/").prefix, "models/");
        assert_eq!(ObjectLocation::new("b", "").prefix, "");
    }

    #[test]
    fn test_object_key_layout() {
        let loc = ObjectLocation::new("demo", "datasets/");
        assert_eq!(
            loc.object_key("housing", "abc123", "part/0.csv"),
            "datasets/housing/abc123/part/0.csv"
        );
        assert_eq!(loc.to_string(), "s3://demo/datasets/");
    }

    #[test]
    fn test_short_version() {
        let r = ArtifactRef::new("model", "0123456789abcdef");
        assert_eq!(r.short_version(), "0123456789ab");
        assert_eq!(r.to_string(), "model@0123456789ab");
        assert_eq!(short_version("abc"), "abc");
    }
}
