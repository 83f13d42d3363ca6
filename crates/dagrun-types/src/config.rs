//! Configuration types for dagrun.
//!
//! `DagrunConfig` is the engine configuration read from `dagrun.toml` in the
//! data directory. `PipelineConfig` is the open option map handed to an
//! action builder.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine configuration.
///
/// Loaded from `~/.dagrun/dagrun.toml`. All fields have defaults; relative
/// paths are resolved against the data directory by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagrunConfig {
    /// Root directory of the local artifact store.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Where inputs are materialized for actions.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Skip actions whose cache key and outputs are unchanged.
    #[serde(default = "default_caching")]
    pub caching: bool,

    /// Maximum actions running concurrently within one dependency wave.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Per-action wall-clock limit. No limit when absent.
    #[serde(default)]
    pub action_timeout_secs: Option<u64>,

    #[serde(default)]
    pub retry: RetrySettings,

    /// JSON-lines file receiving every logged metric. Disabled when absent.
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("store")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("scratch")
}

fn default_caching() -> bool {
    true
}

fn default_max_parallel() -> usize {
    1
}

impl Default for DagrunConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            scratch_dir: default_scratch_dir(),
            caching: default_caching(),
            max_parallel: default_max_parallel(),
            action_timeout_secs: None,
            retry: RetrySettings::default(),
            metrics_file: None,
        }
    }
}

/// Retry settings for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for every further attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline options
// ---------------------------------------------------------------------------

/// Open map of pipeline options passed to `ActionBuilder::build_actions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineConfig(BTreeMap<String, Value>);

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a `key=value` assignment and insert it.
    ///
    /// The value is parsed as JSON when possible (`rows=500`, `flag=true`),
    /// otherwise kept as a plain string (`bucket=demo`).
    pub fn parse_assignment(&mut self, assignment: &str) -> Result<(), String> {
        let (key, raw) = assignment
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{assignment}'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("empty key in '{assignment}'"));
        }
        let value = serde_json::from_str::<Value>(raw.trim())
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        self.0.insert(key.to_string(), value);
        Ok(())
    }

    /// Build a config from a list of `key=value` assignments.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::new();
        for assignment in assignments {
            config.parse_assignment(assignment.as_ref())?;
        }
        Ok(config)
    }
}
