//! Configuration loader for dagrun.
//!
//! Reads `dagrun.toml` from the data directory (`~/.dagrun/` in production)
//! and deserializes it into [`DagrunConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use dagrun_types::config::DagrunConfig;

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "dagrun.toml";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DAGRUN_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `DAGRUN_DATA_DIR` environment variable
/// 2. `~/.dagrun`
/// 3. `./.dagrun`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".dagrun");
    }

    PathBuf::from(".dagrun")
}

/// Load configuration from `{data_dir}/dagrun.toml`.
///
/// - If the file does not exist, returns [`DagrunConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - `max_parallel = 0` is raised to 1.
pub async fn load_config(data_dir: &Path) -> DagrunConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return DagrunConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return DagrunConfig::default();
        }
    };

    let mut config = match toml::from_str::<DagrunConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            return DagrunConfig::default();
        }
    };

    if config.max_parallel == 0 {
        tracing::warn!("max_parallel = 0 in {}, using 1", config_path.display());
        config.max_parallel = 1;
    }
    config
}

/// Absolute locations derived from a config and its data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagrunPaths {
    pub data_dir: PathBuf,
    pub store_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub metrics_file: Option<PathBuf>,
}

impl DagrunPaths {
    /// Resolve relative config paths against `data_dir`.
    pub fn resolve(data_dir: &Path, config: &DagrunConfig) -> Self {
        let under = |path: &Path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                data_dir.join(path)
            }
        };
        Self {
            data_dir: data_dir.to_path_buf(),
            store_dir: under(&config.store_dir),
            scratch_dir: under(&config.scratch_dir),
            metrics_file: config.metrics_file.as_deref().map(under),
        }
    }
}
