use thiserror::Error;

/// Errors from artifact store operations (used by the store port in dagrun-core).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A failure that may succeed when retried (timeouts, throttling).
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("corrupt object '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the retry policy should attempt the operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(err.to_string()),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted => {
                StoreError::Transient(err.to_string())
            }
            _ => StoreError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
