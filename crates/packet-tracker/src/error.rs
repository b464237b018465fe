// Error types for the packet tracker
use thiserror::Error;

/// Result alias used across the tracker
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Counterparty identity lookup failed.
///
/// Always transient: the caller retries the whole event batch from the same
/// unconsumed events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to resolve {connection_id} on {chain_id}: {reason}")]
pub struct ResolutionError {
    pub chain_id: String,
    pub connection_id: String,
    pub reason: String,
}

impl ResolutionError {
    pub fn new(chain_id: &str, connection_id: &str, reason: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            connection_id: connection_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while tracking packet state
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Malformed filter: {0}")]
    MalformedFilter(String),

    #[error("Invalid packet event: {0}")]
    InvalidEvent(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Packet store lock poisoned")]
    LockPoisoned,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TrackerError {
    /// Whether retrying the originating poll or relay loop can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::Resolution(_) | TrackerError::Store(_) | TrackerError::Io(_)
        )
    }
}

impl From<toml::de::Error> for TrackerError {
    fn from(e: toml::de::Error) -> Self {
        TrackerError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for TrackerError {
    fn from(e: toml::ser::Error) -> Self {
        TrackerError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        TrackerError::Serialization(e.to_string())
    }
}
