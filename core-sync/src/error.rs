use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local library store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Library sync already in progress (job {job_id})")]
    SyncInProgress { job_id: String },

    #[error("Failed to persist exclusion state: {0}")]
    Persistence(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },
}

impl SyncError {
    /// Maps a failure of a local store call.
    pub fn from_store(err: BridgeError) -> Self {
        match err {
            BridgeError::StoreUnavailable(msg) => SyncError::StoreUnavailable(msg),
            other => SyncError::StoreUnavailable(other.to_string()),
        }
    }

    /// Maps a failure of a remote client call.
    pub fn from_remote(err: BridgeError) -> Self {
        match err {
            BridgeError::Remote(msg) => SyncError::Remote(msg),
            other => SyncError::Remote(other.to_string()),
        }
    }

    /// Whether the next scheduled cycle may succeed without user action
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::StoreUnavailable(_)
                | SyncError::Remote(_)
                | SyncError::Persistence(_)
                | SyncError::SyncInProgress { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
