//! # Scrobble Error Types

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrobbleError {
    /// The playing file is not part of the local library.
    #[error("No library item for the playing file: {path}")]
    UnresolvedIdentity { path: String },

    /// The active stream is not something to report (live TV, disabled scrobbling).
    #[error("Playback is not applicable for scrobbling: {0}")]
    NotApplicable(String),

    /// Playback stopped, or newer playback started, while the item was being resolved.
    #[error("Playback ended before the session for {path} could start")]
    Superseded { path: String },

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Local library store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<BridgeError> for ScrobbleError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::StoreUnavailable(msg) => ScrobbleError::StoreUnavailable(msg),
            other => ScrobbleError::StoreUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScrobbleError>;
