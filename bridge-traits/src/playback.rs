//! Playback bridge traits.
//!
//! The host media player owns playback; the core only samples its position
//! and duration and asks whether the current stream is something worth
//! reporting. Position reads are synchronous because the stop handler samples
//! them on the caller's thread before handing off to background dispatch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::library::LocalItem;

/// Kind of media currently playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Episode,
    LiveTv,
    Recording,
}

/// Live player state
pub trait PlaybackSource: Send + Sync {
    /// Current position in seconds
    fn current_position(&self) -> f64;

    /// Total duration in seconds; `0.0` means unknown
    fn duration(&self) -> f64;

    /// Whether the active stream is applicable for scrobbling
    /// (live broadcasts and recordings are not)
    fn is_active_media(&self, kind: MediaKind) -> bool;
}

/// Post-watch rating dialog
#[async_trait]
pub trait RatingPrompt: Send + Sync {
    /// Ask the user to rate `item`; `None` when dismissed
    async fn prompt_rating(&self, item: &LocalItem) -> Option<u8>;
}
