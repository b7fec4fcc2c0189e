//! Local Library Abstractions
//!
//! The on-device media collection is owned by the host (a video database, a
//! media-center library, a folder scanner). The core only lists entries,
//! resolves them by file path, and writes back the two fields it is allowed to
//! correct: the watched flag and the external identifier.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Stable identifier of an entry in the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalItemId(pub i64);

impl fmt::Display for LocalItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One local media entry (movie or episode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalItem {
    pub id: LocalItemId,
    pub title: String,
    /// Release year, `None` when the store has no year recorded
    pub year: Option<i32>,
    /// External catalogue identifier; may be empty or malformed
    pub external_id: String,
    pub watched: bool,
    pub path: String,
    pub runtime_minutes: u32,
}

impl LocalItem {
    pub fn new(id: i64, title: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            id: LocalItemId(id),
            title: title.into(),
            year,
            external_id: String::new(),
            watched: false,
            path: String::new(),
            runtime_minutes: 0,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = external_id.into();
        self
    }

    pub fn with_watched(mut self, watched: bool) -> Self {
        self.watched = watched;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_runtime_minutes(mut self, runtime_minutes: u32) -> Self {
        self.runtime_minutes = runtime_minutes;
        self
    }

    /// Title/year/identifier triple as submitted to the remote service
    pub fn signature(&self) -> ItemSignature {
        ItemSignature {
            title: self.title.clone(),
            year: self.year,
            external_id: self.external_id.clone(),
        }
    }
}

/// Title, year and external identifier of a title.
///
/// This is the unit exchanged in sync batches and remembered by the exclusion
/// lists, so it serializes into the persisted exclusion state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemSignature {
    pub title: String,
    pub year: Option<i32>,
    #[serde(default)]
    pub external_id: String,
}

impl ItemSignature {
    pub fn new(title: impl Into<String>, year: Option<i32>, external_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            year,
            external_id: external_id.into(),
        }
    }

    /// Exact match against a local item's current signature
    pub fn describes(&self, item: &LocalItem) -> bool {
        self.title == item.title && self.year == item.year && self.external_id == item.external_id
    }
}

impl fmt::Display for ItemSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} ({})", self.title, year)?,
            None => write!(f, "{}", self.title)?,
        }
        if !self.external_id.is_empty() {
            write!(f, " [{}]", self.external_id)?;
        }
        Ok(())
    }
}

/// Local media library trait
///
/// Implementations wrap the host's media database. Reads and writes are
/// expected to be fast; updates are per-item and idempotent, which is the only
/// atomicity the core relies on when the sync worker and the scrobbler touch
/// the store concurrently.
///
/// All methods fail with [`BridgeError::StoreUnavailable`](crate::BridgeError::StoreUnavailable)
/// on I/O errors.
#[async_trait]
pub trait LocalLibraryStore: Send + Sync {
    /// List every item in the collection
    async fn list_all(&self) -> Result<Vec<LocalItem>>;

    /// Resolve the item whose media file is at `path`
    async fn resolve_by_path(&self, path: &str) -> Result<Option<LocalItem>>;

    /// Persist a new watched flag
    async fn update_watched(&self, id: LocalItemId, watched: bool) -> Result<()>;

    /// Persist a new external identifier
    async fn update_external_id(&self, id: LocalItemId, external_id: &str) -> Result<()>;

    /// Resolve file names to the ids of the items they belong to.
    ///
    /// Names with no matching item are omitted from the result.
    async fn resolve_blocked_filename_ids(&self, filenames: &[String]) -> Result<Vec<LocalItemId>>;
}
