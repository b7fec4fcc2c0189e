//! Remote Tracking Service Abstractions
//!
//! The per-user watch/collection service is reached through a single client
//! trait. Transport, JSON encoding and authentication live behind it; the core
//! only sees typed snapshots, batch outcomes and scrobble payloads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::library::ItemSignature;

/// Account credentials sent with every remote call
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields are required for any remote call to be accepted
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// One entry of the user's remote library snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub external_id: String,
    pub title: String,
    pub year: Option<i32>,
    /// The user owns this title remotely
    pub in_collection: bool,
    /// The user asked for this title to be treated as unseen locally
    pub unseen_override: bool,
    pub play_count: u32,
}

impl RemoteItem {
    pub fn new(title: impl Into<String>, year: Option<i32>, external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            year,
            in_collection: false,
            unseen_override: false,
            play_count: 0,
        }
    }

    pub fn in_collection(mut self) -> Self {
        self.in_collection = true;
        self
    }

    pub fn with_plays(mut self, play_count: u32) -> Self {
        self.play_count = play_count;
        self
    }

    pub fn unseen(mut self) -> Self {
        self.unseen_override = true;
        self
    }

    /// Seen remotely, or explicitly overridden to unseen
    pub fn has_seen_state(&self) -> bool {
        self.play_count > 0 || self.unseen_override
    }

    pub fn signature(&self) -> ItemSignature {
        ItemSignature::new(self.title.clone(), self.year, self.external_id.clone())
    }
}

/// Kind of library batch sent to the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    /// Add to the remote collection
    Collection,
    /// Mark as seen
    Seen,
    /// Remove from the remote collection
    Remove,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Collection => "collection",
            BatchKind::Seen => "seen",
            BatchKind::Remove => "remove",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item outcome of a batch call.
///
/// `skipped` items could not be resolved against the remote catalogue;
/// `already_exists` items were matched remotely by a fallback the local side
/// cannot reproduce. Neither is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub succeeded: usize,
    #[serde(default)]
    pub skipped: Vec<ItemSignature>,
    #[serde(default)]
    pub already_exists: Vec<ItemSignature>,
}

/// Body of a watching / scrobble call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrobblePayload {
    pub item: ItemSignature,
    /// Percent watched, 0-100
    pub progress: u8,
    pub duration_minutes: u32,
}

/// Remote library client trait
///
/// Every call fails with [`BridgeError::Remote`](crate::BridgeError::Remote) on
/// transport or authentication failure. Implementations must not retry; the
/// sync cycle is the retry unit.
#[async_trait]
pub trait RemoteLibraryClient: Send + Sync {
    /// Fetch the user's full remote library
    async fn fetch_all_items(&self, credentials: &Credentials) -> Result<Vec<RemoteItem>>;

    /// Send one batch of items
    async fn send_batch(
        &self,
        kind: BatchKind,
        items: Vec<ItemSignature>,
        credentials: &Credentials,
    ) -> Result<BatchResult>;

    /// Report an in-progress watch
    async fn send_heartbeat(&self, payload: ScrobblePayload, credentials: &Credentials)
        -> Result<()>;

    /// Report a finished watch
    async fn send_completion(
        &self,
        payload: ScrobblePayload,
        credentials: &Credentials,
    ) -> Result<()>;

    /// Cancel the current watch. Carries no item payload.
    async fn send_cancel(&self, credentials: &Credentials) -> Result<()>;
}
