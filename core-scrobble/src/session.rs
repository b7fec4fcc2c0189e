//! Watch session state.

use bridge_traits::{Credentials, LocalItem, MediaKind, ScrobblePayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State of the scrobbler.
///
/// ```text
/// Idle → Watching → Completed → Idle
///            ↓
///        Cancelled → Idle
/// ```
///
/// The terminal states only describe how a session ended; the scrobbler is
/// back to `Idle` as soon as the terminal event has been handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrobbleState {
    Idle,
    Watching,
    Completed,
    Cancelled,
}

impl ScrobbleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Watching => "watching",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ScrobbleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one watch session. Never changes once the session starts.
#[derive(Debug)]
pub struct ScrobbleSession {
    pub item: LocalItem,
    pub kind: MediaKind,
    pub started_at: DateTime<Utc>,
    last_progress: AtomicU8,
}

impl ScrobbleSession {
    pub fn new(item: LocalItem, kind: MediaKind, started_at: DateTime<Utc>) -> Self {
        Self {
            item,
            kind,
            started_at,
            last_progress: AtomicU8::new(0),
        }
    }

    pub fn title(&self) -> &str {
        &self.item.title
    }

    /// Progress reported by the most recent delivered heartbeat
    pub fn last_progress(&self) -> u8 {
        self.last_progress.load(Ordering::Relaxed)
    }

    pub(crate) fn record_progress(&self, progress: u8) {
        self.last_progress.store(progress, Ordering::Relaxed);
    }

    pub fn payload(&self, progress: u8, duration_minutes: u32) -> ScrobblePayload {
        ScrobblePayload {
            item: self.item.signature(),
            progress,
            duration_minutes,
        }
    }
}

/// The session occupying the scrobbler's slot, with its heartbeat machinery.
pub(crate) struct ActiveSession {
    pub session: Arc<ScrobbleSession>,
    /// Account captured when the session started
    pub credentials: Credentials,
    pub cancel: CancellationToken,
    /// Held for the duration of every outbound call of this session
    pub dispatch_gate: Arc<AsyncMutex<()>>,
    pub heartbeat: JoinHandle<()>,
}
