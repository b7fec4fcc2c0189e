//! # Event Bus System
//!
//! Provides an event-driven architecture for the media sync core using `tokio::sync::broadcast`.
//! Sync cycles, local library corrections and watch sessions are reported to the
//! host through typed events instead of callbacks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   emit   ┌───────────┐
//! │ SyncCoordinator ├─────────>│           │
//! └─────────────────┘          │ EventBus  │   subscribe   ┌────────────┐
//!                              │ (broadcast├──────────────>│ Subscriber │
//! ┌─────────────────┐   emit   │  channel) │               └────────────┘
//! │    Scrobbler    ├─────────>│           │
//! └─────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, ScrobbleEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Scrobble(ScrobbleEvent::Cancelled {
//!         title: "Heat".to_string(),
//!         progress: 42,
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Watch session cancelled");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Library sync cycle events
    Sync(SyncEvent),
    /// Local library corrections
    Library(LibraryEvent),
    /// Watch session events
    Scrobble(ScrobbleEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Scrobble(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Scrobble(ScrobbleEvent::HeartbeatFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Scrobble(ScrobbleEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to library sync cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Sync cycle initiated.
    Started {
        /// Unique identifier for this cycle.
        job_id: String,
    },
    /// Sync cycle finished successfully.
    Completed {
        job_id: String,
        /// Items sent to the remote collection.
        items_collected: u64,
        /// Items sent as seen.
        items_seen: u64,
        /// Items removed from the remote collection.
        items_removed: u64,
        /// Local watched flags corrected from remote state.
        watched_corrections: u64,
        /// Duration of the cycle in seconds.
        duration_secs: u64,
    },
    /// Sync cycle aborted.
    Failed {
        job_id: String,
        /// Human-readable error message.
        message: String,
        /// Whether the next scheduled cycle can be expected to succeed.
        recoverable: bool,
    },
    /// A trigger arrived while another cycle was running and was dropped.
    Ignored {
        /// The cycle that is still running.
        active_job_id: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Ignored { .. } => "Sync trigger ignored",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Corrections applied to the local library from remote state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// Watched flag changed to follow the remote library.
    WatchedChanged {
        item_id: i64,
        title: String,
        watched: bool,
    },
    /// A blank or invalid external identifier was filled from the remote library.
    ExternalIdEnriched {
        item_id: i64,
        title: String,
        external_id: String,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::WatchedChanged { .. } => "Watched flag updated",
            LibraryEvent::ExternalIdEnriched { .. } => "External identifier added",
        }
    }
}

// ============================================================================
// Scrobble Events
// ============================================================================

/// Events related to watch sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScrobbleEvent {
    /// A watch session began.
    Started { item_id: i64, title: String },
    /// A watching heartbeat was delivered.
    Heartbeat {
        title: String,
        /// Percent watched (0-100).
        progress: u8,
        duration_minutes: u32,
    },
    /// A watching heartbeat could not be delivered; the session continues.
    HeartbeatFailed { title: String, message: String },
    /// The session ended past the completion threshold.
    Completed { title: String, rating: Option<u8> },
    /// The session ended below the completion threshold.
    Cancelled {
        title: String,
        /// Percent watched when playback stopped.
        progress: u8,
    },
}

impl ScrobbleEvent {
    fn description(&self) -> &str {
        match self {
            ScrobbleEvent::Started { .. } => "Watch session started",
            ScrobbleEvent::Heartbeat { .. } => "Watching status sent",
            ScrobbleEvent::HeartbeatFailed { .. } => "Watching status failed",
            ScrobbleEvent::Completed { .. } => "Watch session scrobbled",
            ScrobbleEvent::Cancelled { .. } => "Watch session cancelled",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers; emitters in this
    /// workspace ignore that error.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future events.
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let scrobbles = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Scrobble(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
