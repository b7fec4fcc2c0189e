//! # Host Bridge Traits
//!
//! Collaborator contracts that the host application must implement for the
//! media sync core.
//!
//! ## Overview
//!
//! The core owns two hard problems: reconciling the local media collection
//! against the user's remote watch/collection library, and turning live
//! playback into scrobble events. Everything around them is the host's job and
//! reaches the core through the traits below.
//!
//! ## Traits
//!
//! ### Library & Remote Service
//! - [`LocalLibraryStore`](library::LocalLibraryStore) - List, resolve and correct local items
//! - [`RemoteLibraryClient`](remote::RemoteLibraryClient) - Fetch the remote library, send batches and scrobbles
//!
//! ### Playback
//! - [`PlaybackSource`](playback::PlaybackSource) - Live position/duration of the host player
//! - [`RatingPrompt`](playback::RatingPrompt) - Post-watch rating dialog
//!
//! ### Storage & Utilities
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should report local I/O failures as `StoreUnavailable` and transport or
//! authentication failures as `Remote`, since the core decides how to react
//! based on that distinction.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`: the sync worker and the scrobble
//! heartbeat run on separate tasks and share the same collaborators.

pub mod error;
pub mod library;
pub mod playback;
pub mod remote;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use library::{ItemSignature, LocalItem, LocalItemId, LocalLibraryStore};
pub use playback::{MediaKind, PlaybackSource, RatingPrompt};
pub use remote::{
    BatchKind, BatchResult, Credentials, RemoteItem, RemoteLibraryClient, ScrobblePayload,
};
pub use storage::SettingsStore;
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
