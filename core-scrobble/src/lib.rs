//! # Playback Scrobbling Module
//!
//! Real-time reporting of what the user is watching.
//!
//! ## Components
//!
//! - **Progress** (`progress`): Percent watched from player position, with a runtime fallback
//! - **Session** (`session`): Scrobble states and the immutable identity of one watch
//! - **Scrobbler** (`scrobbler`): Session slot, heartbeat task and terminal dispatch

pub mod error;
pub mod progress;
pub mod scrobbler;
pub mod session;

pub use error::{Result, ScrobbleError};
pub use progress::{compute_progress, effective_duration_secs, ProgressSample};
pub use scrobbler::{Scrobbler, StopOutcome};
pub use session::{ScrobbleSession, ScrobbleState};
