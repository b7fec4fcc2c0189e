//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the media sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the sync and scrobble crates
//! depend on. It establishes the logging conventions, the validated
//! configuration handed to every component, and the event broadcasting used to
//! report sync cycles and watch sessions to the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
