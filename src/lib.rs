//! Workspace entry crate.
//!
//! Host applications depend on `mediasync-workspace` to pull in the service
//! façade without wiring each workspace crate individually.

pub use core_service::*;
