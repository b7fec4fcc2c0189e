//! # Core Service
//!
//! Façade that host applications construct once and keep for the lifetime of
//! the media center.
//!
//! [`CoreService::new`] validates a [`CoreConfig`], creates the shared
//! [`EventBus`] and wires the library [`SyncCoordinator`] and, when scrobbling
//! is enabled, the [`Scrobbler`]. Everything the host reports (sign-in,
//! playback start/stop, sync requests) goes through this type.
//!
//! ```no_run
//! # async fn example(config: core_service::CoreConfig) -> core_service::Result<()> {
//! use core_service::CoreService;
//!
//! let core = CoreService::new(config)?;
//! let mut events = core.subscribe_events();
//! let _scheduler = core.start_periodic_sync();
//!
//! let job = core.sync_now().await?;
//! if let Some(stats) = job.stats {
//!     println!("{} items sent", stats.total_sent());
//! }
//! # let _ = events.try_recv();
//! core.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use bridge_traits::{Credentials, MediaKind};
pub use core_runtime::config::{CoreConfig, LibrarySyncSettings, ScrobbleSettings};
pub use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, ScrobbleEvent, SyncEvent};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
pub use core_scrobble::{ScrobbleSession, ScrobbleState, Scrobbler, StopOutcome};
pub use core_sync::{SyncCoordinator, SyncCycleStats, SyncJob, SyncStatus, SyncTrigger};

use core_scrobble::ScrobbleError;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Primary façade exposed to host applications.
pub struct CoreService {
    event_bus: EventBus,
    sync: Arc<SyncCoordinator>,
    scrobbler: Option<Scrobbler>,
    shutdown: CancellationToken,
}

impl CoreService {
    /// Validates `config` and wires the core components.
    ///
    /// # Errors
    ///
    /// - [`CoreError::CapabilityMissing`] if a required bridge is absent
    /// - [`CoreError::InitializationFailed`] if a setting is out of range
    /// - [`CoreError::Scrobble`] if scrobbling is enabled and no Tokio
    ///   runtime is running
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let sync = Arc::new(SyncCoordinator::from_config(&config, event_bus.clone()));

        let scrobbler = if config.scrobble.enabled {
            Some(Scrobbler::from_config(&config, event_bus.clone())?)
        } else {
            None
        };

        info!(
            scrobbling = scrobbler.is_some(),
            keep_remote_library_clean = config.library.keep_remote_library_clean,
            "Core service initialized"
        );

        Ok(Self {
            event_bus,
            sync,
            scrobbler,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn sync_coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.sync)
    }

    /// `None` when scrobbling is disabled.
    pub fn scrobbler(&self) -> Option<&Scrobbler> {
        self.scrobbler.as_ref()
    }

    /// Replaces the remote account for both library sync and scrobbling.
    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        self.sync.set_credentials(credentials.clone());
        if let Some(scrobbler) = &self.scrobbler {
            scrobbler.set_credentials(credentials);
        }
    }

    /// Runs one library sync cycle now.
    ///
    /// Fails with `SyncInProgress` if a cycle is already running.
    pub async fn sync_now(&self) -> Result<SyncJob> {
        Ok(self.sync.run_cycle(SyncTrigger::Manual).await?)
    }

    /// Starts the periodic library sync at the configured interval.
    ///
    /// The scheduler stops on [`shutdown`](Self::shutdown).
    pub fn start_periodic_sync(&self) -> JoinHandle<()> {
        let interval = self.sync.settings().sync_interval;
        info!(interval_secs = interval.as_secs(), "Starting periodic library sync");
        self.sync
            .spawn_periodic(interval, self.shutdown.child_token())
    }

    /// Reports that the host player started playing the file at `path`.
    pub async fn start_playback(&self, path: &str, kind: MediaKind) -> Result<Arc<ScrobbleSession>> {
        Ok(self.active_scrobbler()?.start(path, kind).await?)
    }

    /// Reports that the host player stopped.
    ///
    /// Returns `None` if no session was watching.
    pub fn stop_playback(&self) -> Option<StopOutcome> {
        self.scrobbler.as_ref()?.stop()
    }

    /// Stops background work started by this service.
    pub fn shutdown(&self) {
        info!("Shutting down core service");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn active_scrobbler(&self) -> Result<&Scrobbler> {
        self.scrobbler.as_ref().ok_or_else(|| {
            CoreError::Scrobble(ScrobbleError::NotApplicable(
                "scrobbling is disabled".to_string(),
            ))
        })
    }
}

impl Drop for CoreService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
