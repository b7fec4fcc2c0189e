//! # Core Configuration Module
//!
//! Provides configuration management for the media sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host bridges and the library/scrobble settings. It
//! enforces fail-fast validation so that a missing bridge is reported at
//! startup rather than in the middle of a sync cycle.
//!
//! ## Required Dependencies
//!
//! - `LocalLibraryStore` - The on-device media collection
//! - `RemoteLibraryClient` - The remote tracking service
//! - `SettingsStore` - Persistence for the exclusion memory
//! - `PlaybackSource` - Required only while scrobbling is enabled
//!
//! ## Optional Dependencies
//!
//! - `RatingPrompt` - Post-watch rating dialog
//! - `Clock` - Defaults to `SystemClock`
//!
//! Credentials are optional at build time. Operations that need them fail
//! individually with a configuration-missing error until they are provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, LibrarySyncSettings};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .library_store(Arc::new(MyVideoDatabase))
//!     .remote_client(Arc::new(MyTrackerClient))
//!     .settings_store(Arc::new(MySettings))
//!     .playback_source(Arc::new(MyPlayer))
//!     .credentials(Credentials::new("alice", "secret"))
//!     .library_settings(LibrarySyncSettings::default().keep_remote_library_clean(true))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Fails with an actionable message naming the missing bridge
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing required bridges");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    Clock, Credentials, LocalLibraryStore, PlaybackSource, RatingPrompt, RemoteLibraryClient,
    SettingsStore, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;

/// Days a skipped item stays excluded before the whole skip set is retried.
pub const SKIP_EXPIRY_DAYS: i64 = 7;

/// Watched percentage at or above which a stopped session counts as watched.
pub const COMPLETION_THRESHOLD_PERCENT: f64 = 90.0;

/// Core configuration for the media sync core.
///
/// This struct holds all dependencies and settings required to initialize
/// the core library. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Local media collection (required)
    pub library_store: Arc<dyn LocalLibraryStore>,

    /// Remote tracking service client (required)
    pub remote_client: Arc<dyn RemoteLibraryClient>,

    /// Preference storage for the exclusion memory (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Live player state (required when scrobbling is enabled)
    pub playback_source: Option<Arc<dyn PlaybackSource>>,

    /// Post-watch rating dialog (optional)
    pub rating_prompt: Option<Arc<dyn RatingPrompt>>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Remote account; `None` until the user signs in
    pub credentials: Option<Credentials>,

    /// Library sync settings
    pub library: LibrarySyncSettings,

    /// Scrobble settings
    pub scrobble: ScrobbleSettings,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("library_store", &"LocalLibraryStore { ... }")
            .field("remote_client", &"RemoteLibraryClient { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field(
                "playback_source",
                &self
                    .playback_source
                    .as_ref()
                    .map(|_| "PlaybackSource { ... }"),
            )
            .field(
                "rating_prompt",
                &self.rating_prompt.as_ref().map(|_| "RatingPrompt { ... }"),
            )
            .field("credentials", &self.credentials)
            .field("library", &self.library)
            .field("scrobble", &self.scrobble)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

/// Settings governing library sync cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySyncSettings {
    /// Path substrings excluded from sync (matched case-insensitively)
    pub blocked_folders: Vec<String>,

    /// File names excluded from sync (resolved to items by the local store)
    pub blocked_filenames: Vec<String>,

    /// Remove remote collection entries that are no longer present locally
    pub keep_remote_library_clean: bool,

    /// Number of local library providers feeding the remote account
    pub local_provider_count: usize,

    /// Period of the background sync scheduler
    pub sync_interval: Duration,
}

impl Default for LibrarySyncSettings {
    fn default() -> Self {
        Self {
            blocked_folders: Vec::new(),
            blocked_filenames: Vec::new(),
            keep_remote_library_clean: false,
            local_provider_count: 1,
            sync_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl LibrarySyncSettings {
    pub fn blocked_folders(mut self, folders: Vec<String>) -> Self {
        self.blocked_folders = folders;
        self
    }

    pub fn blocked_filenames(mut self, filenames: Vec<String>) -> Self {
        self.blocked_filenames = filenames;
        self
    }

    pub fn keep_remote_library_clean(mut self, enabled: bool) -> Self {
        self.keep_remote_library_clean = enabled;
        self
    }

    pub fn local_provider_count(mut self, count: usize) -> Self {
        self.local_provider_count = count;
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Whether exactly one local provider is registered.
    ///
    /// Remote removal and already-exists eviction are only safe in that case.
    pub fn single_provider(&self) -> bool {
        self.local_provider_count == 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_provider_count == 0 {
            return Err(Error::Config(
                "Local provider count must be at least 1".to_string(),
            ));
        }

        if self.sync_interval.is_zero() {
            return Err(Error::Config(
                "Sync interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Settings governing watch sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleSettings {
    /// Report playback to the remote service
    pub enabled: bool,

    /// Period between "watching" heartbeats
    pub heartbeat_interval: Duration,

    /// Delay before the first heartbeat of a session
    pub heartbeat_initial_delay: Duration,

    /// Ask for a rating after a session completes
    pub show_rate_dialog_on_watched: bool,
}

impl Default for ScrobbleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval: Duration::from_secs(15 * 60),
            heartbeat_initial_delay: Duration::from_secs(3),
            show_rate_dialog_on_watched: true,
        }
    }
}

impl ScrobbleSettings {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn heartbeat_initial_delay(mut self, delay: Duration) -> Self {
        self.heartbeat_initial_delay = delay;
        self
    }

    pub fn show_rate_dialog_on_watched(mut self, enabled: bool) -> Self {
        self.show_rate_dialog_on_watched = enabled;
        self
    }

    /// Fixed completion threshold in percent
    pub fn completion_threshold_percent(&self) -> f64 {
        COMPLETION_THRESHOLD_PERCENT
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Config(
                "Heartbeat interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Library and scrobble settings are in range
    /// - A `PlaybackSource` is present when scrobbling is enabled
    /// - The event buffer can hold at least one event
    pub fn validate(&self) -> Result<()> {
        self.library.validate()?;
        self.scrobble.validate()?;

        if self.scrobble.enabled && self.playback_source.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "PlaybackSource".to_string(),
                message: "Scrobbling is enabled but no PlaybackSource was provided. \
                          Inject the host player's position reporter or disable scrobbling."
                    .to_string(),
            });
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Credentials that can actually be sent, if any
    pub fn usable_credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref().filter(|c| c.is_complete())
    }
}

fn missing_capability(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build()`](CoreConfigBuilder::build) to create the final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    library_store: Option<Arc<dyn LocalLibraryStore>>,
    remote_client: Option<Arc<dyn RemoteLibraryClient>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    playback_source: Option<Arc<dyn PlaybackSource>>,
    rating_prompt: Option<Arc<dyn RatingPrompt>>,
    clock: Option<Arc<dyn Clock>>,
    credentials: Option<Credentials>,
    library: LibrarySyncSettings,
    scrobble: ScrobbleSettings,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the local library store (required).
    pub fn library_store(mut self, store: Arc<dyn LocalLibraryStore>) -> Self {
        self.library_store = Some(store);
        self
    }

    /// Sets the remote library client (required).
    pub fn remote_client(mut self, client: Arc<dyn RemoteLibraryClient>) -> Self {
        self.remote_client = Some(client);
        self
    }

    /// Sets the settings store (required).
    ///
    /// The exclusion memory is persisted here between sync cycles.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the playback source.
    ///
    /// Required unless scrobbling is disabled.
    pub fn playback_source(mut self, source: Arc<dyn PlaybackSource>) -> Self {
        self.playback_source = Some(source);
        self
    }

    /// Sets the rating prompt (optional).
    pub fn rating_prompt(mut self, prompt: Arc<dyn RatingPrompt>) -> Self {
        self.rating_prompt = Some(prompt);
        self
    }

    /// Overrides the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn library_settings(mut self, settings: LibrarySyncSettings) -> Self {
        self.library = settings;
        self
    }

    pub fn scrobble_settings(mut self, settings: ScrobbleSettings) -> Self {
        self.scrobble = settings;
        self
    }

    /// Sets the event bus buffer size.
    ///
    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - Required bridges are missing
    /// - Settings are out of range
    /// - Scrobbling is enabled without a `PlaybackSource`
    pub fn build(self) -> Result<CoreConfig> {
        let library_store = self.library_store.ok_or_else(|| {
            missing_capability(
                "LocalLibraryStore",
                "LocalLibraryStore implementation is required to read the local media collection. \
                 Wrap the host's video database and pass it to .library_store().",
            )
        })?;

        let remote_client = self.remote_client.ok_or_else(|| {
            missing_capability(
                "RemoteLibraryClient",
                "RemoteLibraryClient implementation is required to reach the tracking service. \
                 Pass the host's API client to .remote_client().",
            )
        })?;

        let settings_store = self.settings_store.ok_or_else(|| {
            missing_capability(
                "SettingsStore",
                "SettingsStore implementation is required to persist skipped and already-exists items. \
                 Pass the host's preference storage to .settings_store().",
            )
        })?;

        let config = CoreConfig {
            library_store,
            remote_client,
            settings_store,
            playback_source: self.playback_source,
            rating_prompt: self.rating_prompt,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            credentials: self.credentials,
            library: self.library,
            scrobble: self.scrobble,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
