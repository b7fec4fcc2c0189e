//! Tests for the core service façade

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BatchKind, BatchResult, Credentials, ItemSignature, LocalItem, LocalItemId, LocalLibraryStore,
    MediaKind, PlaybackSource, RemoteItem, RemoteLibraryClient, ScrobblePayload, SettingsStore,
};
use core_scrobble::ScrobbleError;
use core_service::{
    CoreConfig, CoreError, CoreEvent, CoreService, ScrobbleSettings, ScrobbleState, SyncEvent,
    SyncStatus,
};
use core_sync::SyncError;
use mockall::mock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HEAT: &str = "/media/Movies/Heat (1995).mkv";

// ============================================================================
// Test Collaborators
// ============================================================================

struct Library;

fn heat() -> LocalItem {
    LocalItem::new(1, "Heat", Some(1995))
        .with_external_id("tt0113277")
        .with_path(HEAT)
        .with_runtime_minutes(170)
}

#[async_trait]
impl LocalLibraryStore for Library {
    async fn list_all(&self) -> BridgeResult<Vec<LocalItem>> {
        Ok(vec![heat()])
    }

    async fn resolve_by_path(&self, path: &str) -> BridgeResult<Option<LocalItem>> {
        Ok(Some(heat()).filter(|item| item.path == path))
    }

    async fn update_watched(&self, _id: LocalItemId, _watched: bool) -> BridgeResult<()> {
        Ok(())
    }

    async fn update_external_id(&self, _id: LocalItemId, _external_id: &str) -> BridgeResult<()> {
        Ok(())
    }

    async fn resolve_blocked_filename_ids(
        &self,
        _filenames: &[String],
    ) -> BridgeResult<Vec<LocalItemId>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct Settings {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for Settings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
    }

    async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
        Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Player parked at 95 % of a two hour film
struct Player;

impl PlaybackSource for Player {
    fn current_position(&self) -> f64 {
        6840.0
    }

    fn duration(&self) -> f64 {
        7200.0
    }

    fn is_active_media(&self, kind: MediaKind) -> bool {
        kind != MediaKind::LiveTv
    }
}

mock! {
    Remote {}

    #[async_trait]
    impl RemoteLibraryClient for Remote {
        async fn fetch_all_items(&self, credentials: &Credentials) -> BridgeResult<Vec<RemoteItem>>;
        async fn send_batch(
            &self,
            kind: BatchKind,
            items: Vec<ItemSignature>,
            credentials: &Credentials,
        ) -> BridgeResult<BatchResult>;
        async fn send_heartbeat(&self, payload: ScrobblePayload, credentials: &Credentials) -> BridgeResult<()>;
        async fn send_completion(&self, payload: ScrobblePayload, credentials: &Credentials) -> BridgeResult<()>;
        async fn send_cancel(&self, credentials: &Credentials) -> BridgeResult<()>;
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn config(remote: MockRemote, scrobble: ScrobbleSettings) -> CoreConfig {
    let builder = CoreConfig::builder()
        .library_store(Arc::new(Library))
        .remote_client(Arc::new(remote))
        .settings_store(Arc::new(Settings::default()))
        .scrobble_settings(scrobble.clone());

    let builder = if scrobble.enabled {
        builder.playback_source(Arc::new(Player))
    } else {
        builder
    };

    builder.build().unwrap()
}

fn credentials() -> Credentials {
    Credentials::new("viewer", "hunter2")
}

fn expect_single_collection_batch(remote: &mut MockRemote) {
    remote
        .expect_fetch_all_items()
        .times(1)
        .returning(|_| Ok(Vec::new()));
    remote
        .expect_send_batch()
        .withf(|kind, items, _| *kind == BatchKind::Collection && items.len() == 1)
        .times(1)
        .returning(|_, items, _| {
            Ok(BatchResult {
                succeeded: items.len(),
                ..Default::default()
            })
        });
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_scrobbling_requires_playback_source() {
    let mut config = config(MockRemote::new(), ScrobbleSettings::default().enabled(false));
    config.scrobble.enabled = true;

    let result = CoreService::new(config);
    assert!(matches!(
        result,
        Err(CoreError::CapabilityMissing { ref capability, .. }) if capability == "PlaybackSource"
    ));
}

#[test]
fn test_zero_event_buffer_rejected() {
    let mut config = config(MockRemote::new(), ScrobbleSettings::default().enabled(false));
    config.event_buffer_size = 0;

    assert!(matches!(
        CoreService::new(config),
        Err(CoreError::InitializationFailed(_))
    ));
}

#[test]
fn test_scrobbling_outside_runtime_is_reported() {
    let result = CoreService::new(config(MockRemote::new(), ScrobbleSettings::default()));
    assert!(matches!(
        result,
        Err(CoreError::Scrobble(ScrobbleError::ConfigurationMissing(_)))
    ));
}

#[tokio::test]
async fn test_disabled_scrobbling_has_no_scrobbler() {
    let core = CoreService::new(config(
        MockRemote::new(),
        ScrobbleSettings::default().enabled(false),
    ))
    .unwrap();

    assert!(core.scrobbler().is_none());
    assert!(core.stop_playback().is_none());
    assert!(matches!(
        core.start_playback(HEAT, MediaKind::Movie).await,
        Err(CoreError::Scrobble(ScrobbleError::NotApplicable(_)))
    ));
}

// ============================================================================
// Library sync
// ============================================================================

#[tokio::test]
async fn test_sync_without_credentials_fails() {
    let core = CoreService::new(config(
        MockRemote::new(),
        ScrobbleSettings::default().enabled(false),
    ))
    .unwrap();

    let result = core.sync_now().await;
    assert!(matches!(
        result,
        Err(CoreError::Sync(SyncError::ConfigurationMissing(_)))
    ));
}

#[tokio::test]
async fn test_sync_now_runs_cycle() {
    let mut remote = MockRemote::new();
    expect_single_collection_batch(&mut remote);

    let core = CoreService::new(config(remote, ScrobbleSettings::default().enabled(false))).unwrap();
    core.set_credentials(Some(credentials()));
    let mut events = core.subscribe_events();

    let job = core.sync_now().await.unwrap();
    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(job.stats.unwrap().to_collection, 1);

    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Sync(SyncEvent::Completed {
            items_collected, ..
        }) = event
        {
            assert_eq!(items_collected, 1);
            completed = true;
        }
    }
    assert!(completed);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_sync_stops_on_shutdown() {
    let mut remote = MockRemote::new();
    expect_single_collection_batch(&mut remote);

    let core = CoreService::new(config(remote, ScrobbleSettings::default().enabled(false))).unwrap();
    core.set_credentials(Some(credentials()));

    let scheduler = core.start_periodic_sync();
    tokio::time::sleep(Duration::from_secs(1)).await;

    core.shutdown();
    scheduler.await.unwrap();
    assert!(core.is_shut_down());

    tokio::time::sleep(Duration::from_secs(3 * 60 * 60)).await;
    assert!(!core.sync_coordinator().is_running());
}

// ============================================================================
// Playback
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_playback_is_scrobbled_on_stop() {
    let mut remote = MockRemote::new();
    remote.expect_send_heartbeat().never();
    remote
        .expect_send_completion()
        .withf(|payload, _| payload.progress == 100 && payload.duration_minutes == 120)
        .times(1)
        .returning(|_, _| Ok(()));

    let core = CoreService::new(config(remote, ScrobbleSettings::default())).unwrap();
    core.set_credentials(Some(credentials()));

    let session = core.start_playback(HEAT, MediaKind::Movie).await.unwrap();
    assert_eq!(session.title(), "Heat");

    let outcome = core.stop_playback().unwrap();
    assert_eq!(outcome.state, ScrobbleState::Completed);
    outcome.dispatch.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_credentials_reach_scrobbler() {
    let core = CoreService::new(config(MockRemote::new(), ScrobbleSettings::default())).unwrap();

    assert!(matches!(
        core.start_playback(HEAT, MediaKind::Movie).await,
        Err(CoreError::Scrobble(ScrobbleError::ConfigurationMissing(_)))
    ));

    core.set_credentials(Some(credentials()));
    core.start_playback(HEAT, MediaKind::Movie).await.unwrap();
    assert_eq!(
        core.scrobbler().unwrap().state(),
        ScrobbleState::Watching
    );
}
