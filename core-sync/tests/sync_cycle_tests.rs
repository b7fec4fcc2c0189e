//! Integration tests for library sync cycles
//!
//! These tests drive `SyncCoordinator` end to end against in-memory
//! collaborators and verify:
//! - Idempotence of repeated cycles
//! - Local corrections (watched flags, identifier enrichment)
//! - Abort semantics on remote failure
//! - Single-flight triggering
//! - Exclusion memory folding, persistence and expiry
//! - Remote cleaning gates

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    BatchKind, BatchResult, Clock, Credentials, ItemSignature, LocalItem, LocalItemId,
    LocalLibraryStore, RemoteItem, RemoteLibraryClient, ScrobblePayload, SettingsStore,
};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use core_runtime::config::LibrarySyncSettings;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent};
use core_sync::{
    normalize_external_id, ExclusionRepository, SettingsExclusionRepository, SyncCoordinator,
    SyncError, SyncPhase, SyncStatus, SyncTrigger, EXCLUSION_STATE_KEY,
};
use mockall::mock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio_util::sync::CancellationToken;

// ============================================================================
// In-memory Collaborators
// ============================================================================

#[derive(Default)]
struct MemoryLibrary {
    items: AsyncMutex<Vec<LocalItem>>,
}

impl MemoryLibrary {
    fn with_items(items: Vec<LocalItem>) -> Self {
        Self {
            items: AsyncMutex::new(items),
        }
    }

    async fn item(&self, id: i64) -> LocalItem {
        self.items
            .lock()
            .await
            .iter()
            .find(|item| item.id.0 == id)
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl LocalLibraryStore for MemoryLibrary {
    async fn list_all(&self) -> BridgeResult<Vec<LocalItem>> {
        Ok(self.items.lock().await.clone())
    }

    async fn resolve_by_path(&self, path: &str) -> BridgeResult<Option<LocalItem>> {
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .find(|item| item.path == path)
            .cloned())
    }

    async fn update_watched(&self, id: LocalItemId, watched: bool) -> BridgeResult<()> {
        if let Some(item) = self.items.lock().await.iter_mut().find(|i| i.id == id) {
            item.watched = watched;
        }
        Ok(())
    }

    async fn update_external_id(&self, id: LocalItemId, external_id: &str) -> BridgeResult<()> {
        if let Some(item) = self.items.lock().await.iter_mut().find(|i| i.id == id) {
            item.external_id = external_id.to_string();
        }
        Ok(())
    }

    async fn resolve_blocked_filename_ids(
        &self,
        _filenames: &[String],
    ) -> BridgeResult<Vec<LocalItemId>> {
        Ok(Vec::new())
    }
}

/// Remote service that applies batches to its own library
#[derive(Default)]
struct MemoryRemote {
    items: AsyncMutex<Vec<RemoteItem>>,
    batches: AsyncMutex<Vec<(BatchKind, Vec<ItemSignature>)>>,
    /// Titles the catalogue cannot resolve
    unresolvable: Vec<String>,
    /// Titles the service matches by its own fallback
    title_matched: Vec<String>,
    fetches: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl MemoryRemote {
    fn with_items(items: Vec<RemoteItem>) -> Self {
        Self {
            items: AsyncMutex::new(items),
            ..Default::default()
        }
    }

    async fn batch_kinds(&self) -> Vec<BatchKind> {
        self.batches.lock().await.iter().map(|(k, _)| *k).collect()
    }

    fn same_title(remote: &RemoteItem, item: &ItemSignature) -> bool {
        match (
            normalize_external_id(&remote.external_id),
            normalize_external_id(&item.external_id),
        ) {
            (Some(a), Some(b)) if a == b => true,
            _ => remote.year == item.year && remote.title.eq_ignore_ascii_case(&item.title),
        }
    }
}

#[async_trait]
impl RemoteLibraryClient for MemoryRemote {
    async fn fetch_all_items(&self, _credentials: &Credentials) -> BridgeResult<Vec<RemoteItem>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.items.lock().await.clone())
    }

    async fn send_batch(
        &self,
        kind: BatchKind,
        items: Vec<ItemSignature>,
        _credentials: &Credentials,
    ) -> BridgeResult<BatchResult> {
        self.batches.lock().await.push((kind, items.clone()));

        let mut result = BatchResult::default();
        let mut remote = self.items.lock().await;

        for item in items {
            if self.unresolvable.contains(&item.title) {
                result.skipped.push(item);
                continue;
            }
            if self.title_matched.contains(&item.title) {
                result.already_exists.push(item);
                continue;
            }

            let existing = remote.iter().position(|r| Self::same_title(r, &item));
            match (kind, existing) {
                (BatchKind::Remove, Some(idx)) => {
                    remote.remove(idx);
                }
                (BatchKind::Remove, None) => continue,
                (_, Some(idx)) => {
                    if kind == BatchKind::Collection {
                        remote[idx].in_collection = true;
                    } else {
                        remote[idx].play_count = remote[idx].play_count.max(1);
                    }
                }
                (_, None) => {
                    let mut created =
                        RemoteItem::new(item.title.clone(), item.year, item.external_id.clone());
                    if kind == BatchKind::Collection {
                        created = created.in_collection();
                    } else {
                        created = created.with_plays(1);
                    }
                    remote.push(created);
                }
            }
            result.succeeded += 1;
        }

        Ok(result)
    }

    async fn send_heartbeat(
        &self,
        _payload: ScrobblePayload,
        _credentials: &Credentials,
    ) -> BridgeResult<()> {
        Ok(())
    }

    async fn send_completion(
        &self,
        _payload: ScrobblePayload,
        _credentials: &Credentials,
    ) -> BridgeResult<()> {
        Ok(())
    }

    async fn send_cancel(&self, _credentials: &Credentials) -> BridgeResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
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

struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    fn new() -> Self {
        Self(Mutex::new(Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap()))
    }

    fn advance(&self, by: ChronoDuration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

mock! {
    Store {}

    #[async_trait]
    impl LocalLibraryStore for Store {
        async fn list_all(&self) -> BridgeResult<Vec<LocalItem>>;
        async fn resolve_by_path(&self, path: &str) -> BridgeResult<Option<LocalItem>>;
        async fn update_watched(&self, id: LocalItemId, watched: bool) -> BridgeResult<()>;
        async fn update_external_id(&self, id: LocalItemId, external_id: &str) -> BridgeResult<()>;
        async fn resolve_blocked_filename_ids(&self, filenames: &[String]) -> BridgeResult<Vec<LocalItemId>>;
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

struct Harness {
    library: Arc<MemoryLibrary>,
    remote: Arc<MemoryRemote>,
    settings: Arc<MemorySettings>,
    clock: Arc<TestClock>,
    events: Receiver<CoreEvent>,
    coordinator: Arc<SyncCoordinator>,
}

fn harness(library: MemoryLibrary, remote: MemoryRemote, settings: LibrarySyncSettings) -> Harness {
    let library = Arc::new(library);
    let remote = Arc::new(remote);
    let store = Arc::new(MemorySettings::default());
    let clock = Arc::new(TestClock::new());
    let bus = EventBus::new(64);
    let events = bus.subscribe();

    let coordinator = SyncCoordinator::new(
        library.clone(),
        remote.clone(),
        Arc::new(SettingsExclusionRepository::new(store.clone())),
        clock.clone(),
        settings,
        bus,
    );
    coordinator.set_credentials(Some(Credentials::new("viewer", "hunter2")));

    Harness {
        library,
        remote,
        settings: store,
        clock,
        events,
        coordinator: Arc::new(coordinator),
    }
}

fn drain(events: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_second_cycle_sends_nothing() {
    let library = MemoryLibrary::with_items(vec![
        LocalItem::new(1, "Heat", Some(1995))
            .with_external_id("tt0113277")
            .with_watched(true),
        LocalItem::new(2, "Ronin", Some(1998)),
    ]);
    let mut h = harness(library, MemoryRemote::default(), LibrarySyncSettings::default());

    let first = h.coordinator.run_cycle(SyncTrigger::Manual).await.unwrap();
    let stats = first.stats.unwrap();
    assert_eq!(stats.to_collection, 2);
    assert_eq!(stats.to_seen, 1);
    assert_eq!(
        h.remote.batch_kinds().await,
        vec![BatchKind::Collection, BatchKind::Seen]
    );

    let second = h.coordinator.run_cycle(SyncTrigger::Scheduled).await.unwrap();
    assert_eq!(second.stats.unwrap().total_sent(), 0);
    assert_eq!(second.stats.unwrap().watched_corrections, 0);
    assert_eq!(h.remote.batches.lock().await.len(), 2);

    let completed = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, CoreEvent::Sync(SyncEvent::Completed { .. })))
        .count();
    assert_eq!(completed, 2);
}

#[tokio::test]
async fn test_remote_play_marks_local_item_watched() {
    let library = MemoryLibrary::with_items(vec![
        LocalItem::new(1, "A", Some(2000)).with_external_id("tt0000001")
    ]);
    let remote = MemoryRemote::with_items(vec![RemoteItem::new("A", Some(2000), "tt0000001")
        .in_collection()
        .with_plays(1)]);
    let mut h = harness(library, remote, LibrarySyncSettings::default());

    let job = h.coordinator.run_cycle(SyncTrigger::Manual).await.unwrap();

    assert!(h.library.item(1).await.watched);
    assert_eq!(job.stats.unwrap().watched_corrections, 1);
    assert_eq!(job.stats.unwrap().total_sent(), 0);
    assert!(h.remote.batches.lock().await.is_empty());
    assert!(drain(&mut h.events).contains(&CoreEvent::Library(LibraryEvent::WatchedChanged {
        item_id: 1,
        title: "A".to_string(),
        watched: true,
    })));
}

#[tokio::test]
async fn test_missing_identifier_is_written_back() {
    let library = MemoryLibrary::with_items(vec![LocalItem::new(7, "Alien", Some(1979))]);
    let remote = MemoryRemote::with_items(vec![
        RemoteItem::new("Alien", Some(1979), "tt0078748").in_collection()
    ]);
    let mut h = harness(library, remote, LibrarySyncSettings::default());

    let job = h.coordinator.run_cycle(SyncTrigger::Manual).await.unwrap();

    assert_eq!(h.library.item(7).await.external_id, "tt0078748");
    assert_eq!(job.stats.unwrap().ids_enriched, 1);
    assert!(drain(&mut h.events).iter().any(|e| matches!(
        e,
        CoreEvent::Library(LibraryEvent::ExternalIdEnriched { item_id: 7, .. })
    )));
}

#[tokio::test]
async fn test_remote_failure_aborts_without_local_changes() {
    let mut store = MockStore::new();
    store.expect_list_all().returning(|| {
        Ok(vec![
            LocalItem::new(1, "Heat", Some(1995)),
            LocalItem::new(2, "Alien", Some(1979)),
        ])
    });
    store.expect_update_watched().never();
    store.expect_update_external_id().never();
    store.expect_resolve_blocked_filename_ids().never();

    let mut remote = MockRemote::new();
    remote
        .expect_fetch_all_items()
        .times(1)
        .returning(|_| Err(BridgeError::Remote("503 Service Unavailable".to_string())));
    remote.expect_send_batch().never();

    let settings = Arc::new(MemorySettings::default());
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let coordinator = SyncCoordinator::new(
        Arc::new(store),
        Arc::new(remote),
        Arc::new(SettingsExclusionRepository::new(settings.clone())),
        Arc::new(TestClock::new()),
        LibrarySyncSettings::default(),
        bus,
    );
    coordinator.set_credentials(Some(Credentials::new("viewer", "hunter2")));

    let result = coordinator.run_cycle(SyncTrigger::Manual).await;

    assert!(matches!(result, Err(SyncError::Remote(_))));
    assert!(!settings.has_key(EXCLUSION_STATE_KEY).await.unwrap());

    let job = coordinator.last_job().unwrap();
    assert_eq!(job.status, SyncStatus::Failed);
    assert_eq!(job.phase, SyncPhase::FetchingRemote);

    let failed = drain(&mut events)
        .into_iter()
        .find(|e| matches!(e, CoreEvent::Sync(SyncEvent::Failed { .. })));
    assert!(matches!(
        failed,
        Some(CoreEvent::Sync(SyncEvent::Failed {
            recoverable: true,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_missing_credentials() {
    let mut h = harness(
        MemoryLibrary::default(),
        MemoryRemote::default(),
        LibrarySyncSettings::default(),
    );
    h.coordinator.set_credentials(None);

    let result = h.coordinator.run_cycle(SyncTrigger::Manual).await;

    assert!(matches!(result, Err(SyncError::ConfigurationMissing(_))));
    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), 0);
    assert!(drain(&mut h.events).iter().any(|e| matches!(
        e,
        CoreEvent::Sync(SyncEvent::Failed {
            recoverable: false,
            ..
        })
    )));
}

#[tokio::test]
async fn test_trigger_during_cycle_is_ignored() {
    let gate = Arc::new(Notify::new());
    let remote = MemoryRemote {
        gate: Some(gate.clone()),
        ..Default::default()
    };
    let mut h = harness(MemoryLibrary::default(), remote, LibrarySyncSettings::default());

    let running = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.run_cycle(SyncTrigger::Scheduled).await })
    };
    while h.remote.fetches.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    assert!(h.coordinator.is_running());

    let job_id = match h.coordinator.run_cycle(SyncTrigger::Manual).await {
        Err(SyncError::SyncInProgress { job_id }) => job_id,
        other => panic!("expected SyncInProgress, got {:?}", other),
    };

    gate.notify_one();
    let first = running.await.unwrap().unwrap();
    assert_eq!(first.id.to_string(), job_id);
    assert!(!h.coordinator.is_running());
    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), 1);

    assert!(drain(&mut h.events).contains(&CoreEvent::Sync(SyncEvent::Ignored {
        active_job_id: job_id,
    })));
}

#[tokio::test]
async fn test_skipped_items_are_remembered_until_expiry() {
    let library = MemoryLibrary::with_items(vec![
        LocalItem::new(1, "Alien", Some(1979)),
        LocalItem::new(2, "Heat", Some(1995)),
    ]);
    let remote = MemoryRemote {
        unresolvable: vec!["Alien".to_string()],
        ..Default::default()
    };
    let h = harness(library, remote, LibrarySyncSettings::default());

    let first = h.coordinator.run_cycle(SyncTrigger::Manual).await.unwrap();
    assert_eq!(first.stats.unwrap().skipped, 1);

    let state = SettingsExclusionRepository::new(h.settings.clone())
        .load()
        .await
        .unwrap();
    assert_eq!(state.skipped.len(), 1);
    assert_eq!(state.skipped[0].item.title, "Alien");

    h.clock.advance(ChronoDuration::days(2));
    let second = h.coordinator.run_cycle(SyncTrigger::Scheduled).await.unwrap();
    assert_eq!(second.stats.unwrap().to_collection, 0);

    h.clock.advance(ChronoDuration::days(6));
    let third = h.coordinator.run_cycle(SyncTrigger::Scheduled).await.unwrap();
    assert_eq!(third.stats.unwrap().to_collection, 1);

    let batches = h.remote.batches.lock().await;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].1[0].title, "Alien");
}

#[tokio::test]
async fn test_remote_cleaning_removes_items_gone_locally() {
    let library = MemoryLibrary::with_items(vec![LocalItem::new(1, "Heat", Some(1995))]);
    let remote = MemoryRemote::with_items(vec![
        RemoteItem::new("Gone Girl", Some(2014), "tt2267998").in_collection()
    ]);
    let h = harness(
        library,
        remote,
        LibrarySyncSettings::default().keep_remote_library_clean(true),
    );

    let job = h.coordinator.run_cycle(SyncTrigger::Manual).await.unwrap();

    assert_eq!(job.stats.unwrap().removed, 1);
    assert_eq!(
        h.remote.batch_kinds().await,
        vec![BatchKind::Collection, BatchKind::Remove]
    );
    assert!(!h
        .remote
        .items
        .lock()
        .await
        .iter()
        .any(|r| r.title == "Gone Girl"));
}

#[tokio::test]
async fn test_remote_cleaning_needs_single_provider() {
    let remote = MemoryRemote::with_items(vec![
        RemoteItem::new("Gone Girl", Some(2014), "tt2267998").in_collection()
    ]);
    let h = harness(
        MemoryLibrary::default(),
        remote,
        LibrarySyncSettings::default()
            .keep_remote_library_clean(true)
            .local_provider_count(2),
    );

    let job = h.coordinator.run_cycle(SyncTrigger::Manual).await.unwrap();

    assert_eq!(job.stats.unwrap().removed, 0);
    assert!(h.remote.batches.lock().await.is_empty());
}

#[tokio::test]
async fn test_already_exists_entries_stop_remote_cleaning() {
    let library = MemoryLibrary::with_items(vec![LocalItem::new(1, "Le Samouraï", Some(1967))]);
    let remote = MemoryRemote {
        items: AsyncMutex::new(vec![
            RemoteItem::new("Gone Girl", Some(2014), "tt2267998").in_collection()
        ]),
        title_matched: vec!["Le Samouraï".to_string()],
        ..Default::default()
    };
    let h = harness(
        library,
        remote,
        LibrarySyncSettings::default().keep_remote_library_clean(true),
    );

    let first = h.coordinator.run_cycle(SyncTrigger::Manual).await.unwrap();
    assert_eq!(first.stats.unwrap().already_exists, 1);
    assert_eq!(first.stats.unwrap().removed, 0);

    let second = h.coordinator.run_cycle(SyncTrigger::Manual).await.unwrap();
    assert_eq!(second.stats.unwrap().to_collection, 0);
    assert_eq!(second.stats.unwrap().removed, 0);

    assert_eq!(h.remote.batch_kinds().await, vec![BatchKind::Collection]);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_scheduler_runs_until_cancelled() {
    let h = harness(
        MemoryLibrary::default(),
        MemoryRemote::default(),
        LibrarySyncSettings::default(),
    );
    let shutdown = CancellationToken::new();

    let handle = h
        .coordinator
        .spawn_periodic(Duration::from_secs(3600), shutdown.clone());

    tokio::time::sleep(Duration::from_secs(2 * 3600 + 1)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), 3);
    assert_eq!(
        h.coordinator.last_job().map(|job| job.trigger),
        Some(SyncTrigger::Scheduled)
    );
}
