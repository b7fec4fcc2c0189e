//! # Sync Coordinator
//!
//! Runs library sync cycles against the remote tracking service.
//!
//! ## Workflow
//!
//! 1. Check that usable credentials are configured
//! 2. Load the exclusion state and expire a stale skip set
//! 3. List the local library and build the filtered index
//! 4. Fetch the remote library snapshot
//! 5. Reconcile, then write watched and identifier corrections to the store
//! 6. Send the collection batch, then the seen batch, folding per-item
//!    outcomes into the exclusion state
//! 7. Send the removal batch when remote cleaning is enabled, exactly one
//!    local provider is registered and no already-exists entry is recorded
//! 8. Save the exclusion state
//!
//! Any store or remote failure aborts the cycle at the step where it occurs.
//! The exclusion state is only saved by a cycle that reaches the end, so the
//! next cycle retries from the same starting point.
//!
//! ## Single flight
//!
//! At most one cycle runs at a time. A trigger that arrives while a cycle is
//! running is dropped with [`SyncError::SyncInProgress`] and a
//! [`SyncEvent::Ignored`] event; it is never queued or interleaved.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncCoordinator, SyncTrigger};
//! use tokio_util::sync::CancellationToken;
//!
//! let coordinator = Arc::new(SyncCoordinator::from_config(&config, event_bus));
//!
//! // Sync now
//! let job = coordinator.run_cycle(SyncTrigger::Manual).await?;
//! println!("Sent {} items", job.stats.map(|s| s.total_sent()).unwrap_or(0));
//!
//! // And every hour from here on
//! let shutdown = CancellationToken::new();
//! coordinator.spawn_periodic(config.library.sync_interval, shutdown.clone());
//! ```

use crate::exclusion::ExclusionCache;
use crate::index::LibraryIndexBuilder;
use crate::job::{SyncCycleStats, SyncJob, SyncJobId, SyncPhase, SyncTrigger};
use crate::reconcile::{reconcile, LocalCorrection, Reconciliation};
use crate::repository::{ExclusionRepository, SettingsExclusionRepository};
use crate::{Result, SyncError};
use bridge_traits::{
    BatchKind, BatchResult, Clock, Credentials, ItemSignature, LocalLibraryStore,
    RemoteLibraryClient,
};
use chrono::{DateTime, Utc};
use core_runtime::config::{CoreConfig, LibrarySyncSettings};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub struct SyncCoordinator {
    store: Arc<dyn LocalLibraryStore>,
    remote: Arc<dyn RemoteLibraryClient>,
    repository: Arc<dyn ExclusionRepository>,
    clock: Arc<dyn Clock>,
    settings: LibrarySyncSettings,
    credentials: RwLock<Option<Credentials>>,
    event_bus: EventBus,
    active: Mutex<Option<SyncJobId>>,
    last_job: Mutex<Option<SyncJob>>,
}

/// Releases the single-flight slot when the cycle ends, however it ends.
struct ActiveCycle<'a> {
    slot: &'a Mutex<Option<SyncJobId>>,
}

impl Drop for ActiveCycle<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn LocalLibraryStore>,
        remote: Arc<dyn RemoteLibraryClient>,
        repository: Arc<dyn ExclusionRepository>,
        clock: Arc<dyn Clock>,
        settings: LibrarySyncSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            remote,
            repository,
            clock,
            settings,
            credentials: RwLock::new(None),
            event_bus,
            active: Mutex::new(None),
            last_job: Mutex::new(None),
        }
    }

    /// Wires a coordinator from a validated [`CoreConfig`].
    ///
    /// The exclusion state is persisted in the configured settings store.
    pub fn from_config(config: &CoreConfig, event_bus: EventBus) -> Self {
        let repository = Arc::new(SettingsExclusionRepository::new(Arc::clone(
            &config.settings_store,
        )));
        let coordinator = Self::new(
            Arc::clone(&config.library_store),
            Arc::clone(&config.remote_client),
            repository,
            Arc::clone(&config.clock),
            config.library.clone(),
            event_bus,
        );
        coordinator.set_credentials(config.credentials.clone());
        coordinator
    }

    /// Replaces the account used by subsequent cycles.
    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credentials;
    }

    pub fn settings(&self) -> &LibrarySyncSettings {
        &self.settings
    }

    /// Whether a cycle is running right now
    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The most recently finished cycle, completed or failed
    pub fn last_job(&self) -> Option<SyncJob> {
        self.last_job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one full sync cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SyncInProgress`] if another cycle is running, and
    /// the error that aborted the cycle otherwise.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, trigger: SyncTrigger) -> Result<SyncJob> {
        let job = SyncJob::new(trigger);
        let _cycle = self.claim(job.id)?;

        let mut job = job.start()?;
        let job_id = job.id;
        info!(job_id = %job_id, "Starting library sync");
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                job_id: job_id.to_string(),
            }))
            .ok();

        match self.execute(&mut job).await {
            Ok(stats) => {
                let job = job.complete(stats)?;
                let duration_secs = job.duration_secs().unwrap_or(0);
                info!(
                    job_id = %job_id,
                    collected = stats.to_collection,
                    seen = stats.to_seen,
                    removed = stats.removed,
                    skipped = stats.skipped,
                    duration_secs,
                    "Library sync completed"
                );
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Completed {
                        job_id: job_id.to_string(),
                        items_collected: stats.to_collection,
                        items_seen: stats.to_seen,
                        items_removed: stats.removed,
                        watched_corrections: stats.watched_corrections,
                        duration_secs,
                    }))
                    .ok();
                self.remember(&job);
                Ok(job)
            }
            Err(e) => {
                error!(job_id = %job_id, phase = %job.phase, error = %e, "Library sync aborted");
                let job = job.fail(e.to_string())?;
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Failed {
                        job_id: job_id.to_string(),
                        message: e.to_string(),
                        recoverable: e.is_recoverable(),
                    }))
                    .ok();
                self.remember(&job);
                Err(e)
            }
        }
    }

    /// Triggers a cycle every `interval` until `shutdown` is cancelled.
    ///
    /// The first cycle runs immediately. Ticks missed while a cycle is
    /// running are skipped rather than bunched up.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Periodic library sync stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match coordinator.run_cycle(SyncTrigger::Scheduled).await {
                            Ok(_) => {}
                            Err(SyncError::SyncInProgress { job_id }) => {
                                debug!(active_job_id = %job_id, "Scheduled sync skipped");
                            }
                            Err(e) => debug!(error = %e, "Scheduled sync failed"),
                        }
                    }
                }
            }
        })
    }

    fn claim(&self, job_id: SyncJobId) -> Result<ActiveCycle<'_>> {
        let mut slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(active) = *slot {
            info!(active_job_id = %active, "Library sync already running, ignoring trigger");
            self.event_bus
                .emit(CoreEvent::Sync(SyncEvent::Ignored {
                    active_job_id: active.to_string(),
                }))
                .ok();
            return Err(SyncError::SyncInProgress {
                job_id: active.to_string(),
            });
        }

        *slot = Some(job_id);
        Ok(ActiveCycle { slot: &self.active })
    }

    fn remember(&self, job: &SyncJob) {
        *self.last_job.lock().unwrap_or_else(PoisonError::into_inner) = Some(job.clone());
    }

    fn credentials(&self) -> Result<Credentials> {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|c| c.is_complete())
            .cloned()
            .ok_or_else(|| {
                SyncError::ConfigurationMissing("Remote account credentials are not set".to_string())
            })
    }

    async fn execute(&self, job: &mut SyncJob) -> Result<SyncCycleStats> {
        let credentials = self.credentials()?;
        let now = self.clock.now();
        let mut stats = SyncCycleStats::default();

        let mut cache = ExclusionCache::new(self.repository.load().await?);
        cache.expire_if_stale(now);

        let raw = self.store.list_all().await.map_err(SyncError::from_store)?;
        let index = LibraryIndexBuilder::new(Arc::clone(&self.store), self.settings.clone())
            .build(raw, &mut cache, now)
            .await?;

        job.advance(SyncPhase::FetchingRemote)?;
        let remote = self
            .remote
            .fetch_all_items(&credentials)
            .await
            .map_err(SyncError::from_remote)?;
        info!(items = remote.len(), "Fetched remote library");

        job.advance(SyncPhase::Reconciling)?;
        let Reconciliation { plan, corrections } = reconcile(&index.items, &remote);
        self.apply_corrections(&corrections, &mut stats).await?;

        job.advance(SyncPhase::SendingCollection)?;
        stats.to_collection = plan.to_collection.len() as u64;
        let collection = plan.to_collection.iter().map(|item| item.signature()).collect();
        if let Some(result) = self
            .send_batch(BatchKind::Collection, collection, &credentials)
            .await?
        {
            fold_outcomes(&mut cache, &result, now, &mut stats);
        }

        job.advance(SyncPhase::SendingSeen)?;
        stats.to_seen = plan.to_seen.len() as u64;
        let seen = plan.to_seen.iter().map(|item| item.signature()).collect();
        if let Some(result) = self.send_batch(BatchKind::Seen, seen, &credentials).await? {
            fold_outcomes(&mut cache, &result, now, &mut stats);
        }

        job.advance(SyncPhase::CleaningRemote)?;
        if self.settings.keep_remote_library_clean && self.settings.single_provider() {
            if cache.has_already_exists() {
                warn!(
                    already_exists = cache.already_exists_count(),
                    "Items matched remotely by title are recorded, not removing anything from the remote collection"
                );
            } else {
                let removals: Vec<ItemSignature> = plan
                    .to_remove_remotely
                    .iter()
                    .map(|item| item.signature())
                    .collect();
                stats.removed = removals.len() as u64;
                self.send_batch(BatchKind::Remove, removals, &credentials)
                    .await?;
            }
        }

        self.repository.save(cache.state()).await?;
        Ok(stats)
    }

    async fn apply_corrections(
        &self,
        corrections: &[LocalCorrection],
        stats: &mut SyncCycleStats,
    ) -> Result<()> {
        for correction in corrections {
            match correction {
                LocalCorrection::SetExternalId {
                    id,
                    title,
                    external_id,
                } => {
                    self.store
                        .update_external_id(*id, external_id)
                        .await
                        .map_err(SyncError::from_store)?;
                    stats.ids_enriched += 1;
                    self.event_bus
                        .emit(CoreEvent::Library(LibraryEvent::ExternalIdEnriched {
                            item_id: id.0,
                            title: title.clone(),
                            external_id: external_id.clone(),
                        }))
                        .ok();
                }
                LocalCorrection::SetWatched { id, title, watched } => {
                    self.store
                        .update_watched(*id, *watched)
                        .await
                        .map_err(SyncError::from_store)?;
                    stats.watched_corrections += 1;
                    self.event_bus
                        .emit(CoreEvent::Library(LibraryEvent::WatchedChanged {
                            item_id: id.0,
                            title: title.clone(),
                            watched: *watched,
                        }))
                        .ok();
                }
            }
        }
        Ok(())
    }

    /// Sends one batch. Empty batches are not sent and yield `None`.
    async fn send_batch(
        &self,
        kind: BatchKind,
        items: Vec<ItemSignature>,
        credentials: &Credentials,
    ) -> Result<Option<BatchResult>> {
        if items.is_empty() {
            debug!(batch = %kind, "Nothing to send");
            return Ok(None);
        }

        for item in &items {
            info!(batch = %kind, item = %item, "Sending item");
        }

        let count = items.len();
        let result = self
            .remote
            .send_batch(kind, items, credentials)
            .await
            .map_err(SyncError::from_remote)?;

        info!(
            batch = %kind,
            sent = count,
            succeeded = result.succeeded,
            skipped = result.skipped.len(),
            already_exists = result.already_exists.len(),
            "Batch sent"
        );
        Ok(Some(result))
    }
}

fn fold_outcomes(
    cache: &mut ExclusionCache,
    result: &BatchResult,
    now: DateTime<Utc>,
    stats: &mut SyncCycleStats,
) {
    cache.record_skipped(&result.skipped, now);
    cache.record_already_exists(&result.already_exists);
    stats.skipped += result.skipped.len() as u64;
    stats.already_exists += result.already_exists.len() as u64;
}
