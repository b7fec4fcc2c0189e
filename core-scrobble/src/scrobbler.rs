//! # Scrobbler
//!
//! Reports what the user is watching while it plays.
//!
//! ## Overview
//!
//! [`Scrobbler::start`] resolves the playing file against the local library
//! and opens a session. While the session is watching, a heartbeat task
//! reports progress to the remote service, first after a short delay and
//! then on a fixed interval. [`Scrobbler::stop`] samples the final position:
//! at or past 90 % the watch is scrobbled as complete (and the user may be
//! asked for a rating), below that the remote "watching" state is cancelled.
//!
//! ## Concurrency
//!
//! The scrobbler owns at most one session. Starting playback discards the
//! previous session first, cancelling it remotely.
//!
//! Every outbound call of a session runs under that session's dispatch gate.
//! Stopping cancels the heartbeat token before the terminal call is queued,
//! and a heartbeat checks the token only after taking the gate, so no
//! heartbeat is sent once the terminal call has gone out.
//!
//! Every `start` and `stop` advances a generation counter. A `start` whose
//! library lookup is overtaken by a `stop` or a newer `start` does not install
//! its session and fails with [`ScrobbleError::Superseded`].
//!
//! Remote calls never run on the caller's path: `stop` returns as soon as the
//! terminal call is spawned, handing back its [`JoinHandle`]. Tasks are
//! spawned on the runtime the scrobbler was created in, so `stop` may be
//! called from a host thread outside that runtime.

use crate::error::{Result, ScrobbleError};
use crate::progress::ProgressSample;
use crate::session::{ActiveSession, ScrobbleSession, ScrobbleState};
use bridge_traits::{
    Clock, Credentials, LocalLibraryStore, MediaKind, PlaybackSource, RatingPrompt,
    RemoteLibraryClient,
};
use core_runtime::config::{CoreConfig, ScrobbleSettings};
use core_runtime::events::{CoreEvent, EventBus, ScrobbleEvent};
use core_runtime::logging::strip_path;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of stopping a session.
#[derive(Debug)]
pub struct StopOutcome {
    /// `Completed` or `Cancelled`
    pub state: ScrobbleState,
    /// Percent watched when playback stopped
    pub progress: f64,
    /// The terminal remote call, and the rating prompt after a completed watch
    pub dispatch: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
enum Terminal {
    Completed { duration_minutes: u32 },
    Cancelled { progress: u8 },
}

/// Everything the background tasks of a session need.
#[derive(Clone)]
struct Dispatcher {
    remote: Arc<dyn RemoteLibraryClient>,
    playback: Arc<dyn PlaybackSource>,
    rating_prompt: Option<Arc<dyn RatingPrompt>>,
    show_rate_dialog: bool,
    event_bus: EventBus,
}

impl Dispatcher {
    fn emit(&self, event: ScrobbleEvent) {
        self.event_bus.emit(CoreEvent::Scrobble(event)).ok();
    }

    async fn run_heartbeats(
        self,
        session: Arc<ScrobbleSession>,
        credentials: Credentials,
        cancel: CancellationToken,
        gate: Arc<AsyncMutex<()>>,
        initial_delay: Duration,
        interval: Duration,
    ) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(initial_delay) => {}
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            self.heartbeat(&session, &credentials, &cancel, &gate).await;

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
        }
    }

    async fn heartbeat(
        &self,
        session: &ScrobbleSession,
        credentials: &Credentials,
        cancel: &CancellationToken,
        gate: &AsyncMutex<()>,
    ) {
        let _gate = gate.lock().await;
        if cancel.is_cancelled() {
            return;
        }

        let sample = ProgressSample::read(self.playback.as_ref(), session.item.runtime_minutes);
        let progress = sample.progress();
        let duration_minutes = sample.duration_minutes();
        let payload = session.payload(progress, duration_minutes);

        match self.remote.send_heartbeat(payload, credentials).await {
            Ok(()) => {
                session.record_progress(progress);
                debug!(title = %session.title(), progress, "Sent watching status");
                self.emit(ScrobbleEvent::Heartbeat {
                    title: session.title().to_string(),
                    progress,
                    duration_minutes,
                });
            }
            Err(e) => {
                warn!(title = %session.title(), error = %e, "Failed to send watching status");
                self.emit(ScrobbleEvent::HeartbeatFailed {
                    title: session.title().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    async fn finish(self, active: ActiveSession, terminal: Terminal) {
        let ActiveSession {
            session,
            credentials,
            dispatch_gate,
            ..
        } = active;
        let _gate = dispatch_gate.lock().await;

        match terminal {
            Terminal::Completed { duration_minutes } => {
                let payload = session.payload(100, duration_minutes);
                match self.remote.send_completion(payload, &credentials).await {
                    Ok(()) => info!(title = %session.title(), "Scrobbled watch"),
                    Err(e) => warn!(title = %session.title(), error = %e, "Failed to scrobble watch"),
                }

                let rating = self.prompt_rating(&session).await;
                self.emit(ScrobbleEvent::Completed {
                    title: session.title().to_string(),
                    rating,
                });
            }
            Terminal::Cancelled { progress } => {
                match self.remote.send_cancel(&credentials).await {
                    Ok(()) => info!(title = %session.title(), progress, "Cancelled watching"),
                    Err(e) => warn!(title = %session.title(), error = %e, "Failed to cancel watching"),
                }

                self.emit(ScrobbleEvent::Cancelled {
                    title: session.title().to_string(),
                    progress,
                });
            }
        }
    }

    async fn prompt_rating(&self, session: &ScrobbleSession) -> Option<u8> {
        if !self.show_rate_dialog {
            return None;
        }
        let prompt = self.rating_prompt.as_ref()?;

        let rating = prompt.prompt_rating(&session.item).await;
        if let Some(rating) = rating.filter(|r| *r > 0) {
            info!(title = %session.title(), rating, "User rated watch");
        }
        rating
    }
}

pub struct Scrobbler {
    store: Arc<dyn LocalLibraryStore>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    settings: ScrobbleSettings,
    credentials: RwLock<Option<Credentials>>,
    slot: Mutex<Option<ActiveSession>>,
    generation: AtomicU64,
    runtime: Handle,
}

impl Scrobbler {
    /// Creates a scrobbler bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime. [`Scrobbler::from_config`]
    /// reports that case as an error instead.
    pub fn new(
        store: Arc<dyn LocalLibraryStore>,
        remote: Arc<dyn RemoteLibraryClient>,
        playback: Arc<dyn PlaybackSource>,
        rating_prompt: Option<Arc<dyn RatingPrompt>>,
        clock: Arc<dyn Clock>,
        settings: ScrobbleSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            dispatcher: Dispatcher {
                remote,
                playback,
                rating_prompt,
                show_rate_dialog: settings.show_rate_dialog_on_watched,
                event_bus,
            },
            clock,
            settings,
            credentials: RwLock::new(None),
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
            runtime: Handle::current(),
        }
    }

    /// Wires a scrobbler from a validated [`CoreConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ScrobbleError::ConfigurationMissing`] if no `PlaybackSource`
    /// is configured or no Tokio runtime is running.
    pub fn from_config(config: &CoreConfig, event_bus: EventBus) -> Result<Self> {
        Handle::try_current().map_err(|e| {
            ScrobbleError::ConfigurationMissing(format!("No Tokio runtime available: {e}"))
        })?;

        let playback = config.playback_source.clone().ok_or_else(|| {
            ScrobbleError::ConfigurationMissing("No PlaybackSource configured".to_string())
        })?;

        let scrobbler = Self::new(
            Arc::clone(&config.library_store),
            Arc::clone(&config.remote_client),
            playback,
            config.rating_prompt.clone(),
            Arc::clone(&config.clock),
            config.scrobble.clone(),
            event_bus,
        );
        scrobbler.set_credentials(config.credentials.clone());
        Ok(scrobbler)
    }

    /// Replaces the account used by sessions started from now on.
    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        *self.credentials.write() = credentials;
    }

    pub fn state(&self) -> ScrobbleState {
        if self.slot.lock().is_some() {
            ScrobbleState::Watching
        } else {
            ScrobbleState::Idle
        }
    }

    pub fn current_session(&self) -> Option<Arc<ScrobbleSession>> {
        self.slot
            .lock()
            .as_ref()
            .map(|active| Arc::clone(&active.session))
    }

    /// Opens a session for the file at `path`.
    ///
    /// Any session still watching is cancelled first, whether or not the new
    /// one can be opened.
    ///
    /// # Errors
    ///
    /// - [`ScrobbleError::NotApplicable`] when scrobbling is disabled or the
    ///   player reports the stream as not applicable
    /// - [`ScrobbleError::ConfigurationMissing`] without usable credentials
    /// - [`ScrobbleError::UnresolvedIdentity`] when no library item has this path
    /// - [`ScrobbleError::StoreUnavailable`] when the lookup fails
    /// - [`ScrobbleError::Superseded`] when `stop` or another `start` was
    ///   called while the lookup ran
    ///
    /// The scrobbler stays `Idle` on every error except `Superseded`, where
    /// it keeps whatever the newer call left.
    #[instrument(skip(self, path), fields(path = %strip_path(path)))]
    pub async fn start(&self, path: &str, kind: MediaKind) -> Result<Arc<ScrobbleSession>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let previous = self.slot.lock().take();
        if let Some(previous) = previous {
            info!(title = %previous.session.title(), "New playback started, discarding previous session");
            self.discard(previous);
        }

        if !self.settings.enabled {
            return Err(ScrobbleError::NotApplicable(
                "scrobbling is disabled".to_string(),
            ));
        }

        if !self.dispatcher.playback.is_active_media(kind) {
            debug!(?kind, "Ignoring playback that is not reported");
            return Err(ScrobbleError::NotApplicable(format!(
                "{:?} playback is not reported",
                kind
            )));
        }

        let credentials = self.usable_credentials()?;

        let item = self
            .store
            .resolve_by_path(path)
            .await?
            .ok_or_else(|| ScrobbleError::UnresolvedIdentity {
                path: path.to_string(),
            })?;

        let session = Arc::new(ScrobbleSession::new(item, kind, self.clock.now()));

        {
            // Any call that touched the slot after us has advanced the generation
            let mut slot = self.slot.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                info!(title = %session.title(), "Playback ended during lookup, not starting session");
                return Err(ScrobbleError::Superseded {
                    path: path.to_string(),
                });
            }
            *slot = Some(self.activate(Arc::clone(&session), credentials));
        }

        info!(title = %session.title(), id = %session.item.id, "Watching");
        self.dispatcher.emit(ScrobbleEvent::Started {
            item_id: session.item.id.0,
            title: session.title().to_string(),
        });

        Ok(session)
    }

    /// Ends the current session, if any.
    ///
    /// The terminal remote call is spawned and this returns without waiting
    /// for it. A `start` still resolving its item is abandoned.
    #[instrument(skip(self))]
    pub fn stop(&self) -> Option<StopOutcome> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let active = self.slot.lock().take()?;
        active.cancel.cancel();

        let sample = ProgressSample::read(
            self.dispatcher.playback.as_ref(),
            active.session.item.runtime_minutes,
        );
        let (state, terminal) = if sample.reached(self.settings.completion_threshold_percent()) {
            (
                ScrobbleState::Completed,
                Terminal::Completed {
                    duration_minutes: sample.duration_minutes(),
                },
            )
        } else {
            (
                ScrobbleState::Cancelled,
                Terminal::Cancelled {
                    progress: sample.progress(),
                },
            )
        };

        info!(
            title = %active.session.title(),
            progress = sample.percent,
            state = %state,
            "Playback stopped"
        );

        let dispatch = self.dispatch_terminal(active, terminal);
        Some(StopOutcome {
            state,
            progress: sample.percent,
            dispatch,
        })
    }

    fn activate(&self, session: Arc<ScrobbleSession>, credentials: Credentials) -> ActiveSession {
        let cancel = CancellationToken::new();
        let dispatch_gate = Arc::new(AsyncMutex::new(()));

        let heartbeat = self.runtime.spawn(self.dispatcher.clone().run_heartbeats(
            Arc::clone(&session),
            credentials.clone(),
            cancel.clone(),
            Arc::clone(&dispatch_gate),
            self.settings.heartbeat_initial_delay,
            self.settings.heartbeat_interval,
        ));

        ActiveSession {
            session,
            credentials,
            cancel,
            dispatch_gate,
            heartbeat,
        }
    }

    fn discard(&self, active: ActiveSession) {
        let progress = active.session.last_progress();
        self.dispatch_terminal(active, Terminal::Cancelled { progress });
    }

    fn dispatch_terminal(&self, active: ActiveSession, terminal: Terminal) -> JoinHandle<()> {
        active.cancel.cancel();
        self.runtime
            .spawn(self.dispatcher.clone().finish(active, terminal))
    }

    fn usable_credentials(&self) -> Result<Credentials> {
        self.credentials
            .read()
            .as_ref()
            .filter(|c| c.is_complete())
            .cloned()
            .ok_or_else(|| {
                ScrobbleError::ConfigurationMissing(
                    "Remote account credentials are not set".to_string(),
                )
            })
    }
}

impl Drop for Scrobbler {
    fn drop(&mut self) {
        if let Some(active) = self.slot.get_mut().take() {
            active.cancel.cancel();
            active.heartbeat.abort();
        }
    }
}
