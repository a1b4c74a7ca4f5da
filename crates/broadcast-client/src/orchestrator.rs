//! Session orchestrator.
//!
//! Sequences credential fetch, transport setup, local media and remote
//! participant handling into one session lifecycle:
//!
//! ```text
//! Idle -> Joining -> Joined -> Leaving -> Idle
//!            \__________________/
//!             leave during join
//! ```
//!
//! The state lives in a `watch` channel and every transition is a single
//! check-and-set on it, so concurrent `join`/`leave` calls never interleave
//! their side effects. A failed join rolls back everything it set up before
//! the error is returned.
//!
//! # Cancellation
//!
//! `leave` during `Joining` moves the state to `Leaving` and cancels the join
//! token. Remote join steps race the token; local device steps run to
//! completion and the token is checked after each step. A leave that lands
//! during the final preview attach is caught by the `Joining -> Joined`
//! transition instead. The join then rolls back, returns `Join(Cancelled)`
//! and `leave` resolves once the state is back to `Idle`.
//!
//! The event pump handles one transport event at a time and races each one
//! against its token, so stopping it never waits on a remote subscribe.

use crate::config::{duration_ms, Config};
use crate::credentials::{CredentialProvider, SessionCredential};
use crate::errors::{CredentialError, JoinFailure, SessionError};
use crate::media::{CaptureDevices, LocalMediaController, LocalMediaState};
use crate::observability::metrics;
use crate::registry::{RemoteParticipant, RemoteParticipantRegistry};
use crate::render::{RenderSurface, SharedSurface};
use crate::transport::{EventReceiver, MediaTransport, TransportClient, TransportPhase};
use common::types::{MediaKind, Role};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Joining,
    Joined,
    Leaving,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Joined => "joined",
            SessionState::Leaving => "leaving",
        };
        write!(f, "{s}")
    }
}

/// Upper bound on waiting for the event pump task to exit.
const PUMP_STOP_TIMEOUT: Duration = Duration::from_secs(2);

type ErrorCallback = Arc<dyn Fn(&SessionError) + Send + Sync>;
type ParticipantsCallback = Arc<dyn Fn(&[RemoteParticipant]) + Send + Sync>;

/// Registered UI callbacks.
///
/// Callbacks are cloned out before invocation so no lock is held while user
/// code runs.
#[derive(Default)]
struct Listeners {
    error: RwLock<Vec<ErrorCallback>>,
    participants: RwLock<Vec<ParticipantsCallback>>,
}

impl Listeners {
    async fn notify_error(&self, error: &SessionError) {
        let callbacks = self.error.read().await.clone();
        for callback in callbacks {
            callback(error);
        }
    }

    async fn notify_participants(&self, snapshot: &[RemoteParticipant]) {
        let callbacks = self.participants.read().await.clone();
        for callback in callbacks {
            callback(snapshot);
        }
    }
}

/// Running event pump task.
struct EventPump {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Coordinates one participant's broadcast session.
pub struct SessionOrchestrator {
    config: Config,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<TransportClient>,
    media: Mutex<LocalMediaController>,
    registry: Arc<Mutex<RemoteParticipantRegistry>>,
    /// Last published registry snapshot, readable without the registry lock.
    roster: Arc<watch::Sender<Vec<RemoteParticipant>>>,
    state: watch::Sender<SessionState>,
    join_cancel: Mutex<Option<CancellationToken>>,
    pump: Mutex<Option<EventPump>>,
    listeners: Arc<Listeners>,
    /// Parent of every event pump token; cancelled on drop.
    shutdown: CancellationToken,
}

impl SessionOrchestrator {
    #[must_use]
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialProvider>,
        sdk: Arc<dyn MediaTransport>,
        devices: Arc<dyn CaptureDevices>,
        surface: Arc<dyn RenderSurface>,
    ) -> Self {
        let surface = SharedSurface::new(surface);
        let transport = Arc::new(TransportClient::new(sdk, config.join_timeout));
        let (state, _) = watch::channel(SessionState::Idle);
        let (roster, _) = watch::channel(Vec::new());

        Self {
            config,
            credentials,
            transport,
            media: Mutex::new(LocalMediaController::new(devices, surface.clone())),
            registry: Arc::new(Mutex::new(RemoteParticipantRegistry::new(surface))),
            roster: Arc::new(roster),
            state,
            join_cancel: Mutex::new(None),
            pump: Mutex::new(None),
            listeners: Arc::new(Listeners::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Snapshot of the remote participants, ordered by ID.
    #[must_use]
    pub fn participants(&self) -> Vec<RemoteParticipant> {
        self.roster.borrow().clone()
    }

    pub async fn local_media_state(&self) -> LocalMediaState {
        self.media.lock().await.state()
    }

    /// Register a callback for failed operations.
    pub async fn on_error<F>(&self, callback: F)
    where
        F: Fn(&SessionError) + Send + Sync + 'static,
    {
        self.listeners.error.write().await.push(Arc::new(callback));
    }

    /// Register a callback for remote participant changes.
    pub async fn on_participants_changed<F>(&self, callback: F)
    where
        F: Fn(&[RemoteParticipant]) + Send + Sync + 'static,
    {
        self.listeners
            .participants
            .write()
            .await
            .push(Arc::new(callback));
    }

    // =========================================================================
    // Join
    // =========================================================================

    /// Join the configured channel as `role`.
    ///
    /// Hosts also acquire and publish microphone and camera tracks. On any
    /// failure everything set up so far is rolled back and the session returns
    /// to `Idle`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the session is `Idle`
    /// - `Join(Cancelled)` if `leave` was called before the join completed
    /// - the error of the first step that failed otherwise
    #[instrument(skip_all, fields(channel = %self.config.channel, role = %role))]
    pub async fn join(&self, role: Role) -> Result<(), SessionError> {
        let guarded = {
            let mut slot = self.join_cancel.lock().await;
            self.transition(SessionState::Idle, SessionState::Joining)
                .map(|()| {
                    let token = CancellationToken::new();
                    *slot = Some(token.clone());
                    token
                })
        };
        let cancel = match guarded {
            Ok(token) => token,
            Err(current) => {
                let err = SessionError::InvalidState(format!(
                    "join requires an idle session (session is {current})"
                ));
                self.report(&err).await;
                return Err(err);
            }
        };

        let start = Instant::now();
        info!(target: "bc.orchestrator", "Joining session");

        let result = match self.run_join(role, &cancel).await {
            Ok(()) => self
                .transition(SessionState::Joining, SessionState::Joined)
                .map_err(|_| SessionError::Join(JoinFailure::Cancelled)),
            Err(e) => Err(e),
        };
        self.join_cancel.lock().await.take();

        match result {
            Ok(()) => {
                metrics::record_join(role, "success", start.elapsed());
                info!(
                    target: "bc.orchestrator",
                    duration_ms = start.elapsed().as_millis(),
                    "Session joined"
                );
                Ok(())
            }
            Err(e) => {
                self.rollback(&e).await;
                let outcome = if e.is_cancellation() {
                    "cancelled"
                } else {
                    e.kind().as_str()
                };
                metrics::record_join(role, outcome, start.elapsed());
                if e.is_cancellation() {
                    info!(target: "bc.orchestrator", "Join cancelled by leave");
                } else {
                    warn!(
                        target: "bc.orchestrator",
                        error_kind = e.kind().as_str(),
                        error = %e,
                        "Join failed, session rolled back"
                    );
                }
                self.report(&e).await;
                Err(e)
            }
        }
    }

    async fn run_join(&self, role: Role, cancel: &CancellationToken) -> Result<(), SessionError> {
        let credential = step(cancel, self.fetch_credential(role)).await?;

        let events = self.transport.initialize(&self.config.client_options).await?;
        checkpoint(cancel)?;

        step(cancel, self.transport.set_role(role)).await?;
        step(cancel, self.transport.join(&credential)).await?;

        self.start_pump(events).await;

        if role.can_publish() {
            self.media
                .lock()
                .await
                .acquire(&[MediaKind::Audio, MediaKind::Video])
                .await?;
            checkpoint(cancel)?;

            let tracks = self.media.lock().await.tracks();
            step(cancel, self.transport.publish(&tracks)).await?;

            self.media
                .lock()
                .await
                .attach(&self.config.local_preview_surface)
                .await;
        }

        Ok(())
    }

    async fn fetch_credential(&self, role: Role) -> Result<SessionCredential, SessionError> {
        let timeout = self.config.credential_timeout;
        match tokio::time::timeout(
            timeout,
            self.credentials.fetch_credential(&self.config.channel, role),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(CredentialError::Timeout(duration_ms(timeout)).into()),
        }
    }

    /// Undo a partial join and return to `Idle`.
    async fn rollback(&self, error: &SessionError) {
        self.release_session().await;
        if error.is_auth_related() || error.is_cancellation() {
            self.credentials.invalidate().await;
        }
        self.state.send_replace(SessionState::Idle);
        debug!(target: "bc.orchestrator", "Session state -> idle");
    }

    // =========================================================================
    // Leave
    // =========================================================================

    /// Leave the session.
    ///
    /// No-op when `Idle`. During `Joining` the join is cancelled and this
    /// resolves once its rollback finished. During `Leaving` this waits for
    /// the in-flight leave.
    #[instrument(skip_all, fields(channel = %self.config.channel))]
    pub async fn leave(&self) {
        match self.state() {
            SessionState::Idle => {
                debug!(target: "bc.orchestrator", "Leave while idle ignored");
            }
            SessionState::Joined => {
                if self
                    .transition(SessionState::Joined, SessionState::Leaving)
                    .is_ok()
                {
                    self.finish_leave().await;
                } else {
                    self.wait_for_idle().await;
                }
            }
            SessionState::Joining => {
                if self
                    .transition(SessionState::Joining, SessionState::Leaving)
                    .is_ok()
                {
                    if let Some(token) = self.join_cancel.lock().await.as_ref() {
                        token.cancel();
                    }
                    info!(target: "bc.orchestrator", "Leave requested during join, cancelling");
                }
                self.wait_for_idle().await;
            }
            SessionState::Leaving => self.wait_for_idle().await,
        }
    }

    async fn finish_leave(&self) {
        self.release_session().await;
        self.credentials.invalidate().await;
        self.state.send_replace(SessionState::Idle);
        metrics::record_leave();
        info!(target: "bc.orchestrator", "Session left");
    }

    async fn wait_for_idle(&self) {
        let mut rx = self.state.subscribe();
        if rx.wait_for(|s| *s == SessionState::Idle).await.is_err() {
            error!(target: "bc.orchestrator", "State channel closed while waiting for idle");
        }
    }

    /// Release local tracks, remote participants and the transport client.
    async fn release_session(&self) {
        self.media.lock().await.release().await;

        self.stop_pump().await;
        let removed = self.registry.lock().await.teardown_all().await;
        self.roster.send_replace(Vec::new());
        if removed > 0 {
            self.listeners.notify_participants(&[]).await;
        }

        if self.transport.phase().await == TransportPhase::Joined {
            self.transport.leave().await;
        } else {
            self.transport.teardown().await;
        }
    }

    // =========================================================================
    // Local Media Toggles
    // =========================================================================

    /// Flip the microphone mute state. Returns the new muted flag.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless joined with a local audio track.
    pub async fn toggle_mute(&self) -> Result<bool, SessionError> {
        let result = async {
            self.require_joined("toggle_mute")?;
            let mut media = self.media.lock().await;
            let muted = !media.is_muted();
            media.set_muted(muted).await?;
            Ok::<_, SessionError>(muted)
        }
        .await;

        if let Err(e) = &result {
            self.report(e).await;
        }
        result
    }

    /// Flip the camera suspend state. Returns the new suspended flag.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless joined with a local video track.
    pub async fn toggle_video(&self) -> Result<bool, SessionError> {
        let result = async {
            self.require_joined("toggle_video")?;
            let mut media = self.media.lock().await;
            let suspended = !media.is_video_suspended();
            media.set_video_enabled(!suspended).await?;
            Ok::<_, SessionError>(suspended)
        }
        .await;

        if let Err(e) = &result {
            self.report(e).await;
        }
        result
    }

    fn require_joined(&self, operation: &str) -> Result<(), SessionError> {
        let current = self.state();
        if current == SessionState::Joined {
            Ok(())
        } else {
            Err(SessionError::InvalidState(format!(
                "{operation} requires a joined session (session is {current})"
            )))
        }
    }

    // =========================================================================
    // Event Pump
    // =========================================================================

    async fn start_pump(&self, mut events: EventReceiver) {
        let cancel = self.shutdown.child_token();
        let child = cancel.clone();
        let registry = Arc::clone(&self.registry);
        let roster = Arc::clone(&self.roster);
        let transport = Arc::clone(&self.transport);
        let listeners = Arc::clone(&self.listeners);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    () = child.cancelled() => break,

                    event = events.recv() => {
                        let Some(event) = event else {
                            debug!(target: "bc.orchestrator", "Transport event channel closed");
                            break;
                        };
                        debug!(
                            target: "bc.orchestrator",
                            event = event.label(),
                            participant_id = %event.participant_id(),
                            "Transport event"
                        );

                        let apply = async {
                            let mut registry = registry.lock().await;
                            match registry.handle_event(event, &transport).await {
                                Ok(true) => Some(registry.snapshot()),
                                Ok(false) => None,
                                Err(e) => {
                                    debug!(
                                        target: "bc.orchestrator",
                                        error_kind = e.kind().as_str(),
                                        "Participant event not applied"
                                    );
                                    None
                                }
                            }
                        };

                        // Dropping `apply` releases the registry lock; a
                        // half-applied participant is removed by teardown_all.
                        let snapshot = tokio::select! {
                            biased;
                            () = child.cancelled() => break,
                            snapshot = apply => snapshot,
                        };

                        if let Some(snapshot) = snapshot {
                            roster.send_replace(snapshot.clone());
                            listeners.notify_participants(&snapshot).await;
                        }
                    }
                }
            }
        });

        if let Some(previous) = self.pump.lock().await.replace(EventPump { cancel, task }) {
            warn!(target: "bc.orchestrator", "Replacing a running event pump");
            previous.cancel.cancel();
        }
    }

    async fn stop_pump(&self) {
        let Some(mut pump) = self.pump.lock().await.take() else {
            return;
        };
        pump.cancel.cancel();
        match tokio::time::timeout(PUMP_STOP_TIMEOUT, &mut pump.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(target: "bc.orchestrator", error = %e, "Event pump task failed");
            }
            Err(_) => {
                warn!(
                    target: "bc.orchestrator",
                    timeout_ms = duration_ms(PUMP_STOP_TIMEOUT),
                    "Event pump did not stop in time, aborting"
                );
                pump.task.abort();
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Atomically move from `from` to `to`. Returns the current state on mismatch.
    fn transition(&self, from: SessionState, to: SessionState) -> Result<(), SessionState> {
        let mut current = from;
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                current = *state;
                false
            }
        });
        if changed {
            debug!(target: "bc.orchestrator", from = %from, to = %to, "Session state transition");
            Ok(())
        } else {
            Err(current)
        }
    }

    async fn report(&self, error: &SessionError) {
        if error.is_cancellation() {
            return;
        }
        self.listeners.notify_error(error).await;
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Run a join step unless the join is cancelled first.
async fn step<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(SessionError::Join(JoinFailure::Cancelled)),
        result = fut => result?,
    };
    checkpoint(cancel)?;
    Ok(result)
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), SessionError> {
    if cancel.is_cancelled() {
        Err(SessionError::Join(JoinFailure::Cancelled))
    } else {
        Ok(())
    }
}
