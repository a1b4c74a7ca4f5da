//! Transport client wrapper.
//!
//! [`MediaTransport`] is the seam to the external real-time media SDK. The
//! SDK reports raw [`SdkError`]s and knows nothing about session policy.
//! [`TransportClient`] wraps it, enforces call ordering
//! (initialize → set role → join → publish/subscribe → leave) and
//! normalizes every failure into a [`SessionError`].
//!
//! Presence events are delivered as typed [`TransportEvent`]s on a single
//! channel created with the client, so events for one participant arrive in
//! emission order.

use crate::config::duration_ms;
use crate::credentials::SessionCredential;
use crate::errors::{JoinFailure, SdkError, SessionError};
use common::types::{MediaKind, ParticipantId, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Transport client operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    /// Broadcast: hosts publish, audience only receives.
    Live,
    /// Communication: every participant may publish.
    Rtc,
}

/// Preferred video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp8,
    H264,
}

/// Options used when creating the transport client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    pub mode: ClientMode,
    pub codec: VideoCodec,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            mode: ClientMode::Live,
            codec: VideoCodec::Vp8,
        }
    }
}

/// Opaque handle to a captured or decoded media stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaHandle {
    /// SDK-assigned stream identifier.
    pub id: String,
    /// Media carried by the stream.
    pub kind: MediaKind,
}

impl MediaHandle {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Remote presence event emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A remote participant started publishing one media kind.
    Published {
        participant_id: ParticipantId,
        kind: MediaKind,
    },
    /// A remote participant stopped publishing one media kind.
    Unpublished {
        participant_id: ParticipantId,
        kind: MediaKind,
    },
    /// A remote participant left the channel.
    Left { participant_id: ParticipantId },
}

impl TransportEvent {
    /// Participant the event is about.
    #[must_use]
    pub fn participant_id(&self) -> &ParticipantId {
        match self {
            TransportEvent::Published { participant_id, .. }
            | TransportEvent::Unpublished { participant_id, .. }
            | TransportEvent::Left { participant_id } => participant_id,
        }
    }

    /// Bounded label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            TransportEvent::Published { .. } => "published",
            TransportEvent::Unpublished { .. } => "unpublished",
            TransportEvent::Left { .. } => "left",
        }
    }
}

/// Receiving side of the transport event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// External real-time media SDK (enables mocking).
#[async_trait::async_trait]
pub trait MediaTransport: Send + Sync {
    /// Create the SDK client and return its event channel.
    fn create_client(&self, options: &ClientOptions) -> Result<EventReceiver, SdkError>;

    /// Set the client role for the upcoming join.
    async fn set_client_role(&self, role: Role) -> Result<(), SdkError>;

    /// Join the channel named in the credential.
    async fn join(&self, credential: &SessionCredential) -> Result<(), SdkError>;

    /// Publish local tracks.
    async fn publish(&self, tracks: &[MediaHandle]) -> Result<(), SdkError>;

    /// Subscribe to one media kind of a remote participant.
    async fn subscribe(
        &self,
        participant_id: &ParticipantId,
        kind: MediaKind,
    ) -> Result<MediaHandle, SdkError>;

    /// Leave the channel.
    async fn leave(&self) -> Result<(), SdkError>;

    /// Free the SDK client; its event channel closes.
    fn destroy_client(&self);
}

/// Lifecycle phase of the wrapped SDK client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPhase {
    Uninitialized,
    Initialized,
    Joined,
}

#[derive(Debug)]
struct ClientState {
    phase: TransportPhase,
    role: Option<Role>,
}

/// Policy-enforcing wrapper over a [`MediaTransport`].
pub struct TransportClient {
    sdk: Arc<dyn MediaTransport>,
    state: Mutex<ClientState>,
    join_timeout: Duration,
}

impl TransportClient {
    #[must_use]
    pub fn new(sdk: Arc<dyn MediaTransport>, join_timeout: Duration) -> Self {
        Self {
            sdk,
            state: Mutex::new(ClientState {
                phase: TransportPhase::Uninitialized,
                role: None,
            }),
            join_timeout,
        }
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> TransportPhase {
        self.state.lock().await.phase
    }

    /// Role set for the current client, if any.
    pub async fn role(&self) -> Option<Role> {
        self.state.lock().await.role
    }

    /// Create the SDK client.
    ///
    /// # Errors
    ///
    /// `TransportInit` if a client already exists or the SDK refuses.
    pub async fn initialize(&self, options: &ClientOptions) -> Result<EventReceiver, SessionError> {
        let mut state = self.state.lock().await;
        if state.phase != TransportPhase::Uninitialized {
            return Err(SessionError::TransportInit(
                "transport already initialized; leave before initializing again".into(),
            ));
        }

        let events = self
            .sdk
            .create_client(options)
            .map_err(|e| SessionError::TransportInit(e.to_string()))?;

        state.phase = TransportPhase::Initialized;
        state.role = None;
        debug!(target: "bc.transport", mode = ?options.mode, codec = ?options.codec, "Transport client created");
        Ok(events)
    }

    /// Set the role used for the next join.
    ///
    /// # Errors
    ///
    /// `InvalidState` if not initialized or already joined.
    pub async fn set_role(&self, role: Role) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        match state.phase {
            TransportPhase::Uninitialized => {
                return Err(SessionError::InvalidState(
                    "set_role requires an initialized transport".into(),
                ))
            }
            TransportPhase::Joined => {
                return Err(SessionError::InvalidState(
                    "role cannot change while joined".into(),
                ))
            }
            TransportPhase::Initialized => {}
        }

        self.sdk
            .set_client_role(role)
            .await
            .map_err(|e| SessionError::Join(join_failure(e)))?;
        state.role = Some(role);
        Ok(())
    }

    /// Join the channel.
    ///
    /// # Errors
    ///
    /// `Join` on rejection, network failure or timeout; `InvalidState` if
    /// the role was not set first.
    #[instrument(skip_all, fields(channel = %credential.channel, role = %credential.role))]
    pub async fn join(&self, credential: &SessionCredential) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if state.phase != TransportPhase::Initialized {
            return Err(SessionError::InvalidState(format!(
                "join requires an initialized, not yet joined transport (phase {:?})",
                state.phase
            )));
        }
        match state.role {
            Some(role) if role == credential.role => {}
            Some(role) => {
                return Err(SessionError::InvalidState(format!(
                    "credential issued for {} but role is {role}",
                    credential.role
                )))
            }
            None => {
                return Err(SessionError::InvalidState(
                    "set_role must precede join".into(),
                ))
            }
        }

        match tokio::time::timeout(self.join_timeout, self.sdk.join(credential)).await {
            Ok(Ok(())) => {
                state.phase = TransportPhase::Joined;
                info!(
                    target: "bc.transport",
                    participant_id = %credential.participant_id,
                    "Joined channel"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(target: "bc.transport", error = %e, "Transport join failed");
                Err(SessionError::Join(join_failure(e)))
            }
            Err(_) => {
                let ms = duration_ms(self.join_timeout);
                warn!(target: "bc.transport", timeout_ms = ms, "Transport join timed out");
                Err(SessionError::Join(JoinFailure::Timeout(ms)))
            }
        }
    }

    /// Publish local tracks.
    ///
    /// # Errors
    ///
    /// `Publish` if no tracks are given, the role is not Host, or the SDK
    /// rejects; `InvalidState` if not joined.
    pub async fn publish(&self, tracks: &[MediaHandle]) -> Result<(), SessionError> {
        let state = self.state.lock().await;
        if state.phase != TransportPhase::Joined {
            return Err(SessionError::InvalidState("publish requires a joined transport".into()));
        }
        if !state.role.is_some_and(Role::can_publish) {
            return Err(SessionError::Publish(
                "only the host role may publish".into(),
            ));
        }
        if tracks.is_empty() {
            return Err(SessionError::Publish("no local tracks to publish".into()));
        }

        self.sdk
            .publish(tracks)
            .await
            .map_err(|e| SessionError::Publish(e.to_string()))?;
        debug!(target: "bc.transport", tracks = tracks.len(), "Local tracks published");
        Ok(())
    }

    /// Subscribe to one media kind of a remote participant.
    ///
    /// Bounded by the join timeout.
    ///
    /// # Errors
    ///
    /// `ParticipantSubscribe` for this participant only.
    pub async fn subscribe(
        &self,
        participant_id: &ParticipantId,
        kind: MediaKind,
    ) -> Result<MediaHandle, SessionError> {
        let subscribe_error = |reason: String| SessionError::ParticipantSubscribe {
            participant_id: participant_id.clone(),
            kind,
            reason,
        };

        if self.phase().await != TransportPhase::Joined {
            return Err(subscribe_error("transport not joined".into()));
        }

        match tokio::time::timeout(self.join_timeout, self.sdk.subscribe(participant_id, kind)).await
        {
            Ok(result) => result.map_err(|e| subscribe_error(e.to_string())),
            Err(_) => Err(subscribe_error(format!(
                "timed out after {}ms",
                duration_ms(self.join_timeout)
            ))),
        }
    }

    /// Leave the channel and free the client.
    ///
    /// Never fails: SDK errors are logged, local state is always reset.
    pub async fn leave(&self) {
        let mut state = self.state.lock().await;
        if state.phase == TransportPhase::Joined {
            match self.sdk.leave().await {
                Ok(()) => info!(target: "bc.transport", "Left channel"),
                Err(e) => warn!(
                    target: "bc.transport",
                    error = %e,
                    "Transport leave failed, continuing local cleanup"
                ),
            }
        }
        self.reset(&mut state);
    }

    /// Free the client without notifying the remote side.
    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        self.reset(&mut state);
    }

    fn reset(&self, state: &mut ClientState) {
        if state.phase != TransportPhase::Uninitialized {
            self.sdk.destroy_client();
        }
        state.phase = TransportPhase::Uninitialized;
        state.role = None;
    }
}

fn join_failure(e: SdkError) -> JoinFailure {
    match e {
        SdkError::AuthRejected(reason) => JoinFailure::Rejected(reason),
        other => JoinFailure::Network(other.to_string()),
    }
}
