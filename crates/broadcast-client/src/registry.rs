//! Remote participant registry.
//!
//! Tracks every subscribed remote participant and keeps one render container
//! per participant in sync with the presence events from the transport.
//!
//! # Invariants
//!
//! - At most one [`RemoteParticipant`] per participant ID; repeated
//!   `Published` events only update media flags
//! - A participant with neither audio nor video is removed with its container
//! - `Left` removes the participant whatever its flags, since per-kind
//!   `Unpublished` events may never arrive after an abrupt disconnect
//! - A subscribe failure affects only the participant it was for

use crate::errors::SessionError;
use crate::observability::metrics;
use crate::render::SharedSurface;
use crate::transport::{TransportClient, TransportEvent};
use common::types::{MediaKind, ParticipantId, SurfaceId};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A subscribed remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub participant_id: ParticipantId,
    pub has_audio: bool,
    pub has_video: bool,
    /// Render container holding this participant's media.
    pub container: SurfaceId,
}

impl RemoteParticipant {
    fn new(participant_id: ParticipantId) -> Self {
        let container = SurfaceId::for_remote(&participant_id);
        Self {
            participant_id,
            has_audio: false,
            has_video: false,
            container,
        }
    }

    fn has(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.has_audio,
            MediaKind::Video => self.has_video,
        }
    }

    fn set(&mut self, kind: MediaKind, value: bool) {
        match kind {
            MediaKind::Audio => self.has_audio = value,
            MediaKind::Video => self.has_video = value,
        }
    }

    fn has_any(&self) -> bool {
        self.has_audio || self.has_video
    }
}

/// Registry of remote participants keyed by participant ID.
pub struct RemoteParticipantRegistry {
    surface: SharedSurface,
    participants: BTreeMap<ParticipantId, RemoteParticipant>,
}

impl RemoteParticipantRegistry {
    #[must_use]
    pub fn new(surface: SharedSurface) -> Self {
        Self {
            surface,
            participants: BTreeMap::new(),
        }
    }

    /// Apply one presence event.
    ///
    /// Returns whether the participant set changed.
    ///
    /// # Errors
    ///
    /// `ParticipantSubscribe` when subscribing to the participant failed. The
    /// registry stays consistent and other participants are untouched.
    pub async fn handle_event(
        &mut self,
        event: TransportEvent,
        transport: &TransportClient,
    ) -> Result<bool, SessionError> {
        let changed = match event {
            TransportEvent::Published {
                participant_id,
                kind,
            } => self.on_published(participant_id, kind, transport).await?,
            TransportEvent::Unpublished {
                participant_id,
                kind,
            } => self.on_unpublished(&participant_id, kind).await,
            TransportEvent::Left { participant_id } => self.on_left(&participant_id).await,
        };
        if changed {
            metrics::set_remote_participants_active(self.participants.len());
        }
        Ok(changed)
    }

    async fn on_published(
        &mut self,
        participant_id: ParticipantId,
        kind: MediaKind,
        transport: &TransportClient,
    ) -> Result<bool, SessionError> {
        let created = if let Some(existing) = self.participants.get(&participant_id) {
            if existing.has(kind) {
                debug!(target: "bc.registry", participant_id = %participant_id, kind = %kind, "Duplicate publish ignored");
                return Ok(false);
            }
            false
        } else {
            let participant = RemoteParticipant::new(participant_id.clone());
            if let Err(e) = self.surface.create_container(&participant.container).await {
                warn!(target: "bc.registry", participant_id = %participant_id, error = %e, "Failed to create render container");
            }
            self.participants.insert(participant_id.clone(), participant);
            true
        };

        let handle = match transport.subscribe(&participant_id, kind).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(target: "bc.registry", participant_id = %participant_id, kind = %kind, error = %e, "Subscribe failed, session continues");
                metrics::record_subscribe_failure(kind);
                if created {
                    self.remove(&participant_id).await;
                }
                return Err(e);
            }
        };

        let Some(participant) = self.participants.get_mut(&participant_id) else {
            return Ok(created);
        };
        participant.set(kind, true);
        let container = participant.container.clone();

        if let Err(e) = self.surface.attach(&container, &handle).await {
            warn!(target: "bc.registry", participant_id = %participant_id, kind = %kind, error = %e, "Failed to attach remote media");
        }

        info!(target: "bc.registry", participant_id = %participant_id, kind = %kind, "Subscribed to remote media");
        Ok(true)
    }

    async fn on_unpublished(&mut self, participant_id: &ParticipantId, kind: MediaKind) -> bool {
        let Some(participant) = self.participants.get_mut(participant_id) else {
            debug!(target: "bc.registry", participant_id = %participant_id, kind = %kind, "Unpublish for unknown participant ignored");
            return false;
        };
        if !participant.has(kind) {
            return false;
        }

        participant.set(kind, false);
        let container = participant.container.clone();
        let remaining = participant.has_any();

        self.surface.detach(&container, kind).await;
        if !remaining {
            self.remove(participant_id).await;
        }
        debug!(target: "bc.registry", participant_id = %participant_id, kind = %kind, removed = !remaining, "Remote media unpublished");
        true
    }

    async fn on_left(&mut self, participant_id: &ParticipantId) -> bool {
        let removed = self.remove(participant_id).await;
        if removed {
            info!(target: "bc.registry", participant_id = %participant_id, "Remote participant left");
        }
        removed
    }

    async fn remove(&mut self, participant_id: &ParticipantId) -> bool {
        match self.participants.remove(participant_id) {
            Some(participant) => {
                self.surface.remove_container(&participant.container).await;
                true
            }
            None => false,
        }
    }

    /// Remove every participant and container. Returns how many were removed.
    pub async fn teardown_all(&mut self) -> usize {
        let participants = std::mem::take(&mut self.participants);
        let count = participants.len();
        for participant in participants.into_values() {
            self.surface.remove_container(&participant.container).await;
        }
        if count > 0 {
            debug!(target: "bc.registry", count, "Remote participants torn down");
            metrics::set_remote_participants_active(0);
        }
        count
    }

    #[must_use]
    pub fn get(&self, participant_id: &ParticipantId) -> Option<&RemoteParticipant> {
        self.participants.get(participant_id)
    }

    /// Participants ordered by ID.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RemoteParticipant> {
        self.participants.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
