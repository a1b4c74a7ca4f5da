//! Local capture track management.
//!
//! [`LocalMediaController`] exclusively owns the [`LocalTrackSet`]. Tracks
//! are opened through the [`CaptureDevices`] seam, toggled in place for
//! mute/video-off, and closed on release.

use crate::errors::{DeviceError, SessionError};
use crate::render::SharedSurface;
use crate::transport::MediaHandle;
use common::types::{MediaKind, SurfaceId};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A local capture track (microphone or camera).
#[async_trait::async_trait]
pub trait LocalTrack: Send + Sync {
    fn kind(&self) -> MediaKind;

    /// Handle used to publish and render this track.
    fn handle(&self) -> MediaHandle;

    fn is_enabled(&self) -> bool;

    /// Enable or disable capture without closing the device.
    async fn set_enabled(&self, enabled: bool) -> Result<(), DeviceError>;

    /// Stop capture and free the device.
    fn close(&self);
}

/// Platform capture devices (enables mocking).
#[async_trait::async_trait]
pub trait CaptureDevices: Send + Sync {
    /// Open the default device of `kind`.
    async fn open(&self, kind: MediaKind) -> Result<Box<dyn LocalTrack>, DeviceError>;
}

/// Tracks held by the local participant.
#[derive(Default)]
pub struct LocalTrackSet {
    audio: Option<Box<dyn LocalTrack>>,
    video: Option<Box<dyn LocalTrack>>,
    muted: bool,
    video_suspended: bool,
}

impl LocalTrackSet {
    fn get(&self, kind: MediaKind) -> Option<&dyn LocalTrack> {
        match kind {
            MediaKind::Audio => self.audio.as_deref(),
            MediaKind::Video => self.video.as_deref(),
        }
    }

    fn put(&mut self, track: Box<dyn LocalTrack>) {
        match track.kind() {
            MediaKind::Audio => self.audio = Some(track),
            MediaKind::Video => self.video = Some(track),
        }
    }
}

/// Snapshot of local media for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalMediaState {
    pub has_audio: bool,
    pub has_video: bool,
    pub muted: bool,
    pub video_suspended: bool,
}

/// Owner of the local capture tracks.
pub struct LocalMediaController {
    devices: Arc<dyn CaptureDevices>,
    surface: SharedSurface,
    tracks: LocalTrackSet,
    preview: Option<SurfaceId>,
}

impl LocalMediaController {
    #[must_use]
    pub fn new(devices: Arc<dyn CaptureDevices>, surface: SharedSurface) -> Self {
        Self {
            devices,
            surface,
            tracks: LocalTrackSet::default(),
            preview: None,
        }
    }

    /// Open capture devices for `kinds`.
    ///
    /// Kinds already held are kept. On the first failure every held track is
    /// released before the error is returned.
    ///
    /// # Errors
    ///
    /// `DeviceAcquisition` if any device is busy, denied or missing.
    #[instrument(skip_all, fields(kinds = ?kinds))]
    pub async fn acquire(&mut self, kinds: &[MediaKind]) -> Result<(), SessionError> {
        for &kind in kinds {
            if self.tracks.get(kind).is_some() {
                continue;
            }
            match self.devices.open(kind).await {
                Ok(track) => {
                    debug!(target: "bc.media", kind = %kind, track_id = %track.handle().id, "Local track acquired");
                    self.tracks.put(track);
                }
                Err(e) => {
                    warn!(target: "bc.media", kind = %kind, error = %e, "Device acquisition failed, releasing local tracks");
                    self.release().await;
                    return Err(SessionError::DeviceAcquisition(e));
                }
            }
        }
        Ok(())
    }

    /// Handles of every held track, audio first.
    #[must_use]
    pub fn tracks(&self) -> Vec<MediaHandle> {
        MediaKind::ALL
            .iter()
            .filter_map(|kind| self.tracks.get(*kind).map(|track| track.handle()))
            .collect()
    }

    /// Whether no track is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.audio.is_none() && self.tracks.video.is_none()
    }

    /// Render the local video track on `surface_id`.
    ///
    /// Missing video or an unresolved target is logged and ignored.
    pub async fn attach(&mut self, surface_id: &SurfaceId) {
        let Some(video) = self.tracks.get(MediaKind::Video) else {
            debug!(target: "bc.media", surface = %surface_id, "No local video track to attach");
            return;
        };
        match self.surface.attach(surface_id, &video.handle()).await {
            Ok(()) => {
                debug!(target: "bc.media", surface = %surface_id, "Local preview attached");
                self.preview = Some(surface_id.clone());
            }
            Err(e) => {
                warn!(target: "bc.media", surface = %surface_id, error = %e, "Local preview target unresolved, skipping");
            }
        }
    }

    /// Mute or unmute the microphone.
    ///
    /// # Errors
    ///
    /// `InvalidState` without an audio track; `DeviceAcquisition` if the
    /// device refuses.
    pub async fn set_muted(&mut self, muted: bool) -> Result<(), SessionError> {
        let Some(audio) = self.tracks.get(MediaKind::Audio) else {
            return Err(SessionError::InvalidState("no local audio track".into()));
        };
        audio.set_enabled(!muted).await?;
        self.tracks.muted = muted;
        debug!(target: "bc.media", muted, "Microphone state changed");
        Ok(())
    }

    /// Resume or suspend the camera.
    ///
    /// # Errors
    ///
    /// `InvalidState` without a video track; `DeviceAcquisition` if the
    /// device refuses.
    pub async fn set_video_enabled(&mut self, enabled: bool) -> Result<(), SessionError> {
        let Some(video) = self.tracks.get(MediaKind::Video) else {
            return Err(SessionError::InvalidState("no local video track".into()));
        };
        video.set_enabled(enabled).await?;
        self.tracks.video_suspended = !enabled;
        debug!(target: "bc.media", enabled, "Camera state changed");
        Ok(())
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.tracks.muted
    }

    #[must_use]
    pub fn is_video_suspended(&self) -> bool {
        self.tracks.video_suspended
    }

    #[must_use]
    pub fn state(&self) -> LocalMediaState {
        LocalMediaState {
            has_audio: self.tracks.audio.is_some(),
            has_video: self.tracks.video.is_some(),
            muted: self.tracks.muted,
            video_suspended: self.tracks.video_suspended,
        }
    }

    /// Detach the preview and close every track. Safe to call repeatedly.
    pub async fn release(&mut self) {
        if let Some(preview) = self.preview.take() {
            self.surface.detach(&preview, MediaKind::Video).await;
        }
        for track in [self.tracks.audio.take(), self.tracks.video.take()]
            .into_iter()
            .flatten()
        {
            track.close();
            debug!(target: "bc.media", kind = %track.kind(), "Local track released");
        }
        self.tracks.muted = false;
        self.tracks.video_suspended = false;
    }
}
