//! Broadcast client error types.
//!
//! Every component normalizes its failures into [`SessionError`] before they
//! cross an awaited boundary. Component-level errors (`CredentialError`,
//! `SdkError`, `DeviceError`, `RenderError`) carry the raw cause and are
//! wrapped by the matching taxonomy variant.

use common::types::{MediaKind, ParticipantId};
use thiserror::Error;

/// Top-level session error surfaced to callers of the orchestrator.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Credential backend unreachable, rejected the request, or timed out.
    #[error("Credential fetch failed: {0}")]
    CredentialFetch(#[from] CredentialError),

    /// Transport client could not be created.
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    /// Joining the channel failed or was cancelled.
    #[error("Join failed: {0}")]
    Join(JoinFailure),

    /// Capture device busy, denied, or missing.
    #[error("Device acquisition failed: {0}")]
    DeviceAcquisition(#[from] DeviceError),

    /// Publishing local tracks failed.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Subscribing to one remote participant failed (recovered locally).
    #[error("Subscribe to participant {participant_id} ({kind}) failed: {reason}")]
    ParticipantSubscribe {
        participant_id: ParticipantId,
        kind: MediaKind,
        reason: String,
    },

    /// Operation not permitted in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Stable, bounded error classification for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CredentialFetch,
    TransportInit,
    Join,
    DeviceAcquisition,
    Publish,
    ParticipantSubscribe,
    InvalidState,
}

impl ErrorKind {
    /// Label value for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::CredentialFetch => "credential_fetch",
            ErrorKind::TransportInit => "transport_init",
            ErrorKind::Join => "join",
            ErrorKind::DeviceAcquisition => "device_acquisition",
            ErrorKind::Publish => "publish",
            ErrorKind::ParticipantSubscribe => "participant_subscribe",
            ErrorKind::InvalidState => "invalid_state",
        }
    }
}

impl SessionError {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::CredentialFetch(_) => ErrorKind::CredentialFetch,
            SessionError::TransportInit(_) => ErrorKind::TransportInit,
            SessionError::Join(_) => ErrorKind::Join,
            SessionError::DeviceAcquisition(_) => ErrorKind::DeviceAcquisition,
            SessionError::Publish(_) => ErrorKind::Publish,
            SessionError::ParticipantSubscribe { .. } => ErrorKind::ParticipantSubscribe,
            SessionError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// Whether the failure means the cached credential can no longer be trusted.
    #[must_use]
    pub fn is_auth_related(&self) -> bool {
        match self {
            SessionError::CredentialFetch(e) => {
                matches!(e, CredentialError::AuthenticationRejected(_))
            }
            SessionError::Join(JoinFailure::Rejected(_)) => true,
            _ => false,
        }
    }

    /// Whether this error reports a join abandoned because of a leave request.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SessionError::Join(JoinFailure::Cancelled))
    }

    /// Returns a user-safe message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::CredentialFetch(CredentialError::AuthenticationRejected(_)) => {
                "You are not allowed to join this session".to_string()
            }
            SessionError::CredentialFetch(_) => {
                "Could not reach the session service, please try again".to_string()
            }
            SessionError::TransportInit(_) | SessionError::Publish(_) => {
                "An internal error occurred".to_string()
            }
            SessionError::Join(JoinFailure::Rejected(_)) => {
                "Your session access has expired, please rejoin".to_string()
            }
            SessionError::Join(JoinFailure::Cancelled) => "Join cancelled".to_string(),
            SessionError::Join(_) => "Could not join the session, please try again".to_string(),
            SessionError::DeviceAcquisition(e) => e.client_message().to_string(),
            SessionError::ParticipantSubscribe { .. } => {
                "A participant's media is unavailable".to_string()
            }
            SessionError::InvalidState(_) => "That action is not available right now".to_string(),
        }
    }
}

/// Why a transport join did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinFailure {
    /// Transport rejected the credential.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Network failure while joining.
    #[error("network: {0}")]
    Network(String),

    /// Join did not complete within the configured timeout.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Join abandoned because leave was requested.
    #[error("cancelled by leave")]
    Cancelled,
}

/// Errors from the credential backend.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// HTTP transport failure (connect, TLS, read).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Backend rejected the participant (401, 403).
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Backend response could not be decoded.
    #[error("Invalid credential response: {0}")]
    InvalidResponse(String),

    /// Request exceeded the configured timeout.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Provider misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Raw error reported by the transport SDK.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    /// Credential refused by the media service.
    #[error("auth rejected: {0}")]
    AuthRejected(String),

    /// Network or service failure.
    #[error("network: {0}")]
    Network(String),

    /// Operation invalid for the SDK's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Errors from local capture devices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Device in use by another application.
    #[error("{0} device busy")]
    Busy(MediaKind),

    /// User or platform denied access.
    #[error("{0} permission denied")]
    PermissionDenied(MediaKind),

    /// No device of this kind present.
    #[error("no {0} device found")]
    NotFound(MediaKind),

    /// Device failed after acquisition.
    #[error("{kind} device failure: {reason}")]
    Failed { kind: MediaKind, reason: String },
}

impl DeviceError {
    /// Returns a user-safe description.
    #[must_use]
    pub fn client_message(&self) -> &'static str {
        match self {
            DeviceError::Busy(_) => "Your camera or microphone is in use by another application",
            DeviceError::PermissionDenied(_) => "Camera or microphone access was denied",
            DeviceError::NotFound(_) => "No camera or microphone was found",
            DeviceError::Failed { .. } => "Your camera or microphone stopped working",
        }
    }
}

/// Errors from the render surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Surface ID does not resolve to a render target.
    #[error("unknown surface: {0}")]
    UnknownSurface(String),

    /// Surface refused the operation.
    #[error("render failure: {0}")]
    Failed(String),
}
