//! Integration tests for the session lifecycle.
//!
//! Drives the orchestrator through join, leave, rollback and cancellation
//! against the mock SDK, devices, surface and credential provider.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use bc_test_utils::*;
use broadcast_client::errors::{CredentialError, DeviceError, JoinFailure, SdkError};
use broadcast_client::{SessionError, SessionState};
use common::types::{MediaKind, Role};

// ============================================================================
// Join / Leave
// ============================================================================

#[tokio::test]
async fn test_host_join_publishes_and_previews() {
    let session = TestSession::new();

    session.orchestrator.join(Role::Host).await.unwrap();

    assert_eq!(session.orchestrator.state(), SessionState::Joined);
    assert_eq!(session.devices.open_count(), 2);

    let published: Vec<MediaKind> = session.transport.published().iter().map(|h| h.kind).collect();
    assert_eq!(published, vec![MediaKind::Audio, MediaKind::Video]);
    assert_eq!(session.surface.attached(TEST_PREVIEW_SURFACE), vec![MediaKind::Video]);

    let media = session.orchestrator.local_media_state().await;
    assert!(media.has_audio && media.has_video);
    assert!(!media.muted && !media.video_suspended);
}

#[tokio::test]
async fn test_sdk_call_order_for_host_join() {
    let session = TestSession::new();

    session.orchestrator.join(Role::Host).await.unwrap();

    let calls = session.transport.calls();
    assert!(matches!(calls.first(), Some(TransportCall::CreateClient(_))));
    assert_eq!(calls.get(1), Some(&TransportCall::SetRole(Role::Host)));
    assert_eq!(calls.get(2), Some(&TransportCall::Join(Role::Host)));
    assert!(matches!(calls.get(3), Some(TransportCall::Publish(tracks)) if tracks.len() == 2));
}

#[tokio::test]
async fn test_audience_join_acquires_no_tracks() {
    let session = TestSession::new();

    session.orchestrator.join(Role::Audience).await.unwrap();

    assert_eq!(session.orchestrator.state(), SessionState::Joined);
    assert!(session.devices.opened().is_empty());
    assert!(session.transport.published().is_empty());
    assert_eq!(
        session.orchestrator.local_media_state().await,
        broadcast_client::media::LocalMediaState::default()
    );
}

#[tokio::test]
async fn test_join_then_leave_returns_to_idle_with_nothing_held() {
    let session = TestSession::new();

    session.orchestrator.join(Role::Host).await.unwrap();
    session.orchestrator.leave().await;

    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert_eq!(session.devices.open_count(), 0);
    assert_eq!(session.transport.leave_count(), 1);
    assert!(!session.transport.has_client());
    assert!(session.surface.attached(TEST_PREVIEW_SURFACE).is_empty());
    assert_eq!(session.credentials.invalidations(), 1);
    assert!(!session.credentials.is_cached());
}

#[tokio::test]
async fn test_leave_twice_equals_leave_once() {
    let session = TestSession::new();

    session.orchestrator.join(Role::Audience).await.unwrap();
    session.orchestrator.leave().await;
    session.orchestrator.leave().await;

    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert_eq!(session.transport.leave_count(), 1);
    assert_eq!(session.transport.destroy_count(), 1);
    assert_eq!(session.credentials.invalidations(), 1);
}

#[tokio::test]
async fn test_leave_while_idle_is_noop() {
    let session = TestSession::new();

    session.orchestrator.leave().await;

    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert!(session.transport.calls().is_empty());
    assert_eq!(session.credentials.invalidations(), 0);
}

#[tokio::test]
async fn test_leave_succeeds_when_sdk_leave_fails() {
    let session = TestSession::builder()
        .transport(MockTransport::new().with_leave_failure(SdkError::Network("reset".into())))
        .build();

    session.orchestrator.join(Role::Host).await.unwrap();
    session.orchestrator.leave().await;

    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert_eq!(session.devices.open_count(), 0);
    assert_eq!(session.transport.destroy_count(), 1);
}

#[tokio::test]
async fn test_rejoin_after_leave() {
    let session = TestSession::new();

    session.orchestrator.join(Role::Host).await.unwrap();
    session.orchestrator.leave().await;
    session.orchestrator.join(Role::Audience).await.unwrap();

    assert_eq!(session.orchestrator.state(), SessionState::Joined);
    assert_eq!(session.transport.join_count(), 2);
    assert_eq!(session.credentials.backend_fetches(), 2);
}

#[tokio::test]
async fn test_state_watch_observes_transitions() {
    let session = TestSession::new();
    let mut rx = session.orchestrator.watch_state();

    session.orchestrator.join(Role::Audience).await.unwrap();
    assert_eq!(*rx.borrow_and_update(), SessionState::Joined);

    session.orchestrator.leave().await;
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), SessionState::Idle);
}

// ============================================================================
// Guards
// ============================================================================

#[tokio::test]
async fn test_join_while_joined_is_invalid_state() {
    let session = TestSession::new();
    let mut errors = session.errors().await;

    session.orchestrator.join(Role::Audience).await.unwrap();
    let err = session.orchestrator.join(Role::Host).await.unwrap_err();

    assert!(matches!(err, SessionError::InvalidState(_)));
    assert_eq!(session.orchestrator.state(), SessionState::Joined);
    assert_eq!(session.transport.join_count(), 1);
    assert!(matches!(next_within(&mut errors).await, SessionError::InvalidState(_)));
}

#[tokio::test]
async fn test_join_while_joining_is_invalid_state() {
    let session = TestSession::builder()
        .transport(MockTransport::new().with_held_join())
        .build();

    let orchestrator = Arc::clone(&session.orchestrator);
    let first = tokio::spawn(async move { orchestrator.join(Role::Audience).await });
    session.transport.join_started().await;

    let err = session.orchestrator.join(Role::Audience).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));

    session.transport.release_join();
    first.await.unwrap().unwrap();
    assert_eq!(session.orchestrator.state(), SessionState::Joined);
}

// ============================================================================
// Rollback
// ============================================================================

#[tokio::test]
async fn test_video_device_failure_rolls_back_host_join() {
    let session = TestSession::builder()
        .devices(
            MockCaptureDevices::new()
                .with_failure(MediaKind::Video, DeviceError::Busy(MediaKind::Video)),
        )
        .build();
    let mut errors = session.errors().await;

    let err = session.orchestrator.join(Role::Host).await.unwrap_err();

    assert!(matches!(err, SessionError::DeviceAcquisition(DeviceError::Busy(MediaKind::Video))));
    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert_eq!(session.transport.leave_count(), 1);
    assert!(!session.transport.has_client());
    assert_eq!(session.devices.open_count(), 0);
    let audio = session.devices.latest(MediaKind::Audio).unwrap();
    assert!(audio.is_closed());
    assert!(session.transport.published().is_empty());
    // Not auth-related: credential stays cached
    assert_eq!(session.credentials.invalidations(), 0);
    assert!(session.credentials.is_cached());

    assert!(matches!(next_within(&mut errors).await, SessionError::DeviceAcquisition(_)));
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_publish_failure_rolls_back() {
    let session = TestSession::builder()
        .transport(MockTransport::new().with_publish_failure(SdkError::Other("codec".into())))
        .build();

    let err = session.orchestrator.join(Role::Host).await.unwrap_err();

    assert!(matches!(err, SessionError::Publish(_)));
    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert_eq!(session.devices.open_count(), 0);
    assert_eq!(session.devices.opened().len(), 2);
    assert_eq!(session.transport.leave_count(), 1);
}

#[tokio::test]
async fn test_credential_failure_never_touches_transport() {
    let session = TestSession::builder()
        .credentials(
            MockCredentialProvider::new()
                .with_failure(CredentialError::HttpError("connection refused".into())),
        )
        .build();
    let mut errors = session.errors().await;

    let err = session.orchestrator.join(Role::Host).await.unwrap_err();

    assert!(matches!(err, SessionError::CredentialFetch(CredentialError::HttpError(_))));
    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert!(session.transport.calls().is_empty());
    assert!(session.devices.opened().is_empty());
    assert_eq!(session.credentials.invalidations(), 0);
    assert!(matches!(next_within(&mut errors).await, SessionError::CredentialFetch(_)));
}

#[tokio::test]
async fn test_transport_init_failure_rolls_back() {
    let session = TestSession::builder()
        .transport(MockTransport::new().with_create_failure(SdkError::Other("no engine".into())))
        .build();

    let err = session.orchestrator.join(Role::Audience).await.unwrap_err();

    assert!(matches!(err, SessionError::TransportInit(_)));
    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert_eq!(session.transport.join_count(), 0);
}

#[tokio::test]
async fn test_auth_rejected_join_invalidates_credential() {
    let session = TestSession::builder()
        .transport(
            MockTransport::new().with_join_failure(SdkError::AuthRejected("token expired".into())),
        )
        .build();

    let err = session.orchestrator.join(Role::Host).await.unwrap_err();

    assert!(matches!(err, SessionError::Join(JoinFailure::Rejected(_))));
    assert!(err.is_auth_related());
    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert_eq!(session.credentials.invalidations(), 1);
    assert!(!session.credentials.is_cached());
    // Join never succeeded, so no remote leave
    assert_eq!(session.transport.leave_count(), 0);
    assert_eq!(session.transport.destroy_count(), 1);
}

#[tokio::test]
async fn test_network_join_failure_keeps_credential() {
    let session = TestSession::builder()
        .transport(MockTransport::new().with_join_failure(SdkError::Network("unreachable".into())))
        .build();

    let err = session.orchestrator.join(Role::Audience).await.unwrap_err();

    assert!(matches!(err, SessionError::Join(JoinFailure::Network(_))));
    assert_eq!(session.credentials.invalidations(), 0);
    assert!(session.credentials.is_cached());

    // Retry reuses the cached credential
    let _ = session.orchestrator.join(Role::Audience).await;
    assert_eq!(session.credentials.backend_fetches(), 1);
}

#[tokio::test]
async fn test_auth_rejected_credential_fetch_invalidates() {
    let session = TestSession::builder()
        .credentials(
            MockCredentialProvider::new()
                .with_failure(CredentialError::AuthenticationRejected("Status 401".into())),
        )
        .build();

    let err = session.orchestrator.join(Role::Host).await.unwrap_err();

    assert!(err.is_auth_related());
    assert_eq!(session.credentials.invalidations(), 1);
}

#[tokio::test]
async fn test_join_timeout_rolls_back() {
    let session = TestSession::builder()
        .config(test_config_with(&[("BC_JOIN_TIMEOUT_MS", "50")]))
        .transport(MockTransport::new().with_held_join())
        .build();

    let err = session.orchestrator.join(Role::Audience).await.unwrap_err();

    assert!(matches!(err, SessionError::Join(JoinFailure::Timeout(50))));
    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert!(!session.transport.has_client());
}

#[tokio::test]
async fn test_credential_timeout_rolls_back() {
    let session = TestSession::builder()
        .config(test_config_with(&[("BC_CREDENTIAL_TIMEOUT_MS", "50")]))
        .credentials(MockCredentialProvider::new().with_delay(Duration::from_secs(5)))
        .build();

    let err = session.orchestrator.join(Role::Audience).await.unwrap_err();

    assert!(matches!(err, SessionError::CredentialFetch(CredentialError::Timeout(50))));
    assert_eq!(session.orchestrator.state(), SessionState::Idle);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_leave_during_join_cancels_and_ends_idle() {
    let session = TestSession::builder()
        .transport(MockTransport::new().with_held_join())
        .build();
    let mut errors = session.errors().await;

    let orchestrator = Arc::clone(&session.orchestrator);
    let join = tokio::spawn(async move { orchestrator.join(Role::Host).await });
    session.transport.join_started().await;
    assert_eq!(session.orchestrator.state(), SessionState::Joining);

    session.orchestrator.leave().await;
    assert_eq!(session.orchestrator.state(), SessionState::Idle);

    let err = join.await.unwrap().unwrap_err();
    assert!(err.is_cancellation());
    assert!(session.devices.opened().is_empty());
    assert!(!session.transport.has_client());
    assert_eq!(session.credentials.invalidations(), 1);
    // Cancellation is not reported as an error
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_leave_during_credential_fetch_cancels() {
    let session = TestSession::builder()
        .credentials(MockCredentialProvider::new().with_delay(Duration::from_millis(500)))
        .build();

    let orchestrator = Arc::clone(&session.orchestrator);
    let join = tokio::spawn(async move { orchestrator.join(Role::Audience).await });

    let mut state = session.orchestrator.watch_state();
    state
        .wait_for(|s| *s == SessionState::Joining)
        .await
        .unwrap();
    session.orchestrator.leave().await;

    let err = join.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Join(JoinFailure::Cancelled)));
    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert!(session.transport.calls().is_empty());
}

#[tokio::test]
async fn test_leave_during_publish_leaves_joined_channel() {
    let session = TestSession::builder()
        .transport(MockTransport::new().with_held_publish())
        .build();

    let orchestrator = Arc::clone(&session.orchestrator);
    let join = tokio::spawn(async move { orchestrator.join(Role::Host).await });
    session.transport.publish_started().await;

    session.orchestrator.leave().await;

    let err = join.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Join(JoinFailure::Cancelled)));
    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    // The transport join had completed, so the channel is left, not just torn down
    assert_eq!(session.transport.leave_count(), 1);
    assert_eq!(session.transport.destroy_count(), 1);
    assert_eq!(session.devices.opened().len(), 2);
    assert!(session.devices.opened().iter().all(|track| track.is_closed()));
    assert_eq!(session.credentials.invalidations(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_leave_during_preview_attach_cancels_join() {
    let session = TestSession::builder()
        .surface(
            RecordingSurface::new()
                .with_surface(TEST_PREVIEW_SURFACE)
                .with_attach_gate(),
        )
        .build();

    let orchestrator = Arc::clone(&session.orchestrator);
    let join = tokio::spawn(async move { orchestrator.join(Role::Host).await });
    session.surface.attach_started().await;

    // Every join step is done; only the final transition can see the leave
    let orchestrator = Arc::clone(&session.orchestrator);
    let leave = tokio::spawn(async move { orchestrator.leave().await });
    let mut state = session.orchestrator.watch_state();
    state
        .wait_for(|s| *s == SessionState::Leaving)
        .await
        .unwrap();
    session.surface.release_attach();

    let err = join.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Join(JoinFailure::Cancelled)));
    tokio::time::timeout(Duration::from_secs(1), leave)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert_eq!(session.transport.leave_count(), 1);
    assert!(session.devices.opened().iter().all(|track| track.is_closed()));
    assert!(session.surface.attached(TEST_PREVIEW_SURFACE).is_empty());
    assert_eq!(session.credentials.invalidations(), 1);
}

// ============================================================================
// Toggles
// ============================================================================

#[tokio::test]
async fn test_toggle_mute_twice_restores_state() {
    let session = TestSession::new();
    session.orchestrator.join(Role::Host).await.unwrap();
    let audio = session.devices.latest(MediaKind::Audio).unwrap();

    assert!(session.orchestrator.toggle_mute().await.unwrap());
    assert!(!audio.is_enabled());
    assert!(session.orchestrator.local_media_state().await.muted);

    assert!(!session.orchestrator.toggle_mute().await.unwrap());
    assert!(audio.is_enabled());
    assert!(!session.orchestrator.local_media_state().await.muted);
}

#[tokio::test]
async fn test_toggle_video_twice_restores_state() {
    let session = TestSession::new();
    session.orchestrator.join(Role::Host).await.unwrap();
    let video = session.devices.latest(MediaKind::Video).unwrap();

    assert!(session.orchestrator.toggle_video().await.unwrap());
    assert!(!video.is_enabled());
    assert!(!session.orchestrator.toggle_video().await.unwrap());
    assert!(video.is_enabled());
}

#[tokio::test]
async fn test_toggle_outside_joined_is_invalid_state() {
    let session = TestSession::new();
    let mut errors = session.errors().await;

    let err = session.orchestrator.toggle_mute().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));
    let err = session.orchestrator.toggle_video().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));

    assert!(matches!(next_within(&mut errors).await, SessionError::InvalidState(_)));
    assert!(matches!(next_within(&mut errors).await, SessionError::InvalidState(_)));
}

#[tokio::test]
async fn test_toggle_as_audience_is_invalid_state() {
    let session = TestSession::new();
    session.orchestrator.join(Role::Audience).await.unwrap();

    let err = session.orchestrator.toggle_mute().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));
    let err = session.orchestrator.toggle_video().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));
    assert_eq!(session.orchestrator.state(), SessionState::Joined);
}

#[tokio::test]
async fn test_mute_resets_after_rejoin() {
    let session = TestSession::new();
    session.orchestrator.join(Role::Host).await.unwrap();
    session.orchestrator.toggle_mute().await.unwrap();
    session.orchestrator.leave().await;

    session.orchestrator.join(Role::Host).await.unwrap();

    assert!(!session.orchestrator.local_media_state().await.muted);
    assert!(session.devices.latest(MediaKind::Audio).unwrap().is_enabled());
}

#[tokio::test]
async fn test_missing_preview_target_does_not_fail_join() {
    let session = TestSession::builder()
        .surface(RecordingSurface::new())
        .build();

    session.orchestrator.join(Role::Host).await.unwrap();

    assert_eq!(session.orchestrator.state(), SessionState::Joined);
    assert!(session.surface.attached(TEST_PREVIEW_SURFACE).is_empty());
}
