//! Integration tests for remote participant handling.
//!
//! Events are pushed through the mock SDK's event channel and observed via
//! `on_participants_changed` snapshots, so they travel the same event pump
//! path as in production.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::time::Duration;

use bc_test_utils::*;
use broadcast_client::registry::{RemoteParticipant, RemoteParticipantRegistry};
use broadcast_client::render::SharedSurface;
use broadcast_client::transport::{ClientOptions, TransportClient, TransportEvent};
use broadcast_client::SessionState;
use common::types::{MediaKind, Role};
use std::sync::Arc;

fn published(id: &str, kind: MediaKind) -> TransportEvent {
    TransportEvent::Published {
        participant_id: participant(id),
        kind,
    }
}

fn unpublished(id: &str, kind: MediaKind) -> TransportEvent {
    TransportEvent::Unpublished {
        participant_id: participant(id),
        kind,
    }
}

fn left(id: &str) -> TransportEvent {
    TransportEvent::Left {
        participant_id: participant(id),
    }
}

fn ids(snapshot: &[RemoteParticipant]) -> Vec<&str> {
    snapshot.iter().map(|p| p.participant_id.as_str()).collect()
}

// ============================================================================
// Through The Orchestrator
// ============================================================================

#[tokio::test]
async fn test_audience_sees_host_with_both_kinds() {
    let session = TestSession::new();
    let mut updates = session.participant_updates().await;
    session.orchestrator.join(Role::Audience).await.unwrap();

    assert!(session.transport.emit(published("host-a", MediaKind::Video)));
    assert!(session.transport.emit(published("host-a", MediaKind::Audio)));

    let first = next_within(&mut updates).await;
    assert_eq!(ids(&first), vec!["host-a"]);
    assert!(first[0].has_video && !first[0].has_audio);

    let second = next_within(&mut updates).await;
    assert_eq!(second.len(), 1);
    assert!(second[0].has_video && second[0].has_audio);

    assert_eq!(session.surface.containers().len(), 1);
    assert!(session.surface.has_container("remote-host-a"));
    let mut attached = session.surface.attached("remote-host-a");
    attached.sort();
    assert_eq!(attached, vec![MediaKind::Audio, MediaKind::Video]);
}

#[tokio::test]
async fn test_repeated_published_yields_one_participant() {
    let session = TestSession::new();
    let mut updates = session.participant_updates().await;
    session.orchestrator.join(Role::Audience).await.unwrap();

    session.transport.emit(published("host-a", MediaKind::Video));
    session.transport.emit(published("host-a", MediaKind::Video));
    session.transport.emit(published("host-a", MediaKind::Video));
    session.transport.emit(published("host-b", MediaKind::Audio));

    let first = next_within(&mut updates).await;
    assert_eq!(ids(&first), vec!["host-a"]);
    // Duplicates produce no update; the next snapshot is host-b arriving
    let second = next_within(&mut updates).await;
    assert_eq!(ids(&second), vec!["host-a", "host-b"]);

    assert_eq!(session.transport.subscribe_count("host-a"), 1);
    assert_eq!(session.orchestrator.participants().len(), 2);
}

#[tokio::test]
async fn test_left_removes_participant_with_media() {
    let session = TestSession::new();
    let mut updates = session.participant_updates().await;
    session.orchestrator.join(Role::Audience).await.unwrap();

    session.transport.emit(published("host-a", MediaKind::Audio));
    session.transport.emit(published("host-a", MediaKind::Video));
    session.transport.emit(left("host-a"));

    next_within(&mut updates).await;
    next_within(&mut updates).await;
    let after_leave = next_within(&mut updates).await;

    assert!(after_leave.is_empty());
    assert!(!session.surface.has_container("remote-host-a"));
    assert_eq!(session.surface.removed().len(), 1);
}

#[tokio::test]
async fn test_unpublish_all_kinds_removes_participant() {
    let session = TestSession::new();
    let mut updates = session.participant_updates().await;
    session.orchestrator.join(Role::Audience).await.unwrap();

    session.transport.emit(published("host-a", MediaKind::Audio));
    session.transport.emit(published("host-a", MediaKind::Video));
    session.transport.emit(unpublished("host-a", MediaKind::Video));
    session.transport.emit(unpublished("host-a", MediaKind::Audio));

    next_within(&mut updates).await;
    next_within(&mut updates).await;

    let audio_only = next_within(&mut updates).await;
    assert_eq!(audio_only.len(), 1);
    assert!(audio_only[0].has_audio && !audio_only[0].has_video);

    let gone = next_within(&mut updates).await;
    assert!(gone.is_empty());
    assert!(session.surface.containers().is_empty());
}

#[tokio::test]
async fn test_subscribe_failure_isolated_to_one_participant() {
    let session = TestSession::builder()
        .transport(MockTransport::new().with_subscribe_failure("broken"))
        .build();
    let mut updates = session.participant_updates().await;
    let mut errors = session.errors().await;
    session.orchestrator.join(Role::Audience).await.unwrap();

    session.transport.emit(published("broken", MediaKind::Video));
    session.transport.emit(published("healthy", MediaKind::Video));

    let snapshot = next_within(&mut updates).await;
    assert_eq!(ids(&snapshot), vec!["healthy"]);

    assert_eq!(session.orchestrator.state(), SessionState::Joined);
    assert!(!session.surface.has_container("remote-broken"));
    assert!(session.surface.has_container("remote-healthy"));
    // Subscribe failures are not surfaced to the error callback
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_leave_tears_down_participants() {
    let session = TestSession::new();
    let mut updates = session.participant_updates().await;
    session.orchestrator.join(Role::Audience).await.unwrap();

    session.transport.emit(published("host-a", MediaKind::Video));
    session.transport.emit(published("host-b", MediaKind::Video));
    next_within(&mut updates).await;
    next_within(&mut updates).await;

    session.orchestrator.leave().await;

    let final_snapshot = next_within(&mut updates).await;
    assert!(final_snapshot.is_empty());
    assert!(session.orchestrator.participants().is_empty());
    assert!(session.surface.containers().is_empty());
}

#[tokio::test]
async fn test_leave_completes_while_subscribe_stalled() {
    let session = TestSession::builder()
        .transport(MockTransport::new().with_stalled_subscribe("frozen"))
        .build();
    session.orchestrator.join(Role::Audience).await.unwrap();

    session.transport.emit(published("frozen", MediaKind::Video));
    tokio::time::timeout(
        Duration::from_secs(1),
        session.transport.stalled_subscribe_started(),
    )
    .await
    .unwrap();
    // Reading the roster does not wait on the in-flight subscribe
    assert!(session.orchestrator.participants().is_empty());

    tokio::time::timeout(Duration::from_secs(1), session.orchestrator.leave())
        .await
        .unwrap();

    assert_eq!(session.orchestrator.state(), SessionState::Idle);
    assert!(session.surface.containers().is_empty());
    assert_eq!(session.transport.leave_count(), 1);

    session.orchestrator.join(Role::Audience).await.unwrap();
    assert_eq!(session.orchestrator.state(), SessionState::Joined);
}

#[tokio::test]
async fn test_stalled_subscribe_times_out_without_blocking_others() {
    let session = TestSession::builder()
        .config(test_config_with(&[("BC_JOIN_TIMEOUT_MS", "100")]))
        .transport(MockTransport::new().with_stalled_subscribe("frozen"))
        .build();
    let mut updates = session.participant_updates().await;
    session.orchestrator.join(Role::Audience).await.unwrap();

    session.transport.emit(published("frozen", MediaKind::Video));
    session.transport.emit(published("healthy", MediaKind::Video));

    let snapshot = next_within(&mut updates).await;
    assert_eq!(ids(&snapshot), vec!["healthy"]);
    assert!(!session.surface.has_container("remote-frozen"));
    assert_eq!(session.orchestrator.state(), SessionState::Joined);
}

#[tokio::test]
async fn test_host_receives_cohost_media() {
    let session = TestSession::new();
    let mut updates = session.participant_updates().await;
    session.orchestrator.join(Role::Host).await.unwrap();

    session.transport.emit(published("cohost", MediaKind::Audio));

    let snapshot = tokio::time::timeout(Duration::from_secs(1), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ids(&snapshot), vec!["cohost"]);
}

// ============================================================================
// Registry Directly
// ============================================================================

async fn joined_transport(mock: Arc<MockTransport>) -> TransportClient {
    let transport = TransportClient::new(mock, Duration::from_secs(1));
    let _events = transport.initialize(&ClientOptions::default()).await.unwrap();
    transport.set_role(Role::Audience).await.unwrap();
    transport
        .join(&test_credential(Role::Audience))
        .await
        .unwrap();
    transport
}

#[tokio::test]
async fn test_registry_reports_changes() {
    let mock = Arc::new(MockTransport::new());
    let transport = joined_transport(mock.clone()).await;
    let surface = Arc::new(RecordingSurface::new());
    let mut registry = RemoteParticipantRegistry::new(SharedSurface::new(surface.clone()));

    assert!(registry
        .handle_event(published("a", MediaKind::Audio), &transport)
        .await
        .unwrap());
    assert!(!registry
        .handle_event(published("a", MediaKind::Audio), &transport)
        .await
        .unwrap());
    assert!(!registry
        .handle_event(left("nobody"), &transport)
        .await
        .unwrap());
    assert!(!registry
        .handle_event(unpublished("a", MediaKind::Video), &transport)
        .await
        .unwrap());

    let participant = registry.get(&participant("a")).unwrap();
    assert!(participant.has_audio && !participant.has_video);
    assert_eq!(participant.container.as_str(), "remote-a");
}

#[tokio::test]
async fn test_registry_subscribe_failure_keeps_existing_media() {
    let mock = Arc::new(MockTransport::new());
    let transport = joined_transport(mock).await;
    let surface = Arc::new(RecordingSurface::new());
    let mut registry = RemoteParticipantRegistry::new(SharedSurface::new(surface.clone()));

    registry
        .handle_event(published("a", MediaKind::Audio), &transport)
        .await
        .unwrap();

    // Transport gone: further subscribes fail, existing participant survives
    transport.leave().await;
    let err = registry
        .handle_event(published("a", MediaKind::Video), &transport)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        broadcast_client::SessionError::ParticipantSubscribe { .. }
    ));
    let participant = registry.get(&participant("a")).unwrap();
    assert!(participant.has_audio && !participant.has_video);
    assert!(surface.has_container("remote-a"));
}

#[tokio::test]
async fn test_registry_teardown_all() {
    let mock = Arc::new(MockTransport::new());
    let transport = joined_transport(mock).await;
    let surface = Arc::new(RecordingSurface::new());
    let mut registry = RemoteParticipantRegistry::new(SharedSurface::new(surface.clone()));

    for id in ["a", "b", "c"] {
        registry
            .handle_event(published(id, MediaKind::Video), &transport)
            .await
            .unwrap();
    }
    assert_eq!(registry.len(), 3);

    assert_eq!(registry.teardown_all().await, 3);
    assert!(registry.is_empty());
    assert!(surface.containers().is_empty());
    assert_eq!(registry.teardown_all().await, 0);
}
