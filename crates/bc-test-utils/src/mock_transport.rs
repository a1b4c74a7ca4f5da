//! Mock media transport SDK.
//!
//! Records every call, injects failures per operation, and lets tests push
//! presence events into the event channel of the current client.
//!
//! # Example
//!
//! ```rust,ignore
//! use bc_test_utils::MockTransport;
//!
//! let transport = MockTransport::new()
//!     .with_join_failure(SdkError::AuthRejected("expired".into()))
//!     .with_subscribe_failure("peer-7")
//!     .with_stalled_subscribe("peer-9");
//!
//! // After a join, simulate a remote host going live
//! transport.emit(TransportEvent::Published { participant_id, kind });
//! ```

use broadcast_client::credentials::SessionCredential;
use broadcast_client::errors::SdkError;
use broadcast_client::transport::{
    ClientOptions, EventReceiver, MediaHandle, MediaTransport, TransportEvent,
};
use common::types::{MediaKind, ParticipantId, Role};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, Notify};

/// One recorded SDK call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    CreateClient(ClientOptions),
    SetRole(Role),
    Join(Role),
    Publish(Vec<MediaHandle>),
    Subscribe(ParticipantId, MediaKind),
    Leave,
    DestroyClient,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    calls: Vec<TransportCall>,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    create_failure: Option<SdkError>,
    set_role_failure: Option<SdkError>,
    join_failure: Option<SdkError>,
    publish_failure: Option<SdkError>,
    leave_failure: Option<SdkError>,
    subscribe_failures: HashSet<ParticipantId>,
    stalled_subscribes: HashSet<ParticipantId>,
}

/// Mock transport SDK for orchestrator and transport client tests.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Mutex<MockTransportInner>,
    hold_join: bool,
    join_entered: Notify,
    join_release: Notify,
    hold_publish: bool,
    publish_entered: Notify,
    publish_release: Notify,
    stall_entered: Notify,
}

impl MockTransport {
    /// Create a mock where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_create_failure(self, error: SdkError) -> Self {
        self.lock().create_failure = Some(error);
        self
    }

    #[must_use]
    pub fn with_set_role_failure(self, error: SdkError) -> Self {
        self.lock().set_role_failure = Some(error);
        self
    }

    #[must_use]
    pub fn with_join_failure(self, error: SdkError) -> Self {
        self.lock().join_failure = Some(error);
        self
    }

    #[must_use]
    pub fn with_publish_failure(self, error: SdkError) -> Self {
        self.lock().publish_failure = Some(error);
        self
    }

    #[must_use]
    pub fn with_leave_failure(self, error: SdkError) -> Self {
        self.lock().leave_failure = Some(error);
        self
    }

    /// Fail every subscribe to `participant_id`.
    #[must_use]
    pub fn with_subscribe_failure(self, participant_id: impl Into<String>) -> Self {
        self.lock()
            .subscribe_failures
            .insert(ParticipantId::new(participant_id));
        self
    }

    /// Never complete a subscribe to `participant_id`.
    #[must_use]
    pub fn with_stalled_subscribe(self, participant_id: impl Into<String>) -> Self {
        self.lock()
            .stalled_subscribes
            .insert(ParticipantId::new(participant_id));
        self
    }

    /// Wait until a stalled subscribe has started.
    pub async fn stalled_subscribe_started(&self) {
        self.stall_entered.notified().await;
    }

    /// Block `publish` until [`release_publish`](Self::release_publish) is called.
    #[must_use]
    pub fn with_held_publish(mut self) -> Self {
        self.hold_publish = true;
        self
    }

    /// Wait until a `publish` call has started.
    pub async fn publish_started(&self) {
        self.publish_entered.notified().await;
    }

    /// Let a held `publish` complete.
    pub fn release_publish(&self) {
        self.publish_release.notify_one();
    }

    /// Block `join` until [`release_join`](Self::release_join) is called.
    #[must_use]
    pub fn with_held_join(mut self) -> Self {
        self.hold_join = true;
        self
    }

    /// Wait until a `join` call has started.
    pub async fn join_started(&self) {
        self.join_entered.notified().await;
    }

    /// Let a held `join` complete.
    pub fn release_join(&self) {
        self.join_release.notify_one();
    }

    /// Push an event to the current client. Returns false without a client.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.lock().events.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Every call recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    #[must_use]
    pub fn join_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Join(_)))
    }

    #[must_use]
    pub fn leave_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Leave))
    }

    #[must_use]
    pub fn destroy_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::DestroyClient))
    }

    #[must_use]
    pub fn subscribe_count(&self, participant_id: &str) -> usize {
        self.count(|call| {
            matches!(call, TransportCall::Subscribe(id, _) if id.as_str() == participant_id)
        })
    }

    /// Tracks passed to the last publish call.
    #[must_use]
    pub fn published(&self) -> Vec<MediaHandle> {
        self.lock()
            .calls
            .iter()
            .rev()
            .find_map(|call| match call {
                TransportCall::Publish(tracks) => Some(tracks.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Whether a client currently exists.
    #[must_use]
    pub fn has_client(&self) -> bool {
        self.lock().events.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().expect("mock transport lock poisoned")
    }

    fn record(&self, call: TransportCall) {
        self.lock().calls.push(call);
    }
}

#[async_trait::async_trait]
impl MediaTransport for MockTransport {
    fn create_client(&self, options: &ClientOptions) -> Result<EventReceiver, SdkError> {
        let mut inner = self.lock();
        inner.calls.push(TransportCall::CreateClient(*options));
        if let Some(error) = inner.create_failure.clone() {
            return Err(error);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.events = Some(tx);
        Ok(rx)
    }

    async fn set_client_role(&self, role: Role) -> Result<(), SdkError> {
        self.record(TransportCall::SetRole(role));
        match self.lock().set_role_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn join(&self, credential: &SessionCredential) -> Result<(), SdkError> {
        self.record(TransportCall::Join(credential.role));
        self.join_entered.notify_one();
        if self.hold_join {
            self.join_release.notified().await;
        }
        match self.lock().join_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn publish(&self, tracks: &[MediaHandle]) -> Result<(), SdkError> {
        self.record(TransportCall::Publish(tracks.to_vec()));
        self.publish_entered.notify_one();
        if self.hold_publish {
            self.publish_release.notified().await;
        }
        match self.lock().publish_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn subscribe(
        &self,
        participant_id: &ParticipantId,
        kind: MediaKind,
    ) -> Result<MediaHandle, SdkError> {
        let stalled = {
            let mut inner = self.lock();
            inner
                .calls
                .push(TransportCall::Subscribe(participant_id.clone(), kind));
            if inner.subscribe_failures.contains(participant_id) {
                return Err(SdkError::Network(format!(
                    "stream of {participant_id} unavailable"
                )));
            }
            inner.stalled_subscribes.contains(participant_id)
        };
        if stalled {
            self.stall_entered.notify_one();
            std::future::pending::<()>().await;
        }
        Ok(MediaHandle::new(format!("remote-{participant_id}-{kind}"), kind))
    }

    async fn leave(&self) -> Result<(), SdkError> {
        self.record(TransportCall::Leave);
        match self.lock().leave_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn destroy_client(&self) {
        let mut inner = self.lock();
        inner.calls.push(TransportCall::DestroyClient);
        inner.events = None;
    }
}
