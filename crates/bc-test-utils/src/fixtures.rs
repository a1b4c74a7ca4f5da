//! Pre-configured test data and a wired-up session harness.

use crate::mock_credentials::MockCredentialProvider;
use crate::mock_devices::MockCaptureDevices;
use crate::mock_surface::RecordingSurface;
use crate::mock_transport::MockTransport;
use broadcast_client::config::Config;
use broadcast_client::credentials::SessionCredential;
use broadcast_client::errors::SessionError;
use broadcast_client::registry::RemoteParticipant;
use broadcast_client::SessionOrchestrator;
use chrono::Utc;
use common::secret::SecretString;
use common::types::{ChannelName, ParticipantId, Role};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Channel used by every fixture.
pub const TEST_CHANNEL: &str = "taasnet";

/// Local participant ID used by every fixture.
pub const TEST_PARTICIPANT: &str = "1001";

/// Local preview surface registered on the harness surface.
pub const TEST_PREVIEW_SURFACE: &str = "local-video";

/// Environment map for a valid configuration.
#[must_use]
pub fn test_vars() -> HashMap<String, String> {
    HashMap::from([
        (
            "BC_CREDENTIAL_ENDPOINT".to_string(),
            "http://127.0.0.1:9".to_string(),
        ),
        ("BC_CHANNEL".to_string(), TEST_CHANNEL.to_string()),
        ("BC_PARTICIPANT_ID".to_string(), TEST_PARTICIPANT.to_string()),
        ("BC_APP_ID".to_string(), "test-app".to_string()),
        ("BC_CREDENTIAL_TIMEOUT_MS".to_string(), "2000".to_string()),
        ("BC_JOIN_TIMEOUT_MS".to_string(), "2000".to_string()),
        (
            "BC_LOCAL_PREVIEW_SURFACE".to_string(),
            TEST_PREVIEW_SURFACE.to_string(),
        ),
    ])
}

#[must_use]
pub fn test_config() -> Config {
    test_config_with(&[])
}

/// Test configuration with some variables overridden.
#[must_use]
pub fn test_config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars = test_vars();
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    Config::from_vars(&vars).expect("test configuration should be valid")
}

/// Credential for the test channel, valid for an hour.
#[must_use]
pub fn test_credential(role: Role) -> SessionCredential {
    SessionCredential {
        app_id: "test-app".to_string(),
        channel: ChannelName::new(TEST_CHANNEL),
        access_token: SecretString::from("test-access-token"),
        participant_id: ParticipantId::new(TEST_PARTICIPANT),
        role,
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
    }
}

#[must_use]
pub fn participant(id: &str) -> ParticipantId {
    ParticipantId::new(id)
}

/// Orchestrator wired to mocks, with the mocks kept for inspection.
pub struct TestSession {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub transport: Arc<MockTransport>,
    pub devices: Arc<MockCaptureDevices>,
    pub surface: Arc<RecordingSurface>,
    pub credentials: Arc<MockCredentialProvider>,
}

impl TestSession {
    /// Harness where every collaborator succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> TestSessionBuilder {
        TestSessionBuilder::default()
    }

    /// Collect every error passed to `on_error`.
    pub async fn errors(&self) -> mpsc::UnboundedReceiver<SessionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.orchestrator
            .on_error(move |error| {
                let _ = tx.send(error.clone());
            })
            .await;
        rx
    }

    /// Collect every participant snapshot passed to `on_participants_changed`.
    pub async fn participant_updates(&self) -> mpsc::UnboundedReceiver<Vec<RemoteParticipant>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.orchestrator
            .on_participants_changed(move |snapshot| {
                let _ = tx.send(snapshot.to_vec());
            })
            .await;
        rx
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TestSession`].
#[derive(Default)]
pub struct TestSessionBuilder {
    config: Option<Config>,
    transport: Option<MockTransport>,
    devices: Option<MockCaptureDevices>,
    surface: Option<RecordingSurface>,
    credentials: Option<MockCredentialProvider>,
}

impl TestSessionBuilder {
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: MockTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn devices(mut self, devices: MockCaptureDevices) -> Self {
        self.devices = Some(devices);
        self
    }

    #[must_use]
    pub fn surface(mut self, surface: RecordingSurface) -> Self {
        self.surface = Some(surface);
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: MockCredentialProvider) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn build(self) -> TestSession {
        let transport = Arc::new(self.transport.unwrap_or_default());
        let devices = Arc::new(self.devices.unwrap_or_default());
        let surface = Arc::new(
            self.surface
                .unwrap_or_else(|| RecordingSurface::new().with_surface(TEST_PREVIEW_SURFACE)),
        );
        let credentials = Arc::new(self.credentials.unwrap_or_default());

        let orchestrator = Arc::new(SessionOrchestrator::new(
            self.config.unwrap_or_else(test_config),
            credentials.clone(),
            transport.clone(),
            devices.clone(),
            surface.clone(),
        ));

        TestSession {
            orchestrator,
            transport,
            devices,
            surface,
            credentials,
        }
    }
}

/// Receive the next item or fail the test after one second.
pub async fn next_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for update")
        .expect("update channel closed")
}
