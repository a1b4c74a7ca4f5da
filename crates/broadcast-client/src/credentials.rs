//! Session credential provider.
//!
//! Resolves per-session credentials from the credential backend and caches
//! them in an explicit [`CredentialCache`] owned by the provider instance.
//!
//! # Caching
//!
//! - A cached credential is reused for the same channel and role until it is
//!   invalidated or comes within [`CLOCK_DRIFT_MARGIN_SECS`] of expiry
//! - The orchestrator invalidates on leave and on auth-related join failures
//! - The access token is never logged

use crate::config::{duration_ms, Config};
use crate::errors::CredentialError;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::{ChannelName, ParticipantId, Role};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace, warn};

/// Path of the token endpoint on the credential backend.
pub const TOKEN_PATH: &str = "/generate_token";

/// Default connection timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Credentials this close to expiry are refetched.
pub const CLOCK_DRIFT_MARGIN_SECS: i64 = 30;

// =============================================================================
// Credential Value
// =============================================================================

/// Credential needed to join one channel with one role.
#[derive(Debug, Clone)]
pub struct SessionCredential {
    /// Transport application ID.
    pub app_id: String,
    /// Channel the credential grants access to.
    pub channel: ChannelName,
    /// Transport access token.
    pub access_token: SecretString,
    /// Participant ID the token was issued for.
    pub participant_id: ParticipantId,
    /// Role the token was issued for.
    pub role: Role,
    /// Expiry, if the backend reported one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionCredential {
    /// Whether the credential is usable at `now` for `channel` and `role`.
    #[must_use]
    pub fn is_valid_for(&self, channel: &ChannelName, role: Role, now: DateTime<Utc>) -> bool {
        if &self.channel != channel || self.role != role {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => expires_at.timestamp() - now.timestamp() > CLOCK_DRIFT_MARGIN_SECS,
            None => true,
        }
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Single-slot credential cache with explicit invalidation.
#[derive(Debug, Default)]
pub struct CredentialCache {
    slot: RwLock<Option<SessionCredential>>,
}

impl CredentialCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached credential if it is valid for `channel` and `role`.
    pub async fn get_valid(&self, channel: &ChannelName, role: Role) -> Option<SessionCredential> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|credential| credential.is_valid_for(channel, role, Utc::now()))
            .cloned()
    }

    /// Returns whatever is cached, valid or not.
    pub async fn peek(&self) -> Option<SessionCredential> {
        self.slot.read().await.clone()
    }

    pub async fn store(&self, credential: SessionCredential) {
        *self.slot.write().await = Some(credential);
    }

    /// Clears the cache. Returns whether a credential was present.
    pub async fn clear(&self) -> bool {
        self.slot.write().await.take().is_some()
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Source of session credentials (enables mocking).
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns a credential for `channel` and `role`, from cache when valid.
    async fn fetch_credential(
        &self,
        channel: &ChannelName,
        role: Role,
    ) -> Result<SessionCredential, CredentialError>;

    /// Drops any cached credential.
    async fn invalidate(&self);

    /// Returns the cached credential without fetching.
    async fn cached(&self) -> Option<SessionCredential>;
}

// =============================================================================
// Backend Response
// =============================================================================

/// Token response from the credential backend.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: SecretString,
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    /// Numeric or string participant ID, depending on the backend.
    #[serde(default)]
    uid: Option<serde_json::Value>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &"[REDACTED]")
            .field("app_id", &self.app_id)
            .field("channel", &self.channel)
            .field("uid", &self.uid)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

// =============================================================================
// HTTP Provider
// =============================================================================

/// Credential provider backed by the HTTP token endpoint.
pub struct SessionConfigProvider {
    endpoint: String,
    participant_id: ParticipantId,
    default_app_id: String,
    timeout: Duration,
    http_client: reqwest::Client,
    cache: Arc<CredentialCache>,
}

impl SessionConfigProvider {
    /// Create a provider with a fresh cache.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Configuration` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, CredentialError> {
        Self::new(config, Arc::new(CredentialCache::new()))
    }

    /// Create a provider around an injected cache.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: &Config, cache: Arc<CredentialCache>) -> Result<Self, CredentialError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.credential_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(config.credential_timeout))
            .build()
            .map_err(|e| {
                CredentialError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            endpoint: config.credential_endpoint.clone(),
            participant_id: config.participant_id.clone(),
            default_app_id: config.app_id.clone(),
            timeout: config.credential_timeout,
            http_client,
            cache,
        })
    }

    /// The cache this provider writes to.
    #[must_use]
    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    #[instrument(skip_all, fields(channel = %channel, role = %role))]
    async fn request_credential(
        &self,
        channel: &ChannelName,
        role: Role,
    ) -> Result<SessionCredential, CredentialError> {
        let url = format!("{}{TOKEN_PATH}", self.endpoint);

        debug!(
            target: "bc.credentials",
            url = %url,
            participant_id = %self.participant_id,
            "Requesting credential from backend"
        );

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("channel", channel.as_str()),
                ("participantId", self.participant_id.as_str()),
                ("role", role.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();

        if status.is_success() {
            let body: TokenResponse = response.json().await.map_err(|e| {
                if e.is_timeout() {
                    return self.timeout_error();
                }
                warn!(target: "bc.credentials", error = %e, "Failed to parse credential response");
                CredentialError::InvalidResponse(e.to_string())
            })?;
            self.into_credential(body, channel, role)
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "bc.credentials", error = %e, "Failed to read error response body");
                "<failed to read body>".to_string()
            });
            warn!(target: "bc.credentials", status = %status, "Credential request rejected");
            trace!(target: "bc.credentials", body = %body, "Rejection response body");
            Err(CredentialError::AuthenticationRejected(format!(
                "Status {status}"
            )))
        } else {
            warn!(
                target: "bc.credentials",
                status = %status,
                "Unexpected response from credential backend"
            );
            Err(CredentialError::HttpError(format!(
                "Unexpected status: {status}"
            )))
        }
    }

    fn into_credential(
        &self,
        body: TokenResponse,
        channel: &ChannelName,
        role: Role,
    ) -> Result<SessionCredential, CredentialError> {
        if body.token.expose_secret().is_empty() {
            return Err(CredentialError::InvalidResponse(
                "backend returned an empty token".into(),
            ));
        }

        if let Some(echoed) = body.channel.as_deref() {
            if echoed != channel.as_str() {
                return Err(CredentialError::InvalidResponse(format!(
                    "token issued for channel '{echoed}', requested '{channel}'"
                )));
            }
        }

        let app_id = body
            .app_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.default_app_id.clone());
        if app_id.is_empty() {
            return Err(CredentialError::InvalidResponse(
                "no application ID in response or configuration".into(),
            ));
        }

        let participant_id = match body.uid {
            Some(serde_json::Value::String(uid)) if !uid.is_empty() => ParticipantId::new(uid),
            Some(serde_json::Value::Number(uid)) => ParticipantId::new(uid.to_string()),
            _ => self.participant_id.clone(),
        };

        // Out-of-range lifetimes are treated as non-expiring
        let expires_at = body.expires_in.and_then(|secs| {
            let secs = i64::try_from(secs).ok()?;
            Utc::now().checked_add_signed(chrono::Duration::try_seconds(secs)?)
        });

        Ok(SessionCredential {
            app_id,
            channel: channel.clone(),
            access_token: body.token,
            participant_id,
            role,
            expires_at,
        })
    }

    fn map_transport_error(&self, e: &reqwest::Error) -> CredentialError {
        if e.is_timeout() {
            return self.timeout_error();
        }
        debug!(target: "bc.credentials", error = %e, "HTTP request failed");
        CredentialError::HttpError(e.to_string())
    }

    fn timeout_error(&self) -> CredentialError {
        let ms = duration_ms(self.timeout);
        warn!(target: "bc.credentials", timeout_ms = ms, "Credential request timed out");
        CredentialError::Timeout(ms)
    }
}

#[async_trait::async_trait]
impl CredentialProvider for SessionConfigProvider {
    async fn fetch_credential(
        &self,
        channel: &ChannelName,
        role: Role,
    ) -> Result<SessionCredential, CredentialError> {
        if let Some(credential) = self.cache.get_valid(channel, role).await {
            debug!(target: "bc.credentials", channel = %channel, role = %role, "Credential cache hit");
            metrics::record_credential_fetch("cache");
            return Ok(credential);
        }

        debug!(target: "bc.credentials", channel = %channel, role = %role, "Credential cache miss");

        match self.request_credential(channel, role).await {
            Ok(credential) => {
                self.cache.store(credential.clone()).await;
                metrics::record_credential_fetch("backend");
                Ok(credential)
            }
            Err(e) => {
                metrics::record_credential_fetch("error");
                Err(e)
            }
        }
    }

    async fn invalidate(&self) {
        if self.cache.clear().await {
            debug!(target: "bc.credentials", "Cached credential invalidated");
        }
    }

    async fn cached(&self) -> Option<SessionCredential> {
        self.cache.peek().await
    }
}

// =============================================================================
// Tests
// =============================================================================
