//! Broadcast client configuration.
//!
//! Configuration is loaded from environment variables, or from a map for
//! embedding applications and tests.

use crate::transport::{ClientMode, ClientOptions, VideoCodec};
use common::config::{ObservabilityConfig, DEFAULT_LOG_LEVEL};
use common::types::{ChannelName, ParticipantId, SurfaceId};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default credential fetch timeout in milliseconds.
pub const DEFAULT_CREDENTIAL_TIMEOUT_MS: u64 = 10_000;

/// Default transport join timeout in milliseconds.
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 15_000;

/// Default render target for the local preview.
pub const DEFAULT_LOCAL_PREVIEW_SURFACE: &str = "local-video";

/// Broadcast client configuration.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the credential backend (e.g. `https://tokens.example.com`).
    pub credential_endpoint: String,

    /// Channel to join.
    pub channel: ChannelName,

    /// Local participant ID sent to the credential backend.
    pub participant_id: ParticipantId,

    /// Application ID used when the backend response omits one.
    pub app_id: String,

    /// Credential fetch timeout (default: 10s).
    pub credential_timeout: Duration,

    /// Transport join timeout (default: 15s).
    pub join_timeout: Duration,

    /// Render target for the local camera preview (default: "local-video").
    pub local_preview_surface: SurfaceId,

    /// Options used when creating the transport client.
    pub client_options: ClientOptions,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("credential_endpoint", &self.credential_endpoint)
            .field("channel", &self.channel.as_str())
            .field("participant_id", &self.participant_id.as_str())
            .field("app_id", &self.app_id)
            .field("credential_timeout", &self.credential_timeout)
            .field("join_timeout", &self.join_timeout)
            .field("local_preview_surface", &self.local_preview_surface.as_str())
            .field("client_options", &self.client_options)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let credential_endpoint = required(vars, "BC_CREDENTIAL_ENDPOINT")?
            .trim_end_matches('/')
            .to_string();
        if !credential_endpoint.starts_with("http://") && !credential_endpoint.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue(format!(
                "BC_CREDENTIAL_ENDPOINT must be an http(s) URL, got '{credential_endpoint}'"
            )));
        }

        let channel = ChannelName::new(required(vars, "BC_CHANNEL")?);
        let participant_id = ParticipantId::new(required(vars, "BC_PARTICIPANT_ID")?);

        let app_id = vars.get("BC_APP_ID").cloned().unwrap_or_default();

        let credential_timeout = timeout_ms(
            vars,
            "BC_CREDENTIAL_TIMEOUT_MS",
            DEFAULT_CREDENTIAL_TIMEOUT_MS,
        )?;
        let join_timeout = timeout_ms(vars, "BC_JOIN_TIMEOUT_MS", DEFAULT_JOIN_TIMEOUT_MS)?;

        let local_preview_surface = SurfaceId::new(
            vars.get("BC_LOCAL_PREVIEW_SURFACE")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOCAL_PREVIEW_SURFACE.to_string()),
        );

        let mode = match vars.get("BC_TRANSPORT_MODE").map(String::as_str) {
            None | Some("live") => ClientMode::Live,
            Some("rtc") => ClientMode::Rtc,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "BC_TRANSPORT_MODE must be 'live' or 'rtc', got '{other}'"
                )))
            }
        };

        let codec = match vars.get("BC_VIDEO_CODEC").map(String::as_str) {
            None | Some("vp8") => VideoCodec::Vp8,
            Some("h264") => VideoCodec::H264,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "BC_VIDEO_CODEC must be 'vp8' or 'h264', got '{other}'"
                )))
            }
        };

        let log_level = vars
            .get("BC_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = match vars.get("BC_JSON_LOGS").map(String::as_str) {
            None => false,
            Some(value) => value.parse::<bool>().map_err(|_| {
                ConfigError::InvalidValue(format!("BC_JSON_LOGS must be a boolean, got '{value}'"))
            })?,
        };

        Ok(Config {
            credential_endpoint,
            channel,
            participant_id,
            app_id,
            credential_timeout,
            join_timeout,
            local_preview_surface,
            client_options: ClientOptions { mode, codec },
            observability: ObservabilityConfig {
                log_level,
                json_logs,
            },
        })
    }
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    match vars.get(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn timeout_ms(
    vars: &HashMap<String, String>,
    key: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = vars.get(key) else {
        return Ok(Duration::from_millis(default_ms));
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue(format!("{key} must be non-zero"))),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(e) => Err(ConfigError::InvalidValue(format!(
            "{key} must be a number of milliseconds: {e}"
        ))),
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
