//! Observability for the broadcast client.
//!
//! - [`metrics`] - session, credential and participant metrics
//! - [`init_tracing`] - installs the global tracing subscriber for
//!   embedding applications

pub mod metrics;

use common::config::ObservabilityConfig;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("Failed to install tracing subscriber: {0}")]
    AlreadyInstalled(String),
}

/// Install a global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level` when set.
///
/// # Errors
///
/// - `InvalidFilter` if `config.log_level` is not a valid directive
/// - `AlreadyInstalled` if a global subscriber is already set
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TracingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            TracingError::InvalidFilter {
                directive: config.log_level.clone(),
                reason: e.to_string(),
            }
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| TracingError::AlreadyInstalled(e.to_string()))
}
