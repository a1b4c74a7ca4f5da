//! Common configuration types for the broadcast client crates.

use serde::{Deserialize, Serialize};

/// Default tracing filter directive.
pub const DEFAULT_LOG_LEVEL: &str = "broadcast_client=info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing filter directive (e.g. `broadcast_client=debug`)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}
