use serde::{Deserialize, Serialize};

use super::defaults;

/// Control-plane channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Per-channel cap on in-flight requests; the next call past the cap
    /// fails synchronously with `rate_limit`.
    pub max_concurrent_operations: usize,
    /// Default request deadline (milliseconds).
    pub operation_timeout_ms: u64,
    pub enable_performance_monitoring: bool,
    /// Minimum emitted log severity: "debug" | "info" | "warn" | "error".
    pub log_level: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: defaults::DEFAULT_MAX_CONCURRENT_OPERATIONS,
            operation_timeout_ms: defaults::DEFAULT_OPERATION_TIMEOUT_MS,
            enable_performance_monitoring: defaults::DEFAULT_PERFORMANCE_MONITORING,
            log_level: defaults::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}
