use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Point-in-time provider metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    /// Provider-specific extras (token usage, model residency, ...).
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Provider health probe result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub healthy: bool,
    pub status: String,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ProviderHealth {
    pub fn healthy(status: impl Into<String>) -> Self {
        Self {
            healthy: true,
            status: status.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn unhealthy(status: impl Into<String>) -> Self {
        Self {
            healthy: false,
            status: status.into(),
            details: BTreeMap::new(),
        }
    }
}
