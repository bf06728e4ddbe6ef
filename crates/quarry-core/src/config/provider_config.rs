use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Per-provider transport and rate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub requests_per_minute: u32,
    pub max_retries: u32,
    /// Base delay for the exponential retry backoff.
    pub retry_base_ms: u64,
    pub timeout_ms: u64,
    /// Extra headers attached to every upstream request.
    pub headers: BTreeMap<String, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            requests_per_minute: defaults::DEFAULT_REQUESTS_PER_MINUTE,
            max_retries: defaults::DEFAULT_MAX_RETRIES,
            retry_base_ms: defaults::DEFAULT_RETRY_BASE_MS,
            timeout_ms: defaults::DEFAULT_PROVIDER_TIMEOUT_MS,
            headers: BTreeMap::new(),
        }
    }
}
