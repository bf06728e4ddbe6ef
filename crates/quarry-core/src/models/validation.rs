use serde::{Deserialize, Serialize};

/// Outcome of provider configuration validation. `errors` block
/// construction; `warnings` and `suggestions` are advisory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            ..Self::default()
        }
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
    }
}

/// Runtime capability flags checked before provider construction.
/// A missing capability yields `EnvironmentUnsupported` with the
/// requirement list and alternative provider suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentCaps {
    pub http_transport: bool,
    pub crypto_digest: bool,
    pub persistent_storage: bool,
    pub worker_threads: bool,
}

impl Default for EnvironmentCaps {
    fn default() -> Self {
        Self {
            http_transport: true,
            crypto_digest: true,
            persistent_storage: true,
            worker_threads: true,
        }
    }
}
