//! Gateway configuration from TOML (`[gateway]` section)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileGatewayConfig {
    /// Agent id stamped on every call record (default: "default")
    pub agent_id: String,
    /// Optional run id stamped on every call record
    pub run_id: Option<String>,
    /// Upper bound on one policy evaluation (default: 10000)
    pub evaluator_timeout_ms: u64,
    /// Upper bound on one request to a backend (default: 60000)
    pub backend_timeout_ms: u64,
}

impl Default for FileGatewayConfig {
    fn default() -> Self {
        Self {
            agent_id: "default".to_string(),
            run_id: None,
            evaluator_timeout_ms: 10_000,
            backend_timeout_ms: 60_000,
        }
    }
}

impl FileGatewayConfig {
    pub fn evaluator_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluator_timeout_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub(super) fn validate(&self) -> Vec<ConfigValidationError> {
        let mut issues = Vec::new();
        if self.agent_id.trim().is_empty() {
            issues.push(ConfigValidationError::EmptyAgentId);
        }
        if self.evaluator_timeout_ms == 0 {
            issues.push(ConfigValidationError::ZeroTimeout {
                field: "gateway.evaluator_timeout_ms",
            });
        }
        if self.backend_timeout_ms == 0 {
            issues.push(ConfigValidationError::ZeroTimeout {
                field: "gateway.backend_timeout_ms",
            });
        }
        issues
    }
}
