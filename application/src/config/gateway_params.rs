//! Gateway parameters: use case behaviour control.
//!
//! [`GatewayParams`] groups the static parameters the policy gateway and
//! policy engine need at runtime. File-level configuration is mapped onto it
//! by the infrastructure config loader.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Synthetic call used to smoke-test a policy before it is activated.
pub const SELF_CHECK_TOOL: &str = "ui_send_message";

/// Policy text used when nothing has been persisted yet.
pub const DEFAULT_POLICY_SOURCE: &str = "# default policy: every call asks for approval\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayParams {
    /// Agent id stamped on every call record
    pub agent_id: String,
    /// Optional run id stamped on every call record
    pub run_id: Option<String>,
    /// Upper bound on one policy evaluation
    pub evaluator_timeout: Duration,
    /// Policy activated when the store has none
    pub default_policy: String,
}

impl Default for GatewayParams {
    fn default() -> Self {
        Self {
            agent_id: "default".to_string(),
            run_id: None,
            evaluator_timeout: Duration::from_secs(10),
            default_policy: DEFAULT_POLICY_SOURCE.to_string(),
        }
    }
}

impl GatewayParams {
    // ==================== Builder Methods ====================

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_evaluator_timeout(mut self, timeout: Duration) -> Self {
        self.evaluator_timeout = timeout;
        self
    }

    pub fn with_default_policy(mut self, source: impl Into<String>) -> Self {
        self.default_policy = source.into();
        self
    }
}
