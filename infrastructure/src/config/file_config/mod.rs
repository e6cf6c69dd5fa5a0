//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and use domain types where appropriate.

mod audit;
mod gateway;
mod policy;

pub use audit::FileAuditConfig;
pub use gateway::FileGatewayConfig;
pub use policy::{FileEvaluatorConfig, FilePolicyConfig};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolgate_application::GatewayParams;
use toolgate_domain::{MountError, MountName, ServerSpec};

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("{field} cannot be 0")]
    ZeroTimeout { field: &'static str },

    #[error("gateway.agent_id cannot be empty")]
    EmptyAgentId,

    #[error("policy.default_decision: unknown value '{0}' (expected ALLOW, ASK, DENY_CONTINUE or DENY_ABORT)")]
    InvalidDecision(String),

    #[error("policy.evaluator.command cannot be empty")]
    EmptyEvaluatorCommand,

    #[error("servers.{name}: {reason}")]
    InvalidServerName { name: String, reason: String },

    #[error("servers.{0}.command cannot be empty")]
    EmptyServerCommand(String),
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Gateway identity and timeouts
    pub gateway: FileGatewayConfig,
    /// Policy source and evaluator
    pub policy: FilePolicyConfig,
    /// Backends to mount, keyed by mount name
    pub servers: BTreeMap<String, ServerSpec>,
    /// Audit trail output
    pub audit: FileAuditConfig,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut issues = Vec::new();

        issues.extend(self.gateway.validate());
        issues.extend(self.policy.validate());

        for (name, spec) in &self.servers {
            if let Err(MountError::InvalidName { reason, .. }) = MountName::new(name.as_str()) {
                issues.push(ConfigValidationError::InvalidServerName {
                    name: name.clone(),
                    reason: reason.to_string(),
                });
            }
            if spec.command.trim().is_empty() {
                issues.push(ConfigValidationError::EmptyServerCommand(name.clone()));
            }
        }

        issues
    }

    /// Map onto the use case parameters.
    ///
    /// `policy_source` is the text read from `policy.source_file`, if any.
    pub fn to_gateway_params(&self, policy_source: Option<String>) -> GatewayParams {
        let mut params = GatewayParams::default()
            .with_agent_id(&self.gateway.agent_id)
            .with_evaluator_timeout(self.gateway.evaluator_timeout());
        if let Some(run_id) = &self.gateway.run_id {
            params = params.with_run_id(run_id);
        }
        if let Some(source) = policy_source {
            params = params.with_default_policy(source);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toolgate_domain::Decision;

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[gateway]
agent_id = "reviewer"
evaluator_timeout_ms = 2500

[policy]
source_file = "policy.star"
default_decision = "DENY_CONTINUE"

[policy.evaluator]
command = "policy-eval"
args = ["--strict"]

[servers.git]
command = "git-mcp"
args = ["--repo", "."]

[servers.git.env]
GIT_PAGER = "cat"

[audit]
jsonl_path = "/tmp/toolgate/audit.jsonl"
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gateway.agent_id, "reviewer");
        assert_eq!(config.gateway.evaluator_timeout(), Duration::from_millis(2500));
        assert_eq!(config.policy.parse_default_decision(), Some(Decision::DenyContinue));
        assert_eq!(config.policy.evaluator.command.as_deref(), Some("policy-eval"));
        assert_eq!(config.policy.evaluator.args, vec!["--strict"]);
        let git = &config.servers["git"];
        assert_eq!(git.args, vec!["--repo", "."]);
        assert_eq!(git.env["GIT_PAGER"], "cat");
        assert!(config.audit.jsonl_path.is_some());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let toml_str = r#"
[servers.fs]
command = "fs-mcp"
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.servers.len(), 1);
        // Defaults should apply
        assert_eq!(config.gateway.agent_id, "default");
        assert_eq!(config.gateway.evaluator_timeout_ms, 10_000);
        assert_eq!(config.policy.parse_default_decision(), Some(Decision::Ask));
        assert!(config.policy.evaluator.command.is_none());
        assert!(config.audit.jsonl_path.is_none());
    }

    #[test]
    fn test_validate_collects_all_issues() {
        let toml_str = r#"
[gateway]
agent_id = ""
evaluator_timeout_ms = 0

[policy]
default_decision = "MAYBE"

[servers.my__tools]
command = "x"

[servers.empty]
command = " "
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        let issues = config.validate();
        assert!(issues.contains(&ConfigValidationError::EmptyAgentId));
        assert!(issues.contains(&ConfigValidationError::ZeroTimeout {
            field: "gateway.evaluator_timeout_ms"
        }));
        assert!(issues.contains(&ConfigValidationError::InvalidDecision("MAYBE".into())));
        assert!(issues.contains(&ConfigValidationError::EmptyServerCommand("empty".into())));
        assert!(issues.iter().any(|i| matches!(
            i,
            ConfigValidationError::InvalidServerName { name, .. } if name == "my__tools"
        )));
    }

    #[test]
    fn test_to_gateway_params() {
        let mut config = FileConfig::default();
        config.gateway.agent_id = "ci".into();
        config.gateway.run_id = Some("run-7".into());
        config.gateway.evaluator_timeout_ms = 500;

        let params = config.to_gateway_params(Some("deny everything".into()));
        assert_eq!(params.agent_id, "ci");
        assert_eq!(params.run_id.as_deref(), Some("run-7"));
        assert_eq!(params.evaluator_timeout, Duration::from_millis(500));
        assert_eq!(params.default_policy, "deny everything");

        let params = FileConfig::default().to_gateway_params(None);
        assert_eq!(params.default_policy, GatewayParams::default().default_policy);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(FileConfig::default().validate().is_empty());
    }
}
