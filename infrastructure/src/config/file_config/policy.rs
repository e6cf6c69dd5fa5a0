//! Policy configuration from TOML (`[policy]` section)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use toolgate_domain::Decision;

use super::ConfigValidationError;

/// External evaluator program (`[policy.evaluator]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEvaluatorConfig {
    /// Program to run per evaluation. Unset means the fixed default decision.
    pub command: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePolicyConfig {
    /// Policy text activated when the store has none
    pub source_file: Option<PathBuf>,
    /// Decision returned for every call when no evaluator command is set
    /// (default: "ASK")
    pub default_decision: String,
    pub evaluator: FileEvaluatorConfig,
}

impl Default for FilePolicyConfig {
    fn default() -> Self {
        Self {
            source_file: None,
            default_decision: Decision::Ask.as_str().to_string(),
            evaluator: FileEvaluatorConfig::default(),
        }
    }
}

impl FilePolicyConfig {
    pub fn parse_default_decision(&self) -> Option<Decision> {
        Decision::parse(self.default_decision.trim())
    }

    /// Read the policy text named by `source_file`.
    pub fn load_source(&self) -> std::io::Result<Option<String>> {
        self.source_file
            .as_ref()
            .map(std::fs::read_to_string)
            .transpose()
    }

    pub(super) fn validate(&self) -> Vec<ConfigValidationError> {
        let mut issues = Vec::new();
        if self.parse_default_decision().is_none() {
            issues.push(ConfigValidationError::InvalidDecision(
                self.default_decision.clone(),
            ));
        }
        if let Some(command) = &self.evaluator.command
            && command.trim().is_empty()
        {
            issues.push(ConfigValidationError::EmptyEvaluatorCommand);
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.star");
        std::fs::write(&path, "deny(\"fs_delete\")\n").unwrap();

        let config = FilePolicyConfig {
            source_file: Some(path),
            ..Default::default()
        };
        assert_eq!(
            config.load_source().unwrap().as_deref(),
            Some("deny(\"fs_delete\")\n")
        );
        assert!(FilePolicyConfig::default().load_source().unwrap().is_none());
    }

    #[test]
    fn test_missing_source_file_is_an_error() {
        let config = FilePolicyConfig {
            source_file: Some("/nonexistent/policy.star".into()),
            ..Default::default()
        };
        assert!(config.load_source().is_err());
    }
}
