//! Policy evaluator port.
//!
//! The evaluator runs the active policy program against one tool call and
//! returns a [`PolicyDecision`]. How the program runs (sandbox, interpreter)
//! is the adapter's business.
//!
//! An [`EvaluatorError`] means the evaluator itself failed. It is never a
//! decision: the gateway reports it with its own reserved code and does not
//! treat it as ALLOW or as a denial.
//!
//! # Built-in Implementations
//!
//! - [`FixedDecisionEvaluator`] - Returns the same decision for every call
//!
//! For a subprocess-backed evaluator, see `CommandPolicyEvaluator` in the
//! infrastructure layer.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use toolgate_domain::{PolicyDecision, ToolCall};

#[derive(Debug, Clone, Error)]
pub enum EvaluatorError {
    #[error("Evaluator timed out after {0:?}")]
    Timeout(Duration),

    #[error("Evaluator failed: {0}")]
    Failed(String),

    #[error("Evaluator returned a malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate `policy_source` against `call`.
    async fn evaluate(
        &self,
        policy_source: &str,
        call: &ToolCall,
    ) -> Result<PolicyDecision, EvaluatorError>;
}

/// Evaluator that ignores the policy text and always returns one decision.
pub struct FixedDecisionEvaluator {
    decision: PolicyDecision,
}

impl FixedDecisionEvaluator {
    pub fn new(decision: PolicyDecision) -> Self {
        Self { decision }
    }
}

#[async_trait]
impl PolicyEvaluator for FixedDecisionEvaluator {
    async fn evaluate(
        &self,
        _policy_source: &str,
        _call: &ToolCall,
    ) -> Result<PolicyDecision, EvaluatorError> {
        Ok(self.decision.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgate_domain::Decision;

    #[tokio::test]
    async fn test_fixed_decision() {
        let evaluator = FixedDecisionEvaluator::new(PolicyDecision::deny_continue("read-only"));
        let decision = evaluator
            .evaluate("ignored", &ToolCall::new("fs_write"))
            .await
            .unwrap();
        assert_eq!(decision.decision, Decision::DenyContinue);
        assert_eq!(decision.rationale.as_deref(), Some("read-only"));
    }
}
