//! Policy decisions

use serde::{Deserialize, Serialize};

/// The evaluator's verdict on a tool call. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Execute immediately
    Allow,
    /// Suspend until an operator resolves the call
    Ask,
    /// Refuse this call; the agent may carry on
    DenyContinue,
    /// Refuse this call and stop the agent's turn
    DenyAbort,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Ask => "ASK",
            Decision::DenyContinue => "DENY_CONTINUE",
            Decision::DenyAbort => "DENY_ABORT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ALLOW" => Some(Decision::Allow),
            "ASK" => Some(Decision::Ask),
            "DENY_CONTINUE" => Some(Decision::DenyContinue),
            "DENY_ABORT" => Some(Decision::DenyAbort),
            _ => None,
        }
    }

    pub fn is_denial(&self) -> bool {
        matches!(self, Decision::DenyContinue | Decision::DenyAbort)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision plus the evaluator's optional rationale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl PolicyDecision {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn allow() -> Self {
        Self::new(Decision::Allow)
    }

    pub fn ask() -> Self {
        Self::new(Decision::Ask)
    }

    pub fn deny_abort(rationale: impl Into<String>) -> Self {
        Self::new(Decision::DenyAbort).with_rationale(rationale)
    }

    pub fn deny_continue(rationale: impl Into<String>) -> Self {
        Self::new(Decision::DenyContinue).with_rationale(rationale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_values() {
        for decision in [
            Decision::Allow,
            Decision::Ask,
            Decision::DenyContinue,
            Decision::DenyAbort,
        ] {
            let wire = serde_json::to_value(decision).unwrap();
            assert_eq!(wire, json!(decision.as_str()));
            assert_eq!(Decision::parse(decision.as_str()), Some(decision));
        }
        assert_eq!(Decision::parse("allow"), None);
    }

    #[test]
    fn test_policy_decision_deserialize() {
        let parsed: PolicyDecision =
            serde_json::from_value(json!({"decision": "DENY_ABORT", "rationale": "destructive"}))
                .unwrap();
        assert_eq!(parsed, PolicyDecision::deny_abort("destructive"));
        assert!(parsed.decision.is_denial());

        let bare: PolicyDecision = serde_json::from_value(json!({"decision": "ASK"})).unwrap();
        assert_eq!(bare, PolicyDecision::ask());
        assert!(serde_json::from_value::<PolicyDecision>(json!({"decision": "MAYBE"})).is_err());
    }
}
