//! Notifications published by the approval and policy subsystems

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyNotification {
    /// The set of calls awaiting approval changed
    ApprovalsChanged,
    PolicyChanged { version: u64 },
    ProposalChanged { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialization() {
        let note = PolicyNotification::ProposalChanged { id: "p1".into() };
        assert_eq!(
            serde_json::to_value(&note).unwrap(),
            json!({"type": "proposal_changed", "id": "p1"})
        );
        assert_eq!(
            serde_json::to_value(PolicyNotification::ApprovalsChanged).unwrap(),
            json!({"type": "approvals_changed"})
        );
    }
}
