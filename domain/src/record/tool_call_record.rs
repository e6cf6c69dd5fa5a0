//! Tool call record state machine.
//!
//! Every call that passes through the policy gateway gets one
//! [`ToolCallRecord`]. Records are never deleted; together they form the
//! audit trail of what was decided and what ran.
//!
//! # State Transitions
//!
//! ```text
//! Pending ──> Executing ──> Completed
//!        ├──> Aborted
//!        ├──> Denied
//!        └──> Failed
//! ```
//!
//! A decision is always recorded before any execution, and only records in
//! `Executing` accept an execution result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tool::ToolCall;

/// Unique identifier of one intercepted call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<String>> From<T> for CallId {
    fn from(s: T) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Executing,
    Completed,
    Aborted,
    Denied,
    Failed,
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Aborted | Self::Denied | Self::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Denied => "denied",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a call's fate was decided, and by whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    PolicyAllow,
    PolicyDenyAbort,
    PolicyDenyContinue,
    UserApprove,
    UserDenyAbort,
    UserDenyContinue,
    EvaluatorError,
    InternalError,
}

impl ApprovalOutcome {
    /// Status a pending record moves to when this outcome is recorded
    pub fn next_status(&self) -> RecordStatus {
        match self {
            Self::PolicyAllow | Self::UserApprove => RecordStatus::Executing,
            Self::PolicyDenyAbort | Self::UserDenyAbort => RecordStatus::Aborted,
            Self::PolicyDenyContinue | Self::UserDenyContinue => RecordStatus::Denied,
            Self::EvaluatorError | Self::InternalError => RecordStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub outcome: ApprovalOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub completed_at: DateTime<Utc>,
    /// Tool result, or the backend error object if the call failed
    pub output: Value,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordError {
    #[error("Record {call_id} cannot {action} from state {from}")]
    InvalidTransition {
        call_id: CallId,
        from: RecordStatus,
        action: &'static str,
    },

    #[error("Record {0} not found")]
    NotFound(CallId),

    #[error("Record {0} already exists")]
    Duplicate(CallId),
}

/// Audit record of one intercepted tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: CallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub agent_id: String,
    pub tool_call: ToolCall,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionRecord>,
    pub created_at: DateTime<Utc>,
}

impl ToolCallRecord {
    /// New record in `Pending`.
    pub fn new(call_id: impl Into<CallId>, agent_id: impl Into<String>, tool_call: ToolCall) -> Self {
        Self {
            call_id: call_id.into(),
            run_id: None,
            agent_id: agent_id.into(),
            tool_call,
            status: RecordStatus::Pending,
            decision: None,
            execution: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Records the decision. Only valid from `Pending`.
    pub fn record_decision(
        &mut self,
        outcome: ApprovalOutcome,
        reason: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        if self.status != RecordStatus::Pending {
            return Err(self.invalid("record a decision"));
        }
        self.decision = Some(DecisionRecord {
            outcome,
            reason,
            decided_at,
        });
        self.status = outcome.next_status();
        Ok(())
    }

    /// Records the execution result. Only valid from `Executing`.
    pub fn record_execution(
        &mut self,
        output: Value,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        if self.status != RecordStatus::Executing {
            return Err(self.invalid("record an execution"));
        }
        self.execution = Some(ExecutionRecord {
            completed_at,
            output,
        });
        self.status = RecordStatus::Completed;
        Ok(())
    }

    /// Ends a call that stopped before it could finish, e.g. because its
    /// caller went away. Valid from `Pending` or `Executing`; both end in
    /// `Failed`.
    pub fn record_failure(
        &mut self,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        let reason = reason.into();
        match self.status {
            RecordStatus::Pending => {
                self.record_decision(ApprovalOutcome::InternalError, Some(reason), at)
            }
            RecordStatus::Executing => {
                self.execution = Some(ExecutionRecord {
                    completed_at: at,
                    output: serde_json::json!({ "error": { "message": reason } }),
                });
                self.status = RecordStatus::Failed;
                Ok(())
            }
            _ => Err(self.invalid("record a failure")),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn outcome(&self) -> Option<ApprovalOutcome> {
        self.decision.as_ref().map(|d| d.outcome)
    }

    fn invalid(&self, action: &'static str) -> RecordError {
        RecordError::InvalidTransition {
            call_id: self.call_id.clone(),
            from: self.status,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_pending() -> ToolCallRecord {
        ToolCallRecord::new("c1", "agent", ToolCall::new("git_status"))
    }

    #[test]
    fn test_allow_then_complete() {
        let mut record = make_pending();
        assert_eq!(record.status, RecordStatus::Pending);

        record
            .record_decision(ApprovalOutcome::PolicyAllow, None, Utc::now())
            .unwrap();
        assert_eq!(record.status, RecordStatus::Executing);
        assert!(!record.is_terminal());

        record
            .record_execution(json!({"content": []}), Utc::now())
            .unwrap();
        assert_eq!(record.status, RecordStatus::Completed);
        assert!(record.is_terminal());
        assert!(record.execution.is_some());
    }

    #[test]
    fn test_denials_are_terminal_without_execution() {
        for (outcome, status) in [
            (ApprovalOutcome::PolicyDenyAbort, RecordStatus::Aborted),
            (ApprovalOutcome::UserDenyAbort, RecordStatus::Aborted),
            (ApprovalOutcome::PolicyDenyContinue, RecordStatus::Denied),
            (ApprovalOutcome::UserDenyContinue, RecordStatus::Denied),
            (ApprovalOutcome::EvaluatorError, RecordStatus::Failed),
            (ApprovalOutcome::InternalError, RecordStatus::Failed),
        ] {
            let mut record = make_pending();
            record
                .record_decision(outcome, Some("destructive".into()), Utc::now())
                .unwrap();
            assert_eq!(record.status, status);
            assert!(record.is_terminal());

            let err = record.record_execution(json!(null), Utc::now()).unwrap_err();
            assert!(matches!(err, RecordError::InvalidTransition { .. }));
            assert!(record.execution.is_none());
        }
    }

    #[test]
    fn test_execution_requires_decision() {
        let mut record = make_pending();
        let err = record.record_execution(json!("out"), Utc::now()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Record c1 cannot record an execution from state pending"
        );
    }

    #[test]
    fn test_decision_only_once() {
        let mut record = make_pending();
        record
            .record_decision(ApprovalOutcome::UserApprove, None, Utc::now())
            .unwrap();
        assert!(
            record
                .record_decision(ApprovalOutcome::PolicyDenyAbort, None, Utc::now())
                .is_err()
        );
        assert_eq!(record.outcome(), Some(ApprovalOutcome::UserApprove));
    }

    #[test]
    fn test_failure_ends_pending_and_executing_calls() {
        let mut record = make_pending();
        record.record_failure("cancelled", Utc::now()).unwrap();
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.outcome(), Some(ApprovalOutcome::InternalError));
        assert_eq!(
            record.decision.as_ref().unwrap().reason.as_deref(),
            Some("cancelled")
        );

        let mut record = make_pending();
        record
            .record_decision(ApprovalOutcome::PolicyAllow, None, Utc::now())
            .unwrap();
        record.record_failure("cancelled", Utc::now()).unwrap();
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.outcome(), Some(ApprovalOutcome::PolicyAllow));
        assert_eq!(
            record.execution.as_ref().unwrap().output["error"]["message"],
            "cancelled"
        );

        let err = record.record_failure("again", Utc::now()).unwrap_err();
        assert!(matches!(err, RecordError::InvalidTransition { .. }));
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let record = make_pending().with_run_id("run-7");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["run_id"], "run-7");
        assert!(value.get("decision").is_none());
        assert!(value.get("execution").is_none());
    }
}
