//! Port doubles shared by the use case tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use toolgate_domain::{
    ApprovalOutcome, CallId, Policy, PolicyDecision, Proposal, RecordError, ToolCall,
    ToolCallRecord, ToolError, ToolResult,
};

use crate::ports::audit_logger::{AuditEvent, AuditLogger};
use crate::ports::policy_evaluator::{EvaluatorError, PolicyEvaluator};
use crate::ports::record_store::{RecordStore, StoreError};
use crate::ports::tool_surface::ToolSurface;

#[derive(Default)]
pub struct MockStore {
    records: Mutex<Vec<ToolCallRecord>>,
    policies: Mutex<Vec<Policy>>,
    proposals: Mutex<Vec<Proposal>>,
}

impl MockStore {
    pub fn records(&self) -> Vec<ToolCallRecord> {
        self.records.lock().unwrap().clone()
    }

    fn update<F>(&self, call_id: &CallId, f: F) -> Result<ToolCallRecord, StoreError>
    where
        F: FnOnce(&mut ToolCallRecord) -> Result<(), RecordError>,
    {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| &r.call_id == call_id)
            .ok_or_else(|| RecordError::NotFound(call_id.clone()))?;
        f(record)?;
        Ok(record.clone())
    }
}

#[async_trait]
impl RecordStore for MockStore {
    async fn insert_record(&self, record: &ToolCallRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn record_decision(
        &self,
        call_id: &CallId,
        outcome: ApprovalOutcome,
        reason: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> Result<ToolCallRecord, StoreError> {
        self.update(call_id, |r| r.record_decision(outcome, reason, decided_at))
    }

    async fn record_execution(
        &self,
        call_id: &CallId,
        output: Value,
        completed_at: DateTime<Utc>,
    ) -> Result<ToolCallRecord, StoreError> {
        self.update(call_id, |r| r.record_execution(output, completed_at))
    }

    async fn record_failure(
        &self,
        call_id: &CallId,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<ToolCallRecord, StoreError> {
        self.update(call_id, |r| r.record_failure(reason, at))
    }

    async fn get_record(&self, call_id: &CallId) -> Result<Option<ToolCallRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.call_id == call_id)
            .cloned())
    }

    async fn list_records(&self, _agent_id: Option<&str>) -> Result<Vec<ToolCallRecord>, StoreError> {
        Ok(self.records())
    }

    async fn save_policy(&self, source: &str) -> Result<Policy, StoreError> {
        let mut policies = self.policies.lock().unwrap();
        let policy = Policy::new(source, policies.len() as u64 + 1);
        policies.push(policy.clone());
        Ok(policy)
    }

    async fn latest_policy(&self) -> Result<Option<Policy>, StoreError> {
        Ok(self.policies.lock().unwrap().last().cloned())
    }

    async fn insert_proposal(&self, proposal: &Proposal) -> Result<(), StoreError> {
        self.proposals.lock().unwrap().push(proposal.clone());
        Ok(())
    }

    async fn update_proposal(&self, proposal: &Proposal) -> Result<(), StoreError> {
        let mut proposals = self.proposals.lock().unwrap();
        let slot = proposals
            .iter_mut()
            .find(|p| p.id == proposal.id)
            .ok_or_else(|| StoreError::ProposalNotFound(proposal.id.clone()))?;
        *slot = proposal.clone();
        Ok(())
    }

    async fn get_proposal(&self, id: &str) -> Result<Option<Proposal>, StoreError> {
        Ok(self
            .proposals
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list_proposals(&self) -> Result<Vec<Proposal>, StoreError> {
        Ok(self.proposals.lock().unwrap().clone())
    }
}

/// Evaluator whose answer depends on the policy text.
///
/// `"broken"` anywhere in the source fails, `"slow"` sleeps past any test
/// timeout, otherwise the configured decision is returned.
pub struct ScriptedEvaluator {
    decision: PolicyDecision,
    pub seen: Mutex<Vec<(String, String)>>,
}

impl ScriptedEvaluator {
    pub fn new(decision: PolicyDecision) -> Self {
        Self {
            decision,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PolicyEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        policy_source: &str,
        call: &ToolCall,
    ) -> Result<PolicyDecision, EvaluatorError> {
        self.seen
            .lock()
            .unwrap()
            .push((policy_source.to_string(), call.name.clone()));
        if policy_source.contains("broken") {
            return Err(EvaluatorError::Failed("SyntaxError: line 1".into()));
        }
        if policy_source.contains("slow") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(self.decision.clone())
    }
}

/// Surface that replays queued outcomes and remembers the calls it saw.
#[derive(Default)]
pub struct MockSurface {
    outcomes: Mutex<VecDeque<Result<ToolResult, ToolError>>>,
    pub calls: Mutex<Vec<ToolCall>>,
    hang: bool,
}

impl MockSurface {
    pub fn returning(outcome: Result<ToolResult, ToolError>) -> Self {
        let surface = Self::default();
        surface.outcomes.lock().unwrap().push_back(outcome);
        surface
    }

    /// A surface whose calls never return.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolSurface for MockSurface {
    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        self.calls.lock().unwrap().push(call.clone());
        if self.hang {
            futures::future::pending::<()>().await;
        }
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ToolResult::text("ok")))
    }
}

#[derive(Default)]
pub struct MemoryAudit {
    pub events: Mutex<Vec<(&'static str, Value)>>,
}

impl MemoryAudit {
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

impl AuditLogger for MemoryAudit {
    fn log(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap()
            .push((event.event_type, event.payload));
    }
}
