//! In-memory [`RecordStore`].

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use toolgate_application::{RecordStore, StoreError};
use toolgate_domain::{ApprovalOutcome, CallId, Policy, Proposal, RecordError, ToolCallRecord};

#[derive(Default)]
struct State {
    /// Records in insertion order
    records: Vec<ToolCallRecord>,
    index: BTreeMap<CallId, usize>,
    policies: Vec<Policy>,
    proposals: Vec<Proposal>,
}

impl State {
    fn record_mut(&mut self, call_id: &CallId) -> Result<&mut ToolCallRecord, StoreError> {
        let slot = *self
            .index
            .get(call_id)
            .ok_or_else(|| RecordError::NotFound(call_id.clone()))?;
        Ok(&mut self.records[slot])
    }
}

/// Process-local store. Every operation takes one lock, so transitions for
/// a call id are applied atomically and in order.
#[derive(Default)]
pub struct InMemoryRecordStore {
    state: Mutex<State>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_record(&self, record: &ToolCallRecord) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.index.contains_key(&record.call_id) {
            return Err(RecordError::Duplicate(record.call_id.clone()).into());
        }
        let slot = state.records.len();
        state.index.insert(record.call_id.clone(), slot);
        state.records.push(record.clone());
        Ok(())
    }

    async fn record_decision(
        &self,
        call_id: &CallId,
        outcome: ApprovalOutcome,
        reason: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> Result<ToolCallRecord, StoreError> {
        let mut state = self.state();
        let record = state.record_mut(call_id)?;
        record.record_decision(outcome, reason, decided_at)?;
        Ok(record.clone())
    }

    async fn record_execution(
        &self,
        call_id: &CallId,
        output: Value,
        completed_at: DateTime<Utc>,
    ) -> Result<ToolCallRecord, StoreError> {
        let mut state = self.state();
        let record = state.record_mut(call_id)?;
        record.record_execution(output, completed_at)?;
        Ok(record.clone())
    }

    async fn record_failure(
        &self,
        call_id: &CallId,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<ToolCallRecord, StoreError> {
        let mut state = self.state();
        let record = state.record_mut(call_id)?;
        record.record_failure(reason, at)?;
        Ok(record.clone())
    }

    async fn get_record(&self, call_id: &CallId) -> Result<Option<ToolCallRecord>, StoreError> {
        let state = self.state();
        Ok(state
            .index
            .get(call_id)
            .map(|&slot| state.records[slot].clone()))
    }

    async fn list_records(&self, agent_id: Option<&str>) -> Result<Vec<ToolCallRecord>, StoreError> {
        Ok(self
            .state()
            .records
            .iter()
            .filter(|r| agent_id.is_none_or(|id| r.agent_id == id))
            .cloned()
            .collect())
    }

    async fn save_policy(&self, source: &str) -> Result<Policy, StoreError> {
        let mut state = self.state();
        let version = state.policies.last().map_or(1, |p| p.version + 1);
        let policy = Policy::new(source, version);
        state.policies.push(policy.clone());
        Ok(policy)
    }

    async fn latest_policy(&self) -> Result<Option<Policy>, StoreError> {
        Ok(self.state().policies.last().cloned())
    }

    async fn insert_proposal(&self, proposal: &Proposal) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.proposals.iter().any(|p| p.id == proposal.id) {
            return Err(StoreError::DuplicateProposal(proposal.id.clone()));
        }
        state.proposals.push(proposal.clone());
        Ok(())
    }

    async fn update_proposal(&self, proposal: &Proposal) -> Result<(), StoreError> {
        let mut state = self.state();
        let slot = state
            .proposals
            .iter_mut()
            .find(|p| p.id == proposal.id)
            .ok_or_else(|| StoreError::ProposalNotFound(proposal.id.clone()))?;
        *slot = proposal.clone();
        Ok(())
    }

    async fn get_proposal(&self, id: &str) -> Result<Option<Proposal>, StoreError> {
        Ok(self.state().proposals.iter().find(|p| p.id == id).cloned())
    }

    async fn list_proposals(&self) -> Result<Vec<Proposal>, StoreError> {
        Ok(self.state().proposals.clone())
    }
}
