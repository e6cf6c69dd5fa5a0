//! Record store port.
//!
//! The durable store is an external collaborator; the gateway only needs
//! simple CRUD over call records, policies and proposals. Implementations
//! apply record transitions atomically per call id so writes for one call
//! are never reordered or interleaved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use toolgate_domain::{ApprovalOutcome, CallId, Policy, Proposal, RecordError, ToolCallRecord};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Proposal {0} not found")]
    ProposalNotFound(String),

    #[error("Proposal {0} already exists")]
    DuplicateProposal(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    // ==================== Call records ====================

    /// Persists a new record. Fails if the call id is already known.
    async fn insert_record(&self, record: &ToolCallRecord) -> Result<(), StoreError>;

    /// Applies [`ToolCallRecord::record_decision`] and returns the updated record.
    async fn record_decision(
        &self,
        call_id: &CallId,
        outcome: ApprovalOutcome,
        reason: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> Result<ToolCallRecord, StoreError>;

    /// Applies [`ToolCallRecord::record_execution`] and returns the updated record.
    async fn record_execution(
        &self,
        call_id: &CallId,
        output: Value,
        completed_at: DateTime<Utc>,
    ) -> Result<ToolCallRecord, StoreError>;

    /// Applies [`ToolCallRecord::record_failure`] and returns the updated record.
    async fn record_failure(
        &self,
        call_id: &CallId,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<ToolCallRecord, StoreError>;

    async fn get_record(&self, call_id: &CallId) -> Result<Option<ToolCallRecord>, StoreError>;

    /// Records in creation order, optionally for one agent
    async fn list_records(&self, agent_id: Option<&str>) -> Result<Vec<ToolCallRecord>, StoreError>;

    // ==================== Policies ====================

    /// Persists policy text under the next version and returns it.
    async fn save_policy(&self, source: &str) -> Result<Policy, StoreError>;

    async fn latest_policy(&self) -> Result<Option<Policy>, StoreError>;

    // ==================== Proposals ====================

    async fn insert_proposal(&self, proposal: &Proposal) -> Result<(), StoreError>;

    async fn update_proposal(&self, proposal: &Proposal) -> Result<(), StoreError>;

    async fn get_proposal(&self, id: &str) -> Result<Option<Proposal>, StoreError>;

    /// Proposals in creation order
    async fn list_proposals(&self) -> Result<Vec<Proposal>, StoreError>;
}
