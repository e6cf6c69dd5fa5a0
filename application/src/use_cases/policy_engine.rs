//! Policy engine: the active policy, its versions, and change proposals.
//!
//! The engine owns the one active [`Policy`] and evaluates calls against it
//! through the [`PolicyEvaluator`] port. Versions come from the record store,
//! never from a local counter, so they stay monotonic across restarts.
//!
//! Policy changes can go through a proposal workflow:
//!
//! ```text
//! create_proposal ──self-check──▶ pending ──approve (self-check)──▶ approved + set_policy
//!                                    ├──reject───▶ rejected
//!                                    └──withdraw─▶ withdrawn
//! ```
//!
//! A self-check runs the candidate policy against a synthetic benign call.
//! Any decision passes; an evaluator error fails the check.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use toolgate_domain::{Policy, PolicyDecision, PolicyNotification, Proposal, ProposalStatus, ToolCall};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{GatewayParams, SELF_CHECK_TOOL};
use crate::ports::audit_logger::{AuditEvent, AuditLogger, NoAuditLogger};
use crate::ports::policy_evaluator::{EvaluatorError, PolicyEvaluator};
use crate::ports::record_store::{RecordStore, StoreError};

#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    #[error("Proposal {0} not found")]
    NotFound(String),

    #[error("Proposal {id} is {status}, not pending")]
    NotPending { id: String, status: ProposalStatus },

    #[error("Policy self-check failed: {0}")]
    SelfCheckFailed(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

pub struct PolicyEngine {
    store: Arc<dyn RecordStore>,
    evaluator: Arc<dyn PolicyEvaluator>,
    audit: Arc<dyn AuditLogger>,
    evaluator_timeout: Duration,
    default_policy: String,
    active: RwLock<Policy>,
    /// Serializes proposal decisions so one proposal cannot be approved twice
    proposals: Mutex<()>,
    events: broadcast::Sender<PolicyNotification>,
}

impl PolicyEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        evaluator: Arc<dyn PolicyEvaluator>,
        params: &GatewayParams,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            evaluator,
            audit: Arc::new(NoAuditLogger),
            evaluator_timeout: params.evaluator_timeout,
            default_policy: params.default_policy.clone(),
            active: RwLock::new(Policy::new(params.default_policy.clone(), 0)),
            proposals: Mutex::new(()),
            events,
        }
    }

    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// Subscribe to `PolicyChanged` / `ProposalChanged` notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PolicyNotification> {
        self.events.subscribe()
    }

    // ==================== Active policy ====================

    pub fn get_policy(&self) -> Policy {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Restores the latest persisted policy, persisting the default if the
    /// store has none.
    pub async fn load_policy(&self) -> Result<Policy, PolicyError> {
        match self.store.latest_policy().await? {
            Some(policy) => {
                info!(version = policy.version, "Loaded persisted policy");
                self.activate(policy.clone());
                Ok(policy)
            }
            None => {
                info!("No persisted policy, activating default");
                let source = self.default_policy.clone();
                self.set_policy(&source).await
            }
        }
    }

    /// Persists `source` under the next version and makes it active.
    pub async fn set_policy(&self, source: &str) -> Result<Policy, PolicyError> {
        let policy = self.store.save_policy(source).await?;
        self.activate(policy.clone());
        info!(version = policy.version, "Policy activated");
        self.audit.log(AuditEvent::new(
            "policy_set",
            json!({ "version": policy.version, "bytes": policy.source.len() }),
        ));
        let _ = self.events.send(PolicyNotification::PolicyChanged {
            version: policy.version,
        });
        Ok(policy)
    }

    fn activate(&self, policy: Policy) {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        // concurrent set_policy calls may finish out of order
        if policy.version >= active.version {
            *active = policy;
        }
    }

    // ==================== Evaluation ====================

    /// Evaluates `call` against the active policy.
    pub async fn evaluate(&self, call: &ToolCall) -> Result<PolicyDecision, EvaluatorError> {
        let policy = self.get_policy();
        debug!(tool = %call.name, version = policy.version, "Evaluating policy");
        self.evaluate_source(&policy.source, call).await
    }

    async fn evaluate_source(
        &self,
        source: &str,
        call: &ToolCall,
    ) -> Result<PolicyDecision, EvaluatorError> {
        match tokio::time::timeout(self.evaluator_timeout, self.evaluator.evaluate(source, call))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(EvaluatorError::Timeout(self.evaluator_timeout)),
        }
    }

    /// Runs `source` against a synthetic benign call.
    pub async fn self_check(&self, source: &str) -> Result<PolicyDecision, PolicyError> {
        let benign = ToolCall::new(SELF_CHECK_TOOL);
        self.evaluate_source(source, &benign).await.map_err(|e| {
            warn!(error = %e, "Policy self-check failed");
            PolicyError::SelfCheckFailed(e.to_string())
        })
    }

    // ==================== Proposals ====================

    /// Self-checks `content` and stores it as a pending proposal.
    ///
    /// Nothing is persisted if the self-check fails.
    pub async fn create_proposal(&self, content: &str) -> Result<Proposal, PolicyError> {
        self.self_check(content).await?;

        let proposal = Proposal::new(Uuid::new_v4().to_string(), content, Utc::now());
        self.store.insert_proposal(&proposal).await?;
        info!(proposal_id = %proposal.id, "Policy proposal created");
        self.proposal_changed(&proposal, "proposal_created");
        Ok(proposal)
    }

    pub async fn list_proposals(&self) -> Result<Vec<Proposal>, PolicyError> {
        Ok(self.store.list_proposals().await?)
    }

    pub async fn get_proposal(&self, id: &str) -> Result<Proposal, PolicyError> {
        self.store
            .get_proposal(id)
            .await?
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))
    }

    /// Self-checks the proposal again, activates it, then marks it approved.
    pub async fn approve_proposal(&self, id: &str) -> Result<Policy, PolicyError> {
        let _serialized = self.proposals.lock().await;
        let mut proposal = self.pending_proposal(id).await?;

        self.self_check(&proposal.content).await?;
        let policy = self.set_policy(&proposal.content).await?;

        proposal.decide(ProposalStatus::Approved, Utc::now());
        self.store.update_proposal(&proposal).await?;
        info!(proposal_id = %id, version = policy.version, "Policy proposal approved");
        self.proposal_changed(&proposal, "proposal_approved");
        Ok(policy)
    }

    /// Marks the proposal rejected without activating it.
    pub async fn reject_proposal(&self, id: &str) -> Result<Proposal, PolicyError> {
        self.close_proposal(id, ProposalStatus::Rejected).await
    }

    /// Marks the proposal withdrawn without activating it.
    pub async fn withdraw_proposal(&self, id: &str) -> Result<Proposal, PolicyError> {
        self.close_proposal(id, ProposalStatus::Withdrawn).await
    }

    async fn close_proposal(
        &self,
        id: &str,
        status: ProposalStatus,
    ) -> Result<Proposal, PolicyError> {
        let _serialized = self.proposals.lock().await;
        let mut proposal = self.pending_proposal(id).await?;
        proposal.decide(status, Utc::now());
        self.store.update_proposal(&proposal).await?;
        info!(proposal_id = %id, status = %status, "Policy proposal closed");
        self.proposal_changed(&proposal, "proposal_closed");
        Ok(proposal)
    }

    async fn pending_proposal(&self, id: &str) -> Result<Proposal, PolicyError> {
        let proposal = self.get_proposal(id).await?;
        if !proposal.is_pending() {
            return Err(PolicyError::NotPending {
                id: id.to_string(),
                status: proposal.status,
            });
        }
        Ok(proposal)
    }

    fn proposal_changed(&self, proposal: &Proposal, event_type: &'static str) {
        self.audit.log(AuditEvent::new(
            event_type,
            json!({ "id": proposal.id, "status": proposal.status }),
        ));
        let _ = self.events.send(PolicyNotification::ProposalChanged {
            id: proposal.id.clone(),
        });
    }
}
