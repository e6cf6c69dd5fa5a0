//! Policy gateway: every tool call passes through here.
//!
//! The gateway is the only component allowed to emit the reserved decision
//! errors. For each call it:
//!
//! 1. persists a PENDING [`ToolCallRecord`] under a fresh call id,
//! 2. asks the [`PolicyEngine`] for a decision,
//! 3. enforces it:
//!
//! ```text
//!            ┌─ ALLOW ──────────────────────────────▶ forward ─▶ COMPLETED
//! evaluate ──┼─ ASK ─▶ rendezvous ─┬─ Continue ─────▶ forward ─▶ COMPLETED
//!            │                     ├─ Abort ────────▶ ABORTED
//!            │                     └─ DenyContinue ─▶ DENIED
//!            ├─ DENY_ABORT ───────────────────────────────────▶ ABORTED
//!            ├─ DENY_CONTINUE ────────────────────────────────▶ DENIED
//!            └─ evaluator error ──────────────────────────────▶ FAILED
//! ```
//!
//! The decision is always persisted before the call is forwarded. If a
//! backend answers with something shaped like a reserved error, the caller
//! gets [`GatewayError::ReservedCodeMisuse`] instead, so a backend can never
//! impersonate a real denial.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{Map, Value, json};
use thiserror::Error;
use toolgate_domain::policy::reserved;
use toolgate_domain::{
    ApprovalOutcome, CallId, Decision, ReservedError, ToolCall, ToolCallRecord, ToolError,
    ToolResult,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::approval_rendezvous::{ApprovalRendezvous, Resolution};
use super::policy_engine::PolicyEngine;
use crate::config::GatewayParams;
use crate::ports::audit_logger::{AuditEvent, AuditLogger, NoAuditLogger};
use crate::ports::record_store::{RecordStore, StoreError};
use crate::ports::tool_surface::ToolSurface;

/// Failure reason recorded for calls whose caller went away.
const CANCELLED_REASON: &str = "cancelled";

/// Why a gated call did not produce a result.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The policy or an operator refused the call
    #[error("Policy denied '{name}' ({decision}): {}", reason.as_deref().unwrap_or("no reason given"))]
    Denied {
        decision: Decision,
        name: String,
        reason: Option<String>,
    },

    /// The evaluator failed; no decision was made
    #[error("Policy evaluator failed for '{name}': {reason}")]
    EvaluatorFailed { name: String, reason: String },

    /// A backend produced a reserved error shape
    #[error("Backend for '{name}' emitted a reserved policy error")]
    ReservedCodeMisuse {
        name: String,
        backend_code: Option<i64>,
    },

    /// Ordinary backend or routing error, passed through unchanged
    #[error("{0}")]
    Backend(ToolError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// Broken internal invariant; never a denial
    #[error("Internal error for '{name}': {reason}")]
    Internal { name: String, reason: String },
}

impl GatewayError {
    /// Whether the agent's turn should stop
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            GatewayError::Denied {
                decision: Decision::DenyAbort,
                ..
            } | GatewayError::Internal { .. }
        )
    }

    /// JSON-RPC error object returned to the original caller.
    pub fn to_tool_error(&self) -> ToolError {
        match self {
            GatewayError::Denied {
                decision,
                name,
                reason,
            } => {
                let kind = match decision {
                    Decision::DenyContinue => ReservedError::DenyContinue,
                    _ => ReservedError::DenyAbort,
                };
                kind.to_tool_error(object(json!({
                    "decision": decision.as_str(),
                    "name": name,
                    "reason": reason,
                })))
            }
            GatewayError::EvaluatorFailed { name, reason } => ReservedError::EvaluatorError
                .to_tool_error(object(json!({ "name": name, "reason": reason }))),
            GatewayError::ReservedCodeMisuse { name, backend_code } => {
                ReservedError::ReservedMisuse.to_tool_error(object(json!({
                    "name": name,
                    "backend_code": backend_code,
                })))
            }
            GatewayError::Backend(error) => error.clone(),
            GatewayError::Store(e) => ToolError::internal(format!("internal_error: {}", e)),
            GatewayError::Internal { name, reason } => {
                ToolError::internal(format!("internal_error: {}", reason))
                    .with_data(json!({ "name": name, "reason": reason }))
            }
        }
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Intercepts tool calls and enforces policy decisions.
pub struct PolicyGateway {
    surface: Arc<dyn ToolSurface>,
    engine: Arc<PolicyEngine>,
    rendezvous: Arc<ApprovalRendezvous>,
    store: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLogger>,
    params: GatewayParams,
    inflight: Arc<Mutex<HashMap<CallId, String>>>,
}

impl PolicyGateway {
    pub fn new(
        surface: Arc<dyn ToolSurface>,
        engine: Arc<PolicyEngine>,
        rendezvous: Arc<ApprovalRendezvous>,
        store: Arc<dyn RecordStore>,
        params: GatewayParams,
    ) -> Self {
        Self {
            surface,
            engine,
            rendezvous,
            store,
            audit: Arc::new(NoAuditLogger),
            params,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// Number of calls currently forwarded to a backend
    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn has_inflight_calls(&self) -> bool {
        self.inflight_count() > 0
    }

    /// Gate and (if allowed) execute one call.
    pub async fn call_tool(&self, call: ToolCall) -> Result<ToolResult, GatewayError> {
        let call_id = CallId::new(Uuid::new_v4().to_string());
        let mut record = ToolCallRecord::new(call_id.clone(), &self.params.agent_id, call.clone());
        if let Some(run_id) = &self.params.run_id {
            record = record.with_run_id(run_id);
        }
        self.store.insert_record(&record).await?;
        self.log_record("call_pending", &record);

        let mut guard = RecordGuard {
            store: Arc::clone(&self.store),
            audit: Arc::clone(&self.audit),
            call_id: call_id.clone(),
            armed: true,
        };
        let result = self.gate(&call_id, call).await;
        guard.armed = false;
        result
    }

    async fn gate(&self, call_id: &CallId, call: ToolCall) -> Result<ToolResult, GatewayError> {
        let call_id = call_id.clone();
        let decision = match self.engine.evaluate(&call).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(call_id = %call_id, tool = %call.name, error = %e, "Policy evaluator error");
                let reason = e.to_string();
                self.decide(&call_id, ApprovalOutcome::EvaluatorError, Some(reason.clone()))
                    .await?;
                return Err(GatewayError::EvaluatorFailed {
                    name: call.name,
                    reason,
                });
            }
        };
        debug!(
            call_id = %call_id,
            tool = %call.name,
            decision = %decision.decision,
            rationale = decision.rationale.as_deref().unwrap_or(""),
            "Policy decision"
        );

        match decision.decision {
            Decision::Allow => {
                self.decide(&call_id, ApprovalOutcome::PolicyAllow, decision.rationale)
                    .await?;
                self.execute(&call_id, &call).await
            }
            Decision::DenyAbort => {
                self.deny(&call_id, call, Decision::DenyAbort, ApprovalOutcome::PolicyDenyAbort, decision.rationale)
                    .await
            }
            Decision::DenyContinue => {
                self.deny(&call_id, call, Decision::DenyContinue, ApprovalOutcome::PolicyDenyContinue, decision.rationale)
                    .await
            }
            Decision::Ask => self.ask(&call_id, call).await,
        }
    }

    async fn ask(&self, call_id: &CallId, call: ToolCall) -> Result<ToolResult, GatewayError> {
        match self.rendezvous.await_decision(call_id, &call).await {
            Ok(Resolution::Continue { reason }) => {
                self.decide(call_id, ApprovalOutcome::UserApprove, reason).await?;
                self.execute(call_id, &call).await
            }
            Ok(Resolution::Abort { reason }) => {
                self.deny(call_id, call, Decision::DenyAbort, ApprovalOutcome::UserDenyAbort, reason)
                    .await
            }
            Ok(Resolution::DenyContinue { reason }) => {
                self.deny(call_id, call, Decision::DenyContinue, ApprovalOutcome::UserDenyContinue, reason)
                    .await
            }
            Err(e) => {
                error!(call_id = %call_id, tool = %call.name, error = %e, "Approval ended without a resolution");
                let reason = e.to_string();
                self.decide(call_id, ApprovalOutcome::InternalError, Some(reason.clone()))
                    .await?;
                Err(GatewayError::Internal {
                    name: call.name,
                    reason,
                })
            }
        }
    }

    async fn deny(
        &self,
        call_id: &CallId,
        call: ToolCall,
        decision: Decision,
        outcome: ApprovalOutcome,
        reason: Option<String>,
    ) -> Result<ToolResult, GatewayError> {
        self.decide(call_id, outcome, reason.clone()).await?;
        info!(call_id = %call_id, tool = %call.name, decision = %decision, "Call denied");
        Err(GatewayError::Denied {
            decision,
            name: call.name,
            reason,
        })
    }

    async fn decide(
        &self,
        call_id: &CallId,
        outcome: ApprovalOutcome,
        reason: Option<String>,
    ) -> Result<(), GatewayError> {
        let record = self
            .store
            .record_decision(call_id, outcome, reason, Utc::now())
            .await?;
        self.log_record("call_decided", &record);
        Ok(())
    }

    /// Forward an approved call and record what came back.
    async fn execute(&self, call_id: &CallId, call: &ToolCall) -> Result<ToolResult, GatewayError> {
        let outcome = {
            let _inflight = InflightGuard::track(&self.inflight, call_id, &call.name);
            self.surface.call_tool(call).await
        };

        let (output, result) = match outcome {
            Ok(result) => {
                let output = serde_json::to_value(&result).unwrap_or(Value::Null);
                match misuse_in_result(&call.name, &result) {
                    Some(misuse) => (output, Err(misuse)),
                    None => (output, Ok(result)),
                }
            }
            Err(backend_error) => {
                let output = json!({ "error": backend_error });
                (output, Err(remap_backend_error(&call.name, backend_error)))
            }
        };

        if let Err(GatewayError::ReservedCodeMisuse { backend_code, .. }) = &result {
            warn!(call_id = %call_id, tool = %call.name, backend_code = ?backend_code, "Backend emitted a reserved policy error");
        }

        let record = self
            .store
            .record_execution(call_id, output, Utc::now())
            .await?;
        self.log_record("call_completed", &record);
        result
    }

    fn log_record(&self, event_type: &'static str, record: &ToolCallRecord) {
        let payload = serde_json::to_value(record).unwrap_or(Value::Null);
        self.audit.log(AuditEvent::new(event_type, payload));
    }
}

fn remap_backend_error(name: &str, backend_error: ToolError) -> GatewayError {
    match reserved::detect(&backend_error) {
        Some(_) => GatewayError::ReservedCodeMisuse {
            name: name.to_string(),
            backend_code: Some(backend_error.code),
        },
        None => GatewayError::Backend(backend_error),
    }
}

/// Error results (`is_error`) are checked for reserved shapes too.
fn misuse_in_result(name: &str, result: &ToolResult) -> Option<GatewayError> {
    if !result.is_error {
        return None;
    }
    if let Some(embedded) = result.embedded_error()
        && reserved::detect(&embedded).is_some()
    {
        return Some(GatewayError::ReservedCodeMisuse {
            name: name.to_string(),
            backend_code: Some(embedded.code),
        });
    }
    ReservedError::find_in_text(&result.text_content()).map(|_| GatewayError::ReservedCodeMisuse {
        name: name.to_string(),
        backend_code: None,
    })
}

/// Fails the record of a call whose future was dropped before it finished.
struct RecordGuard {
    store: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLogger>,
    call_id: CallId,
    armed: bool,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(call_id = %self.call_id, "Call cancelled outside a runtime, record left open");
            return;
        };
        let store = Arc::clone(&self.store);
        let audit = Arc::clone(&self.audit);
        let call_id = self.call_id.clone();
        handle.spawn(async move {
            match store.record_failure(&call_id, CANCELLED_REASON.to_string(), Utc::now()).await {
                Ok(record) => {
                    info!(call_id = %call_id, tool = %record.tool_call.name, "Call cancelled");
                    let payload = serde_json::to_value(&record).unwrap_or(Value::Null);
                    audit.log(AuditEvent::new("call_cancelled", payload));
                }
                Err(e) => warn!(call_id = %call_id, error = %e, "Could not close cancelled call record"),
            }
        });
    }
}

struct InflightGuard {
    inflight: Arc<Mutex<HashMap<CallId, String>>>,
    call_id: CallId,
}

impl InflightGuard {
    fn track(inflight: &Arc<Mutex<HashMap<CallId, String>>>, call_id: &CallId, tool: &str) -> Self {
        inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(call_id.clone(), tool.to_string());
        Self {
            inflight: Arc::clone(inflight),
            call_id: call_id.clone(),
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.call_id);
    }
}
