//! Port for the structured audit trail.
//!
//! Defines the [`AuditLogger`] trait for recording gateway events (record
//! transitions, policy activations, proposal decisions) to a structured log.
//!
//! This is separate from `tracing`-based operation logs: tracing handles
//! human-readable diagnostic messages, while this port captures a
//! machine-readable trail (JSONL) of what the gateway decided.

use serde_json::Value;

/// A structured audit event.
pub struct AuditEvent {
    /// Event type identifier (e.g., "call_pending", "call_decided", "policy_set").
    pub event_type: &'static str,
    /// JSON payload with event-specific data.
    pub payload: Value,
}

impl AuditEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}

/// Port for logging audit events.
///
/// Synchronous and non-fallible: a logging failure must never change the
/// outcome of a tool call, so implementations swallow their own errors.
pub trait AuditLogger: Send + Sync {
    fn log(&self, event: AuditEvent);
}

/// No-op implementation for tests and when auditing is disabled.
pub struct NoAuditLogger;

impl AuditLogger for NoAuditLogger {
    fn log(&self, _event: AuditEvent) {}
}
