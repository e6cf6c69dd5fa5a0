//! Application layer for toolgate
//!
//! This crate contains use cases, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::GatewayParams;
pub use ports::{
    audit_logger::{AuditEvent, AuditLogger, NoAuditLogger},
    policy_evaluator::{EvaluatorError, FixedDecisionEvaluator, PolicyEvaluator},
    record_store::{RecordStore, StoreError},
    tool_surface::ToolSurface,
};
pub use use_cases::approval_rendezvous::{ApprovalRendezvous, RendezvousError, Resolution};
pub use use_cases::policy_engine::{PolicyEngine, PolicyError};
pub use use_cases::policy_gateway::{GatewayError, PolicyGateway};
