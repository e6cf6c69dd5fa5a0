//! Domain layer for toolgate
//!
//! This crate contains the core entities and value objects of the gateway.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Mounts
//!
//! A **mount** is a named backend whose tools appear on the aggregated
//! surface as `{mount}_{tool}`. Backends are reached through the
//! [`ToolProvider`] trait, one implementation per transport.
//!
//! ## Decisions
//!
//! Every call is judged by a policy evaluator which returns a [`Decision`]:
//!
//! - **ALLOW**: run it
//! - **ASK**: wait for an operator
//! - **DENY_CONTINUE** / **DENY_ABORT**: refuse it
//!
//! Refusals travel back to the caller as [`ReservedError`]s that no backend
//! is allowed to produce.
//!
//! ## Records
//!
//! Each call leaves a [`ToolCallRecord`] describing what was decided and what
//! ran.

pub mod mount;
pub mod policy;
pub mod record;
pub mod tool;

// Re-export commonly used types
pub use mount::{
    BackendNotification, MountCapabilities, MountError, MountEvent, MountName, MountStatus,
    ServerSpec,
};
pub use policy::{
    Decision, Policy, PolicyDecision, PolicyNotification, Proposal, ProposalStatus, ReservedError,
    STAMP_KEY,
};
pub use record::{
    ApprovalOutcome, CallId, DecisionRecord, ExecutionRecord, RecordError, RecordStatus,
    ToolCallRecord,
};
pub use tool::{
    BackendObserver, Handshake, ListKind, NoopObserver, ProviderError, ToolCall, ToolDefinition,
    ToolError, ToolProvider, ToolResult,
};
