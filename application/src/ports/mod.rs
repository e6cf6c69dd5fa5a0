//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod audit_logger;
pub mod policy_evaluator;
pub mod record_store;
pub mod tool_surface;
