//! Application-level configuration.
//!
//! - [`GatewayParams`]: agent identity, evaluator timeout and default policy

pub mod gateway_params;

pub use gateway_params::{DEFAULT_POLICY_SOURCE, GatewayParams, SELF_CHECK_TOOL};
