//! Policy domain module
//!
//! - [`Decision`] / [`PolicyDecision`]: the evaluator's verdict on a call
//! - [`reserved`]: error codes only the gateway may emit
//! - [`Policy`] / [`Proposal`]: the active policy and pending changes
//! - [`PolicyNotification`]: approval and policy change events

pub mod decision;
pub mod entities;
pub mod events;
pub mod reserved;

pub use decision::{Decision, PolicyDecision};
pub use entities::{Policy, Proposal, ProposalStatus};
pub use events::PolicyNotification;
pub use reserved::{ReservedError, STAMP_KEY};
