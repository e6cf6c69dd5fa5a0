//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod approval_rendezvous;
pub mod policy_engine;
pub mod policy_gateway;

#[cfg(test)]
pub(crate) mod test_support;
