//! Operator-facing approval of parked tool calls

pub mod prompt;

pub use prompt::{InteractiveApprover, parse_answer};
