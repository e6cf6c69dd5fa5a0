//! Presentation layer for toolgate
//!
//! This crate contains the CLI definition, console output formatting,
//! and the interactive prompt operators use to approve parked calls.

pub mod approval;
pub mod cli;
pub mod output;

// Re-export commonly used types
pub use approval::{InteractiveApprover, parse_answer};
pub use cli::commands::{Cli, Command};
pub use output::console::ConsoleFormatter;
