//! Tool domain module
//!
//! Core abstractions for the tools exposed through the gateway: what a tool
//! looks like ([`ToolDefinition`]), how it is invoked ([`ToolCall`]), what
//! comes back ([`ToolResult`] / [`ToolError`]), and who serves it
//! ([`ToolProvider`]).
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ToolDefinition│───▶│  ToolCall    │───▶│ ToolResult   │
//! │ (tools/list) │    │ (invocation) │    │ or ToolError │
//! └──────────────┘    └──────────────┘    └──────────────┘
//! ```

pub mod entities;
pub mod provider;
pub mod value_objects;

pub use entities::{Handshake, ToolCall, ToolDefinition};
pub use provider::{BackendObserver, ListKind, NoopObserver, ProviderError, ToolProvider};
pub use value_objects::{ToolError, ToolResult};
