//! Tool surface port.
//!
//! The aggregated surface the gateway forwards approved calls into. Errors
//! come back as JSON-RPC style [`ToolError`]s so the gateway can inspect a
//! backend's code, message and data uniformly.

use async_trait::async_trait;
use toolgate_domain::{ToolCall, ToolError, ToolResult};

#[async_trait]
pub trait ToolSurface: Send + Sync {
    /// Call a tool by its exposed `{mount}_{tool}` name.
    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ToolError>;
}
