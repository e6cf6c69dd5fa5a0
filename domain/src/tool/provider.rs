//! Tool provider abstraction
//!
//! This module defines the [`ToolProvider`] trait, the closed interface every
//! mounted backend implements, whether it lives in a child process or in the
//! gateway's own address space.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Compositor                            │
//! │   (mount registry, `{mount}_{tool}` routing, enumeration)   │
//! └─────────────────────────────────────────────────────────────┘
//!           │                    │                    │
//!           ▼                    ▼                    ▼
//!    ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//!    │    Stdio     │     │    Stdio     │     │  In-process  │
//!    │   Provider   │     │   Provider   │     │ LocalServer  │
//!    └──────────────┘     └──────────────┘     └──────────────┘
//!      mount: git           mount: fs           mount: meta (pinned)
//! ```
//!
//! The provider is selected when the mount is created; the compositor never
//! inspects which implementation it holds.
//!
//! # Notifications
//!
//! Backends push change notifications at any time. The compositor hands each
//! provider a [`BackendObserver`] bound to the mount name when it calls
//! [`ToolProvider::open`], so every event is attributed to its origin without
//! the provider knowing its own mount name.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::entities::{Handshake, ToolCall, ToolDefinition};
use super::value_objects::{ToolError, ToolResult};

/// Error type for tool provider operations
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Provider has not been opened, or the connection is gone
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Failed to start or talk to the backend
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend sent something that is not valid protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Backend answered with a JSON-RPC error object
    #[error("Backend error {}: {}", .0.code, .0.message)]
    Rpc(ToolError),

    /// Tool not found in this provider
    #[error("Tool not found: {0}")]
    ToolNotFound(String),
}

impl ProviderError {
    /// Structured form of this error for returning to a caller.
    pub fn to_tool_error(&self) -> ToolError {
        match self {
            ProviderError::Rpc(error) => error.clone(),
            ProviderError::ToolNotFound(name) => ToolError::not_found(name),
            other => ToolError::internal(other.to_string()),
        }
    }
}

/// Which capability list a backend reported as changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Tools,
    Resources,
    Prompts,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Tools => "tools",
            ListKind::Resources => "resources",
            ListKind::Prompts => "prompts",
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives change notifications pushed by a backend.
///
/// Called from the provider's reader task, so implementations must not block.
pub trait BackendObserver: Send + Sync {
    /// A capability list changed on the backend
    fn on_list_changed(&self, kind: ListKind);

    /// A subscribed resource changed. `uri` is passed through verbatim.
    fn on_resource_updated(&self, uri: &str);
}

/// Observer that discards every notification
pub struct NoopObserver;

impl BackendObserver for NoopObserver {
    fn on_list_changed(&self, _kind: ListKind) {}
    fn on_resource_updated(&self, _uri: &str) {}
}

/// Tool provider abstraction, one per mounted backend
///
/// Implementations:
/// - `StdioToolProvider`: JSON-RPC over a child process's stdio
/// - `LocalToolServer`: in-process handlers, used for pinned mounts and tests
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Short label for logs (e.g. "stdio:git-server", "local:meta")
    fn id(&self) -> &str;

    /// Open the connection and perform the capability handshake.
    ///
    /// `observer` receives every notification the backend sends afterwards.
    async fn open(&self, observer: Arc<dyn BackendObserver>) -> Result<Handshake, ProviderError>;

    /// Close the connection. Idempotent.
    async fn close(&self);

    /// Whether the connection is currently usable
    fn is_connected(&self) -> bool;

    /// List the backend's tools under their backend-local names
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError>;

    /// Call a tool by its backend-local name
    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A mock provider for testing
    struct MockProvider {
        tools: Vec<ToolDefinition>,
        connected: AtomicBool,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                tools: Vec::new(),
                connected: AtomicBool::new(false),
            }
        }

        fn with_tool(mut self, name: &str) -> Self {
            self.tools.push(ToolDefinition::new(name));
            self
        }
    }

    #[async_trait]
    impl ToolProvider for MockProvider {
        fn id(&self) -> &str {
            "mock"
        }

        async fn open(
            &self,
            observer: Arc<dyn BackendObserver>,
        ) -> Result<Handshake, ProviderError> {
            self.connected.store(true, Ordering::SeqCst);
            observer.on_list_changed(ListKind::Tools);
            Ok(Handshake::new("mock"))
        }

        async fn close(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError> {
            if !self.is_connected() {
                return Err(ProviderError::NotConnected("mock".into()));
            }
            Ok(self.tools.clone())
        }

        async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ProviderError> {
            if self.tools.iter().any(|t| t.name == call.name) {
                Ok(ToolResult::text("Mock output"))
            } else {
                Err(ProviderError::ToolNotFound(call.name.clone()))
            }
        }
    }

    #[tokio::test]
    async fn test_provider_lifecycle() {
        let provider = MockProvider::new().with_tool("tool_a").with_tool("tool_b");

        assert!(provider.list_tools().await.is_err());

        let handshake = provider.open(Arc::new(NoopObserver)).await.unwrap();
        assert_eq!(handshake.server_name, "mock");
        assert!(provider.is_connected());
        assert_eq!(provider.list_tools().await.unwrap().len(), 2);

        provider.close().await;
        assert!(!provider.is_connected());
    }

    #[tokio::test]
    async fn test_provider_unknown_tool() {
        let provider = MockProvider::new().with_tool("read_file");
        provider.open(Arc::new(NoopObserver)).await.unwrap();

        let result = provider.call_tool(&ToolCall::new("read_file")).await;
        assert!(result.unwrap().is_success());

        let err = provider.call_tool(&ToolCall::new("nope")).await.unwrap_err();
        assert!(matches!(err, ProviderError::ToolNotFound(ref n) if n == "nope"));
    }

    #[test]
    fn test_provider_error_to_tool_error() {
        let rpc = ProviderError::Rpc(ToolError::new(-32000, "boom"));
        assert_eq!(rpc.to_tool_error().code, -32000);
        assert_eq!(rpc.to_string(), "Backend error -32000: boom");

        let transport = ProviderError::Transport("pipe closed".into());
        assert_eq!(transport.to_tool_error().code, crate::tool::value_objects::INTERNAL_ERROR);
    }

    #[test]
    fn test_list_kind_serialization() {
        assert_eq!(serde_json::to_string(&ListKind::Resources).unwrap(), "\"resources\"");
        assert_eq!(ListKind::Prompts.to_string(), "prompts");
    }
}
