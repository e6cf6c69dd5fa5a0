//! In-process tool server
//!
//! [`LocalToolServer`] lets the gateway mount tools that live in its own
//! address space, such as its management surface. It implements the same
//! [`ToolProvider`] interface as a stdio backend, so the compositor treats
//! both alike.
//!
//! # Usage
//!
//! ```ignore
//! let server = LocalToolServer::new("tools").with_tool(
//!     ToolDefinition::new("pending"),
//!     |_args| async move { Ok(ToolResult::text("[]")) },
//! );
//! compositor.mount_in_process("tools", Arc::new(server), false).await?;
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use toolgate_domain::{
    BackendObserver, Handshake, ListKind, ProviderError, ToolCall, ToolDefinition, ToolError,
    ToolProvider, ToolResult,
};

type Handler =
    Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<ToolResult, ToolError>> + Send + Sync>;

struct LocalTool {
    definition: ToolDefinition,
    handler: Handler,
}

/// Tool server whose handlers are async closures.
pub struct LocalToolServer {
    name: String,
    instructions: Option<String>,
    tools: RwLock<BTreeMap<String, LocalTool>>,
    observer: RwLock<Option<Arc<dyn BackendObserver>>>,
    connected: AtomicBool,
}

impl LocalToolServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: None,
            tools: RwLock::new(BTreeMap::new()),
            observer: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a tool (builder form).
    pub fn with_tool<F, Fut>(self, definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        self.insert(definition, handler);
        self
    }

    /// Register or replace a tool at runtime.
    ///
    /// An open server announces the change as `tools` list changed.
    pub fn add_tool<F, Fut>(&self, definition: ToolDefinition, handler: F)
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        self.insert(definition, handler);
        self.notify_list_changed(ListKind::Tools);
    }

    /// Remove a tool. Returns whether it existed.
    pub fn remove_tool(&self, name: &str) -> bool {
        let removed = self
            .tools
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some();
        if removed {
            self.notify_list_changed(ListKind::Tools);
        }
        removed
    }

    pub fn notify_list_changed(&self, kind: ListKind) {
        if let Some(observer) = self.current_observer() {
            observer.on_list_changed(kind);
        }
    }

    pub fn notify_resource_updated(&self, uri: &str) {
        if let Some(observer) = self.current_observer() {
            observer.on_resource_updated(uri);
        }
    }

    fn insert<F, Fut>(&self, definition: ToolDefinition, handler: F)
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args: Map<String, Value>| handler(args).boxed());
        self.tools
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                definition.name.clone(),
                LocalTool {
                    definition,
                    handler,
                },
            );
    }

    fn current_observer(&self) -> Option<Arc<dyn BackendObserver>> {
        if !self.is_connected() {
            return None;
        }
        self.observer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ToolProvider for LocalToolServer {
    fn id(&self) -> &str {
        &self.name
    }

    async fn open(&self, observer: Arc<dyn BackendObserver>) -> Result<Handshake, ProviderError> {
        *self.observer.write().unwrap_or_else(|e| e.into_inner()) = Some(observer);
        self.connected.store(true, Ordering::SeqCst);

        let mut handshake = Handshake::new(&self.name).with_version(env!("CARGO_PKG_VERSION"));
        handshake.instructions = self.instructions.clone();
        handshake.capabilities = json!({ "tools": { "listChanged": true } });
        Ok(handshake)
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.observer.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError> {
        if !self.is_connected() {
            return Err(ProviderError::NotConnected(self.name.clone()));
        }
        Ok(self
            .tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|t| t.definition.clone())
            .collect())
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ProviderError> {
        if !self.is_connected() {
            return Err(ProviderError::NotConnected(self.name.clone()));
        }
        let handler = self
            .tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&call.name)
            .map(|t| Arc::clone(&t.handler))
            .ok_or_else(|| ProviderError::ToolNotFound(call.name.clone()))?;

        handler(call.arguments.clone())
            .await
            .map_err(ProviderError::Rpc)
    }
}
