//! Tool provider backed by a child process speaking JSON-RPC on stdio.

use std::process::Stdio;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::BufWriter;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use toolgate_domain::{
    BackendObserver, Handshake, ProviderError, ServerSpec, ToolCall, ToolDefinition, ToolProvider,
    ToolResult,
};
use tracing::{debug, info, warn};

use super::connection::RpcConnection;
use super::protocol::{
    InitializeResult, ListToolsResult, call_tool_params, initialize_params, list_tools_params,
    parse_call_result,
};

/// Default bound on any single request to the backend.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on `tools/list` pages followed per enumeration.
const MAX_LIST_PAGES: usize = 64;

/// Stdio backend.
///
/// The process is spawned by [`open`](ToolProvider::open) and killed by
/// [`close`](ToolProvider::close) or on drop. On Linux the child also gets
/// `PR_SET_PDEATHSIG` so it dies with the gateway even when Drop never runs.
pub struct StdioToolProvider {
    id: String,
    spec: ServerSpec,
    request_timeout: Duration,
    connection: RwLock<Option<Arc<RpcConnection>>>,
    child: Mutex<Option<Child>>,
}

impl StdioToolProvider {
    pub fn new(id: impl Into<String>, spec: ServerSpec) -> Self {
        Self {
            id: id.into(),
            spec,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connection: RwLock::new(None),
            child: Mutex::new(None),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn spec(&self) -> &ServerSpec {
        &self.spec
    }

    fn connection(&self) -> Result<Arc<RpcConnection>, ProviderError> {
        self.connection
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .filter(|c| c.is_alive())
            .ok_or_else(|| ProviderError::NotConnected(self.id.clone()))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.spec.command);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &self.spec.cwd {
            cmd.current_dir(cwd);
        }

        // Linux: request kernel to send SIGTERM to child when parent dies.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        cmd
    }

    async fn initialize(&self, connection: &RpcConnection) -> Result<Handshake, ProviderError> {
        let result = connection
            .request("initialize", Some(initialize_params()), self.request_timeout)
            .await?;
        let handshake = serde_json::from_value::<InitializeResult>(result)
            .map_err(|e| ProviderError::Protocol(format!("invalid initialize result: {}", e)))?
            .into_handshake();
        connection
            .notify("notifications/initialized", None)
            .await?;
        Ok(handshake)
    }
}

#[async_trait]
impl ToolProvider for StdioToolProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn open(&self, observer: Arc<dyn BackendObserver>) -> Result<Handshake, ProviderError> {
        let mut child_slot = self.child.lock().await;
        if child_slot.is_some() {
            return Err(ProviderError::Transport(format!(
                "{} is already open",
                self.id
            )));
        }

        debug!(backend = %self.id, command = %self.spec.command, "Spawning backend");
        let mut child = self.command().spawn().map_err(|e| {
            ProviderError::Transport(format!("failed to spawn '{}': {}", self.spec.command, e))
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill().await;
            return Err(ProviderError::Transport("failed to capture stdio".into()));
        };

        let connection = Arc::new(RpcConnection::start(
            self.id.clone(),
            stdout,
            BufWriter::new(stdin),
            observer,
        ));

        let handshake = match self.initialize(&connection).await {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!(backend = %self.id, "Handshake failed: {}", e);
                connection.shutdown();
                let _ = child.kill().await;
                return Err(e);
            }
        };

        info!(
            backend = %self.id,
            server = %handshake.server_name,
            version = handshake.server_version.as_deref().unwrap_or("-"),
            "Backend initialized"
        );

        *self.connection.write().unwrap_or_else(|e| e.into_inner()) = Some(connection);
        *child_slot = Some(child);
        Ok(handshake)
    }

    async fn close(&self) {
        if let Some(connection) = self
            .connection
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            connection.shutdown();
        }
        if let Some(mut child) = self.child.lock().await.take() {
            debug!(backend = %self.id, "Killing backend process");
            let _ = child.kill().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.connection().is_ok()
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ProviderError> {
        let connection = self.connection()?;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let result = connection
                .request(
                    "tools/list",
                    list_tools_params(cursor.as_deref()),
                    self.request_timeout,
                )
                .await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| ProviderError::Protocol(format!("invalid tools/list result: {}", e)))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }

        warn!(backend = %self.id, "tools/list exceeded {} pages", MAX_LIST_PAGES);
        Ok(tools)
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ProviderError> {
        let connection = self.connection()?;
        let result = connection
            .request(
                "tools/call",
                Some(call_tool_params(&call.name, &call.arguments)),
                self.request_timeout,
            )
            .await?;
        parse_call_result(result)
            .map_err(|e| ProviderError::Protocol(format!("invalid tools/call result: {}", e)))
    }
}

impl Drop for StdioToolProvider {
    fn drop(&mut self) {
        if let Some(child) = self.child.get_mut().as_mut() {
            debug!(backend = %self.id, "StdioToolProvider dropping, killing child process");
            let _ = child.start_kill();
        }
    }
}
