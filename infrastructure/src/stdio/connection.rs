//! JSON-RPC connection over a pair of byte streams.
//!
//! [`RpcConnection`] owns the read half in a background task and correlates
//! responses to requests through `oneshot` channels. It does not know about
//! processes, so tests can drive it over an in-memory duplex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolgate_domain::tool::value_objects::METHOD_NOT_FOUND;
use toolgate_domain::{BackendObserver, ProviderError};
use tracing::{debug, trace, warn};

use super::protocol::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponseOut, list_changed_kind,
};
use super::transport::{MessageKind, classify_message, read_frame, write_frame};

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// A live JSON-RPC session with one backend.
pub struct RpcConnection {
    label: String,
    writer: Arc<AsyncMutex<Writer>>,
    /// Request-response correlation (request_id -> oneshot sender).
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    _reader_handle: JoinHandle<()>,
}

/// Removes a pending entry when the awaiting request is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl RpcConnection {
    /// Starts the reader task and returns the connection handle.
    pub fn start<R, W>(
        label: impl Into<String>,
        reader: R,
        writer: W,
        observer: Arc<dyn BackendObserver>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let label = label.into();
        let writer: Arc<AsyncMutex<Writer>> = Arc::new(AsyncMutex::new(Box::new(writer)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let reader_handle = tokio::spawn(Self::reader_loop(
            label.clone(),
            BufReader::new(reader),
            Arc::clone(&pending),
            Arc::clone(&writer),
            observer,
            Arc::clone(&alive),
            cancel.clone(),
        ));

        Self {
            label,
            writer,
            pending,
            alive,
            cancel,
            _reader_handle: reader_handle,
        }
    }

    /// Whether the reader task is still running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a request and wait for the correlated response.
    ///
    /// A JSON-RPC error object comes back as [`ProviderError::Rpc`].
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ProviderError> {
        if !self.is_alive() {
            return Err(self.closed());
        }

        let request = JsonRpcRequest::new(method, params);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request.id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: request.id,
        };

        self.send(&request).await?;

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(self.closed()),
            Err(_) => {
                return Err(ProviderError::Transport(format!(
                    "{} timed out after {:?}",
                    method, timeout
                )));
            }
        };

        response.into_result().map_err(ProviderError::Rpc)
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ProviderError> {
        self.send(&JsonRpcNotification::new(method, params)).await
    }

    /// Stops the reader task and fails every outstanding request.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.alive.store(false, Ordering::SeqCst);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn closed(&self) -> ProviderError {
        ProviderError::NotConnected(format!("connection to {} is closed", self.label))
    }

    async fn send<T: Serialize>(&self, message: &T) -> Result<(), ProviderError> {
        let json = serde_json::to_string(message)
            .map_err(|e| ProviderError::Protocol(e.to_string()))?;
        trace!(backend = %self.label, "Sending: {}", json);

        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &json)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }

    /// Background reader loop, the single owner of the read half.
    ///
    /// Runs until the stream closes, an I/O error occurs, or the connection
    /// is shut down. On exit every pending sender is dropped so waiting
    /// requests observe a closed connection.
    async fn reader_loop<R>(
        label: String,
        mut reader: BufReader<R>,
        pending: PendingMap,
        writer: Arc<AsyncMutex<Writer>>,
        observer: Arc<dyn BackendObserver>,
        alive: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) where
        R: AsyncRead + Send + Unpin,
    {
        let mut line = String::new();

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = read_frame(&mut reader, &mut line) => frame,
            };

            let body = match frame {
                Ok(Some(body)) => body,
                Ok(None) => {
                    debug!(backend = %label, "Backend closed its output");
                    break;
                }
                Err(e) => {
                    warn!(backend = %label, "Reader loop: failed to read frame: {}", e);
                    break;
                }
            };

            let json: Value = match serde_json::from_slice(&body) {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        backend = %label,
                        "Failed to parse JSON: {} ({})",
                        e,
                        String::from_utf8_lossy(&body)
                    );
                    continue;
                }
            };
            trace!(backend = %label, "Received: {}", json);

            match classify_message(&json) {
                MessageKind::Response => {
                    let Some(id) = json.get("id").and_then(|v| v.as_u64()) else {
                        continue;
                    };
                    let sender = pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id);
                    match (sender, serde_json::from_value::<JsonRpcResponse>(json)) {
                        (Some(tx), Ok(response)) => {
                            let _ = tx.send(response);
                        }
                        (Some(_), Err(e)) => {
                            warn!(backend = %label, id, "Malformed response: {}", e);
                        }
                        (None, _) => {
                            debug!(backend = %label, id, "Response for unknown request");
                        }
                    }
                }
                MessageKind::IncomingRequest { id } => {
                    let method = json.get("method").and_then(|v| v.as_str()).unwrap_or("");
                    let reply = if method == "ping" {
                        JsonRpcResponseOut::success(id, serde_json::json!({}))
                    } else {
                        debug!(backend = %label, method, "Rejecting backend request");
                        JsonRpcResponseOut::error(
                            id,
                            METHOD_NOT_FOUND,
                            format!("Method not found: {}", method),
                        )
                    };
                    if let Err(e) = Self::write_reply(&writer, &reply).await {
                        warn!(backend = %label, "Failed to answer backend request: {}", e);
                    }
                }
                MessageKind::Notification => {
                    Self::dispatch_notification(&label, &json, observer.as_ref());
                }
            }
        }

        alive.store(false, Ordering::SeqCst);
        pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    async fn write_reply(
        writer: &AsyncMutex<Writer>,
        reply: &JsonRpcResponseOut,
    ) -> std::io::Result<()> {
        let json = serde_json::to_string(reply)?;
        let mut writer = writer.lock().await;
        write_frame(&mut *writer, &json).await
    }

    fn dispatch_notification(label: &str, json: &Value, observer: &dyn BackendObserver) {
        let Some(method) = json.get("method").and_then(|v| v.as_str()) else {
            return;
        };

        if let Some(kind) = list_changed_kind(method) {
            debug!(backend = %label, %kind, "List changed");
            observer.on_list_changed(kind);
        } else if method == "notifications/resources/updated" {
            match json
                .get("params")
                .and_then(|p| p.get("uri"))
                .and_then(|u| u.as_str())
            {
                Some(uri) => observer.on_resource_updated(uri),
                None => warn!(backend = %label, "resources/updated without a uri"),
            }
        } else {
            trace!(backend = %label, method, "Ignoring notification");
        }
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio::sync::mpsc;
    use toolgate_domain::ListKind;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct ChannelObserver(mpsc::UnboundedSender<String>);

    impl BackendObserver for ChannelObserver {
        fn on_list_changed(&self, kind: ListKind) {
            let _ = self.0.send(format!("list:{}", kind));
        }

        fn on_resource_updated(&self, uri: &str) {
            let _ = self.0.send(format!("resource:{}", uri));
        }
    }

    struct FakeBackend {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
        line: String,
    }

    impl FakeBackend {
        async fn next(&mut self) -> Option<Value> {
            let body = read_frame(&mut self.reader, &mut self.line).await.unwrap()?;
            Some(serde_json::from_slice(&body).unwrap())
        }

        async fn send(&mut self, value: Value) {
            write_frame(&mut self.writer, &value.to_string())
                .await
                .unwrap();
        }
    }

    fn connect() -> (RpcConnection, FakeBackend, mpsc::UnboundedReceiver<String>) {
        let (client, server) = tokio::io::duplex(8192);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = RpcConnection::start(
            "fake",
            client_read,
            client_write,
            Arc::new(ChannelObserver(tx)),
        );
        let backend = FakeBackend {
            reader: BufReader::new(server_read),
            writer: server_write,
            line: String::new(),
        };
        (connection, backend, rx)
    }

    #[tokio::test]
    async fn test_request_is_correlated_by_id() {
        let (connection, mut backend, _rx) = connect();

        let server = tokio::spawn(async move {
            let request = backend.next().await.unwrap();
            assert_eq!(request["method"], "tools/list");
            backend
                .send(json!({"jsonrpc": "2.0", "id": request["id"], "result": {"tools": []}}))
                .await;
            backend
        });

        let result = connection
            .request("tools/list", None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(result, json!({"tools": []}));
        server.await.unwrap();
        assert!(connection.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_object_becomes_rpc_error() {
        let (connection, mut backend, _rx) = connect();

        let server = tokio::spawn(async move {
            let request = backend.next().await.unwrap();
            backend
                .send(json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "error": {"code": -32951, "message": "policy_denied_continue"}
                }))
                .await;
            backend
        });

        let err = connection
            .request("tools/call", Some(json!({"name": "x"})), TIMEOUT)
            .await
            .unwrap_err();
        match err {
            ProviderError::Rpc(error) => assert_eq!(error.code, -32951),
            other => panic!("unexpected error: {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_notifications_reach_observer() {
        let (_connection, mut backend, mut rx) = connect();

        backend
            .send(json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}))
            .await;
        backend
            .send(json!({
                "jsonrpc": "2.0",
                "method": "notifications/resources/updated",
                "params": {"uri": "file:///tmp/a%20b.txt"}
            }))
            .await;

        assert_eq!(rx.recv().await.unwrap(), "list:tools");
        assert_eq!(rx.recv().await.unwrap(), "resource:file:///tmp/a%20b.txt");
    }

    #[tokio::test]
    async fn test_ping_is_answered() {
        let (_connection, mut backend, _rx) = connect();

        backend
            .send(json!({"jsonrpc": "2.0", "id": 99, "method": "ping"}))
            .await;
        let reply = backend.next().await.unwrap();
        assert_eq!(reply["id"], 99);
        assert_eq!(reply["result"], json!({}));

        backend
            .send(json!({"jsonrpc": "2.0", "id": 100, "method": "sampling/createMessage"}))
            .await;
        let reply = backend.next().await.unwrap();
        assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_closed_stream_fails_pending_request() {
        let (connection, mut backend, _rx) = connect();

        let server = tokio::spawn(async move {
            backend.next().await.unwrap();
            drop(backend);
        });

        let err = connection
            .request("tools/list", None, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConnected(_)));
        server.await.unwrap();

        let err = connection
            .request("tools/list", None, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let (connection, _backend, _rx) = connect();
        let err = connection
            .request("tools/list", None, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport(msg) if msg.contains("timed out")));
        assert!(connection.pending.lock().unwrap().is_empty());
    }
}
