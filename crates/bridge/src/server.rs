//! Request Bridge - The Tool-Server Side of the Transport
//!
//! Design decisions:
//! 1. One listening socket, at most one live peer (one browser, one session)
//! 2. Request/response matching via correlation ID - arrival order is free
//! 3. Fail fast when no peer is attached - no queuing for future connections
//! 4. Peer disconnect does NOT fail pending requests; their own timers do.
//!    This bounds the caller-visible error window to the configured timeout
//!    instead of compounding it with an immediate secondary failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::port::{self, PortError};
use crate::protocol::{self, Action, Envelope, RequestEnvelope, ResponseEnvelope, StatusEnvelope};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;
type Settled = std::result::Result<ResponseEnvelope, BridgeError>;
type PendingTable = DashMap<String, oneshot::Sender<Settled>>;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("port allocation failed: {0}")]
    Port(#[from] PortError),

    #[error("no extension connected")]
    NotConnected,

    #[error("request {id} timed out after {timeout_ms}ms")]
    Timeout { id: String, timeout_ms: u64 },

    #[error("extension error [{code}]: {message}")]
    Remote { code: String, message: String },

    #[error("bridge shut down while request was in flight")]
    Shutdown,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_port: u16,
    pub port_range: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_port: port::DEFAULT_BASE_PORT,
            port_range: port::DEFAULT_PORT_RANGE,
        }
    }
}

/// Live peer connection. The generation tag lets a stale reader tell that
/// a newer peer already replaced it, so its shutdown must not clear the slot.
struct PeerConnection {
    sink: WsSink,
    generation: u64,
}

/// Request Bridge - owns the listener, the single peer slot, and the
/// pending-request table.
pub struct RequestBridge {
    config: BridgeConfig,
    pending: Arc<PendingTable>,
    conn: Arc<RwLock<Option<PeerConnection>>>,
    status: Arc<RwLock<Option<StatusEnvelope>>>,
    conn_seq: Arc<AtomicU64>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    port: RwLock<Option<u16>>,
}

impl RequestBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            pending: Arc::new(DashMap::new()),
            conn: Arc::new(RwLock::new(None)),
            status: Arc::new(RwLock::new(None)),
            conn_seq: Arc::new(AtomicU64::new(0)),
            accept_task: Mutex::new(None),
            port: RwLock::new(None),
        }
    }

    /// Bind a listener via the port allocator and start accepting peers.
    /// Resolves once listening, with the bound port. Bind failure - including
    /// range exhaustion - propagates as an error.
    pub async fn start(&self) -> Result<u16> {
        let listener = port::bind_first_free(self.config.base_port, self.config.port_range)?;
        let local_port = listener
            .local_addr()
            .map_err(PortError::Listener)?
            .port();

        let conn = Arc::clone(&self.conn);
        let pending = Arc::clone(&self.pending);
        let status = Arc::clone(&self.status);
        let conn_seq = Arc::clone(&self.conn_seq);

        let handle = tokio::spawn(async move {
            loop {
                let (stream, peer_addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!("Accept failed: {}", err);
                        continue;
                    }
                };
                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(err) => {
                        tracing::warn!("WebSocket handshake failed: {}", err);
                        continue;
                    }
                };
                tracing::info!("Extension connected from {}", peer_addr);

                let (sink, ws_stream) = ws.split();
                let generation = conn_seq.fetch_add(1, Ordering::Relaxed) + 1;
                // Replacing the slot invalidates sending on the old peer but
                // leaves its pending requests to their own timeouts.
                *conn.write().await = Some(PeerConnection { sink, generation });

                tokio::spawn(read_loop(
                    ws_stream,
                    generation,
                    Arc::clone(&conn),
                    Arc::clone(&pending),
                    Arc::clone(&status),
                ));
            }
        });

        *self.accept_task.lock().await = Some(handle);
        *self.port.write().await = Some(local_port);
        tracing::info!("Request bridge listening on port {}", local_port);
        Ok(local_port)
    }

    /// Bound port, once `start()` has resolved.
    pub async fn port(&self) -> Option<u16> {
        *self.port.read().await
    }

    /// Whether a peer is currently attached.
    pub async fn is_connected(&self) -> bool {
        self.conn.read().await.is_some()
    }

    /// Last status announcement received from the extension.
    pub async fn extension_status(&self) -> Option<StatusEnvelope> {
        self.status.read().await.clone()
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send a request to the connected extension and await its response.
    ///
    /// Fails immediately with `NotConnected` when no peer is attached - a
    /// request is never queued for a future connection. A response that
    /// arrives after the timeout finds no pending entry and is dropped.
    pub async fn request(
        &self,
        action: Action,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let envelope = RequestEnvelope::new(action, params);
        let id = envelope.id.clone();
        let text = protocol::encode(&Envelope::Request(envelope))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.conn.write().await;
            let peer = guard.as_mut().ok_or(BridgeError::NotConnected)?;
            self.pending.insert(id.clone(), tx);
            if let Err(err) = peer.sink.send(Message::Text(text)).await {
                self.pending.remove(&id);
                return Err(err.into());
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(settled)) => {
                let response = settled?;
                if response.success {
                    Ok(response.data.unwrap_or(Value::Null))
                } else {
                    let info = response.error.unwrap_or_else(|| protocol::ErrorInfo {
                        code: "UNKNOWN".to_string(),
                        message: "remote error with no detail".to_string(),
                    });
                    Err(BridgeError::Remote {
                        code: info.code,
                        message: info.message,
                    })
                }
            }
            // Sender dropped without settling: table was cleared by stop().
            Ok(Err(_)) => Err(BridgeError::Shutdown),
            Err(_) => {
                self.pending.remove(&id);
                Err(BridgeError::Timeout {
                    id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Stop the bridge: reject all pending requests with a shutdown error,
    /// close the peer connection and the listener. Resolves only once the
    /// accept loop has fully terminated.
    pub async fn stop(&self) {
        if let Some(handle) = self.accept_task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }

        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(BridgeError::Shutdown));
            }
        }

        if let Some(mut peer) = self.conn.write().await.take() {
            let _ = peer.sink.close().await;
        }
        *self.port.write().await = None;
        *self.status.write().await = None;
        tracing::info!("Request bridge stopped");
    }
}

/// Per-connection reader: routes responses into the pending table and
/// status frames into the status slot until the peer goes away.
async fn read_loop(
    mut stream: WsStream,
    generation: u64,
    conn: Arc<RwLock<Option<PeerConnection>>>,
    pending: Arc<PendingTable>,
    status: Arc<RwLock<Option<StatusEnvelope>>>,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(&text, &pending, &status).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!("Peer read error: {}", err);
                break;
            }
        }
    }

    // Clear the slot only if it still belongs to this connection; pending
    // requests are intentionally left to ride out their own timeouts.
    let mut guard = conn.write().await;
    if guard
        .as_ref()
        .is_some_and(|peer| peer.generation == generation)
    {
        *guard = None;
        *status.write().await = None;
        tracing::info!("Extension disconnected");
    }
}

async fn handle_frame(
    text: &str,
    pending: &PendingTable,
    status: &RwLock<Option<StatusEnvelope>>,
) {
    match protocol::decode(text) {
        Some(Envelope::Response(response)) => {
            if let Some((_, tx)) = pending.remove(&response.id) {
                let _ = tx.send(Ok(response));
            } else {
                tracing::debug!(
                    "Dropping response for unknown or expired request {}",
                    response.id
                );
            }
        }
        Some(Envelope::Status(announcement)) => {
            tracing::debug!(
                "Extension status: connected={} tab={:?}",
                announcement.connected,
                announcement.active_tab.as_ref().map(|tab| tab.id)
            );
            *status.write().await = Some(announcement);
        }
        Some(Envelope::Request(request)) => {
            tracing::warn!("Ignoring unexpected request {} from peer", request.id);
        }
        None => {} // decode already logged the drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TabInfo;
    use futures_util::future::join_all;
    use serde_json::json;
    use std::net::TcpListener as StdTcpListener;
    use std::time::Instant;
    use tokio_tungstenite::connect_async;

    fn free_base_port() -> u16 {
        let probe = StdTcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    }

    async fn start_bridge() -> (Arc<RequestBridge>, u16) {
        let bridge = Arc::new(RequestBridge::new(BridgeConfig {
            base_port: free_base_port(),
            port_range: port::DEFAULT_PORT_RANGE,
        }));
        let port = bridge.start().await.unwrap();
        (bridge, port)
    }

    async fn connect_peer(
        port: u16,
    ) -> WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>> {
        let (ws, _) = connect_async(format!("ws://127.0.0.1:{}", port))
            .await
            .unwrap();
        // Give the accept loop a beat to install the connection slot.
        tokio::time::sleep(Duration::from_millis(50)).await;
        ws
    }

    fn read_request(text: &str) -> RequestEnvelope {
        match protocol::decode(text) {
            Some(Envelope::Request(request)) => request,
            other => panic!("expected request frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn request_without_peer_rejects_immediately() {
        let (bridge, _port) = start_bridge().await;

        let started = Instant::now();
        let result = bridge
            .request(Action::GetActiveTab, None, Duration::from_secs(10))
            .await;

        assert!(matches!(result, Err(BridgeError::NotConnected)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(bridge.pending_count(), 0);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn occupied_base_port_binds_the_next_one() {
        let base = free_base_port();
        let _holder = StdTcpListener::bind(("127.0.0.1", base)).unwrap();

        let bridge = RequestBridge::new(BridgeConfig {
            base_port: base,
            port_range: 5,
        });
        let port = bridge.start().await.unwrap();
        assert!(port > base && port < base + 5);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn concurrent_responses_route_by_correlation_id() {
        let (bridge, port) = start_bridge().await;
        let ws = connect_peer(port).await;
        let (mut sink, mut stream) = ws.split();

        const N: usize = 8;

        // Peer: collect N requests, answer them in reverse order.
        let peer = tokio::spawn(async move {
            let mut requests = Vec::new();
            while requests.len() < N {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => requests.push(read_request(&text)),
                    Some(Ok(_)) => {}
                    other => panic!("peer stream ended early: {:?}", other),
                }
            }
            for request in requests.into_iter().rev() {
                let echo = request.params.clone().unwrap_or(Value::Null);
                let response = ResponseEnvelope::ok(request.id, json!({ "echo": echo }));
                let text = protocol::encode(&Envelope::Response(response)).unwrap();
                sink.send(Message::Text(text)).await.unwrap();
            }
        });

        let calls = (0..N).map(|n| {
            let bridge = Arc::clone(&bridge);
            async move {
                bridge
                    .request(
                        Action::EvaluateJs,
                        Some(json!({ "n": n })),
                        Duration::from_secs(5),
                    )
                    .await
            }
        });
        let results = join_all(calls).await;

        for (n, result) in results.into_iter().enumerate() {
            let data = result.unwrap();
            assert_eq!(data["echo"]["n"], json!(n), "response crossed wires");
        }
        peer.await.unwrap();
        assert_eq!(bridge.pending_count(), 0);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn timeout_rejects_and_late_response_is_ignored() {
        let (bridge, port) = start_bridge().await;
        let ws = connect_peer(port).await;
        let (mut sink, mut stream) = ws.split();

        let result = bridge
            .request(Action::GetConsoleLogs, None, Duration::from_millis(100))
            .await;
        let id = match result {
            Err(BridgeError::Timeout { id, timeout_ms }) => {
                assert_eq!(timeout_ms, 100);
                id
            }
            other => panic!("expected timeout, got {:?}", other),
        };
        assert_eq!(bridge.pending_count(), 0);

        // Drain the request frame, then answer it far too late.
        let _ = stream.next().await;
        let late = ResponseEnvelope::ok(id, json!({ "late": true }));
        let text = protocol::encode(&Envelope::Response(late)).unwrap();
        sink.send(Message::Text(text)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Bridge still works: a fresh request settles normally.
        let peer = tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let request = read_request(&text);
                        let response = ResponseEnvelope::ok(request.id, json!({ "fresh": true }));
                        let text = protocol::encode(&Envelope::Response(response)).unwrap();
                        sink.send(Message::Text(text)).await.unwrap();
                        break;
                    }
                    Some(Ok(_)) => {}
                    other => panic!("peer stream ended early: {:?}", other),
                }
            }
        });
        let data = bridge
            .request(Action::GetConsoleLogs, None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(data["fresh"], json!(true));
        peer.await.unwrap();
        bridge.stop().await;
    }

    #[tokio::test]
    async fn remote_error_surfaces_verbatim() {
        let (bridge, port) = start_bridge().await;
        let ws = connect_peer(port).await;
        let (mut sink, mut stream) = ws.split();

        let peer = tokio::spawn(async move {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let request = read_request(&text);
                    let response = ResponseEnvelope::err(
                        request.id,
                        "RESTRICTED_PAGE",
                        "page cannot be captured: chrome://settings",
                    );
                    let text = protocol::encode(&Envelope::Response(response)).unwrap();
                    sink.send(Message::Text(text)).await.unwrap();
                }
                other => panic!("peer stream ended early: {:?}", other),
            }
        });

        let result = bridge
            .request(Action::TakeScreenshot, None, Duration::from_secs(5))
            .await;
        match result {
            Err(BridgeError::Remote { code, message }) => {
                assert_eq!(code, "RESTRICTED_PAGE");
                assert_eq!(message, "page cannot be captured: chrome://settings");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
        peer.await.unwrap();
        bridge.stop().await;
    }

    #[tokio::test]
    async fn stop_rejects_all_pending_with_shutdown() {
        let (bridge, port) = start_bridge().await;
        // Peer that never answers.
        let _ws = connect_peer(port).await;

        const K: usize = 3;
        let mut calls = Vec::new();
        for _ in 0..K {
            let bridge = Arc::clone(&bridge);
            calls.push(tokio::spawn(async move {
                bridge
                    .request(Action::GetExceptions, None, Duration::from_secs(30))
                    .await
            }));
        }
        // Let all K register in the pending table.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(bridge.pending_count(), K);

        bridge.stop().await;

        for call in calls {
            let result = call.await.unwrap();
            assert!(matches!(result, Err(BridgeError::Shutdown)));
        }
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn status_frames_update_extension_status() {
        let (bridge, port) = start_bridge().await;
        let ws = connect_peer(port).await;
        let (mut sink, _stream) = ws.split();

        let status = StatusEnvelope {
            connected: true,
            active_tab: Some(TabInfo {
                id: 42,
                url: "https://example.test".into(),
                title: "Example".into(),
            }),
        };
        let text = protocol::encode(&Envelope::Status(status)).unwrap();
        sink.send(Message::Text(text)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let seen = bridge.extension_status().await.unwrap();
        assert!(seen.connected);
        assert_eq!(seen.active_tab.unwrap().id, 42);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn new_peer_replaces_old_connection() {
        let (bridge, port) = start_bridge().await;
        let ws_old = connect_peer(port).await;
        let (_old_sink, mut old_stream) = ws_old.split();

        let ws_new = connect_peer(port).await;
        let (mut new_sink, mut new_stream) = ws_new.split();
        assert!(bridge.is_connected().await);

        let peer = tokio::spawn(async move {
            match new_stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let request = read_request(&text);
                    let response = ResponseEnvelope::ok(request.id, json!({ "peer": "new" }));
                    let text = protocol::encode(&Envelope::Response(response)).unwrap();
                    new_sink.send(Message::Text(text)).await.unwrap();
                }
                other => panic!("new peer saw no request: {:?}", other),
            }
        });

        let data = bridge
            .request(Action::GetActiveTab, None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(data["peer"], json!("new"));

        // The old peer never received the frame.
        let nothing =
            tokio::time::timeout(Duration::from_millis(200), old_stream.next()).await;
        assert!(nothing.is_err(), "old peer unexpectedly received data");
        peer.await.unwrap();
        bridge.stop().await;
    }
}
