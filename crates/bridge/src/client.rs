//! Reconnecting Client - The Extension Side of the Transport
//!
//! Design:
//! - one client per fixed server URL; a manager fans out across the whole
//!   allocator port range because the extension cannot know which port won
//!   the server's allocation race
//! - at most one reconnect timer pending at a time; a close while one is
//!   already scheduled is a no-op
//! - ping doubles as the liveness probe and the lazy-reconnect trigger for
//!   environments where close events might be missed

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::protocol::{
    self, Action, Envelope, RequestEnvelope, ResponseEnvelope, StatusEnvelope, TabInfo,
    HANDLER_ERROR_CODE,
};

/// Fixed backoff before an automatic reconnect attempt.
pub const RECONNECT_DELAY_MS: u64 = 2_000;

/// Interval for the optional keepalive ping loop. Keeps the host process
/// aware the extension is alive and lazily re-establishes lost connections.
pub const KEEPALIVE_INTERVAL_MS: u64 = 25_000;

type WsClientSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsClientStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Handles one inbound request from the server. An `Ok` value becomes a
/// success response; an `Err` becomes an error response carrying the
/// handler's code and message.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(
        &self,
        action: Action,
        params: Value,
    ) -> std::result::Result<Value, HandlerError>;
}

/// Supplies the active-tab identity announced in status frames.
pub trait StatusSource: Send + Sync {
    fn active_tab(&self) -> Option<TabInfo>;
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub code: String,
    pub message: String,
}

impl HandlerError {
    /// Plain handler failure with the fixed handler-error code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: HANDLER_ERROR_CODE.to_string(),
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
        }
    }
}

struct ClientState {
    sink: Option<WsClientSink>,
    intentional_close: bool,
    reconnect_scheduled: bool,
    generation: u64,
}

struct Inner {
    url: String,
    config: ClientConfig,
    handler: Arc<dyn RequestHandler>,
    status: Arc<dyn StatusSource>,
    state: Mutex<ClientState>,
}

/// WebSocket client bound to exactly one server URL. Cheap to clone; all
/// clones share the same connection state.
#[derive(Clone)]
pub struct ReconnectingClient {
    inner: Arc<Inner>,
}

impl ReconnectingClient {
    pub fn new(
        url: impl Into<String>,
        handler: Arc<dyn RequestHandler>,
        status: Arc<dyn StatusSource>,
    ) -> Self {
        Self::with_config(url, ClientConfig::default(), handler, status)
    }

    pub fn with_config(
        url: impl Into<String>,
        config: ClientConfig,
        handler: Arc<dyn RequestHandler>,
        status: Arc<dyn StatusSource>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                config,
                handler,
                status,
                state: Mutex::new(ClientState {
                    sink: None,
                    intentional_close: false,
                    reconnect_scheduled: false,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.sink.is_some()
    }

    /// Open the connection. Idempotent while already open. On open the
    /// client immediately announces its status (including the active tab).
    /// A failed attempt schedules the single reconnect timer.
    pub fn connect(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        // Returned as a boxed future rather than `async fn` to break the
        // async-recursion cycle (connect -> schedule_reconnect -> connect):
        // the concrete boxed type carries a declared `Send` bound so the
        // compiler need not resolve an opaque type through the cycle.
        Box::pin(async move {
            {
                let mut state = self.inner.state.lock().await;
                if state.sink.is_some() {
                    return;
                }
                state.intentional_close = false;
            }

            let ws = match connect_async(self.inner.url.as_str()).await {
                Ok((ws, _)) => ws,
                Err(err) => {
                    tracing::debug!("Connect to {} failed: {}", self.inner.url, err);
                    self.schedule_reconnect().await;
                    return;
                }
            };

            let (sink, stream) = ws.split();
            let generation = {
                let mut state = self.inner.state.lock().await;
                state.generation += 1;
                state.sink = Some(sink);
                state.generation
            };
            tracing::info!("Connected to {}", self.inner.url);
            self.announce_status().await;

            let client = self.clone();
            tokio::spawn(async move {
                client.read_loop(stream, generation).await;
            });
        })
    }

    /// Mark the close as intentional and drop the connection. The automatic
    /// reconnect path will not fire afterwards.
    pub async fn disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        state.intentional_close = true;
        if let Some(mut sink) = state.sink.take() {
            let _ = sink.close().await;
        }
    }

    /// Liveness probe: re-announce status if connected, otherwise try to
    /// connect. This is the lazy-reconnect path for missed close events.
    pub async fn ping(&self) {
        if self.is_connected().await {
            self.announce_status().await;
        } else {
            self.connect().await;
        }
    }

    async fn announce_status(&self) {
        let announcement = StatusEnvelope {
            connected: true,
            active_tab: self.inner.status.active_tab(),
        };
        self.send(Envelope::Status(announcement)).await;
    }

    async fn send(&self, envelope: Envelope) {
        let text = match protocol::encode(&envelope) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("Failed to encode envelope: {}", err);
                return;
            }
        };
        let mut state = self.inner.state.lock().await;
        match state.sink.as_mut() {
            Some(sink) => {
                if let Err(err) = sink.send(Message::Text(text)).await {
                    tracing::debug!("Send on {} failed: {}", self.inner.url, err);
                }
            }
            None => tracing::debug!("Dropping outbound frame, {} not connected", self.inner.url),
        }
    }

    async fn read_loop(self, mut stream: WsClientStream, generation: u64) {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Some(Envelope::Request(request)) = protocol::decode(&text) {
                        let client = self.clone();
                        tokio::spawn(async move {
                            client.dispatch(request).await;
                        });
                    }
                    // Non-request envelopes from the server are not part of
                    // the contract; decode warnings already cover bad frames.
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!("Read on {} failed: {}", self.inner.url, err);
                    break;
                }
            }
        }
        self.on_close(generation).await;
    }

    async fn dispatch(&self, request: RequestEnvelope) {
        let params = request.params.unwrap_or(Value::Null);
        let response = match self.inner.handler.handle(request.action, params).await {
            Ok(data) => ResponseEnvelope::ok(request.id, data),
            Err(err) => ResponseEnvelope::err(request.id, err.code, err.message),
        };
        self.send(Envelope::Response(response)).await;
    }

    async fn on_close(&self, generation: u64) {
        let intentional = {
            let mut state = self.inner.state.lock().await;
            if state.generation != generation {
                // A newer connection owns the state now.
                return;
            }
            state.sink = None;
            state.intentional_close
        };
        tracing::info!("Disconnected from {}", self.inner.url);
        if !intentional {
            self.schedule_reconnect().await;
        }
    }

    async fn schedule_reconnect(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.reconnect_scheduled || state.intentional_close {
                return;
            }
            state.reconnect_scheduled = true;
        }
        let client = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(client.inner.config.reconnect_delay).await;
            let intentional = {
                let mut state = client.inner.state.lock().await;
                state.reconnect_scheduled = false;
                state.intentional_close
            };
            if !intentional {
                client.connect().await;
            }
        });
    }
}

/// Holds one client per candidate port and broadcasts connect/ping across
/// all of them. The server bound whichever port was free first; "any one
/// connected" is therefore the overall liveness signal.
pub struct ClientManager {
    clients: Vec<ReconnectingClient>,
}

impl ClientManager {
    pub fn new(
        base_port: u16,
        port_range: u16,
        handler: Arc<dyn RequestHandler>,
        status: Arc<dyn StatusSource>,
    ) -> Self {
        Self::with_config(
            base_port,
            port_range,
            ClientConfig::default(),
            handler,
            status,
        )
    }

    pub fn with_config(
        base_port: u16,
        port_range: u16,
        config: ClientConfig,
        handler: Arc<dyn RequestHandler>,
        status: Arc<dyn StatusSource>,
    ) -> Self {
        let clients = (0..port_range)
            .map(|offset| {
                let port = base_port.saturating_add(offset);
                ReconnectingClient::with_config(
                    format!("ws://127.0.0.1:{}", port),
                    config.clone(),
                    Arc::clone(&handler),
                    Arc::clone(&status),
                )
            })
            .collect();
        Self { clients }
    }

    pub fn clients(&self) -> &[ReconnectingClient] {
        &self.clients
    }

    pub async fn connect_all(&self) {
        for client in &self.clients {
            client.connect().await;
        }
    }

    pub async fn ping_all(&self) {
        for client in &self.clients {
            client.ping().await;
        }
    }

    pub async fn any_connected(&self) -> bool {
        for client in &self.clients {
            if client.is_connected().await {
                return true;
            }
        }
        false
    }

    /// Spawn the periodic ping loop. The handle can be aborted on shutdown.
    pub fn spawn_keepalive(&self, interval: Duration) -> JoinHandle<()> {
        let clients = self.clients.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                for client in &clients {
                    client.ping().await;
                }
            }
        })
    }
}
