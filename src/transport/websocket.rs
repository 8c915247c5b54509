//! WebSocket endpoint and the registry of open connections

use crate::core::handler::{invoke_guarded, HandlerRef, Invocation, RuntimeContext, Trigger, WsFrame};
use crate::metrics::Metrics;
use crate::models::WebSocketEvent;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};

/// Identifies one open WebSocket connection for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound channels of every open connection
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    senders: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().await.insert(id, tx);
        (id, rx)
    }

    pub async fn remove(&self, id: ConnectionId) {
        self.senders.write().await.remove(&id);
    }

    /// Queue a text frame for `id`; false when the connection is gone
    pub async fn push(&self, id: ConnectionId, text: impl Into<String>) -> bool {
        let text: String = text.into();
        let senders = self.senders.read().await;
        match senders.get(&id) {
            Some(tx) => tx.send(Message::Text(text.into())).is_ok(),
            None => false,
        }
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.senders.read().await.keys().copied().collect();
        ids.sort();
        ids
    }
}

/// Everything the upgrade handler needs, cloned per connection
#[derive(Clone)]
pub struct WsState {
    pub bindings: Arc<Vec<(WebSocketEvent, HandlerRef)>>,
    pub connections: ConnectionRegistry,
    pub ctx: RuntimeContext,
    pub timeout: Option<Duration>,
    pub metrics: Option<Arc<Metrics>>,
}

impl WsState {
    /// Invoke every binding for `event`; failures are logged and the connection stays open
    async fn fire(&self, event: WebSocketEvent, connection: ConnectionId, data: Option<String>) {
        for (bound, handler) in self.bindings.iter() {
            if *bound != event {
                continue;
            }
            let frame = WsFrame {
                event,
                connection,
                data: data.clone(),
            };
            let invocation = Invocation::new(Trigger::WebSocket(frame), self.ctx.clone());
            if let Err(e) = invoke_guarded(handler, invocation, self.timeout).await {
                error!(
                    handler = handler.name(),
                    event = %event,
                    connection = %connection,
                    error = %e,
                    "websocket: handler failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_handler_failure("websocket");
                }
            }
        }
    }
}

pub async fn upgrade(ws: WebSocketUpgrade, state: WsState) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, state))
}

async fn serve_connection(socket: WebSocket, state: WsState) {
    let (id, mut outbound) = state.connections.register().await;
    let (mut sink, mut stream) = socket.split();
    info!(connection = %id, "websocket: connection opened");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    state.fire(WebSocketEvent::Open, id, None).await;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                state
                    .fire(WebSocketEvent::Message, id, Some(text.as_str().to_string()))
                    .await
            }
            Ok(Message::Binary(bytes)) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                state.fire(WebSocketEvent::Message, id, Some(text)).await
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %id, error = %e, "websocket: receive error");
                break;
            }
        }
    }

    state.connections.remove(id).await;
    state.fire(WebSocketEvent::Close, id, None).await;
    writer.abort();
    info!(connection = %id, "websocket: connection closed");
}
