//! WebSocket fan-out of merged weather state.
//!
//! Delivery is best-effort and independent per subscriber: every client gets
//! its own broadcast receiver and send task, so a slow or dead client never
//! blocks the others. There is no replay; a client connecting after an
//! envelope was published will not see it.

use crate::station::data::Envelope;
use crate::web::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Client {
    connected_at: std::time::SystemTime,
}

/// Publish/subscribe registry for merged-state envelopes.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<Envelope>,
    clients: Arc<RwLock<HashMap<String, Client>>>,
    max_clients: usize,
}

impl Broadcaster {
    /// Create a broadcaster with the given per-subscriber envelope slack.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            clients: Arc::new(RwLock::new(HashMap::new())),
            max_clients: usize::MAX,
        }
    }

    /// Cap the number of concurrent WebSocket clients. Unlimited by default.
    pub fn with_client_limit(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Whether the client limit has been reached.
    pub async fn at_capacity(&self) -> bool {
        self.clients.read().await.len() >= self.max_clients
    }

    /// Push an envelope to every current subscriber. Never blocks; with no
    /// subscribers the envelope is simply dropped.
    pub fn publish(&self, envelope: Envelope) {
        match self.tx.send(envelope) {
            Ok(receivers) => debug!("Broadcasted envelope to {} receivers", receivers),
            Err(_) => debug!("No subscribers connected, envelope dropped"),
        }
    }

    /// Subscribe to the envelope stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Number of currently connected WebSocket clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn register(&self, id: String) {
        self.clients.write().await.insert(
            id,
            Client {
                connected_at: std::time::SystemTime::now(),
            },
        );
    }

    async fn unregister(&self, id: &str) {
        if let Some(client) = self.clients.write().await.remove(id) {
            let connected = client.connected_at.elapsed().unwrap_or_default();
            debug!("Client {} was connected for {:?}", id, connected);
        }
    }
}

/// WebSocket upgrade handler. Refuses new connections once the configured
/// client limit is reached.
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.broadcaster.at_capacity().await {
        warn!("Rejecting WebSocket connection, client limit reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_websocket(socket, state.broadcaster.clone()))
}

/// Handle one WebSocket connection for its whole lifetime.
async fn handle_websocket(socket: WebSocket, broadcaster: Broadcaster) {
    let client_id = uuid::Uuid::new_v4().to_string();
    info!("WebSocket client connected: {}", client_id);
    broadcaster.register(client_id.clone()).await;

    let (mut sender, mut receiver) = socket.split();
    let mut rx = broadcaster.subscribe();

    // Clients send nothing meaningful; drain their side so pings and the
    // close handshake still work.
    let client_id_recv = client_id.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    info!("WebSocket client {} disconnected", client_id_recv);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error for client {}: {}", client_id_recv, e);
                    break;
                }
            }
        }
    });

    let client_id_send = client_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let envelope = match rx.recv().await {
                Ok(envelope) => envelope,
                // Slow subscriber: updates it missed are gone, keep going.
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Client {} lagged, skipped {} envelopes", client_id_send, missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    if let Err(e) = sender.send(Message::Text(json)).await {
                        warn!("Failed to send to client {}: {}", client_id_send, e);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to serialize envelope for {}: {}", client_id_send, e);
                }
            }
        }
    });

    // Whichever side ends first tears the connection down.
    tokio::select! {
        _ = recv_task => {}
        _ = send_task => {}
    }

    broadcaster.unregister(&client_id).await;
    info!("WebSocket client removed: {}", client_id);
}
