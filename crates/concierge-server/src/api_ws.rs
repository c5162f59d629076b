//! WebSocket relay: `GET /ws`.
//!
//! Every connection is greeted with a `connected` frame. An `init` frame
//! subscribes the connection to a call id; transcript frames are persisted
//! and then fanned out, with `isFinal` and a server timestamp added, to
//! every connection subscribed to the same call, the sender included.
//! Summary chunks and order status changes reach subscribers through
//! [`CallHub::broadcast_frame`].

use axum::{
    body::Bytes,
    extract::{
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        ConnectInfo, Extension,
    },
    response::IntoResponse,
};
use chrono::Utc;
use concierge_store::{record_transcript, RecordTranscriptParams};
use concierge_types::frames::{BroadcastTranscript, ClientFrame, ServerFrame, TranscriptFrame};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::api::with_conn;
use crate::AppState;

pub const GREETING: &str = "Connected to Mi Nhon Hotel Voice Assistant";

/// Interval between keep-alive pings. A connection that has not answered
/// the previous ping by the next tick is closed.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Frames queued per connection before a slow consumer starts losing them.
const OUTBOUND_QUEUE: usize = 256;

struct Subscriber {
    call_id: Option<String>,
    sender: mpsc::Sender<String>,
}

/// Active relay connections and the call each one follows.
#[derive(Clone, Default)]
pub struct CallHub {
    connections: Arc<RwLock<HashMap<Uuid, Subscriber>>>,
}

impl CallHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection with no call yet. Returns its id.
    pub async fn add_connection(&self, sender: mpsc::Sender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.connections.write().await.insert(
            id,
            Subscriber {
                call_id: None,
                sender,
            },
        );
        id
    }

    /// Points a connection at `call_id`, replacing any earlier call.
    pub async fn subscribe(&self, connection_id: Uuid, call_id: String) {
        if let Some(subscriber) = self.connections.write().await.get_mut(&connection_id) {
            subscriber.call_id = Some(call_id);
        }
    }

    pub async fn remove_connection(&self, connection_id: Uuid) {
        self.connections.write().await.remove(&connection_id);
    }

    /// Number of connections currently following `call_id`.
    pub async fn subscriber_count(&self, call_id: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|s| s.call_id.as_deref() == Some(call_id))
            .count()
    }

    /// Sends a message string to every connection following `call_id`.
    pub async fn broadcast(&self, call_id: &str, message_json: String) {
        let connections = self.connections.read().await;
        for (id, subscriber) in connections.iter() {
            if subscriber.call_id.as_deref() != Some(call_id) {
                continue;
            }
            if let Err(e) = subscriber.sender.try_send(message_json.clone()) {
                tracing::warn!(
                    connection_id = %id,
                    call_id = %call_id,
                    "dropping relay frame for slow consumer: {}",
                    e
                );
            }
        }
    }

    pub async fn broadcast_frame(&self, call_id: &str, frame: &ServerFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => self.broadcast(call_id, json).await,
            Err(e) => tracing::error!(call_id = %call_id, "failed to serialize relay frame: {}", e),
        }
    }
}

/// WebSocket handler: `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(remote_addr = %addr, "relay connection upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let connection_id = state.hub.add_connection(tx.clone()).await;
    tracing::info!(connection_id = %connection_id, remote_addr = %addr, "relay client connected");

    send_frame(
        &tx,
        &ServerFrame::Connected {
            message: GREETING.to_string(),
        },
    );

    let alive = Arc::new(AtomicBool::new(true));
    let ping_alive = alive.clone();
    let mut send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + PING_INTERVAL,
            PING_INTERVAL,
        );
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if !ping_alive.swap(false, Ordering::SeqCst) {
                        tracing::info!(connection_id = %connection_id, "relay client missed a ping, closing");
                        break;
                    }
                    if sender.send(AxumMessage::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    loop {
        let msg = tokio::select! {
            msg = receiver.next() => msg,
            _ = &mut send_task => break,
        };
        let Some(Ok(msg)) = msg else { break };
        alive.store(true, Ordering::SeqCst);

        match msg {
            AxumMessage::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(ClientFrame::Init { call_id }) => {
                    tracing::info!(connection_id = %connection_id, call_id = %call_id, "relay client subscribed");
                    state.hub.subscribe(connection_id, call_id).await;
                }
                Ok(ClientFrame::Transcript(line)) => {
                    relay_transcript(&state, &tx, line, false).await;
                }
                Ok(ClientFrame::FinalTranscript(line)) => {
                    relay_transcript(&state, &tx, line, true).await;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, "failed to parse relay frame: {}", e);
                    send_ws_error(&tx, "invalid message format".to_string());
                }
            },
            AxumMessage::Close(_) => break,
            _ => {}
        }
    }

    state.hub.remove_connection(connection_id).await;
    send_task.abort();
    tracing::info!(connection_id = %connection_id, "relay client disconnected");
}

/// Persists a transcript line, then fans it out to the call's subscribers.
async fn relay_transcript(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<String>,
    line: TranscriptFrame,
    is_final: bool,
) {
    if line.call_id.trim().is_empty() || line.content.trim().is_empty() {
        send_ws_error(tx, "transcript frame is missing callId or content".to_string());
        return;
    }

    let timestamp = Utc::now();
    let stored = line.clone();
    let persisted = with_conn(&state.pool, "failed to store transcript", move |conn| {
        record_transcript(
            conn,
            &RecordTranscriptParams {
                call_id: &stored.call_id,
                role: stored.role,
                content: &stored.content,
                is_final,
                utterance_id: stored.revision_key(),
                at: timestamp,
            },
        )
    })
    .await;
    if let Err(e) = persisted {
        tracing::error!(call_id = %line.call_id, "transcript not relayed: {}", e);
        send_ws_error(tx, "Failed to store transcript".to_string());
        return;
    }

    let call_id = line.call_id.clone();
    let broadcast = BroadcastTranscript {
        line,
        is_final,
        timestamp,
    };
    let frame = if is_final {
        ServerFrame::FinalTranscript(broadcast)
    } else {
        ServerFrame::Transcript(broadcast)
    };
    state.hub.broadcast_frame(&call_id, &frame).await;
}

fn send_frame(tx: &mpsc::Sender<String>, frame: &ServerFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("failed to queue relay frame: {}", e);
            }
        }
        Err(e) => tracing::error!("failed to serialize relay frame: {}", e),
    }
}

/// Sends a JSON-serialized error frame over the connection's queue.
fn send_ws_error(tx: &mpsc::Sender<String>, message: String) {
    send_frame(tx, &ServerFrame::Error { message });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_only_the_call_subscribers() {
        let hub = CallHub::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = hub.add_connection(tx_a).await;
        let b = hub.add_connection(tx_b).await;
        hub.subscribe(a, "call-1".to_string()).await;
        hub.subscribe(b, "call-2".to_string()).await;

        hub.broadcast("call-1", "hello".to_string()).await;

        assert_eq!(rx_a.try_recv().unwrap(), "hello");
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.subscriber_count("call-1").await, 1);
    }

    #[tokio::test]
    async fn resubscribing_moves_the_connection() {
        let hub = CallHub::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = hub.add_connection(tx).await;
        hub.subscribe(id, "call-1".to_string()).await;
        hub.subscribe(id, "call-2".to_string()).await;
        assert_eq!(hub.subscriber_count("call-1").await, 0);
        assert_eq!(hub.subscriber_count("call-2").await, 1);

        hub.remove_connection(id).await;
        assert_eq!(hub.subscriber_count("call-2").await, 0);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = CallHub::new();
        let (tx, mut rx) = mpsc::channel(1);
        let id = hub.add_connection(tx).await;
        hub.subscribe(id, "call-1".to_string()).await;

        hub.broadcast("call-1", "first".to_string()).await;
        hub.broadcast("call-1", "second".to_string()).await;

        assert_eq!(rx.try_recv().unwrap(), "first");
        assert!(rx.try_recv().is_err());
    }
}
