//! Status socket: one WebSocket per client connection.
//!
//! The server announces a connection id, forwards every lifecycle event
//! addressed to it and accepts submissions over the same socket. Events for
//! a connection that has gone away are dropped by the notifier; the job
//! itself keeps running.

use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use vtrim_models::{FailureKind, OwnerConnection, WsClientMessage, WsServerMessage};

use crate::auth::OwnerId;
use crate::error::ApiError;
use crate::metrics;
use crate::services::submit_trim;
use crate::state::AppState;

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// GET /ws/jobs
pub async fn ws_jobs(ws: WebSocketUpgrade, State(state): State<AppState>, owner: OwnerId) -> impl IntoResponse {
    metrics::record_ws_connection();
    ws.on_upgrade(move |socket| handle_socket(socket, state, owner))
}

/// Serialize and queue a message; false once the client is gone.
async fn send_json<T: Serialize>(tx: &mpsc::Sender<Message>, msg: &T, message_type: &str) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize {} message: {}", message_type, e);
            return true;
        }
    };
    match tx.try_send(Message::Text(json)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            if tx.send(msg).await.is_err() {
                return false;
            }
        }
        Err(mpsc::error::TrySendError::Closed(_)) => return false,
    }
    metrics::record_ws_message_sent(message_type);
    true
}

async fn handle_socket(socket: WebSocket, state: AppState, owner: OwnerId) {
    metrics::ws_connection_opened();
    let _active = scopeguard::guard((), |_| metrics::ws_connection_closed());

    let connection_id = uuid::Uuid::new_v4().to_string();
    let (ws_sender, mut receiver) = socket.split();

    // Bounded channel so a slow client applies backpressure to this task only.
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);
    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Subscribe before announcing the id so no event can race the subscription.
    let mut events = match state.notifier.subscribe(&connection_id).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(connection_id = %connection_id, "Failed to subscribe to events: {}", e);
            send_json(&tx, &WsServerMessage::error("Event delivery unavailable"), "error").await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    info!(owner = %owner.as_str(), connection_id = %connection_id, "Status socket opened");
    if !send_json(&tx, &WsServerMessage::connected(&connection_id), "connected").await {
        drop(tx);
        let _ = send_task.await;
        return;
    }

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    last_activity = Instant::now();
                    if !send_json(&tx, &event, event.type_str()).await {
                        debug!(connection_id = %connection_id, "Client gone while forwarding events");
                        break;
                    }
                }
                None => {
                    warn!(connection_id = %connection_id, "Event stream ended");
                    break;
                }
            },
            client_msg = receiver.next() => match client_msg {
                Some(Ok(Message::Text(text))) => {
                    last_activity = Instant::now();
                    metrics::record_ws_message_received();
                    if let Some(reply) = handle_client_message(&state, &owner, &connection_id, &text).await {
                        let message_type = reply_type(&reply);
                        if !send_json(&tx, &reply, message_type).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    last_activity = Instant::now();
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > WS_HEARTBEAT_INTERVAL / 2
                    && tx.send(Message::Ping(Vec::new())).await.is_err()
                {
                    break;
                }
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
    info!(owner = %owner.as_str(), connection_id = %connection_id, "Status socket closed");
}

fn reply_type(reply: &WsServerMessage) -> &'static str {
    match reply {
        WsServerMessage::Connected { .. } => "connected",
        WsServerMessage::Rejected { .. } => "rejected",
        WsServerMessage::Error { .. } => "error",
        WsServerMessage::Pong => "pong",
    }
}

/// Handle one client frame; returns the direct reply, if any.
///
/// An accepted submission has no direct reply: its `queued` event arrives
/// through the event stream like every later event.
pub async fn handle_client_message(
    state: &AppState,
    owner: &OwnerId,
    connection_id: &str,
    text: &str,
) -> Option<WsServerMessage> {
    let message: WsClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => return Some(WsServerMessage::error(format!("Invalid message: {}", e))),
    };

    match message {
        WsClientMessage::Ping => Some(WsServerMessage::Pong),
        WsClientMessage::Submit(request) => {
            let owner = OwnerConnection::new(owner.as_str(), connection_id);
            match submit_trim(state, request, owner).await {
                Ok(_) => None,
                Err(e) => Some(rejection(&e)),
            }
        }
    }
}

fn rejection(e: &ApiError) -> WsServerMessage {
    match e.kind() {
        Some(kind @ (FailureKind::Validation | FailureKind::SourceUnavailable | FailureKind::FormatUnsupported)) => {
            WsServerMessage::rejected(kind.as_str(), e.client_detail())
        }
        _ => WsServerMessage::error(e.client_detail()),
    }
}
