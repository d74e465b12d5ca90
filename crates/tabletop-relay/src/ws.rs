//! Scene socket: `GET /ws`.
//!
//! - New clients get `connection_status` followed by the current scene.
//! - `scene_update` becomes the current scene and goes to every client,
//!   the sender included.
//! - Viewer controls and effects go to every client except the sender.
//! - Heartbeats and unknown types are dropped.

use crate::{AppState, Broadcast, Delivery};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tabletop_core::protocol::{ConnectionStatus, Message as WireMessage};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before the greeting so no update slips between the two.
    let mut rx = state.subscribe();
    info!("New connection: {} ({} connected)", peer_id, state.client_count());

    let mut greeting = vec![WireMessage::status(ConnectionStatus::Connected)];
    if let Some(scene) = state.current_scene().await {
        greeting.push(WireMessage::scene_update(scene));
    }
    for message in greeting {
        let Some(text) = encode(&message) else { continue };
        if sender.send(Message::Text(text.into())).await.is_err() {
            info!("Connection closed during greeting: {}", peer_id);
            return;
        }
    }

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &peer_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary/ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            // Handle broadcast messages
            msg = rx.recv() => {
                match msg {
                    Ok(broadcast) => {
                        if !broadcast.reaches(&peer_id) {
                            continue;
                        }
                        if sender.send(Message::Text(broadcast.text.clone().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Peer {} lagged, skipped {} messages", peer_id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Connection closed: {}", peer_id);
}

async fn handle_text(state: &AppState, peer_id: &str, text: &str) {
    let message = match WireMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Invalid message from {}: {}", peer_id, e);
            return;
        }
    };

    match message {
        WireMessage::SceneUpdate { scene } => {
            debug!("Scene update from {}: {}", peer_id, scene.id);
            state.set_current_scene((*scene).clone()).await;
            publish(state, peer_id, &WireMessage::SceneUpdate { scene }, Delivery::All);
        }
        other if other.is_broadcast() => publish(state, peer_id, &other, Delivery::Others),
        WireMessage::Ping => {}
        _ => debug!("Ignoring message from {}: {}", peer_id, text),
    }
}

fn publish(state: &AppState, peer_id: &str, message: &WireMessage, delivery: Delivery) {
    if let Some(text) = encode(message) {
        state.broadcast(Broadcast {
            from: peer_id.to_string(),
            delivery,
            text,
        });
    }
}

fn encode(message: &WireMessage) -> Option<String> {
    match message.to_json() {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to encode message: {}", e);
            None
        }
    }
}
