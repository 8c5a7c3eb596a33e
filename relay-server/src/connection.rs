use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::messages::WsMessage;
use crate::state::{ConnectionId, RelayState};

/// Perform the WebSocket handshake (rejecting foreign namespaces) and serve the connection
pub async fn accept_connection(stream: TcpStream, state: Arc<RelayState>, config: Arc<RelayConfig>) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let namespace_config = config.clone();
    let check_namespace = move |request: &Request, response: Response| {
        let path = request.uri().path();
        if namespace_config.accepts_path(path) {
            Ok(response)
        } else {
            warn!(path, "Rejecting handshake for unknown namespace");
            let mut rejection = ErrorResponse::new(Some(format!("Unknown namespace {}", path)));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    match accept_hdr_async(stream, check_namespace).await {
        Ok(ws_stream) => handle_connection(ws_stream, state, config).await,
        Err(e) => error!("WebSocket handshake failed for {}: {}", peer, e),
    }
}

/// Handle a single WebSocket connection
pub async fn handle_connection(
    ws_stream: WebSocketStream<TcpStream>,
    state: Arc<RelayState>,
    config: Arc<RelayConfig>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Wait for Connect message to authenticate
    let user_id = match wait_for_connect(&mut ws_receiver, &config).await {
        Ok(id) => id,
        Err(reason) => {
            warn!("Connection rejected before authentication: {}", reason);
            let rejection = WsMessage::AuthResponse {
                success: false,
                message: reason,
            };
            if let Ok(json) = serde_json::to_string(&rejection) {
                let _ = ws_sender.send(Message::Text(json.into())).await;
            }
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };

    // Create channel for sending frames to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connection_id = state.add_client(user_id.clone(), tx);

    info!(connection_id, "User connected: {}", user_id);

    let auth_response = WsMessage::AuthResponse {
        success: true,
        message: "Connected to chat relay".to_string(),
    };
    match serde_json::to_string(&auth_response) {
        Ok(json) => {
            if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
                error!("Failed to send auth response to {}: {}", user_id, e);
            }
        }
        Err(e) => {
            error!("Failed to serialize auth response for {}: {}", user_id, e);
        }
    }

    // Spawn task to forward frames from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            res = ws_receiver.next() => {
                match res {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&text, connection_id, &user_id, &state);
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("User {} sent close frame", user_id);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for user {}: {}", user_id, e);
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended for user {}", user_id);
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut send_task => {
                info!("Send task finished for user {} (likely connection lost)", user_id);
                break;
            }
        }
    }

    send_task.abort();
    let rooms = state.remove_client(connection_id);
    info!(connection_id, rooms = rooms.len(), "User disconnected: {}", user_id);
}

/// Wait for the Connect frame from a new connection
async fn wait_for_connect(
    receiver: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    config: &RelayConfig,
) -> Result<String, String> {
    let expected_token = config.access_token.as_deref();

    let outcome = tokio::time::timeout(config.auth_timeout, async {
        while let Some(result) = receiver.next().await {
            let text = match result {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            match serde_json::from_str::<WsMessage>(&text) {
                Ok(WsMessage::Connect { user_id, token }) => {
                    if user_id.trim().is_empty() {
                        return Err("Missing user id".to_string());
                    }
                    if let Some(expected) = expected_token {
                        match token.as_deref() {
                            Some(received) if received == expected => {}
                            Some(_) => return Err("Invalid token".to_string()),
                            None => return Err("No token provided".to_string()),
                        }
                    }
                    return Ok(user_id);
                }
                Ok(_) => {
                    warn!("Ignoring frame received before connect");
                }
                Err(e) => {
                    warn!("Failed to parse Connect message: {}", e);
                }
            }
        }
        Err("Connection closed".to_string())
    });

    match outcome.await {
        Ok(result) => result,
        Err(_) => Err("Authentication timeout".to_string()),
    }
}

/// Handle an incoming frame from an authenticated connection
pub fn handle_message(text: &str, connection_id: ConnectionId, user_id: &str, state: &RelayState) {
    let msg: WsMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse message from {}: {}", user_id, e);
            return;
        }
    };

    match msg {
        WsMessage::Join { room } => {
            if state.join(connection_id, &room) {
                debug!(connection_id, room = %room, "Joined room");
                broadcast(state, &room, &WsMessage::UserJoined { room: room.clone() });
            }
        }
        WsMessage::Leave { room } => {
            if state.leave(connection_id, &room) {
                debug!(connection_id, room = %room, "Left room");
                broadcast(state, &room, &WsMessage::UserLeft { room: room.clone() });
            }
        }
        WsMessage::SendMessage {
            room,
            message,
            sender,
        } => {
            if message.trim().is_empty() {
                reply_error(state, connection_id, "Message cannot be empty");
                return;
            }
            if !state.is_member(connection_id, &room) {
                warn!(room = %room, "User {} sent to a room it has not joined", user_id);
                reply_error(state, connection_id, "Not a member of this room");
                return;
            }
            if sender != user_id {
                // Enforce sender identity to prevent spoofing
                warn!(claimed = %sender, "Overwriting spoofed sender for {}", user_id);
            }

            let outgoing = WsMessage::ReceiveMessage {
                message,
                sender: user_id.to_string(),
                timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
                room: Some(room.clone()),
            };
            broadcast(state, &room, &outgoing);
        }
        WsMessage::Connect { .. } => {
            // Already authenticated, ignore
        }
        WsMessage::AuthResponse { .. }
        | WsMessage::ReceiveMessage { .. }
        | WsMessage::UserJoined { .. }
        | WsMessage::UserLeft { .. }
        | WsMessage::Error { .. } => {
            // Server-only frames, ignore from client
        }
    }
}

fn broadcast(state: &RelayState, room: &str, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            state.broadcast_to_room(room, &json);
        }
        Err(e) => error!("Failed to serialize frame for room {}: {}", room, e),
    }
}

fn reply_error(state: &RelayState, connection_id: ConnectionId, message: &str) {
    let frame = WsMessage::Error {
        message: message.to_string(),
    };
    if let Ok(json) = serde_json::to_string(&frame) {
        state.send_to(connection_id, &json);
    }
}
