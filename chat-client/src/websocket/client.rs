use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::messages::WsMessage;
use super::{Transport, TransportEvent};
use crate::auth::IdentityProvider;
use crate::config::ClientConfig;
use crate::error::{ChatError, Result};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Internal message type for the write channel
enum WriteMessage {
    Data(String),
    Close,
}

/// How a single connection attempt ended
enum SessionEnd {
    Reconnect,
    Stop,
}

/// WebSocket client for the chat relay, with automatic reconnect
pub struct WebSocketClient {
    endpoint: String,
    reconnect_delay: Duration,
    write_tx: Arc<StdMutex<Option<mpsc::UnboundedSender<WriteMessage>>>>,
    connected: Arc<AtomicBool>,
    /// Set while a connection loop task is alive
    running: Arc<AtomicBool>,
    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

impl WebSocketClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_endpoint(&config.socket_endpoint(), config.reconnect_delay)
    }

    pub fn with_endpoint(endpoint: &str, reconnect_delay: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            endpoint: endpoint.to_string(),
            reconnect_delay,
            write_tx: Arc::new(StdMutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for WebSocketClient {
    fn connect(
        &self,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ChatError::Transport(
                "connection loop already running".to_string(),
            ));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let endpoint = self.endpoint.clone();
        let reconnect_delay = self.reconnect_delay;
        let write_tx = self.write_tx.clone();
        let connected = self.connected.clone();
        let running = self.running.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                // Fresh credential on every attempt; tokens expire between reconnects
                let user_id = identity.user_id();
                let token = identity.bearer_token().await;
                let (user_id, token) = match (user_id, token) {
                    (Some(user_id), Ok(token)) => (user_id, token),
                    (_, Err(e)) => {
                        warn!(error = %e, "No credential for chat relay, retrying later");
                        if wait_or_shutdown(&mut shutdown_rx, reconnect_delay).await {
                            break;
                        }
                        continue;
                    }
                    (None, Ok(_)) => {
                        warn!("Signed out, stopping chat relay connection");
                        break;
                    }
                };

                info!(url = %endpoint, "Connecting to chat relay");

                match connect_async(endpoint.as_str()).await {
                    Ok((ws_stream, _)) => {
                        let (mut ws_write, mut ws_read) = ws_stream.split();

                        let connect_msg = WsMessage::Connect {
                            user_id: user_id.clone(),
                            token: Some(token),
                        };
                        let sent = match serde_json::to_string(&connect_msg) {
                            Ok(json) => ws_write.send(Message::Text(json.into())).await.is_ok(),
                            Err(e) => {
                                error!(error = %e, "Failed to encode connect frame");
                                false
                            }
                        };
                        if !sent {
                            error!("Failed to send connect message");
                            if wait_or_shutdown(&mut shutdown_rx, reconnect_delay).await {
                                break;
                            }
                            continue;
                        }

                        // Wait for auth response, skipping anything else
                        let auth = tokio::time::timeout(AUTH_TIMEOUT, async {
                            while let Some(frame) = ws_read.next().await {
                                if let Ok(Message::Text(text)) = frame {
                                    if let Ok(WsMessage::AuthResponse { success, message }) =
                                        serde_json::from_str::<WsMessage>(&text)
                                    {
                                        return Some((success, message));
                                    }
                                    warn!("Unexpected frame during auth");
                                } else if frame.is_err() {
                                    return None;
                                }
                            }
                            None
                        })
                        .await;

                        match auth {
                            Ok(Some((true, message))) => {
                                info!(user_id = %user_id, "Authenticated with chat relay: {}", message);
                            }
                            Ok(Some((false, message))) => {
                                error!("Authentication failed: {}", message);
                                if events_tx.send(TransportEvent::Rejected(message)).is_err() {
                                    break;
                                }
                                if wait_or_shutdown(&mut shutdown_rx, reconnect_delay).await {
                                    break;
                                }
                                continue;
                            }
                            Ok(None) | Err(_) => {
                                error!("No auth response from chat relay");
                                if wait_or_shutdown(&mut shutdown_rx, reconnect_delay).await {
                                    break;
                                }
                                continue;
                            }
                        }

                        // Create channel for outgoing messages
                        let (tx, mut rx) = mpsc::unbounded_channel::<WriteMessage>();
                        if let Ok(mut guard) = write_tx.lock() {
                            *guard = Some(tx);
                        }
                        connected.store(true, Ordering::SeqCst);

                        let mut end = if events_tx.send(TransportEvent::Connected).is_ok() {
                            SessionEnd::Reconnect
                        } else {
                            SessionEnd::Stop
                        };

                        // Message loop
                        while matches!(end, SessionEnd::Reconnect) {
                            tokio::select! {
                                _ = shutdown_rx.recv() => {
                                    info!("Shutdown signal received, closing connection gracefully");
                                    if let Err(e) = ws_write.send(Message::Close(None)).await {
                                        warn!(error = %e, "Failed to send close frame");
                                    }
                                    end = SessionEnd::Stop;
                                }
                                Some(msg) = rx.recv() => {
                                    match msg {
                                        WriteMessage::Data(data) => {
                                            if ws_write.send(Message::Text(data.into())).await.is_err() {
                                                error!("Failed to send frame to chat relay");
                                                break;
                                            }
                                        }
                                        WriteMessage::Close => {
                                            info!("Close requested, sending close frame");
                                            if let Err(e) = ws_write.send(Message::Close(None)).await {
                                                warn!(error = %e, "Failed to send close frame");
                                            }
                                            end = SessionEnd::Stop;
                                        }
                                    }
                                }
                                msg = ws_read.next() => {
                                    match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            match serde_json::from_str::<WsMessage>(&text) {
                                                Ok(frame) => {
                                                    if events_tx.send(TransportEvent::Frame(frame)).is_err() {
                                                        debug!("Event receiver dropped, closing connection");
                                                        let _ = ws_write.send(Message::Close(None)).await;
                                                        end = SessionEnd::Stop;
                                                    }
                                                }
                                                Err(e) => {
                                                    warn!(error = %e, "Ignoring malformed frame from relay");
                                                }
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | None => {
                                            info!("Relay closed connection");
                                            break;
                                        }
                                        Some(Err(e)) => {
                                            error!(error = %e, "WebSocket error");
                                            break;
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }

                        // Cleanup
                        if let Ok(mut guard) = write_tx.lock() {
                            *guard = None;
                        }
                        connected.store(false, Ordering::SeqCst);
                        info!("Disconnected from chat relay");

                        if matches!(end, SessionEnd::Stop) {
                            break;
                        }
                        if events_tx.send(TransportEvent::Disconnected).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, url = %endpoint, "Failed to connect to chat relay");
                    }
                }

                debug!(delay = ?reconnect_delay, "Reconnecting");
                if wait_or_shutdown(&mut shutdown_rx, reconnect_delay).await {
                    break;
                }
            }

            running.store(false, Ordering::SeqCst);
        });

        Ok(events_rx)
    }

    fn emit(&self, message: WsMessage) -> Result<()> {
        let json = serde_json::to_string(&message)?;
        let preview: String = json.chars().take(100).collect();
        debug!(preview = %preview, "Sending frame to relay");

        let guard = self
            .write_tx
            .lock()
            .map_err(|e| ChatError::Transport(format!("Lock poisoned: {}", e)))?;

        match guard.as_ref() {
            Some(tx) => tx
                .send(WriteMessage::Data(json))
                .map_err(|_| ChatError::NotConnected),
            None => {
                warn!("Cannot send frame: not connected to relay");
                Err(ChatError::NotConnected)
            }
        }
    }

    /// Gracefully disconnect and stop reconnecting
    fn disconnect(&self) {
        info!("Initiating graceful disconnect");
        let _ = self.shutdown_tx.send(());
        if let Ok(guard) = self.write_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(WriteMessage::Close);
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Sleep for the reconnect delay. Returns true if shutdown was requested meanwhile.
async fn wait_or_shutdown(shutdown_rx: &mut broadcast::Receiver<()>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received, stopping reconnection");
            true
        }
        _ = tokio::time::sleep(delay) => false,
    }
}
