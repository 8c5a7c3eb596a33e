mod client;
mod messages;

pub use client::WebSocketClient;
pub use messages::WsMessage;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::auth::IdentityProvider;
use crate::error::Result;

/// What the realtime connection reports back to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Authenticated with the relay. Room membership starts empty.
    Connected,
    /// Connection lost; a reconnect attempt follows.
    Disconnected,
    /// Relay refused the `connect` frame.
    Rejected(String),
    Frame(WsMessage),
}

/// Realtime connection to the chat relay
pub trait Transport: Send + Sync {
    /// Start connecting in the background. Events arrive on the returned channel
    /// until [`Transport::disconnect`] is called or the receiver is dropped.
    fn connect(
        &self,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Queue a frame on the live connection. Fails when not connected.
    fn emit(&self, message: WsMessage) -> Result<()>;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
