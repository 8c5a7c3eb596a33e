//! ReuseU chat relay library
//!
//! Room-based fan-out for listing chats. Exposed as a library so the client
//! crate's integration tests can run a real relay in-process.

mod config;
mod connection;
mod messages;
mod state;

pub use config::RelayConfig;
pub use connection::{accept_connection, handle_connection, handle_message};
pub use messages::WsMessage;
pub use state::{ConnectionId, RelayState};
