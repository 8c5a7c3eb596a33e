//! Client core for ReuseU marketplace chat: chat list, realtime messaging
//! with optimistic sends, and the mark-sold / review gate.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod session;
pub mod store;
mod utils;
pub mod websocket;

pub use auth::{IdentityProvider, StaticIdentity};
pub use config::ClientConfig;
pub use error::{ChatError, Result};
pub use session::{ChatSession, ConnectionState, SessionDeps, View};
pub use utils::helpers::format_display_time;
