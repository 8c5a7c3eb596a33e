use serde::{Deserialize, Serialize};

/// Frames exchanged on the chat namespace (shared between relay and client)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "connect")]
    Connect {
        user_id: String,
        #[serde(default)]
        token: Option<String>,
    },
    #[serde(rename = "auth_response")]
    AuthResponse { success: bool, message: String },
    #[serde(rename = "join")]
    Join { room: String },
    #[serde(rename = "leave")]
    Leave { room: String },
    #[serde(rename = "send_message")]
    SendMessage {
        room: String,
        message: String,
        sender: String,
    },
    #[serde(rename = "receive_message")]
    ReceiveMessage {
        message: String,
        sender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
    },
    #[serde(rename = "user_joined")]
    UserJoined { room: String },
    #[serde(rename = "user_left")]
    UserLeft { room: String },
    #[serde(rename = "error")]
    Error { message: String },
}
