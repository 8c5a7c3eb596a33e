use thiserror::Error;

/// Errors produced by the chat core.
///
/// None of these are fatal to a session: operations that talk to the network
/// either degrade to an empty value or record [`ChatError::inline_message`]
/// next to the control that triggered them.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The realtime connection failed or a frame could not be written.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No live connection to the chat relay.
    #[error("Not connected to chat relay")]
    NotConnected,

    /// Request could not be sent or the response body could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store answered with an unexpected status code.
    #[error("Store returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Missing, expired, or rejected bearer credential.
    #[error("Not signed in or session expired")]
    Unauthorized,

    /// Authenticated but not allowed to perform the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A store record did not match the expected schema.
    #[error("Unexpected store record: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The identity provider could not supply a user or credential.
    #[error("Identity error: {0}")]
    Identity(String),

    /// A transaction gate transition is not allowed in the current state.
    #[error("{0}")]
    Gate(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ChatError {
    /// Text shown next to the control that triggered the failed action
    pub fn inline_message(&self) -> String {
        match self {
            ChatError::Forbidden(_) => "You don't have permission to do that.".to_string(),
            ChatError::Unauthorized | ChatError::Identity(_) => {
                "Please sign in again to continue.".to_string()
            }
            ChatError::Validation(message) | ChatError::Gate(message) => message.clone(),
            ChatError::NotConnected | ChatError::Transport(_) => {
                "Chat is offline. Your message was not delivered live.".to_string()
            }
            ChatError::NotFound(_) => "That item no longer exists.".to_string(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, ChatError::Forbidden(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_message_distinct_from_generic() {
        let forbidden = ChatError::Forbidden("admin only".to_string());
        let generic = ChatError::Status {
            status: 500,
            message: "boom".to_string(),
        };

        assert!(forbidden.is_forbidden());
        assert!(!generic.is_forbidden());
        assert_ne!(forbidden.inline_message(), generic.inline_message());
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = ChatError::Validation("Comment cannot be empty".to_string());
        assert_eq!(err.inline_message(), "Comment cannot be empty");
    }
}
