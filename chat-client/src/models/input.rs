//! Input DTOs with garde validation.
//!
//! Everything here is checked before any transport emit or store call.

use garde::Validate;
use serde::Deserialize;

/// Validation constants
const MAX_ID_LENGTH: usize = 128;
const MAX_CHAT_ID_LENGTH: usize = 256;
const MAX_MESSAGE_LENGTH: usize = 10000;
pub const MAX_REVIEW_LENGTH: usize = 500;

/// Rejects empty and whitespace-only text
fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("cannot be empty"));
    }
    Ok(())
}

/// Input for sending a message
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SendMessageInput {
    #[garde(length(min = 1, max = MAX_CHAT_ID_LENGTH))]
    pub chat_id: String,
    #[garde(custom(not_blank), length(chars, max = MAX_MESSAGE_LENGTH))]
    pub content: String,
}

/// Input for finding or creating the chat about a listing
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct CreateChatInput {
    #[garde(length(min = 1, max = MAX_ID_LENGTH))]
    pub listing_id: String,
    #[garde(length(min = 1, max = MAX_ID_LENGTH))]
    pub seller_id: String,
}

/// Input for reviewing a seller after a sale
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct ReviewInput {
    #[garde(range(min = 1, max = 5))]
    pub rating: u8,
    #[garde(custom(not_blank), length(chars, max = MAX_REVIEW_LENGTH))]
    pub comment: String,
}

/// Helper trait to convert garde validation errors to String
pub trait ValidateExt {
    fn validate_input(&self) -> Result<(), String>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> Result<(), String> {
        self.validate().map_err(|e| e.to_string())
    }
}
