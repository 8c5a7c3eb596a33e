use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::helpers::format_display_time;

/// Which side of the conversation a message came from
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    #[serde(rename = "user")]
    Me,
    Other,
}

impl Author {
    pub fn classify(sender_id: &str, current_user_id: &str) -> Self {
        if sender_id == current_user_id {
            Author::Me
        } else {
            Author::Other
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    /// Client-side identity, stable across confirmation.
    pub local_id: Uuid,
    pub chat_id: String,
    pub sender_id: String,
    pub author: Author,
    pub content: String,
    /// Authoritative time from the relay or the store. `None` while pending.
    pub created_at: Option<DateTime<Utc>>,
    /// When this client queued the message, if it did.
    pub sent_at: Option<DateTime<Utc>>,
    pub pending: bool,
}

impl Message {
    pub fn pending(chat_id: &str, sender_id: &str, content: &str) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            author: Author::Me,
            content: content.to_string(),
            created_at: None,
            sent_at: Some(Utc::now()),
            pending: true,
        }
    }

    pub fn confirmed(
        chat_id: &str,
        sender_id: &str,
        author: Author,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            author,
            content: content.to_string(),
            created_at: Some(created_at),
            sent_at: None,
            pending: false,
        }
    }

    /// Bubble time in local time; pending messages show when they were queued
    pub fn display_time(&self) -> String {
        self.created_at
            .or(self.sent_at)
            .map(|ts| format_display_time(&ts.with_timezone(&Local)))
            .unwrap_or_default()
    }
}
