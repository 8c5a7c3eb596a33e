use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::helpers::format_display_time;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Counterparty {
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LastMessage {
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Chat {
    pub id: String,
    pub listing_id: String,
    pub counterparty: Counterparty,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    /// Listing title, filled in lazily after the list loads.
    pub title: String,
}

impl Chat {
    pub fn needs_title(&self) -> bool {
        self.title.is_empty() && !self.listing_id.is_empty()
    }

    /// Time shown next to the last-message preview in the chat list
    pub fn preview_time(&self) -> String {
        self.last_message
            .as_ref()
            .and_then(|m| m.timestamp)
            .map(|ts| format_display_time(&ts.with_timezone(&Local)))
            .unwrap_or_default()
    }
}
