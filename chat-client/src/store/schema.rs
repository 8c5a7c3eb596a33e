//! Store wire records and the adapters that turn them into local models.
//!
//! The backend's field names are not under our control, so every record is
//! checked here. A renamed or missing required field fails with
//! [`ChatError::Schema`] instead of producing a blank message row.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ChatError, Result};
use crate::models::{
    Author, Chat, Counterparty, LastMessage, Listing, Message, NewReview, SellStatus,
};
use crate::utils::helpers::parse_timestamp;

/// Version of the store records understood by these adapters
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiOtherUser {
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiLastMessage {
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiChat {
    pub id: String,
    #[serde(default)]
    pub listing_id: String,
    #[serde(default)]
    pub other_user: Option<ApiOtherUser>,
    #[serde(default)]
    pub last_message: Option<ApiLastMessage>,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiChatList {
    pub chats: Vec<ApiChat>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiMessage {
    pub id: String,
    pub sender_id: String,
    pub message: String,
    pub timestamp: String,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiChatDetail {
    #[serde(flatten)]
    pub chat: ApiChat,
    pub messages: Vec<ApiMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiCreateChat {
    pub listing_id: String,
    pub seller_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiNewMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
}

/// Ids the listing service sends either as strings or as integers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ApiId {
    Text(String),
    Number(i64),
}

impl fmt::Display for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiId::Text(s) => write!(f, "{}", s),
            ApiId::Number(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiListing {
    #[serde(rename = "ListingID", default)]
    pub listing_id: Option<ApiId>,
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "UserID")]
    pub user_id: ApiId,
    #[serde(rename = "SellStatus")]
    pub sell_status: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiSellStatusUpdate {
    #[serde(rename = "SellStatus")]
    pub sell_status: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiReview {
    #[serde(rename = "ListingID")]
    pub listing_id: String,
    #[serde(rename = "Rating")]
    pub rating: u8,
    #[serde(rename = "Review")]
    pub review: String,
    #[serde(rename = "ReviewDate")]
    pub review_date: String,
    #[serde(rename = "ReviewerID")]
    pub reviewer_id: String,
    #[serde(rename = "SellerID")]
    pub seller_id: String,
}

pub fn adapt_chat(record: ApiChat) -> Result<Chat> {
    if record.id.trim().is_empty() {
        return Err(ChatError::Schema("chat record without id".to_string()));
    }

    let counterparty = match record.other_user {
        Some(user) => Counterparty {
            name: user.username,
            avatar: user.avatar.filter(|a| !a.is_empty()),
        },
        None => Counterparty {
            name: "Unknown".to_string(),
            avatar: None,
        },
    };

    let last_message = record.last_message.map(|last| {
        let timestamp = last.timestamp.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                warn!(chat_id = %record.id, raw, "Unparseable last message timestamp");
            }
            parsed
        });
        LastMessage {
            text: last.text,
            timestamp,
        }
    });

    Ok(Chat {
        id: record.id,
        listing_id: record.listing_id,
        counterparty,
        last_message,
        unread_count: record.unread_count,
        title: String::new(),
    })
}

/// Map a stored message to a local one, tagging the author from the viewer's side
pub fn adapt_message(record: &ApiMessage, chat_id: &str, current_user_id: &str) -> Result<Message> {
    if record.sender_id.trim().is_empty() {
        return Err(ChatError::Schema(format!(
            "message {} has no sender",
            record.id
        )));
    }
    if record.message.trim().is_empty() {
        return Err(ChatError::Schema(format!(
            "message {} has no text",
            record.id
        )));
    }
    let created_at = parse_timestamp(&record.timestamp).ok_or_else(|| {
        ChatError::Schema(format!(
            "message {} has invalid timestamp '{}'",
            record.id, record.timestamp
        ))
    })?;

    Ok(Message::confirmed(
        chat_id,
        &record.sender_id,
        Author::classify(&record.sender_id, current_user_id),
        &record.message,
        created_at,
    ))
}

pub fn adapt_listing(record: ApiListing, requested_id: &str) -> Result<Listing> {
    let owner_id = record.user_id.to_string();
    if owner_id.trim().is_empty() {
        return Err(ChatError::Schema(format!(
            "listing {} has no owner",
            requested_id
        )));
    }

    Ok(Listing {
        id: record
            .listing_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| requested_id.to_string()),
        title: record.title.unwrap_or_default(),
        owner_id,
        sell_status: SellStatus(record.sell_status),
    })
}

pub fn review_record(review: &NewReview) -> ApiReview {
    ApiReview {
        listing_id: review.listing_id.clone(),
        rating: review.rating,
        review: review.comment.clone(),
        review_date: review.review_date.to_rfc3339(),
        reviewer_id: review.reviewer_id.clone(),
        seller_id: review.seller_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_chat_detail_parses_store_shape() {
        let body = json!({
            "id": "chat1",
            "listing_id": "L42",
            "other_user": { "username": "sam", "avatar": "" },
            "messages": [
                { "id": "m1", "sender_id": "U2", "message": "Is this available?",
                  "timestamp": "2024-03-07T09:05:00", "read": false }
            ]
        });
        let detail: ApiChatDetail = serde_json::from_value(body).unwrap();
        assert_eq!(detail.chat.id, "chat1");
        assert_eq!(detail.messages.len(), 1);

        let chat = adapt_chat(detail.chat).unwrap();
        assert_eq!(chat.counterparty.name, "sam");
        assert_eq!(chat.counterparty.avatar, None);
    }

    #[test]
    fn test_renamed_message_field_fails_loudly() {
        let body = json!({
            "id": "chat1",
            "messages": [
                { "id": "m1", "sender_id": "U2", "content": "renamed", "timestamp": "2024-03-07T09:05:00" }
            ]
        });
        assert!(serde_json::from_value::<ApiChatDetail>(body).is_err());
    }

    #[test]
    fn test_adapt_message_tags_author() {
        let record = ApiMessage {
            id: "m1".to_string(),
            sender_id: "U1".to_string(),
            message: "hello".to_string(),
            timestamp: "2024-03-07T09:05:00Z".to_string(),
            read: true,
        };

        let mine = adapt_message(&record, "chat1", "U1").unwrap();
        assert_eq!(mine.author, Author::Me);
        assert!(!mine.pending);
        assert_eq!(
            mine.created_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap())
        );

        let theirs = adapt_message(&record, "chat1", "U2").unwrap();
        assert_eq!(theirs.author, Author::Other);
    }

    #[test]
    fn test_adapt_message_rejects_blank_fields() {
        let mut record = ApiMessage {
            id: "m1".to_string(),
            sender_id: String::new(),
            message: "hello".to_string(),
            timestamp: "2024-03-07T09:05:00Z".to_string(),
            read: false,
        };
        assert!(matches!(
            adapt_message(&record, "chat1", "U1"),
            Err(ChatError::Schema(_))
        ));

        record.sender_id = "U1".to_string();
        record.timestamp = "not a time".to_string();
        assert!(matches!(
            adapt_message(&record, "chat1", "U1"),
            Err(ChatError::Schema(_))
        ));
    }

    #[test]
    fn test_listing_accepts_numeric_owner() {
        let body = json!({ "ListingID": 42, "Title": "Desk lamp", "UserID": 7, "SellStatus": 1 });
        let record: ApiListing = serde_json::from_value(body).unwrap();
        let listing = adapt_listing(record, "42").unwrap();
        assert_eq!(listing.owner_id, "7");
        assert_eq!(listing.id, "42");
        assert!(!listing.sell_status.is_sold());
    }

    #[test]
    fn test_listing_missing_status_fails() {
        let body = json!({ "Title": "Desk lamp", "UserID": "U1" });
        assert!(serde_json::from_value::<ApiListing>(body).is_err());
    }

    #[test]
    fn test_review_record_uses_backend_keys() {
        let review = NewReview {
            listing_id: "L42".to_string(),
            reviewer_id: "U2".to_string(),
            seller_id: "U1".to_string(),
            rating: 5,
            comment: "Smooth pickup".to_string(),
            review_date: Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap(),
        };
        let value = serde_json::to_value(review_record(&review)).unwrap();
        assert_eq!(value["ListingID"], "L42");
        assert_eq!(value["Rating"], 5);
        assert_eq!(value["Review"], "Smooth pickup");
        assert_eq!(value["ReviewerID"], "U2");
        assert_eq!(value["SellerID"], "U1");
        assert!(value["ReviewDate"].as_str().unwrap().starts_with("2024-03-07T09:05:00"));
    }
}
