use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::schema::{
    adapt_listing, review_record, ApiChat, ApiChatDetail, ApiChatList, ApiCreateChat, ApiListing,
    ApiNewMessage, ApiSellStatusUpdate,
};
use super::{ChatStore, ListingStore, ReviewStore};
use crate::config::ClientConfig;
use crate::error::{ChatError, Result};
use crate::models::{Listing, NewReview, SellStatus};

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// REST client for the marketplace backend
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpStore {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        self.config.api_endpoint(path)
    }
}

/// Map a non-success status to the error the session reports
fn status_error(status: StatusCode, body: &str) -> ChatError {
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    };

    match status {
        StatusCode::UNAUTHORIZED => ChatError::Unauthorized,
        StatusCode::FORBIDDEN => ChatError::Forbidden(message),
        StatusCode::NOT_FOUND => ChatError::NotFound(message),
        _ => ChatError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

#[async_trait]
impl ChatStore for HttpStore {
    async fn list_chats(&self, token: &str) -> Result<Vec<ApiChat>> {
        let response = self
            .client
            .get(self.endpoint("/api/chats"))
            .bearer_auth(token)
            .send()
            .await?;
        let list: ApiChatList = check(response).await?.json().await?;
        Ok(list.chats)
    }

    async fn get_chat(&self, token: &str, chat_id: &str) -> Result<ApiChatDetail> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/chats/{}", chat_id)))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn create_chat(
        &self,
        token: &str,
        listing_id: &str,
        seller_id: &str,
    ) -> Result<ApiChat> {
        let body = ApiCreateChat {
            listing_id: listing_id.to_string(),
            seller_id: seller_id.to_string(),
        };
        let response = self
            .client
            .post(self.endpoint("/api/chats"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if response.status() != StatusCode::CONFLICT {
            return Ok(check(response).await?.json().await?);
        }

        // Chat already exists: use the body if it carries the chat, else look it up
        let text = response.text().await.unwrap_or_default();
        if let Ok(existing) = serde_json::from_str::<ApiChat>(&text) {
            debug!(chat_id = %existing.id, listing_id, "Chat already exists");
            return Ok(existing);
        }

        self.list_chats(token)
            .await?
            .into_iter()
            .find(|chat| chat.listing_id == listing_id)
            .ok_or_else(|| {
                warn!(listing_id, "Store reported existing chat but none was listed");
                ChatError::Status {
                    status: StatusCode::CONFLICT.as_u16(),
                    message: text,
                }
            })
    }

    async fn append_message(&self, token: &str, message: &ApiNewMessage) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!("/api/chats/{}/messages", message.chat_id)))
            .bearer_auth(token)
            .json(message)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ListingStore for HttpStore {
    async fn get_listing(&self, token: &str, listing_id: &str) -> Result<Listing> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/listings/{}", listing_id)))
            .bearer_auth(token)
            .send()
            .await?;
        let record: ApiListing = check(response).await?.json().await?;
        adapt_listing(record, listing_id)
    }

    async fn update_sell_status(
        &self,
        token: &str,
        listing_id: &str,
        status: SellStatus,
    ) -> Result<()> {
        let response = self
            .client
            .put(self.endpoint(&format!("/api/listings/{}", listing_id)))
            .bearer_auth(token)
            .json(&ApiSellStatusUpdate {
                sell_status: status.0,
            })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ReviewStore for HttpStore {
    async fn create_review(&self, token: &str, review: &NewReview) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("/api/reviews/"))
            .bearer_auth(token)
            .json(&review_record(review))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
