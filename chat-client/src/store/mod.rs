//! Persistence seams: the chat, listing, and review stores.
//!
//! Each call takes the bearer credential for the signed-in user so
//! implementations stay stateless with respect to identity.

mod http;
mod memory;
pub mod schema;

pub use http::HttpStore;
pub use memory::{MemoryChatStore, MemoryDirectory, MemoryListingStore, MemoryReviewStore};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Listing, NewReview, SellStatus};
use schema::{ApiChat, ApiChatDetail, ApiNewMessage};

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Chats the user takes part in, as the store returns them
    async fn list_chats(&self, token: &str) -> Result<Vec<ApiChat>>;

    async fn get_chat(&self, token: &str, chat_id: &str) -> Result<ApiChatDetail>;

    /// Find-or-create the chat between the caller and the seller about a listing
    async fn create_chat(&self, token: &str, listing_id: &str, seller_id: &str)
        -> Result<ApiChat>;

    async fn append_message(&self, token: &str, message: &ApiNewMessage) -> Result<()>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn get_listing(&self, token: &str, listing_id: &str) -> Result<Listing>;

    async fn update_sell_status(
        &self,
        token: &str,
        listing_id: &str,
        status: SellStatus,
    ) -> Result<()>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn create_review(&self, token: &str, review: &NewReview) -> Result<()>;
}
