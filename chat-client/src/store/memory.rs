//! In-process stores that behave like the backend: bearer tokens resolve to
//! users, participation and ownership are enforced, and failures can be
//! switched on per store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use super::schema::{ApiChat, ApiChatDetail, ApiLastMessage, ApiMessage, ApiNewMessage, ApiOtherUser};
use super::{ChatStore, ListingStore, ReviewStore};
use crate::error::{ChatError, Result};
use crate::models::{Listing, NewReview, SellStatus};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unavailable() -> ChatError {
    ChatError::Status {
        status: 503,
        message: "store unavailable".to_string(),
    }
}

#[derive(Debug, Clone)]
struct DirectoryUser {
    user_id: String,
    username: String,
}

/// Users known to the in-memory stores, keyed by bearer token
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: Mutex<HashMap<String, DirectoryUser>>,
}

impl MemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_user(&self, user_id: &str, username: &str, token: &str) {
        lock(&self.users).insert(
            token.to_string(),
            DirectoryUser {
                user_id: user_id.to_string(),
                username: username.to_string(),
            },
        );
    }

    fn resolve(&self, token: &str) -> Result<String> {
        lock(&self.users)
            .get(token)
            .map(|user| user.user_id.clone())
            .ok_or(ChatError::Unauthorized)
    }

    fn username(&self, user_id: &str) -> Option<String> {
        lock(&self.users)
            .values()
            .find(|user| user.user_id == user_id)
            .map(|user| user.username.clone())
    }
}

#[derive(Debug, Clone)]
struct StoredChat {
    id: String,
    listing_id: String,
    buyer_id: String,
    seller_id: String,
}

impl StoredChat {
    fn has_participant(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    fn other_party(&self, user_id: &str) -> &str {
        if self.buyer_id == user_id {
            &self.seller_id
        } else {
            &self.buyer_id
        }
    }
}

#[derive(Debug, Default)]
struct ChatTables {
    chats: Vec<StoredChat>,
    messages: HashMap<String, Vec<ApiMessage>>,
    next_chat: u64,
    next_message: u64,
    fail_reads: bool,
    fail_appends: bool,
    duplicate_rows: bool,
    append_calls: usize,
    create_calls: usize,
}

pub struct MemoryChatStore {
    directory: Arc<MemoryDirectory>,
    tables: Mutex<ChatTables>,
}

impl MemoryChatStore {
    pub fn new(directory: Arc<MemoryDirectory>) -> Self {
        Self {
            directory,
            tables: Mutex::new(ChatTables::default()),
        }
    }

    /// Make list and detail reads fail
    pub fn fail_reads(&self, fail: bool) {
        lock(&self.tables).fail_reads = fail;
    }

    pub fn fail_appends(&self, fail: bool) {
        lock(&self.tables).fail_appends = fail;
    }

    /// Return every chat twice from `list_chats`, as overlapping pages would
    pub fn duplicate_rows(&self, duplicate: bool) {
        lock(&self.tables).duplicate_rows = duplicate;
    }

    pub fn append_calls(&self) -> usize {
        lock(&self.tables).append_calls
    }

    pub fn create_calls(&self) -> usize {
        lock(&self.tables).create_calls
    }

    pub fn chat_count(&self) -> usize {
        lock(&self.tables).chats.len()
    }

    pub fn messages(&self, chat_id: &str) -> Vec<ApiMessage> {
        lock(&self.tables)
            .messages
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    fn to_record(&self, tables: &ChatTables, chat: &StoredChat, viewer: &str) -> ApiChat {
        let other = chat.other_party(viewer);
        let last_message = tables
            .messages
            .get(&chat.id)
            .and_then(|messages| messages.last())
            .map(|m| ApiLastMessage {
                text: m.message.clone(),
                timestamp: Some(m.timestamp.clone()),
            });

        ApiChat {
            id: chat.id.clone(),
            listing_id: chat.listing_id.clone(),
            other_user: Some(ApiOtherUser {
                username: self
                    .directory
                    .username(other)
                    .unwrap_or_else(|| other.to_string()),
                avatar: None,
            }),
            last_message,
            unread_count: 0,
        }
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn list_chats(&self, token: &str) -> Result<Vec<ApiChat>> {
        let user_id = self.directory.resolve(token)?;
        let tables = lock(&self.tables);
        if tables.fail_reads {
            return Err(unavailable());
        }

        let mut records: Vec<ApiChat> = tables
            .chats
            .iter()
            .filter(|chat| chat.has_participant(&user_id))
            .map(|chat| self.to_record(&tables, chat, &user_id))
            .collect();
        if tables.duplicate_rows {
            let copy = records.clone();
            records.extend(copy);
        }
        Ok(records)
    }

    async fn get_chat(&self, token: &str, chat_id: &str) -> Result<ApiChatDetail> {
        let user_id = self.directory.resolve(token)?;
        let tables = lock(&self.tables);
        if tables.fail_reads {
            return Err(unavailable());
        }

        let chat = tables
            .chats
            .iter()
            .find(|chat| chat.id == chat_id)
            .ok_or_else(|| ChatError::NotFound(format!("chat {}", chat_id)))?;
        if !chat.has_participant(&user_id) {
            return Err(ChatError::Forbidden(format!("not a member of {}", chat_id)));
        }

        Ok(ApiChatDetail {
            chat: self.to_record(&tables, chat, &user_id),
            messages: tables.messages.get(chat_id).cloned().unwrap_or_default(),
        })
    }

    async fn create_chat(
        &self,
        token: &str,
        listing_id: &str,
        seller_id: &str,
    ) -> Result<ApiChat> {
        let buyer_id = self.directory.resolve(token)?;
        let mut tables = lock(&self.tables);
        tables.create_calls += 1;

        if buyer_id == seller_id {
            return Err(ChatError::Status {
                status: 400,
                message: "cannot start a chat about your own listing".to_string(),
            });
        }

        let existing = tables
            .chats
            .iter()
            .find(|c| c.listing_id == listing_id && c.buyer_id == buyer_id)
            .cloned();
        let chat = match existing {
            Some(chat) => chat,
            None => {
                tables.next_chat += 1;
                let chat = StoredChat {
                    id: format!("chat{}", tables.next_chat),
                    listing_id: listing_id.to_string(),
                    buyer_id: buyer_id.clone(),
                    seller_id: seller_id.to_string(),
                };
                tables.chats.push(chat.clone());
                chat
            }
        };

        Ok(self.to_record(&tables, &chat, &buyer_id))
    }

    async fn append_message(&self, token: &str, message: &ApiNewMessage) -> Result<()> {
        let user_id = self.directory.resolve(token)?;
        let mut tables = lock(&self.tables);
        tables.append_calls += 1;

        if tables.fail_appends {
            return Err(unavailable());
        }
        if message.sender_id != user_id {
            return Err(ChatError::Forbidden("sender does not match caller".to_string()));
        }
        if message.content.trim().is_empty() {
            return Err(ChatError::Status {
                status: 400,
                message: "empty message".to_string(),
            });
        }
        let member = tables
            .chats
            .iter()
            .find(|c| c.id == message.chat_id)
            .map(|c| c.has_participant(&user_id))
            .ok_or_else(|| ChatError::NotFound(format!("chat {}", message.chat_id)))?;
        if !member {
            return Err(ChatError::Forbidden(format!(
                "not a member of {}",
                message.chat_id
            )));
        }

        tables.next_message += 1;
        let record = ApiMessage {
            id: format!("m{}", tables.next_message),
            sender_id: message.sender_id.clone(),
            message: message.content.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            read: false,
        };
        tables
            .messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ListingTables {
    listings: HashMap<String, Listing>,
    fail_reads: bool,
    fail_updates: bool,
    update_calls: usize,
}

pub struct MemoryListingStore {
    directory: Arc<MemoryDirectory>,
    tables: Mutex<ListingTables>,
}

impl MemoryListingStore {
    pub fn new(directory: Arc<MemoryDirectory>) -> Self {
        Self {
            directory,
            tables: Mutex::new(ListingTables::default()),
        }
    }

    pub fn insert(&self, listing: Listing) {
        lock(&self.tables)
            .listings
            .insert(listing.id.clone(), listing);
    }

    pub fn fail_reads(&self, fail: bool) {
        lock(&self.tables).fail_reads = fail;
    }

    pub fn fail_updates(&self, fail: bool) {
        lock(&self.tables).fail_updates = fail;
    }

    pub fn update_calls(&self) -> usize {
        lock(&self.tables).update_calls
    }

    pub fn sell_status(&self, listing_id: &str) -> Option<SellStatus> {
        lock(&self.tables)
            .listings
            .get(listing_id)
            .map(|l| l.sell_status)
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn get_listing(&self, token: &str, listing_id: &str) -> Result<Listing> {
        self.directory.resolve(token)?;
        let tables = lock(&self.tables);
        if tables.fail_reads {
            return Err(unavailable());
        }
        tables
            .listings
            .get(listing_id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(format!("listing {}", listing_id)))
    }

    async fn update_sell_status(
        &self,
        token: &str,
        listing_id: &str,
        status: SellStatus,
    ) -> Result<()> {
        let user_id = self.directory.resolve(token)?;
        let mut tables = lock(&self.tables);
        tables.update_calls += 1;

        if tables.fail_updates {
            return Err(unavailable());
        }
        let listing = tables
            .listings
            .get_mut(listing_id)
            .ok_or_else(|| ChatError::NotFound(format!("listing {}", listing_id)))?;
        if listing.owner_id != user_id {
            return Err(ChatError::Forbidden(format!(
                "listing {} belongs to another user",
                listing_id
            )));
        }
        listing.sell_status = status;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ReviewTables {
    reviews: Vec<NewReview>,
    fail_creates: bool,
    create_calls: usize,
}

pub struct MemoryReviewStore {
    directory: Arc<MemoryDirectory>,
    tables: Mutex<ReviewTables>,
}

impl MemoryReviewStore {
    pub fn new(directory: Arc<MemoryDirectory>) -> Self {
        Self {
            directory,
            tables: Mutex::new(ReviewTables::default()),
        }
    }

    pub fn fail_creates(&self, fail: bool) {
        lock(&self.tables).fail_creates = fail;
    }

    pub fn create_calls(&self) -> usize {
        lock(&self.tables).create_calls
    }

    pub fn reviews(&self) -> Vec<NewReview> {
        lock(&self.tables).reviews.clone()
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn create_review(&self, token: &str, review: &NewReview) -> Result<()> {
        let user_id = self.directory.resolve(token)?;
        let mut tables = lock(&self.tables);
        tables.create_calls += 1;

        if tables.fail_creates {
            return Err(unavailable());
        }
        if review.reviewer_id != user_id {
            return Err(ChatError::Forbidden("reviewer does not match caller".to_string()));
        }
        if !(1..=5).contains(&review.rating) {
            return Err(ChatError::Status {
                status: 400,
                message: "rating out of range".to_string(),
            });
        }
        tables.reviews.push(review.clone());
        Ok(())
    }
}
