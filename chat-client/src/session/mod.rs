//! Chat session: chat list, the open chat's timeline, realtime delivery,
//! and the transaction gate for the open chat's listing.
//!
//! All state lives on [`ChatSession`] and is mutated through `&mut self`.
//! Background work (title lookups, store appends) reports back over an
//! internal channel that the owner drains with [`ChatSession::next_event`]
//! or [`ChatSession::drain_events`], together with relay frames.

mod gate;
mod timeline;

pub use gate::{ControlState, GateControls, GateState, Role, TransactionGate};
pub use timeline::{Incoming, Reconciliation, Timeline};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::IdentityProvider;
use crate::config::{ClientConfig, DUPLICATE_WINDOW};
use crate::error::{ChatError, Result};
use crate::models::input::{CreateChatInput, SendMessageInput, ValidateExt};
use crate::models::{Author, Chat, LastMessage, Listing, Message, SellStatus};
use crate::store::schema::{adapt_chat, adapt_message, ApiNewMessage};
use crate::store::{ChatStore, HttpStore, ListingStore, ReviewStore};
use crate::utils::helpers::parse_timestamp;
use crate::websocket::{Transport, TransportEvent, WebSocketClient, WsMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    List,
    Detail,
}

/// Collaborators a session talks to
pub struct SessionDeps {
    pub identity: Arc<dyn IdentityProvider>,
    pub chats: Arc<dyn ChatStore>,
    pub listings: Arc<dyn ListingStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub transport: Arc<dyn Transport>,
}

/// Results of background work
#[derive(Debug)]
enum Update {
    TitleResolved { chat_id: String, title: String },
    AppendFailed { chat_id: String, local_id: Uuid, error: String },
}

enum SessionInput {
    Transport(Option<TransportEvent>),
    Background(Option<Update>),
}

pub struct ChatSession {
    identity: Arc<dyn IdentityProvider>,
    chat_store: Arc<dyn ChatStore>,
    listing_store: Arc<dyn ListingStore>,
    review_store: Arc<dyn ReviewStore>,
    transport: Arc<dyn Transport>,

    connection: ConnectionState,
    inbound: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    /// Dropped on sign-out so the pump ends once background tasks finish
    updates_tx: Option<mpsc::UnboundedSender<Update>>,
    updates_rx: mpsc::UnboundedReceiver<Update>,

    chats: Vec<Chat>,
    selected: Option<Chat>,
    /// Room the relay currently has us in
    joined_room: Option<String>,
    listing_title: String,
    timeline: Timeline,
    gate: Option<TransactionGate>,
    /// Sends still unconfirmed when their chat was closed, by chat id
    outbox: HashMap<String, Vec<Message>>,
    reviewed_chats: HashSet<String>,
    draft: String,
    notice: Option<String>,
}

impl ChatSession {
    pub fn new(deps: SessionDeps) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        Self {
            identity: deps.identity,
            chat_store: deps.chats,
            listing_store: deps.listings,
            review_store: deps.reviews,
            transport: deps.transport,
            connection: ConnectionState::Disconnected,
            inbound: None,
            updates_tx: Some(updates_tx),
            updates_rx,
            chats: Vec::new(),
            selected: None,
            joined_room: None,
            listing_title: String::new(),
            timeline: Timeline::new(DUPLICATE_WINDOW),
            gate: None,
            outbox: HashMap::new(),
            reviewed_chats: HashSet::new(),
            draft: String::new(),
            notice: None,
        }
    }

    /// Session backed by the REST backend and the WebSocket relay
    pub fn from_config(config: &ClientConfig, identity: Arc<dyn IdentityProvider>) -> Result<Self> {
        let store = Arc::new(HttpStore::new(config)?);
        let transport = Arc::new(WebSocketClient::new(config));

        Ok(Self::new(SessionDeps {
            identity,
            chats: store.clone(),
            listings: store.clone(),
            reviews: store,
            transport,
        })
        .with_duplicate_window(config.duplicate_window))
    }

    pub fn with_duplicate_window(mut self, window: Duration) -> Self {
        self.timeline = Timeline::new(window);
        self
    }

    // ---- accessors ----

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn selected_chat(&self) -> Option<&Chat> {
        self.selected.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        self.timeline.messages()
    }

    pub fn view(&self) -> View {
        if self.selected.is_some() {
            View::Detail
        } else {
            View::List
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn gate(&self) -> Option<&TransactionGate> {
        self.gate.as_ref()
    }

    pub fn listing_title(&self) -> &str {
        &self.listing_title
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Inline error from the last failed send
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Unconfirmed sends held for a closed chat
    pub fn outbox_len(&self, chat_id: &str) -> usize {
        self.outbox.get(chat_id).map_or(0, Vec::len)
    }

    pub fn header_title(&self) -> String {
        if self.selected.is_some() && !self.listing_title.is_empty() {
            format!("Chat about {}", self.listing_title)
        } else {
            "Chats".to_string()
        }
    }

    // ---- connection ----

    /// Start the realtime connection if it is not already running.
    /// Returns false when signed out or the transport refused to start.
    pub fn ensure_connected(&mut self) -> bool {
        if self.inbound.is_some() {
            return true;
        }
        if self.identity.user_id().is_none() {
            debug!("Not connecting to chat relay while signed out");
            return false;
        }

        self.connection = ConnectionState::Connecting;
        match self.transport.connect(self.identity.clone()) {
            Ok(events) => {
                self.inbound = Some(events);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to start chat relay connection");
                self.connection = ConnectionState::Disconnected;
                false
            }
        }
    }

    /// Leave the open chat and drop the connection. Local state is cleared.
    pub fn sign_out(&mut self) {
        self.close_chat();
        if self.inbound.take().is_some() {
            self.transport.disconnect();
        }
        self.connection = ConnectionState::Disconnected;
        self.joined_room = None;
        self.chats.clear();
        self.outbox.clear();
        self.reviewed_chats.clear();
        self.draft.clear();
        self.notice = None;
        self.updates_tx = None;
        info!("Chat session signed out");
    }

    /// Sender for background results, reopening the channel after a sign-out
    fn updates_sender(&mut self) -> mpsc::UnboundedSender<Update> {
        if let Some(tx) = &self.updates_tx {
            return tx.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.updates_rx = rx;
        self.updates_tx = Some(tx.clone());
        tx
    }

    async fn token(&self) -> Option<String> {
        match self.identity.bearer_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "No credential available");
                None
            }
        }
    }

    fn emit(&self, message: WsMessage) -> Result<()> {
        self.transport.emit(message)
    }

    fn join_room(&mut self, room: &str) {
        match self.emit(WsMessage::Join {
            room: room.to_string(),
        }) {
            Ok(()) => {
                debug!(room, "Joined chat room");
                self.joined_room = Some(room.to_string());
            }
            Err(e) => debug!(room, error = %e, "Join deferred until connected"),
        }
    }

    fn leave_room(&mut self, room: &str) {
        if let Err(e) = self.emit(WsMessage::Leave {
            room: room.to_string(),
        }) {
            debug!(room, error = %e, "Could not send leave");
        }
        if self.joined_room.as_deref() == Some(room) {
            self.joined_room = None;
        }
    }

    // ---- chat list ----

    /// Load the user's chats. On failure the current list is kept.
    /// Listing titles are resolved in the background.
    pub async fn load_chats(&mut self) -> usize {
        if self.identity.user_id().is_none() {
            warn!("Cannot load chats while signed out");
            return self.chats.len();
        }
        self.ensure_connected();

        let Some(token) = self.token().await else {
            return self.chats.len();
        };

        let records = match self.chat_store.list_chats(&token).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to load chats");
                return self.chats.len();
            }
        };

        let mut seen = HashSet::new();
        let mut chats = Vec::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.id.clone()) {
                continue;
            }
            match adapt_chat(record) {
                Ok(mut chat) => {
                    if let Some(known) = self.chats.iter().find(|c| c.id == chat.id) {
                        chat.title = known.title.clone();
                    }
                    chats.push(chat);
                }
                Err(e) => warn!(error = %e, "Skipping chat record"),
            }
        }

        info!(count = chats.len(), "Loaded chats");
        self.chats = chats;
        self.spawn_title_lookups(&token);
        self.chats.len()
    }

    fn spawn_title_lookups(&mut self, token: &str) {
        let sender = self.updates_sender();
        for chat in self.chats.iter().filter(|c| c.needs_title()) {
            let store = self.listing_store.clone();
            let updates = sender.clone();
            let token = token.to_string();
            let chat_id = chat.id.clone();
            let listing_id = chat.listing_id.clone();

            tokio::spawn(async move {
                match store.get_listing(&token, &listing_id).await {
                    Ok(listing) if !listing.title.is_empty() => {
                        let _ = updates.send(Update::TitleResolved {
                            chat_id,
                            title: listing.title,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => debug!(listing_id, error = %e, "Listing title lookup failed"),
                }
            });
        }
    }

    /// Find or create the chat with a listing's seller, then open it
    pub async fn start_chat(&mut self, listing_id: &str, seller_id: &str) -> Result<Chat> {
        let input = CreateChatInput {
            listing_id: listing_id.to_string(),
            seller_id: seller_id.to_string(),
        };
        input.validate_input().map_err(ChatError::Validation)?;

        let token = self.identity.bearer_token().await?;
        let record = self
            .chat_store
            .create_chat(&token, listing_id, seller_id)
            .await?;
        let created = adapt_chat(record)?;

        let chat = match self.chats.iter().find(|c| c.id == created.id) {
            Some(existing) => existing.clone(),
            None => {
                self.chats.insert(0, created.clone());
                created
            }
        };

        self.open_chat(chat.clone()).await;
        Ok(chat)
    }

    // ---- open chat ----

    /// Open a chat: fetch its listing and history, then join its room.
    /// Returns false, leaving the previous chat open, if history cannot be loaded.
    pub async fn open_chat(&mut self, chat: Chat) -> bool {
        let Some(user_id) = self.identity.user_id() else {
            warn!("Cannot open chat while signed out");
            return false;
        };
        let Some(token) = self.token().await else {
            return false;
        };
        self.ensure_connected();

        let listing = self.fetch_listing(&token, &chat.listing_id).await;

        let detail = match self.chat_store.get_chat(&token, &chat.id).await {
            Ok(detail) => detail,
            Err(e) => {
                error!(chat_id = %chat.id, error = %e, "Failed to load chat history");
                return false;
            }
        };

        let mut carried = Vec::new();
        if let Some(previous) = self.selected.take() {
            if previous.id == chat.id {
                carried = self.timeline.take_pending();
            } else {
                self.stash_pending(&previous.id);
                self.leave_room(&previous.id);
            }
        }
        carried.extend(self.outbox.remove(&chat.id).unwrap_or_default());

        let history: Vec<Message> = detail
            .messages
            .iter()
            .filter_map(|record| match adapt_message(record, &chat.id, &user_id) {
                Ok(message) => Some(message),
                Err(e) => {
                    error!(chat_id = %chat.id, error = %e, "Dropping malformed message");
                    None
                }
            })
            .collect();
        self.timeline.load(history);
        let kept = self.timeline.merge_pending(carried);
        if kept > 0 {
            info!(chat_id = %chat.id, kept, "Restored unconfirmed messages");
        }

        self.listing_title = listing
            .as_ref()
            .map(|l| l.title.clone())
            .unwrap_or_default();
        if !self.listing_title.is_empty() {
            let title = self.listing_title.clone();
            self.set_chat_title(&chat.id, &title);
        }
        self.gate = Some(TransactionGate::new(
            &chat.listing_id,
            &user_id,
            listing.as_ref(),
            self.reviewed_chats.contains(&chat.id),
        ));
        self.notice = None;

        let room = chat.id.clone();
        self.selected = Some(chat);
        if self.joined_room.as_deref() != Some(room.as_str()) {
            self.join_room(&room);
        }
        true
    }

    /// Listing lookup that degrades to `None` on any failure
    async fn fetch_listing(&self, token: &str, listing_id: &str) -> Option<Listing> {
        if listing_id.is_empty() {
            return None;
        }
        match self.listing_store.get_listing(token, listing_id).await {
            Ok(listing) => Some(listing),
            Err(e) => {
                warn!(listing_id, error = %e, "Listing unavailable for chat");
                None
            }
        }
    }

    /// Close the open chat and leave its room. No-op when nothing is open.
    pub fn close_chat(&mut self) {
        let Some(chat) = self.selected.take() else {
            return;
        };
        self.stash_pending(&chat.id);
        self.leave_room(&chat.id);
        self.timeline.clear();
        self.gate = None;
        self.listing_title.clear();
        self.notice = None;
    }

    fn stash_pending(&mut self, chat_id: &str) {
        let pending = self.timeline.take_pending();
        if !pending.is_empty() {
            debug!(chat_id, count = pending.len(), "Holding unconfirmed messages");
            self.outbox
                .entry(chat_id.to_string())
                .or_default()
                .extend(pending);
        }
    }

    fn set_chat_title(&mut self, chat_id: &str, title: &str) {
        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id) {
            chat.title = title.to_string();
        }
        if let Some(chat) = self.selected.as_mut().filter(|c| c.id == chat_id) {
            chat.title = title.to_string();
        }
    }

    /// Re-read the open chat's listing, e.g. after a sale on another device
    pub async fn refresh_listing(&mut self) -> bool {
        let Some(listing_id) = self.gate.as_ref().map(|g| g.listing_id().to_string()) else {
            return false;
        };
        let Some(token) = self.token().await else {
            return false;
        };
        let Some(listing) = self.fetch_listing(&token, &listing_id).await else {
            return false;
        };

        if !listing.title.is_empty() {
            self.listing_title = listing.title.clone();
        }
        if let Some(gate) = self.gate.as_mut() {
            gate.apply_listing(&listing);
        }
        true
    }

    // ---- sending ----

    pub fn set_draft(&mut self, text: &str) {
        self.draft = text.to_string();
    }

    pub fn send_draft(&mut self) -> bool {
        let Some(chat_id) = self.selected.as_ref().map(|c| c.id.clone()) else {
            return false;
        };
        let text = self.draft.clone();
        self.send_message(&chat_id, &text)
    }

    /// Send to the open chat: show it as pending, emit to the relay, and
    /// append to the chat store in the background. Blank text is ignored.
    pub fn send_message(&mut self, chat_id: &str, text: &str) -> bool {
        let input = SendMessageInput {
            chat_id: chat_id.to_string(),
            content: text.trim().to_string(),
        };
        if input.content.is_empty() {
            return false;
        }
        if let Err(e) = input.validate_input() {
            debug!(error = %e, "Rejecting invalid send");
            self.notice = Some(ChatError::Validation(e).inline_message());
            return false;
        }
        if self.selected.as_ref().map(|c| c.id.as_str()) != Some(chat_id) {
            warn!(chat_id, "Send ignored: chat is not open");
            return false;
        }
        let Some(user_id) = self.identity.user_id() else {
            warn!("Send ignored: signed out");
            return false;
        };

        let content = input.content;
        let local_id = self
            .timeline
            .push_pending(Message::pending(chat_id, &user_id, &content));
        self.draft.clear();
        self.notice = None;

        if let Err(e) = self.emit(WsMessage::SendMessage {
            room: chat_id.to_string(),
            message: content.clone(),
            sender: user_id.clone(),
        }) {
            warn!(chat_id, error = %e, "Realtime delivery failed");
            self.notice = Some(e.inline_message());
        }

        let identity = self.identity.clone();
        let store = self.chat_store.clone();
        let updates = self.updates_sender();
        let record = ApiNewMessage {
            chat_id: chat_id.to_string(),
            sender_id: user_id,
            content,
        };
        tokio::spawn(async move {
            let result = match identity.bearer_token().await {
                Ok(token) => store.append_message(&token, &record).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                error!(chat_id = %record.chat_id, error = %e, "Failed to store message");
                let _ = updates.send(Update::AppendFailed {
                    chat_id: record.chat_id,
                    local_id,
                    error: e.inline_message(),
                });
            }
        });

        true
    }

    // ---- transaction gate ----

    fn gate_mut(&mut self) -> Result<&mut TransactionGate> {
        self.gate
            .as_mut()
            .ok_or_else(|| ChatError::Gate("No chat is open".to_string()))
    }

    pub fn request_mark_sold(&mut self) -> Result<()> {
        self.gate_mut()?.request_mark_sold()
    }

    pub fn cancel_mark_sold(&mut self) {
        if let Some(gate) = self.gate.as_mut() {
            gate.cancel_mark_sold();
        }
    }

    /// Confirm the sale with the listing store. On failure the gate
    /// returns to available with an inline error.
    pub async fn confirm_mark_sold(&mut self) -> Result<()> {
        let listing_id = {
            let gate = self.gate_mut()?;
            gate.ensure_confirmable()?;
            gate.listing_id().to_string()
        };

        let result = match self.identity.bearer_token().await {
            Ok(token) => {
                self.listing_store
                    .update_sell_status(&token, &listing_id, SellStatus::SOLD)
                    .await
            }
            Err(e) => Err(e),
        };

        self.gate_mut()?.complete_mark_sold(result)
    }

    /// Submit the buyer's review. Invalid input never reaches the store.
    pub async fn submit_review(&mut self, rating: u8, comment: &str) -> Result<()> {
        let review = self.gate_mut()?.prepare_review(rating, comment)?;

        let result = match self.identity.bearer_token().await {
            Ok(token) => self.review_store.create_review(&token, &review).await,
            Err(e) => Err(e),
        };

        self.gate_mut()?.complete_review(result)?;
        if let Some(chat) = &self.selected {
            self.reviewed_chats.insert(chat.id.clone());
        }
        Ok(())
    }

    // ---- events ----

    /// Wait for the next relay frame or background result and apply it.
    /// Returns false once nothing more can arrive: after sign-out, when
    /// the relay stream is gone and every background task has reported.
    pub async fn next_event(&mut self) -> bool {
        let input = match self.inbound.as_mut() {
            Some(inbound) => tokio::select! {
                event = inbound.recv() => SessionInput::Transport(event),
                update = self.updates_rx.recv() => SessionInput::Background(update),
            },
            None => SessionInput::Background(self.updates_rx.recv().await),
        };

        match input {
            SessionInput::Transport(Some(event)) => self.handle_transport_event(event),
            SessionInput::Transport(None) => self.transport_closed(),
            SessionInput::Background(Some(update)) => self.apply_update(update),
            SessionInput::Background(None) => return self.inbound.is_some(),
        }
        true
    }

    /// Apply everything already queued without waiting
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;

        while let Ok(update) = self.updates_rx.try_recv() {
            self.apply_update(update);
            applied += 1;
        }

        loop {
            let next = match self.inbound.as_mut() {
                Some(inbound) => inbound.try_recv(),
                None => break,
            };
            match next {
                Ok(event) => {
                    self.handle_transport_event(event);
                    applied += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.transport_closed();
                    break;
                }
            }
        }

        applied
    }

    fn transport_closed(&mut self) {
        debug!("Chat relay event stream ended");
        self.inbound = None;
        self.joined_room = None;
        self.connection = ConnectionState::Disconnected;
    }

    fn apply_update(&mut self, update: Update) {
        match update {
            Update::TitleResolved { chat_id, title } => {
                debug!(chat_id, title, "Resolved listing title");
                let is_open = self.selected.as_ref().is_some_and(|c| c.id == chat_id);
                if is_open && self.listing_title.is_empty() {
                    self.listing_title = title.clone();
                }
                self.set_chat_title(&chat_id, &title);
            }
            Update::AppendFailed {
                chat_id,
                local_id,
                error,
            } => {
                warn!(chat_id, %local_id, "Message not stored");
                self.notice = Some(error);
            }
        }
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("Connected to chat relay");
                self.connection = ConnectionState::Connected;
                let room = self.selected.as_ref().map(|c| c.id.clone());
                if let Some(room) = room {
                    if self.joined_room.as_deref() != Some(room.as_str()) {
                        self.join_room(&room);
                    }
                }
            }
            TransportEvent::Disconnected => {
                warn!("Lost connection to chat relay");
                self.connection = ConnectionState::Connecting;
                self.joined_room = None;
            }
            TransportEvent::Rejected(reason) => {
                warn!(reason, "Chat relay rejected the connection");
                self.connection = ConnectionState::Connecting;
                self.notice = Some("Chat relay rejected the connection.".to_string());
            }
            TransportEvent::Frame(WsMessage::ReceiveMessage {
                message,
                sender,
                timestamp,
                room,
            }) => {
                self.receive(message, sender, timestamp, room);
            }
            TransportEvent::Frame(WsMessage::Error { message }) => {
                warn!(error = %message, "Relay reported an error");
                self.notice = Some(message);
            }
            TransportEvent::Frame(WsMessage::UserJoined { room }) => {
                debug!(room, "Participant joined");
            }
            TransportEvent::Frame(WsMessage::UserLeft { room }) => {
                debug!(room, "Participant left");
            }
            TransportEvent::Frame(other) => {
                debug!(frame = ?other, "Ignoring frame");
            }
        }
    }

    fn receive(
        &mut self,
        text: String,
        sender: String,
        timestamp: Option<String>,
        room: Option<String>,
    ) -> Option<Reconciliation> {
        let Some(chat_id) = self.selected.as_ref().map(|c| c.id.clone()) else {
            debug!("Dropping message with no chat open");
            return None;
        };
        if let Some(room) = room.as_deref() {
            if room != chat_id {
                debug!(room, open = %chat_id, "Dropping message for another chat");
                return None;
            }
        }
        let user_id = self.identity.user_id()?;

        let ts = timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let outcome = self.timeline.reconcile(Incoming {
            chat_id: chat_id.clone(),
            author: Author::classify(&sender, &user_id),
            sender_id: sender,
            content: text.clone(),
            timestamp: ts,
        });
        debug!(chat_id, ?outcome, "Reconciled inbound message");

        if outcome != Reconciliation::Duplicate {
            if let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id) {
                chat.last_message = Some(LastMessage {
                    text,
                    timestamp: Some(ts),
                });
            }
        }
        Some(outcome)
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if self.inbound.is_some() {
            self.transport.disconnect();
        }
    }
}
