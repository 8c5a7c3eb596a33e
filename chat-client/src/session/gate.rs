//! Mark-as-sold and review gating for the open chat's listing.

use chrono::Utc;
use garde::Validate;
use tracing::{info, warn};

use crate::error::{ChatError, Result};
use crate::models::input::ReviewInput;
use crate::models::{Listing, NewReview, SellStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Available,
    PendingConfirmation,
    Sold,
    ReviewPending,
    Reviewed,
}

/// The viewer's side of the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Seller,
    Buyer,
    /// Listing could not be loaded; no transaction controls.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Hidden,
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateControls {
    pub mark_sold: ControlState,
    pub review: ControlState,
}

#[derive(Debug, Clone)]
pub struct TransactionGate {
    listing_id: String,
    viewer_id: String,
    seller_id: Option<String>,
    role: Role,
    sell_status: Option<SellStatus>,
    review_left: bool,
    state: GateState,
    error: Option<String>,
}

impl TransactionGate {
    pub fn new(
        listing_id: &str,
        viewer_id: &str,
        listing: Option<&Listing>,
        review_left: bool,
    ) -> Self {
        let role = match listing {
            Some(l) if l.owner_id == viewer_id => Role::Seller,
            Some(_) => Role::Buyer,
            None => Role::Unknown,
        };

        let mut gate = Self {
            listing_id: listing_id.to_string(),
            viewer_id: viewer_id.to_string(),
            seller_id: listing.map(|l| l.owner_id.clone()),
            role,
            sell_status: listing.map(|l| l.sell_status),
            review_left,
            state: GateState::Available,
            error: None,
        };
        gate.state = gate.derive_state();
        gate
    }

    fn derive_state(&self) -> GateState {
        match (self.sell_status, self.role) {
            (Some(status), Role::Seller) if status.is_sold() => GateState::Sold,
            (Some(status), Role::Buyer) if status.is_sold() => {
                if self.review_left {
                    GateState::Reviewed
                } else {
                    GateState::ReviewPending
                }
            }
            _ => GateState::Available,
        }
    }

    pub fn listing_id(&self) -> &str {
        &self.listing_id
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_seller(&self) -> bool {
        self.role == Role::Seller
    }

    pub fn sell_status(&self) -> Option<SellStatus> {
        self.sell_status
    }

    pub fn review_left(&self) -> bool {
        self.review_left
    }

    /// Inline error from the last failed transition
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Which controls the chat header shows
    pub fn controls(&self) -> GateControls {
        let mark_sold = match (self.role, self.state) {
            (Role::Seller, GateState::Available | GateState::PendingConfirmation) => {
                ControlState::Enabled
            }
            (Role::Seller, _) => ControlState::Disabled,
            _ => ControlState::Hidden,
        };
        let review = match (self.role, self.state) {
            (Role::Buyer, GateState::ReviewPending) => ControlState::Enabled,
            _ => ControlState::Hidden,
        };
        GateControls { mark_sold, review }
    }

    /// Seller asks to mark the listing sold; opens the confirmation step
    pub fn request_mark_sold(&mut self) -> Result<()> {
        if self.role != Role::Seller {
            return Err(self.reject("Only the seller can mark this listing as sold"));
        }
        if self.state != GateState::Available {
            return Err(self.reject("This listing is already sold"));
        }
        self.error = None;
        self.state = GateState::PendingConfirmation;
        Ok(())
    }

    pub fn cancel_mark_sold(&mut self) {
        if self.state == GateState::PendingConfirmation {
            self.state = GateState::Available;
        }
    }

    /// Check that a confirmation may be sent to the listing store
    pub fn ensure_confirmable(&self) -> Result<()> {
        if self.state != GateState::PendingConfirmation {
            return Err(ChatError::Gate(
                "Mark as sold has not been requested".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the listing store's answer to a confirmation
    pub fn complete_mark_sold(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                info!(listing_id = %self.listing_id, "Listing marked as sold");
                self.sell_status = Some(SellStatus::SOLD);
                self.state = GateState::Sold;
                self.error = None;
                Ok(())
            }
            Err(e) => {
                warn!(listing_id = %self.listing_id, error = %e, "Failed to mark listing as sold");
                self.state = GateState::Available;
                self.error = Some(e.inline_message());
                Err(e)
            }
        }
    }

    /// Refresh from the listing store. A confirmation in progress is kept
    /// as long as the listing is still available.
    pub fn apply_listing(&mut self, listing: &Listing) {
        self.sell_status = Some(listing.sell_status);
        if self.role == Role::Unknown {
            self.seller_id = Some(listing.owner_id.clone());
            self.role = if listing.owner_id == self.viewer_id {
                Role::Seller
            } else {
                Role::Buyer
            };
        }
        if self.state == GateState::PendingConfirmation && !listing.sell_status.is_sold() {
            return;
        }
        self.state = self.derive_state();
    }

    /// Validate a review and build the record, without touching the network
    pub fn prepare_review(&mut self, rating: u8, comment: &str) -> Result<NewReview> {
        if self.role != Role::Buyer {
            return Err(self.reject("Only the buyer can review this sale"));
        }
        match self.state {
            GateState::ReviewPending => {}
            GateState::Reviewed => return Err(self.reject("You already reviewed this sale")),
            _ => return Err(self.reject("This listing has not been sold yet")),
        }

        let input = ReviewInput {
            rating,
            comment: comment.to_string(),
        };
        if let Err(report) = input.validate() {
            let message = if !(1..=5).contains(&rating) {
                "Choose a rating from 1 to 5".to_string()
            } else {
                format!("Review comment invalid: {}", report)
            };
            self.error = Some(message.clone());
            return Err(ChatError::Validation(message));
        }

        let seller_id = self
            .seller_id
            .clone()
            .ok_or_else(|| self.reject("Seller unknown for this listing"))?;

        self.error = None;
        Ok(NewReview {
            listing_id: self.listing_id.clone(),
            reviewer_id: self.viewer_id.clone(),
            seller_id,
            rating,
            comment: input.comment.trim().to_string(),
            review_date: Utc::now(),
        })
    }

    /// Apply the review store's answer. Failures leave the review open for retry.
    pub fn complete_review(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                info!(listing_id = %self.listing_id, "Review submitted");
                self.review_left = true;
                self.state = GateState::Reviewed;
                self.error = None;
                Ok(())
            }
            Err(e) => {
                warn!(listing_id = %self.listing_id, error = %e, "Failed to submit review");
                self.error = Some(e.inline_message());
                Err(e)
            }
        }
    }

    fn reject(&self, message: &str) -> ChatError {
        ChatError::Gate(message.to_string())
    }
}
