use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewReview {
    pub listing_id: String,
    pub reviewer_id: String,
    pub seller_id: String,
    pub rating: u8,
    pub comment: String,
    pub review_date: DateTime<Utc>,
}
