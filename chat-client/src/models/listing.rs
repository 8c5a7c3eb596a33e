use serde::{Deserialize, Serialize};

/// Listing sale status as stored by the backend. Zero means sold.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(transparent)]
pub struct SellStatus(pub i64);

impl SellStatus {
    pub const SOLD: SellStatus = SellStatus(0);
    pub const AVAILABLE: SellStatus = SellStatus(1);

    pub fn is_sold(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub owner_id: String,
    pub sell_status: SellStatus,
}
