mod chat;
pub mod input;
mod listing;
mod message;
mod review;

pub use chat::{Chat, Counterparty, LastMessage};
pub use listing::{Listing, SellStatus};
pub use message::{Author, Message};
pub use review::NewReview;
