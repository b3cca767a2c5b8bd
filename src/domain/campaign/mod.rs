//! Campaign domain module.
//!
//! Campaigns, their recipients, and the dispatch units a worker sends.
//! The store owns campaign state; the dispatch engine only advances the
//! cursor and writes terminal statuses.

mod aggregate;
mod contact;
mod dispatch;
mod status;

pub use aggregate::{AccountCredentials, Campaign, RateLimit, TemplateRef};
pub use contact::Contact;
pub use dispatch::{idempotency_key, DispatchOutcome, DispatchUnit, SendOutcome, TemplateMessage};
pub use status::CampaignStatus;
