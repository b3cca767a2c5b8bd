//! Foundation value objects shared by every domain module.

mod auth;
mod backoff;
mod errors;
mod ids;
mod timestamp;

pub use auth::{AuthError, AuthenticatedUser};
pub use backoff::ExponentialBackoff;
pub use errors::{DomainError, ErrorCode};
pub use ids::{CampaignId, ContactId, ExternalMessageId, OrganizationId, UserId};
pub use timestamp::Timestamp;
