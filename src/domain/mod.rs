//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (ids, errors, auth, backoff)
//! - `campaign` - Campaigns, contacts and dispatch units
//! - `events` - Real-time events carried over the bus

pub mod campaign;
pub mod events;
pub mod foundation;
