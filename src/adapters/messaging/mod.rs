//! Messaging API adapters.
//!
//! - `CloudApiClient` - HTTP client for the cloud messaging API
//! - `MockMessagingClient` - Scriptable client for tests

mod cloud_api;
mod mock;

pub use cloud_api::{CloudApiClient, CloudApiClientFactory};
pub use mock::{MockMessagingClient, MockMessagingClientFactory, RecordedSend};
