//! Storage adapters that do not need a database.

mod in_memory_campaign_store;

pub use in_memory_campaign_store::InMemoryCampaignStore;
