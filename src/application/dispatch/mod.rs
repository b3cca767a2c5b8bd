//! Campaign dispatch engine.
//!
//! - `CampaignScanner` - periodic reconciliation of running campaigns
//! - `ActiveCampaignRegistry` - one live worker per campaign
//! - `CampaignWorker` - page-by-page dispatch with a persisted cursor
//! - `ContactBatchFetcher` / `MessageSender` - the worker's collaborators

mod fetcher;
mod registry;
mod scanner;
mod sender;
mod worker;

pub use fetcher::ContactBatchFetcher;
pub use registry::{ActiveCampaignRegistry, StopOutcome};
pub use scanner::{CampaignScanner, ScanReport, ScannerConfig};
pub use sender::MessageSender;
pub use worker::{CampaignRun, CampaignWorker, WorkerConfig, WorkerState, WorkerSummary};
