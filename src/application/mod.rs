//! Application layer - orchestration over the ports.
//!
//! The dispatch engine lives here. The real-time layer needs no
//! orchestration beyond its adapters and is wired in `main`.

pub mod dispatch;

pub use dispatch::{
    ActiveCampaignRegistry, CampaignScanner, CampaignWorker, ContactBatchFetcher, MessageSender,
    ScannerConfig, WorkerConfig,
};
