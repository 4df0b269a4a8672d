pub mod analysis;
pub mod cli;
pub mod collector;
pub mod config;
pub mod directory;
pub mod jobs;
pub mod ledger;
pub mod session;
pub mod state;
pub mod storage;

pub use collector::CollectorService;
pub use config::CollectorConfig;
pub use jobs::{QueueConfig, SettlementQueue};
pub use state::AppState;
