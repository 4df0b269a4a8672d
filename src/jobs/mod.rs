mod queue;
mod types;
mod worker;

pub use queue::{QueueConfig, QueueStats, SettlementQueue};
pub use types::{JobStatus, QueueError, RewardOutcome, SettlementEvent, SettlementJob};
pub use worker::{run_settlement, RetryPolicy, SettlementSuccess, SubmissionExhausted};
