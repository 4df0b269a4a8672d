use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::directory::DeviceRecord;
use crate::session::{BatchId, DeviceId};

/// Status of a settlement job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a settlement slot
    Queued,
    /// A ledger submission attempt is in flight
    Submitting,
    /// Analysis submitted to the ledger
    Submitted,
    /// Reward transfer in flight
    RewardPending,
    /// Submitted and reward paid
    Rewarded,
    /// Submitted but the reward transfer failed; still overall success
    RewardFailed,
    /// Submission attempts exhausted; reported, never silently dropped
    DeadLettered,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Rewarded | JobStatus::RewardFailed | JobStatus::DeadLettered
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Submitting => write!(f, "submitting"),
            JobStatus::Submitted => write!(f, "submitted"),
            JobStatus::RewardPending => write!(f, "reward_pending"),
            JobStatus::Rewarded => write!(f, "rewarded"),
            JobStatus::RewardFailed => write!(f, "reward_failed"),
            JobStatus::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// One settlement job per completed batch. Self-contained: carries the
/// analysis payload and every account reference settlement needs, so jobs
/// may settle concurrently and out of order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementJob {
    pub id: Uuid,
    pub device_id: DeviceId,
    pub batch_id: BatchId,
    /// Ledger topic the analysis is submitted to
    pub topic_ref: String,
    /// Account the batch reward is paid to
    pub owner_account: String,
    /// Account the batch reward is paid from
    pub treasury_account: String,
    pub reward_amount: u64,
    pub analysis: AnalysisResult,
    pub status: JobStatus,
    /// Submission attempts made so far
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SettlementJob {
    pub fn new(
        analysis: AnalysisResult,
        record: &DeviceRecord,
        treasury_account: &str,
        reward_amount: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: analysis.device_id.clone(),
            batch_id: analysis.batch_id.clone(),
            topic_ref: record.ledger_topic_ref.clone(),
            owner_account: record.owner_account.clone(),
            treasury_account: treasury_account.to_string(),
            reward_amount,
            analysis,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Outcome of the reward distribution step. Recorded but never retried
/// automatically; a failure here does not invalidate the analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardOutcome {
    pub batch_id: BatchId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl RewardOutcome {
    pub fn paid(batch_id: BatchId, transaction_id: String) -> Self {
        Self {
            batch_id,
            success: true,
            transaction_id: Some(transaction_id),
            error_reason: None,
        }
    }

    pub fn failed(batch_id: BatchId, error_reason: String) -> Self {
        Self {
            batch_id,
            success: false,
            transaction_id: None,
            error_reason: Some(error_reason),
        }
    }
}

/// Operator-facing settlement notification, published on every job state
/// transition
#[derive(Debug, Clone, Serialize)]
pub struct SettlementEvent {
    pub job_id: Uuid,
    pub device_id: DeviceId,
    pub batch_id: BatchId,
    pub status: JobStatus,
    pub attempts: u32,
    pub message: Option<String>,
}

/// Errors raised by the settlement queue itself
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Settlement queue is closed")]
    Closed,
}
