use std::time::Duration;
use tracing::{error, info, warn};

use super::types::{JobStatus, RewardOutcome, SettlementJob};
use crate::ledger::{LedgerService, TransactionId};
use crate::storage::AnalysisStore;

/// Submission retry policy: bounded attempts with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based): base * 2^(n-1)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Successful settlement of one job
#[derive(Debug)]
pub struct SettlementSuccess {
    pub ledger_tx_id: TransactionId,
    pub reward: RewardOutcome,
}

/// Submission retries exhausted; the job is dead-letter material
#[derive(Debug)]
pub struct SubmissionExhausted {
    pub attempts: u32,
    pub last_error: String,
}

/// Settle one job: submit the analysis to the ledger with bounded retries,
/// record the transaction id, then attempt the reward transfer.
///
/// The `on_status` callback is invoked at every state transition with
/// (status, attempts so far, optional message). Reward failure is isolated:
/// it is recorded and reported but the settlement still succeeds.
pub async fn run_settlement<F>(
    job: &SettlementJob,
    ledger: &dyn LedgerService,
    analyses: &dyn AnalysisStore,
    policy: &RetryPolicy,
    mut on_status: F,
) -> Result<SettlementSuccess, SubmissionExhausted>
where
    F: FnMut(JobStatus, u32, Option<String>),
{
    let payload = match serde_json::to_value(&job.analysis) {
        Ok(payload) => payload,
        Err(e) => {
            // Malformed payloads cannot succeed on retry
            return Err(SubmissionExhausted {
                attempts: 0,
                last_error: format!("payload serialization failed: {e}"),
            });
        }
    };

    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts {
        on_status(JobStatus::Submitting, attempt, None);

        match ledger.submit(&job.topic_ref, payload.clone()).await {
            Ok(tx_id) => {
                info!(
                    batch_id = %job.batch_id,
                    tx_id = %tx_id,
                    attempt,
                    "analysis submitted to ledger"
                );
                if let Err(e) = analyses.record_ledger_tx(&job.batch_id, &tx_id).await {
                    // The ledger holds the submission; a recording failure
                    // must not dead-letter a settled batch.
                    error!(batch_id = %job.batch_id, error = %e, "failed to record ledger tx id");
                }
                on_status(JobStatus::Submitted, attempt, Some(tx_id.clone()));

                let reward = distribute_reward(job, ledger, &mut on_status, attempt).await;
                if let Err(e) = analyses.record_reward(&reward).await {
                    error!(batch_id = %job.batch_id, error = %e, "failed to record reward outcome");
                }

                return Ok(SettlementSuccess {
                    ledger_tx_id: tx_id,
                    reward,
                });
            }
            Err(e) => {
                last_error = e.to_string();
                warn!(
                    batch_id = %job.batch_id,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "ledger submission failed"
                );
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.backoff_delay(attempt)).await;
                }
            }
        }
    }

    Err(SubmissionExhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}

async fn distribute_reward<F>(
    job: &SettlementJob,
    ledger: &dyn LedgerService,
    on_status: &mut F,
    attempts: u32,
) -> RewardOutcome
where
    F: FnMut(JobStatus, u32, Option<String>),
{
    on_status(JobStatus::RewardPending, attempts, None);

    match ledger
        .transfer(job.reward_amount, &job.treasury_account, &job.owner_account)
        .await
    {
        Ok(reward_tx) => {
            info!(
                batch_id = %job.batch_id,
                owner = %job.owner_account,
                amount = job.reward_amount,
                "batch reward paid"
            );
            RewardOutcome::paid(job.batch_id.clone(), reward_tx)
        }
        Err(e) => {
            warn!(
                batch_id = %job.batch_id,
                owner = %job.owner_account,
                error = %e,
                "reward transfer failed; settlement unaffected"
            );
            RewardOutcome::failed(job.batch_id.clone(), e.to_string())
        }
    }
}
