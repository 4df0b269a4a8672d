use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::types::{JobStatus, QueueError, SettlementEvent, SettlementJob};
use super::worker::{run_settlement, RetryPolicy};
use crate::ledger::LedgerService;
use crate::storage::AnalysisStore;

/// Configuration for the settlement queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of concurrently running settlements
    pub max_concurrent: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
    /// Submission retry policy
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            event_capacity: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

type JobMap = Arc<RwLock<HashMap<Uuid, SettlementJob>>>;

/// Async settlement queue with bounded parallelism.
///
/// Jobs settle concurrently and out of order; each carries a self-contained
/// analysis payload. Every state transition is published on the broadcast
/// channel, so dead-letters and reward failures are operator-visible.
pub struct SettlementQueue {
    /// All jobs indexed by ID
    jobs: JobMap,
    /// Semaphore to limit concurrent settlements
    semaphore: Arc<Semaphore>,
    /// Channel to submit new jobs
    submit_tx: mpsc::Sender<SettlementJob>,
    /// Broadcast channel for settlement events
    event_tx: broadcast::Sender<SettlementEvent>,
    config: QueueConfig,
}

impl SettlementQueue {
    /// Create a new queue and start its dispatcher
    pub fn new(
        config: QueueConfig,
        ledger: Arc<dyn LedgerService>,
        analyses: Arc<dyn AnalysisStore>,
    ) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel::<SettlementJob>(100);
        let (event_tx, _) = broadcast::channel(config.event_capacity);

        let queue = Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            submit_tx,
            event_tx,
            config,
        };

        queue.start_dispatcher(submit_rx, ledger, analyses);
        queue
    }

    /// Start the dispatcher that processes incoming jobs
    fn start_dispatcher(
        &self,
        mut submit_rx: mpsc::Receiver<SettlementJob>,
        ledger: Arc<dyn LedgerService>,
        analyses: Arc<dyn AnalysisStore>,
    ) {
        let jobs = self.jobs.clone();
        let semaphore = self.semaphore.clone();
        let event_tx = self.event_tx.clone();
        let retry = self.config.retry.clone();

        tokio::spawn(async move {
            while let Some(job) = submit_rx.recv().await {
                let job_id = job.id;
                info!(job_id = %job_id, batch_id = %job.batch_id, "settlement job received");

                {
                    let mut jobs_guard = jobs.write();
                    jobs_guard.insert(job_id, job.clone());
                }

                let jobs = jobs.clone();
                let semaphore = semaphore.clone();
                let event_tx = event_tx.clone();
                let ledger = ledger.clone();
                let analyses = analyses.clone();
                let retry = retry.clone();

                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };

                    {
                        let mut jobs_guard = jobs.write();
                        if let Some(job) = jobs_guard.get_mut(&job_id) {
                            job.started_at = Some(Utc::now());
                        }
                    }

                    let transition_jobs = jobs.clone();
                    let transition_events = event_tx.clone();
                    let result = run_settlement(
                        &job,
                        ledger.as_ref(),
                        analyses.as_ref(),
                        &retry,
                        |status, attempts, message| {
                            transition(
                                &transition_jobs,
                                &transition_events,
                                &job,
                                status,
                                attempts,
                                message,
                            );
                        },
                    )
                    .await;

                    match result {
                        Ok(success) => {
                            let final_status = if success.reward.success {
                                JobStatus::Rewarded
                            } else {
                                JobStatus::RewardFailed
                            };
                            let message = success
                                .reward
                                .error_reason
                                .clone()
                                .or_else(|| Some(success.ledger_tx_id.clone()));
                            let attempts = current_attempts(&jobs, &job_id);
                            complete(&jobs, &job_id);
                            transition(&jobs, &event_tx, &job, final_status, attempts, message);
                            if final_status == JobStatus::RewardFailed {
                                warn!(job_id = %job_id, batch_id = %job.batch_id, "settled with failed reward");
                            } else {
                                info!(job_id = %job_id, batch_id = %job.batch_id, "settled and rewarded");
                            }
                        }
                        Err(exhausted) => {
                            {
                                let mut jobs_guard = jobs.write();
                                if let Some(job) = jobs_guard.get_mut(&job_id) {
                                    job.last_error = Some(exhausted.last_error.clone());
                                }
                            }
                            complete(&jobs, &job_id);
                            transition(
                                &jobs,
                                &event_tx,
                                &job,
                                JobStatus::DeadLettered,
                                exhausted.attempts,
                                Some(exhausted.last_error.clone()),
                            );
                            error!(
                                job_id = %job_id,
                                batch_id = %job.batch_id,
                                attempts = exhausted.attempts,
                                error = %exhausted.last_error,
                                "settlement dead-lettered"
                            );
                        }
                    }
                });
            }
        });
    }

    /// Submit a job to the queue
    pub async fn enqueue(&self, job: SettlementJob) -> Result<Uuid, QueueError> {
        let job_id = job.id;

        {
            let mut jobs = self.jobs.write();
            jobs.insert(job_id, job.clone());
        }

        self.submit_tx
            .send(job)
            .await
            .map_err(|_| QueueError::Closed)?;

        Ok(job_id)
    }

    /// Get a job by id
    pub fn get_job(&self, job_id: Uuid) -> Option<SettlementJob> {
        self.jobs.read().get(&job_id).cloned()
    }

    /// Jobs that exhausted their retry budget, for operator inspection
    pub fn dead_letters(&self) -> Vec<SettlementJob> {
        self.jobs
            .read()
            .values()
            .filter(|job| job.status == JobStatus::DeadLettered)
            .cloned()
            .collect()
    }

    /// Subscribe to settlement events
    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.event_tx.subscribe()
    }

    /// Queue statistics
    pub fn stats(&self) -> QueueStats {
        let jobs = self.jobs.read();
        let mut stats = QueueStats::default();

        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Submitting | JobStatus::Submitted | JobStatus::RewardPending => {
                    stats.in_flight += 1
                }
                JobStatus::Rewarded => stats.rewarded += 1,
                JobStatus::RewardFailed => stats.reward_failed += 1,
                JobStatus::DeadLettered => stats.dead_lettered += 1,
            }
        }

        stats.max_concurrent = self.config.max_concurrent;
        stats.available_slots = self.semaphore.available_permits();
        stats
    }

    /// True once no job is queued or in flight
    pub fn is_drained(&self) -> bool {
        let stats = self.stats();
        stats.queued == 0 && stats.in_flight == 0
    }
}

fn transition(
    jobs: &JobMap,
    event_tx: &broadcast::Sender<SettlementEvent>,
    job: &SettlementJob,
    status: JobStatus,
    attempts: u32,
    message: Option<String>,
) {
    {
        let mut jobs_guard = jobs.write();
        if let Some(job) = jobs_guard.get_mut(&job.id) {
            job.status = status;
            job.attempts = attempts;
        }
    }

    let _ = event_tx.send(SettlementEvent {
        job_id: job.id,
        device_id: job.device_id.clone(),
        batch_id: job.batch_id.clone(),
        status,
        attempts,
        message,
    });
}

fn complete(jobs: &JobMap, job_id: &Uuid) {
    let mut jobs_guard = jobs.write();
    if let Some(job) = jobs_guard.get_mut(job_id) {
        job.completed_at = Some(Utc::now());
    }
}

fn current_attempts(jobs: &JobMap, job_id: &Uuid) -> u32 {
    jobs.read().get(job_id).map_or(0, |job| job.attempts)
}

/// Queue statistics
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub in_flight: usize,
    pub rewarded: usize,
    pub reward_failed: usize,
    pub dead_lettered: usize,
    pub max_concurrent: usize,
    pub available_slots: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze, WarningThresholds};
    use crate::directory::{hash_credential, DeviceRecord};
    use crate::ledger::InMemoryLedger;
    use crate::session::{Batch, Reading};
    use crate::storage::{AnalysisStore, InMemoryAnalysisStore};
    use std::time::Duration;

    fn sample_job() -> SettlementJob {
        let readings = [20.0, 21.0, 22.0]
            .iter()
            .map(|&value| Reading {
                device_id: "dev-a".to_string(),
                value,
                unit: "celsius".to_string(),
                collected_at: Utc::now(),
                location: None,
            })
            .collect();
        let batch = Batch {
            id: "dev-a-1".to_string(),
            device_id: "dev-a".to_string(),
            readings,
        };
        let analysis = analyze(
            &batch,
            &WarningThresholds {
                safe_max: 50.0,
                safe_min: 0.0,
            },
        );
        let record = DeviceRecord {
            device_id: "dev-a".to_string(),
            credential_hash: hash_credential("key-a"),
            ledger_topic_ref: "topic/0.0.1001".to_string(),
            owner_account: "owner-a".to_string(),
        };
        SettlementJob::new(analysis, &record, "treasury", 10)
    }

    fn fast_retry(max_attempts: u32) -> QueueConfig {
        QueueConfig {
            max_concurrent: 2,
            event_capacity: 100,
            retry: RetryPolicy {
                max_attempts,
                backoff_base: Duration::from_millis(1),
            },
        }
    }

    async fn wait_for_terminal(
        rx: &mut broadcast::Receiver<SettlementEvent>,
    ) -> SettlementEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for settlement event")
                .expect("event channel closed");
            if event.status.is_terminal() {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_settles_and_rewards() {
        let ledger = Arc::new(InMemoryLedger::new());
        let analyses = Arc::new(InMemoryAnalysisStore::new());
        let queue = SettlementQueue::new(fast_retry(3), ledger.clone(), analyses.clone());

        let job = sample_job();
        analyses.save_result(&job.analysis).await.unwrap();

        let mut events = queue.subscribe();
        let job_id = queue.enqueue(job).await.unwrap();

        let event = wait_for_terminal(&mut events).await;
        assert_eq!(event.status, JobStatus::Rewarded);

        assert_eq!(ledger.topic_len("topic/0.0.1001"), 1);
        assert_eq!(ledger.transfers().len(), 1);
        let stored = analyses.get_result("dev-a-1").await.unwrap();
        assert!(stored.ledger_tx_id.is_some());

        let settled = queue.get_job(job_id).unwrap();
        assert_eq!(settled.status, JobStatus::Rewarded);
        assert!(settled.completed_at.is_some());
        assert!(queue.is_drained());
    }

    #[tokio::test]
    async fn test_transient_failure_retried_until_success() {
        let ledger = Arc::new(InMemoryLedger::new());
        let analyses = Arc::new(InMemoryAnalysisStore::new());
        let queue = SettlementQueue::new(fast_retry(3), ledger.clone(), analyses.clone());

        ledger.fail_next_submissions(2);
        let job = sample_job();
        analyses.save_result(&job.analysis).await.unwrap();

        let mut events = queue.subscribe();
        let job_id = queue.enqueue(job).await.unwrap();

        let event = wait_for_terminal(&mut events).await;
        assert_eq!(event.status, JobStatus::Rewarded);
        assert_eq!(queue.get_job(job_id).unwrap().attempts, 3);
        assert_eq!(ledger.topic_len("topic/0.0.1001"), 1);
    }

    #[tokio::test]
    async fn test_exhausted_submission_dead_letters() {
        let ledger = Arc::new(InMemoryLedger::new());
        let analyses = Arc::new(InMemoryAnalysisStore::new());
        let queue = SettlementQueue::new(fast_retry(2), ledger.clone(), analyses.clone());

        ledger.fail_next_submissions(10);
        let job = sample_job();
        analyses.save_result(&job.analysis).await.unwrap();

        let mut events = queue.subscribe();
        let job_id = queue.enqueue(job).await.unwrap();

        let event = wait_for_terminal(&mut events).await;
        assert_eq!(event.status, JobStatus::DeadLettered);
        assert_eq!(event.attempts, 2);

        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, job_id);
        assert!(dead[0].last_error.is_some());

        // Nothing reached the ledger and the result was never updated
        assert_eq!(ledger.topic_len("topic/0.0.1001"), 0);
        assert!(ledger.transfers().is_empty());
        let stored = analyses.get_result("dev-a-1").await.unwrap();
        assert!(stored.ledger_tx_id.is_none());
        assert_eq!(queue.stats().dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_reward_failure_is_isolated() {
        let ledger = Arc::new(InMemoryLedger::new());
        let analyses = Arc::new(InMemoryAnalysisStore::new());
        let queue = SettlementQueue::new(fast_retry(3), ledger.clone(), analyses.clone());

        ledger.set_fail_transfers(true);
        let job = sample_job();
        analyses.save_result(&job.analysis).await.unwrap();

        let mut events = queue.subscribe();
        let job_id = queue.enqueue(job).await.unwrap();

        let event = wait_for_terminal(&mut events).await;
        assert_eq!(event.status, JobStatus::RewardFailed);

        // Submission stands: exactly one, never retried for the reward
        assert_eq!(ledger.topic_len("topic/0.0.1001"), 1);
        assert_eq!(queue.get_job(job_id).unwrap().attempts, 1);
        let stored = analyses.get_result("dev-a-1").await.unwrap();
        assert!(stored.ledger_tx_id.is_some());

        let rewards = analyses.rewards();
        assert_eq!(rewards.len(), 1);
        assert!(!rewards[0].success);
        assert!(rewards[0].error_reason.is_some());
    }

    #[tokio::test]
    async fn test_stats_track_capacity() {
        let ledger = Arc::new(InMemoryLedger::new());
        let analyses = Arc::new(InMemoryAnalysisStore::new());
        let queue = SettlementQueue::new(fast_retry(3), ledger, analyses);

        let stats = queue.stats();
        assert_eq!(stats.max_concurrent, 2);
        assert_eq!(stats.available_slots, 2);
        assert!(queue.is_drained());
    }
}
