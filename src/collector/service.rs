use std::sync::Arc;
use tracing::{debug, info, warn};

use super::source::{ReadError, ReadingSource};
use crate::analysis::{analyze, RiskFeatures, RiskScorer, WarningThresholds};
use crate::config::CollectorConfig;
use crate::directory::{verify_credential, DeviceDirectory, DirectoryError};
use crate::jobs::{SettlementJob, SettlementQueue};
use crate::session::{
    Batch, DeviceId, Reading, Session, SessionError, SessionHandle, SessionRegistry, SessionStatus,
};
use crate::storage::{AnalysisStore, ReadingStore, StorageError};

/// Per-device failure inside one tick
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dispatch(#[from] SessionError),
}

/// What one tick cycle accomplished. Failures are per-device and never
/// block the other devices in the same cycle.
#[derive(Debug, Default)]
pub struct TickReport {
    pub collected: usize,
    pub skipped: usize,
    pub failures: Vec<(DeviceId, String)>,
}

/// The collection core: session lifecycle, per-tick collection, batch
/// dispatch into analysis and settlement. This is the operator surface the
/// surrounding application exposes over its protocol of choice.
pub struct CollectorService {
    config: CollectorConfig,
    registry: SessionRegistry,
    directory: Arc<dyn DeviceDirectory>,
    source: Arc<dyn ReadingSource>,
    readings: Arc<dyn ReadingStore>,
    analyses: Arc<dyn AnalysisStore>,
    queue: Arc<SettlementQueue>,
    scorer: Option<Arc<dyn RiskScorer>>,
}

impl CollectorService {
    pub fn new(
        config: CollectorConfig,
        directory: Arc<dyn DeviceDirectory>,
        source: Arc<dyn ReadingSource>,
        readings: Arc<dyn ReadingStore>,
        analyses: Arc<dyn AnalysisStore>,
        queue: Arc<SettlementQueue>,
    ) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(),
            directory,
            source,
            readings,
            analyses,
            queue,
            scorer: None,
        }
    }

    /// Attach a risk-scoring capability
    pub fn with_scorer(mut self, scorer: Arc<dyn RiskScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Start a collection session for a device
    pub async fn start_session(
        &self,
        device_id: &str,
        credential: &str,
    ) -> Result<SessionStatus, SessionError> {
        let record = self.directory.lookup(device_id).await.map_err(|e| match e {
            DirectoryError::DeviceNotFound(id) => SessionError::NotFound(id),
            other => SessionError::Directory(other),
        })?;

        if !verify_credential(credential, &record.credential_hash) {
            return Err(SessionError::InvalidCredential(device_id.to_string()));
        }

        let session = Session::new(device_id.to_string(), record.credential_hash);
        let handle = self.registry.insert(session)?;
        info!(device_id, "collection session started");
        let status = handle.lock().status();
        Ok(status)
    }

    /// Stop a session, flushing any buffered readings as a final partial
    /// batch before the session is removed
    pub async fn stop_session(&self, device_id: &str, credential: &str) -> Result<(), SessionError> {
        let handle = self
            .registry
            .get(device_id)
            .ok_or_else(|| SessionError::NotActive(device_id.to_string()))?;

        let partial = {
            let mut session = handle.lock();
            if !verify_credential(credential, &session.credential_hash) {
                return Err(SessionError::InvalidCredential(device_id.to_string()));
            }
            // Deactivate under the session lock so a tick holding the same
            // handle cannot append into an already-drained buffer
            session.is_active = false;
            session.drain_remaining()
        };

        self.registry.remove(device_id);

        if let Some(batch) = partial {
            debug!(device_id, batch_id = %batch.id, size = batch.len(), "flushing partial batch");
            self.dispatch_batch(batch).await?;
        }

        info!(device_id, "collection session stopped");
        Ok(())
    }

    /// One collection cycle over a snapshot of the active sessions
    pub async fn tick_once(&self) -> TickReport {
        let snapshot = self.registry.snapshot();
        let mut report = TickReport::default();

        for (device_id, handle) in snapshot {
            match self.collect_for_device(&device_id, &handle).await {
                Ok(true) => report.collected += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "device skipped for this tick");
                    report.failures.push((device_id, e.to_string()));
                }
            }
        }

        report
    }

    /// Pull, validate, persist, and buffer one reading for one device.
    /// Returns Ok(false) when the session went inactive under our feet.
    async fn collect_for_device(
        &self,
        device_id: &str,
        handle: &SessionHandle,
    ) -> Result<bool, CollectError> {
        let sample = self.source.next_reading(device_id).await?;

        if sample.value < self.config.plausible_min || sample.value > self.config.plausible_max {
            return Err(ReadError::Implausible {
                device_id: device_id.to_string(),
                value: sample.value,
            }
            .into());
        }

        let reading = Reading {
            device_id: device_id.to_string(),
            value: sample.value,
            unit: sample.unit,
            collected_at: sample.collected_at,
            location: None,
        };

        // Raw history is retained regardless of what batching does next
        self.readings.save_reading(&reading).await?;

        let batch = {
            let mut session = handle.lock();
            if !session.is_active {
                return Ok(false);
            }
            session.append(reading);
            session.take_full_batch(self.config.batch_size)
        };

        if let Some(batch) = batch {
            self.dispatch_batch(batch).await?;
        }

        Ok(true)
    }

    /// Analyze a batch and enqueue it for settlement
    async fn dispatch_batch(&self, batch: Batch) -> Result<(), SessionError> {
        let record = self.directory.lookup(&batch.device_id).await?;

        let thresholds = WarningThresholds {
            safe_max: self.config.safe_max,
            safe_min: self.config.safe_min,
        };
        let mut result = analyze(&batch, &thresholds);
        if let Some(scorer) = &self.scorer {
            result.risk = Some(scorer.score(&RiskFeatures::from_result(&result)));
        }

        info!(
            batch_id = %result.batch_id,
            readings = result.reading_count,
            severity = %result.severity,
            trend = %result.trend,
            outliers = result.outliers.len(),
            "batch analyzed"
        );

        self.analyses.save_result(&result).await?;

        let job = SettlementJob::new(
            result,
            &record,
            &self.config.treasury_account,
            self.config.reward_per_batch,
        );
        self.queue.enqueue(job).await?;
        Ok(())
    }

    /// Graceful-shutdown drain: flush every open buffer through the normal
    /// batch path and remove all sessions. Returns the number of partial
    /// batches flushed.
    pub async fn drain_all(&self) -> Result<usize, SessionError> {
        let handles = self.registry.remove_all();
        let mut flushed = 0;

        for handle in handles {
            let partial = {
                let mut session = handle.lock();
                session.is_active = false;
                session.drain_remaining()
            };
            if let Some(batch) = partial {
                self.dispatch_batch(batch).await?;
                flushed += 1;
            }
        }

        info!(flushed, "session registry drained");
        Ok(flushed)
    }

    pub fn list_sessions(&self) -> Vec<DeviceId> {
        self.registry.list()
    }

    pub fn session_status(&self, device_id: &str) -> Option<SessionStatus> {
        self.registry.status(device_id)
    }

    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }
}
