use async_trait::async_trait;

use crate::analysis::AnalysisResult;
use crate::jobs::RewardOutcome;
use crate::session::{BatchId, Reading};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Analysis result not found for batch: {0}")]
    ResultNotFound(BatchId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Persistence boundary for raw readings. Every reading is saved
/// individually, independent of batching, so raw history survives any
/// batch-pipeline outcome.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persist one reading
    async fn save_reading(&self, reading: &Reading) -> StorageResult<()>;

    /// Readings stored for a device, in insertion order
    async fn readings_for_device(&self, device_id: &str) -> StorageResult<Vec<Reading>>;
}

/// Persistence boundary for batch analysis results and reward outcomes
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Persist a freshly computed analysis result
    async fn save_result(&self, result: &AnalysisResult) -> StorageResult<()>;

    /// Get a stored result by batch id
    async fn get_result(&self, batch_id: &str) -> StorageResult<AnalysisResult>;

    /// Record the ledger transaction id for a submitted result. Idempotent:
    /// recording the same id twice is a no-op.
    async fn record_ledger_tx(&self, batch_id: &str, ledger_tx_id: &str) -> StorageResult<()>;

    /// Record a reward outcome; reward failures are recorded, never retried
    async fn record_reward(&self, outcome: &RewardOutcome) -> StorageResult<()>;

    /// All results stored for a device
    async fn results_for_device(&self, device_id: &str) -> StorageResult<Vec<AnalysisResult>>;
}
