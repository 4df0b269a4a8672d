use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::traits::{AnalysisStore, ReadingStore, StorageError, StorageResult};
use crate::analysis::AnalysisResult;
use crate::jobs::RewardOutcome;
use crate::session::{BatchId, Reading};

/// In-memory reading store
#[derive(Clone, Default)]
pub struct InMemoryReadingStore {
    readings: Arc<RwLock<Vec<Reading>>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reading_count(&self) -> usize {
        self.readings.read().len()
    }
}

#[async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn save_reading(&self, reading: &Reading) -> StorageResult<()> {
        self.readings.write().push(reading.clone());
        Ok(())
    }

    async fn readings_for_device(&self, device_id: &str) -> StorageResult<Vec<Reading>> {
        Ok(self
            .readings
            .read()
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect())
    }
}

/// In-memory analysis result store
#[derive(Clone, Default)]
pub struct InMemoryAnalysisStore {
    results: Arc<RwLock<HashMap<BatchId, AnalysisResult>>>,
    rewards: Arc<RwLock<Vec<RewardOutcome>>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result_count(&self) -> usize {
        self.results.read().len()
    }

    pub fn rewards(&self) -> Vec<RewardOutcome> {
        self.rewards.read().clone()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn save_result(&self, result: &AnalysisResult) -> StorageResult<()> {
        self.results
            .write()
            .insert(result.batch_id.clone(), result.clone());
        Ok(())
    }

    async fn get_result(&self, batch_id: &str) -> StorageResult<AnalysisResult> {
        self.results
            .read()
            .get(batch_id)
            .cloned()
            .ok_or_else(|| StorageError::ResultNotFound(batch_id.to_string()))
    }

    async fn record_ledger_tx(&self, batch_id: &str, ledger_tx_id: &str) -> StorageResult<()> {
        let mut results = self.results.write();
        let result = results
            .get_mut(batch_id)
            .ok_or_else(|| StorageError::ResultNotFound(batch_id.to_string()))?;

        match &result.ledger_tx_id {
            None => result.ledger_tx_id = Some(ledger_tx_id.to_string()),
            Some(existing) if existing == ledger_tx_id => {}
            Some(existing) => {
                // First write wins; a result is updated at most once.
                warn!(
                    batch_id,
                    existing, rejected = ledger_tx_id, "conflicting ledger tx id ignored"
                );
            }
        }
        Ok(())
    }

    async fn record_reward(&self, outcome: &RewardOutcome) -> StorageResult<()> {
        self.rewards.write().push(outcome.clone());
        Ok(())
    }

    async fn results_for_device(&self, device_id: &str) -> StorageResult<Vec<AnalysisResult>> {
        let mut results: Vec<AnalysisResult> = self
            .results
            .read()
            .values()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.analyzed_at.cmp(&b.analyzed_at));
        Ok(results)
    }
}
