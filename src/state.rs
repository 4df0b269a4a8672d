use std::sync::Arc;
use std::time::Instant;

use crate::collector::CollectorService;
use crate::config::CollectorConfig;
use crate::jobs::SettlementQueue;

/// Main application state: the collector surface plus the settlement queue
pub struct AppState {
    pub config: CollectorConfig,
    pub collector: Arc<CollectorService>,
    pub queue: Arc<SettlementQueue>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: CollectorConfig,
        collector: Arc<CollectorService>,
        queue: Arc<SettlementQueue>,
    ) -> Self {
        Self {
            config,
            collector,
            queue,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
