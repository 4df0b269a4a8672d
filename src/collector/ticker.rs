use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::service::CollectorService;

/// Spawn the collection ticker: a single cancellable interval loop driving
/// every active session. Tick cycles never overlap; a long cycle simply
/// delays the next one.
pub fn spawn_ticker(
    service: Arc<CollectorService>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "collection ticker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = service.tick_once().await;
                    if report.failures.is_empty() {
                        debug!(
                            collected = report.collected,
                            skipped = report.skipped,
                            "tick complete"
                        );
                    } else {
                        warn!(
                            collected = report.collected,
                            failed = report.failures.len(),
                            "tick complete with device failures"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("collection ticker stopped");
                        break;
                    }
                }
            }
        }
    })
}
