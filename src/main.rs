use clap::Parser;
use fleetpulse::{
    analysis::ThresholdScorer,
    cli::{Cli, Commands},
    collector::{spawn_ticker, CollectorService, SimulatedSensor},
    config::CollectorConfig,
    directory::{DeviceDirectory, InMemoryDirectory},
    jobs::{JobStatus, QueueConfig, RetryPolicy, SettlementQueue},
    ledger::InMemoryLedger,
    state::AppState,
    storage::{InMemoryAnalysisStore, InMemoryReadingStore},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetpulse=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = CollectorConfig::from_env()?;

    // Provision the demo fleet into the in-memory directory
    let directory = Arc::new(InMemoryDirectory::new());
    for (device_id, device_key) in &config.demo_fleet {
        directory.provision(
            device_id,
            device_key,
            &format!("topic/{device_id}"),
            &format!("owner-{device_id}"),
        )?;
    }

    if let Some(Commands::Devices) = cli.command {
        for device_id in directory.list_devices().await? {
            println!("{device_id}");
        }
        return Ok(());
    }

    info!("🚀 Starting Fleetpulse v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   Batch size: {}", config.batch_size);
    info!("   Tick interval: {}ms", config.tick_interval_ms);
    info!("   Reward per batch: {}", config.reward_per_batch);
    info!("   Max submission attempts: {}", config.max_submission_attempts);
    info!("   Backoff base: {}ms", config.backoff_base_ms);
    info!(
        "   Max concurrent settlements: {}",
        config.max_concurrent_settlements
    );
    info!("   Provisioned devices: {}", directory.device_count());

    // Wire the pipeline: stores, ledger, settlement queue, collector
    let readings = Arc::new(InMemoryReadingStore::new());
    let analyses = Arc::new(InMemoryAnalysisStore::new());
    let ledger = Arc::new(InMemoryLedger::new());

    let queue = Arc::new(SettlementQueue::new(
        QueueConfig {
            max_concurrent: config.max_concurrent_settlements,
            event_capacity: config.event_capacity,
            retry: RetryPolicy {
                max_attempts: config.max_submission_attempts,
                backoff_base: config.backoff_base(),
            },
        },
        ledger.clone(),
        analyses.clone(),
    ));

    let sensor = Arc::new(SimulatedSensor::new(21.0, 2.5, &config.unit));
    let collector = Arc::new(
        CollectorService::new(
            config.clone(),
            directory.clone(),
            sensor,
            readings.clone(),
            analyses.clone(),
            queue.clone(),
        )
        .with_scorer(Arc::new(ThresholdScorer::default())),
    );

    let state = AppState::new(config.clone(), collector.clone(), queue.clone());

    // Surface settlement outcomes on the operator channel
    {
        let mut events = queue.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event.status {
                    JobStatus::DeadLettered => error!(
                        batch_id = %event.batch_id,
                        attempts = event.attempts,
                        "settlement dead-lettered; operator attention required"
                    ),
                    JobStatus::RewardFailed => warn!(
                        batch_id = %event.batch_id,
                        "reward payout failed; analysis settled"
                    ),
                    _ => debug!(batch_id = %event.batch_id, status = %event.status, "settlement event"),
                }
            }
        });
    }

    // Start collection sessions for the demo fleet
    for (device_id, device_key) in &config.demo_fleet {
        match collector.start_session(device_id, device_key).await {
            Ok(status) => info!(device_id = %status.device_id, "session started"),
            Err(e) => warn!(device_id = %device_id, error = %e, "failed to start session"),
        }
    }

    // Run the collection ticker until shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = spawn_ticker(collector.clone(), config.tick_interval(), shutdown_rx);

    info!("🎧 Collecting; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    // Stop the ticker, flush open buffers, let in-flight settlements finish
    shutdown_tx.send(true)?;
    ticker.await?;

    let flushed = collector.drain_all().await?;
    info!(flushed, "open buffers flushed");

    let deadline = Instant::now() + Duration::from_secs(10);
    while !queue.is_drained() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let stats = queue.stats();
    info!(
        rewarded = stats.rewarded,
        reward_failed = stats.reward_failed,
        dead_lettered = stats.dead_lettered,
        readings = readings.reading_count(),
        uptime_seconds = state.uptime_seconds(),
        "Fleetpulse stopped"
    );

    Ok(())
}
