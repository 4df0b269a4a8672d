use std::env;
use std::time::Duration;

/// Collector configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Number of readings that make up a full batch
    pub batch_size: usize,
    /// Collection tick period in milliseconds
    pub tick_interval_ms: u64,
    /// Reward paid to a device owner per settled batch (token base units)
    pub reward_per_batch: u64,
    /// Maximum ledger submission attempts before a job is dead-lettered
    pub max_submission_attempts: u32,
    /// Base delay for exponential submission backoff in milliseconds
    pub backoff_base_ms: u64,
    /// Maximum settlement jobs running concurrently
    pub max_concurrent_settlements: usize,
    /// Capacity of the settlement event broadcast channel
    pub event_capacity: usize,
    /// Unit attached to collected readings
    pub unit: String,
    /// Upper warning threshold ("value exceeds safe maximum")
    pub safe_max: f64,
    /// Lower warning threshold ("value below safe minimum")
    pub safe_min: f64,
    /// Raw values outside this range are rejected at the tick
    pub plausible_min: f64,
    pub plausible_max: f64,
    /// Account rewards are paid from
    pub treasury_account: String,
    /// Demo fleet provisioned at startup, `device-id:device-key` pairs
    pub demo_fleet: Vec<(String, String)>,
}

impl CollectorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            batch_size: env::var("FLEETPULSE_BATCH_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            tick_interval_ms: env::var("FLEETPULSE_TICK_INTERVAL_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10_000),
            reward_per_batch: env::var("FLEETPULSE_REWARD_PER_BATCH")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            max_submission_attempts: env::var("FLEETPULSE_MAX_SUBMISSION_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            backoff_base_ms: env::var("FLEETPULSE_BACKOFF_BASE_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            max_concurrent_settlements: env::var("FLEETPULSE_MAX_CONCURRENT_SETTLEMENTS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            event_capacity: env::var("FLEETPULSE_EVENT_CAPACITY")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            unit: env::var("FLEETPULSE_UNIT").unwrap_or_else(|_| "celsius".to_string()),
            safe_max: env::var("FLEETPULSE_SAFE_MAX")
                .unwrap_or_else(|_| "50.0".to_string())
                .parse()
                .unwrap_or(50.0),
            safe_min: env::var("FLEETPULSE_SAFE_MIN")
                .unwrap_or_else(|_| "0.0".to_string())
                .parse()
                .unwrap_or(0.0),
            plausible_min: env::var("FLEETPULSE_PLAUSIBLE_MIN")
                .unwrap_or_else(|_| "-100.0".to_string())
                .parse()
                .unwrap_or(-100.0),
            plausible_max: env::var("FLEETPULSE_PLAUSIBLE_MAX")
                .unwrap_or_else(|_| "100.0".to_string())
                .parse()
                .unwrap_or(100.0),
            treasury_account: env::var("FLEETPULSE_TREASURY_ACCOUNT")
                .unwrap_or_else(|_| "treasury".to_string()),
            demo_fleet: env::var("FLEETPULSE_DEVICES")
                .map(|s| parse_fleet_spec(&s))
                .unwrap_or_else(|_| {
                    vec![
                        ("pi4-dht11-001".to_string(), "dev-key-001".to_string()),
                        ("pi4-dht11-002".to_string(), "dev-key-002".to_string()),
                        ("pi4-dht11-003".to_string(), "dev-key-003".to_string()),
                    ]
                }),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "FLEETPULSE_BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        if self.max_submission_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "FLEETPULSE_MAX_SUBMISSION_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "FLEETPULSE_TICK_INTERVAL_MS must be at least 1".to_string(),
            ));
        }
        if self.plausible_min >= self.plausible_max {
            return Err(ConfigError::InvalidValue(
                "FLEETPULSE_PLAUSIBLE_MIN must be below FLEETPULSE_PLAUSIBLE_MAX".to_string(),
            ));
        }
        Ok(())
    }

    /// Collection tick period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Base delay for submission backoff
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            tick_interval_ms: 10_000,
            reward_per_batch: 10,
            max_submission_attempts: 5,
            backoff_base_ms: 500,
            max_concurrent_settlements: 4,
            event_capacity: 1000,
            unit: "celsius".to_string(),
            safe_max: 50.0,
            safe_min: 0.0,
            plausible_min: -100.0,
            plausible_max: 100.0,
            treasury_account: "treasury".to_string(),
            demo_fleet: Vec::new(),
        }
    }
}

/// Parse a `device-id:device-key` comma-separated fleet spec
fn parse_fleet_spec(spec: &str) -> Vec<(String, String)> {
    spec.split(',')
        .filter_map(|entry| {
            let (id, key) = entry.trim().split_once(':')?;
            if id.is_empty() || key.is_empty() {
                return None;
            }
            Some((id.to_string(), key.to_string()))
        })
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fleet_spec() {
        let fleet = parse_fleet_spec("dev-a:key-a, dev-b:key-b");
        assert_eq!(fleet.len(), 2);
        assert_eq!(fleet[0], ("dev-a".to_string(), "key-a".to_string()));
        assert_eq!(fleet[1], ("dev-b".to_string(), "key-b".to_string()));
    }

    #[test]
    fn test_parse_fleet_spec_skips_malformed() {
        let fleet = parse_fleet_spec("dev-a:key-a,no-key,:empty-id,");
        assert_eq!(fleet.len(), 1);
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = CollectorConfig {
            batch_size: 0,
            ..CollectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_plausible_range() {
        let config = CollectorConfig {
            plausible_min: 10.0,
            plausible_max: -10.0,
            ..CollectorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
