use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::session::DeviceId;

/// One raw sample pulled from a device
#[derive(Debug, Clone)]
pub struct SourceSample {
    pub value: f64,
    pub unit: String,
    pub collected_at: DateTime<Utc>,
}

/// Tick-level read failures: logged, the device is skipped for the tick,
/// and the session survives
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Sensor read failed for device {device_id}: {reason}")]
    Sensor { device_id: DeviceId, reason: String },

    #[error("Implausible value {value} from device {device_id}")]
    Implausible { device_id: DeviceId, value: f64 },
}

/// External reading source: one scalar reading per invocation per device
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn next_reading(&self, device_id: &str) -> Result<SourceSample, ReadError>;
}

/// Simulated sensor for development wiring: a base value with uniform
/// jitter, occasionally spiking to exercise the outlier path.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    base: f64,
    jitter: f64,
    spike_chance: f64,
    unit: String,
}

impl SimulatedSensor {
    pub fn new(base: f64, jitter: f64, unit: &str) -> Self {
        Self {
            base,
            jitter,
            spike_chance: 0.02,
            unit: unit.to_string(),
        }
    }
}

#[async_trait]
impl ReadingSource for SimulatedSensor {
    async fn next_reading(&self, _device_id: &str) -> Result<SourceSample, ReadError> {
        let mut rng = rand::thread_rng();
        let mut value = self.base + rng.gen_range(-self.jitter..=self.jitter);
        if rng.gen_bool(self.spike_chance) {
            value += self.base;
        }
        Ok(SourceSample {
            value,
            unit: self.unit.clone(),
            collected_at: Utc::now(),
        })
    }
}
