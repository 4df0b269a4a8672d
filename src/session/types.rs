use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for devices
pub type DeviceId = String;

/// Unique identifier for batches: device id plus a monotonic counter
pub type BatchId = String;

/// One telemetry reading pulled from a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: DeviceId,
    pub value: f64,
    pub unit: String,
    pub collected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A fixed-size (or final partial) ordered group of readings from one device,
/// analyzed as a unit. Never split or merged after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub device_id: DeviceId,
    pub readings: Vec<Reading>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Live collection context for one device, from start to stop
#[derive(Debug)]
pub struct Session {
    pub device_id: DeviceId,
    /// SHA-256 hex hash of the credential presented at start
    pub credential_hash: String,
    pub is_active: bool,
    pub buffer: Vec<Reading>,
    pub batch_count: u64,
    pub started_at: DateTime<Utc>,
    pub last_reading_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(device_id: DeviceId, credential_hash: String) -> Self {
        Self {
            device_id,
            credential_hash,
            is_active: true,
            buffer: Vec::new(),
            batch_count: 0,
            started_at: Utc::now(),
            last_reading_at: None,
        }
    }

    /// Append a reading to the buffer and stamp the collection time
    pub fn append(&mut self, reading: Reading) {
        self.last_reading_at = Some(reading.collected_at);
        self.buffer.push(reading);
    }

    /// Take the buffer as a batch if it has reached the configured size.
    /// The buffer is cleared and the batch counter advances in the same step.
    pub fn take_full_batch(&mut self, batch_size: usize) -> Option<Batch> {
        if self.buffer.len() < batch_size {
            return None;
        }
        Some(self.take_batch())
    }

    /// Take whatever is buffered as a final partial batch (flush on stop).
    /// Returns `None` for an empty buffer: an empty batch is not a batch.
    pub fn drain_remaining(&mut self) -> Option<Batch> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.take_batch())
    }

    fn take_batch(&mut self) -> Batch {
        let readings = std::mem::take(&mut self.buffer);
        self.batch_count += 1;
        Batch {
            id: format!("{}-{}", self.device_id, self.batch_count),
            device_id: self.device_id.clone(),
            readings,
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            device_id: self.device_id.clone(),
            active: self.is_active,
            buffer_size: self.buffer.len(),
            batch_count: self.batch_count,
            started_at: self.started_at,
            last_reading_at: self.last_reading_at,
        }
    }
}

/// Observable snapshot of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub device_id: DeviceId,
    pub active: bool,
    pub buffer_size: usize,
    pub batch_count: u64,
    pub started_at: DateTime<Utc>,
    pub last_reading_at: Option<DateTime<Utc>>,
}
