mod credential;

pub use credential::{hash_credential, verify_credential};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::session::DeviceId;

/// Result type for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors that can occur in directory operations
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("Device already provisioned: {0}")]
    DuplicateDevice(DeviceId),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Provisioning record for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    /// SHA-256 hex hash of the device key; the clear key is never stored
    pub credential_hash: String,
    /// Ledger topic analysis results are submitted to
    pub ledger_topic_ref: String,
    /// Account batch rewards are paid to
    pub owner_account: String,
}

/// Directory of provisioned devices
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Look up the provisioning record for a device
    async fn lookup(&self, device_id: &str) -> DirectoryResult<DeviceRecord>;

    /// List all provisioned device ids
    async fn list_devices(&self) -> DirectoryResult<Vec<DeviceId>>;
}

/// In-memory device directory
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    records: Arc<RwLock<HashMap<DeviceId, DeviceRecord>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a device with a clear-text key; only the hash is retained
    pub fn provision(
        &self,
        device_id: &str,
        device_key: &str,
        ledger_topic_ref: &str,
        owner_account: &str,
    ) -> DirectoryResult<()> {
        let mut records = self.records.write();
        if records.contains_key(device_id) {
            return Err(DirectoryError::DuplicateDevice(device_id.to_string()));
        }
        records.insert(
            device_id.to_string(),
            DeviceRecord {
                device_id: device_id.to_string(),
                credential_hash: hash_credential(device_key),
                ledger_topic_ref: ledger_topic_ref.to_string(),
                owner_account: owner_account.to_string(),
            },
        );
        Ok(())
    }

    pub fn device_count(&self) -> usize {
        self.records.read().len()
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryDirectory {
    async fn lookup(&self, device_id: &str) -> DirectoryResult<DeviceRecord> {
        self.records
            .read()
            .get(device_id)
            .cloned()
            .ok_or_else(|| DirectoryError::DeviceNotFound(device_id.to_string()))
    }

    async fn list_devices(&self) -> DirectoryResult<Vec<DeviceId>> {
        let mut ids: Vec<DeviceId> = self.records.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
