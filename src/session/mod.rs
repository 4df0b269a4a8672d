mod registry;
mod types;

pub use registry::{SessionHandle, SessionRegistry};
pub use types::{Batch, BatchId, DeviceId, Reading, Session, SessionStatus};

use crate::directory::DirectoryError;
use crate::jobs::QueueError;
use crate::storage::StorageError;

/// Lifecycle errors surfaced synchronously to start/stop callers
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Device not found: {0}")]
    NotFound(DeviceId),

    #[error("Invalid credential for device {0}")]
    InvalidCredential(DeviceId),

    #[error("Session already active for device {0}")]
    AlreadyActive(DeviceId),

    #[error("No active session for device {0}")]
    NotActive(DeviceId),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Settlement queue error: {0}")]
    Queue(#[from] QueueError),
}
