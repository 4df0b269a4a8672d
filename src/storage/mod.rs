mod memory;
mod traits;

pub use memory::{InMemoryAnalysisStore, InMemoryReadingStore};
pub use traits::{AnalysisStore, ReadingStore, StorageError, StorageResult};
