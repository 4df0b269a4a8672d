mod service;
mod source;
mod ticker;

pub use service::{CollectError, CollectorService, TickReport};
pub use source::{ReadError, ReadingSource, SimulatedSensor, SourceSample};
pub use ticker::spawn_ticker;
