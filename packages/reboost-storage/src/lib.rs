pub mod memory;
pub mod metrics;

pub use memory::MemoryStore;
pub use metrics::{LapEvent, LapStats, MetricsStore};
