pub mod collector;
pub mod history;
pub mod memory;
pub mod process;

pub use collector::{MonitorCollector, MonitorSnapshot, Samplers, TickSample};
pub use history::{HistoryPoint, HistorySeries, HistoryStore};
pub use memory::{MemoryStats, SystemSampler};
pub use process::{Pid, ProcessSample, ProcessSampler, PsProcessSampler};
