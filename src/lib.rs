pub mod analysis;
pub mod config;
pub mod error;
pub mod monitor;
pub mod notifier;
pub mod scheduler;
pub mod settings;

pub use config::{Config, SharedConfig};
pub use error::{ConfigError, SampleError};
pub use monitor::MonitorSnapshot;
pub use scheduler::{Monitor, MonitorState};
