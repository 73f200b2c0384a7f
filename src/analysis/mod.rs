pub mod detector;
pub mod grouper;

pub use detector::{Alert, AlertEngine};
pub use grouper::{base_name, group, ProcessGroup};
