use thiserror::Error;

/// Failure of a single sampling call. Never fatal: the scheduler logs it and
/// keeps the previous state for that tick.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("memory statistics unavailable: {0}")]
    StatsUnavailable(String),

    #[error("process list unavailable: {0}")]
    ProcessListUnavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be within {min}..={max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{key} must be a finite number")]
    NotFinite { key: &'static str },

    #[error("failed to persist settings: {0}")]
    Persist(String),
}
