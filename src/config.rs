use crate::error::ConfigError;
use crate::settings::SettingsStore;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_MEMORY_THRESHOLD: f64 = 95.0;
pub const DEFAULT_SPIKE_THRESHOLD: f64 = 20.0;
pub const DEFAULT_MONITOR_INTERVAL: f64 = 2.0;
pub const DEFAULT_HISTORY_LENGTH: usize = 60;
pub const DEFAULT_SPIKE_CHECK_WINDOW: usize = 5;

pub const MEMORY_THRESHOLD_RANGE: RangeInclusive<f64> = 50.0..=100.0;
pub const SPIKE_THRESHOLD_RANGE: RangeInclusive<f64> = 5.0..=50.0;
pub const MONITOR_INTERVAL_RANGE: RangeInclusive<f64> = 1.0..=10.0;

/// Tuning values read by the scheduler and the alert engine on every tick.
/// Serialized with the settings store's key names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// System usage percent at or above which an alert is raised.
    pub memory_threshold: f64,
    /// Relative growth (percent) over the recent window that counts as a spike.
    pub memory_spike_threshold: f64,
    /// Seconds between ticks.
    pub monitor_interval: f64,
    pub history_length: usize,
    pub spike_check_window: usize,
    pub notifications_enabled: bool,
    /// Forget pids unseen for this many ticks; 0 keeps them forever.
    pub prune_after_ticks: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            memory_spike_threshold: DEFAULT_SPIKE_THRESHOLD,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            history_length: DEFAULT_HISTORY_LENGTH,
            spike_check_window: DEFAULT_SPIKE_CHECK_WINDOW,
            notifications_enabled: true,
            prune_after_ticks: 0,
        }
    }
}

impl Config {
    /// Tick period, held inside `MONITOR_INTERVAL_RANGE` whatever the stored value.
    pub fn interval(&self) -> Duration {
        let seconds = if self.monitor_interval.is_finite() {
            self.monitor_interval
                .clamp(*MONITOR_INTERVAL_RANGE.start(), *MONITOR_INTERVAL_RANGE.end())
        } else {
            DEFAULT_MONITOR_INTERVAL
        };
        Duration::from_secs_f64(seconds)
    }

    /// Replace every out-of-range value with its default, logging each one.
    pub fn sanitized(mut self) -> Self {
        let defaults = Config::default();
        if let Err(e) = check_range("memoryThreshold", self.memory_threshold, &MEMORY_THRESHOLD_RANGE) {
            warn!("{}; using {}", e, defaults.memory_threshold);
            self.memory_threshold = defaults.memory_threshold;
        }
        if let Err(e) = check_range(
            "memorySpikeThreshold",
            self.memory_spike_threshold,
            &SPIKE_THRESHOLD_RANGE,
        ) {
            warn!("{}; using {}", e, defaults.memory_spike_threshold);
            self.memory_spike_threshold = defaults.memory_spike_threshold;
        }
        if let Err(e) = check_range("monitorInterval", self.monitor_interval, &MONITOR_INTERVAL_RANGE) {
            warn!("{}; using {}", e, defaults.monitor_interval);
            self.monitor_interval = defaults.monitor_interval;
        }
        if let Err(e) = check_range("historyLength", self.history_length as f64, &history_length_range()) {
            warn!("{}; using {}", e, defaults.history_length);
            self.history_length = defaults.history_length;
        }
        if let Err(e) = check_range(
            "spikeCheckWindow",
            self.spike_check_window as f64,
            &spike_window_range(self.history_length),
        ) {
            let fallback = defaults.spike_check_window.min(self.history_length);
            warn!("{}; using {}", e, fallback);
            self.spike_check_window = fallback;
        }
        self
    }

    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("memoryThreshold", self.memory_threshold, &MEMORY_THRESHOLD_RANGE)?;
        check_range("memorySpikeThreshold", self.memory_spike_threshold, &SPIKE_THRESHOLD_RANGE)?;
        check_range("monitorInterval", self.monitor_interval, &MONITOR_INTERVAL_RANGE)?;
        check_range("historyLength", self.history_length as f64, &history_length_range())?;
        check_range(
            "spikeCheckWindow",
            self.spike_check_window as f64,
            &spike_window_range(self.history_length),
        )?;
        Ok(())
    }
}

fn history_length_range() -> RangeInclusive<f64> {
    2.0..=f64::from(u32::MAX)
}

fn spike_window_range(history_length: usize) -> RangeInclusive<f64> {
    2.0..=history_length as f64
}

fn check_range(key: &'static str, value: f64, range: &RangeInclusive<f64>) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { key });
    }
    if !range.contains(&value) {
        return Err(ConfigError::OutOfRange {
            key,
            value,
            min: *range.start(),
            max: *range.end(),
        });
    }
    Ok(())
}

/// The single configuration object of a running monitor. Setters validate,
/// apply and persist; readers take a copy.
pub struct SharedConfig {
    current: RwLock<Config>,
    store: Box<dyn SettingsStore>,
}

impl SharedConfig {
    pub fn new(config: Config, store: Box<dyn SettingsStore>) -> Self {
        Self {
            current: RwLock::new(config),
            store,
        }
    }

    /// Load from the store. Missing or out-of-range keys get their defaults.
    pub fn load(store: Box<dyn SettingsStore>) -> anyhow::Result<Self> {
        let config = store.load()?.sanitized();
        Ok(Self::new(config, store))
    }

    /// Copy of the current values.
    pub fn get(&self) -> Config {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_memory_threshold(&self, value: f64) -> Result<(), ConfigError> {
        self.update(|c| c.memory_threshold = value)
    }

    pub fn set_memory_spike_threshold(&self, value: f64) -> Result<(), ConfigError> {
        self.update(|c| c.memory_spike_threshold = value)
    }

    pub fn set_monitor_interval(&self, seconds: f64) -> Result<(), ConfigError> {
        self.update(|c| c.monitor_interval = seconds)
    }

    pub fn set_history_length(&self, points: usize) -> Result<(), ConfigError> {
        self.update(|c| c.history_length = points)
    }

    pub fn set_spike_check_window(&self, ticks: usize) -> Result<(), ConfigError> {
        self.update(|c| c.spike_check_window = ticks)
    }

    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<(), ConfigError> {
        self.update(|c| c.notifications_enabled = enabled)
    }

    pub fn set_prune_after_ticks(&self, ticks: u64) -> Result<(), ConfigError> {
        self.update(|c| c.prune_after_ticks = ticks)
    }

    fn update(&self, apply: impl FnOnce(&mut Config)) -> Result<(), ConfigError> {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut candidate = current.clone();
        apply(&mut candidate);
        if candidate == *current {
            return Ok(());
        }
        candidate.validate()?;
        self.store
            .save(&candidate)
            .map_err(|e| ConfigError::Persist(format!("{:#}", e)))?;
        info!("Configuration updated: {:?}", candidate);
        *current = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.memory_threshold, 95.0);
        assert_eq!(config.memory_spike_threshold, 20.0);
        assert_eq!(config.monitor_interval, 2.0);
        assert_eq!(config.history_length, 60);
        assert_eq!(config.spike_check_window, 5);
        assert_eq!(config.interval(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn setters_reject_out_of_range_values() {
        let shared = SharedConfig::new(Config::default(), Box::new(MemorySettingsStore::default()));
        assert!(matches!(
            shared.set_memory_threshold(30.0),
            Err(ConfigError::OutOfRange { key: "memoryThreshold", .. })
        ));
        assert!(matches!(
            shared.set_monitor_interval(f64::NAN),
            Err(ConfigError::NotFinite { key: "monitorInterval" })
        ));
        assert!(shared.set_spike_check_window(61).is_err());
        assert_eq!(shared.get(), Config::default());
    }

    #[test]
    fn interval_stays_in_range() {
        let mut config = Config {
            monitor_interval: 0.0,
            ..Config::default()
        };
        assert_eq!(config.interval(), Duration::from_secs(1));
        config.monitor_interval = -3.0;
        assert_eq!(config.interval(), Duration::from_secs(1));
        config.monitor_interval = 600.0;
        assert_eq!(config.interval(), Duration::from_secs(10));
        config.monitor_interval = f64::NAN;
        assert_eq!(config.interval(), Duration::from_secs(2));
    }

    #[test]
    fn sanitized_resets_only_offending_keys() {
        let config = Config {
            memory_threshold: 20.0,
            monitor_interval: 0.2,
            memory_spike_threshold: 30.0,
            history_length: 4,
            spike_check_window: 9,
            ..Config::default()
        }
        .sanitized();
        assert_eq!(config.memory_threshold, DEFAULT_MEMORY_THRESHOLD);
        assert_eq!(config.monitor_interval, DEFAULT_MONITOR_INTERVAL);
        assert_eq!(config.memory_spike_threshold, 30.0);
        assert_eq!(config.history_length, 4);
        assert_eq!(config.spike_check_window, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn setters_persist_each_mutation() {
        let store = MemorySettingsStore::default();
        let shared = SharedConfig::new(Config::default(), Box::new(store.clone()));

        shared.set_memory_threshold(80.0).unwrap();
        assert_eq!(store.saved().unwrap().memory_threshold, 80.0);

        shared.set_monitor_interval(5.0).unwrap();
        let saved = store.saved().unwrap();
        assert_eq!(saved.memory_threshold, 80.0);
        assert_eq!(saved.monitor_interval, 5.0);
        assert_eq!(shared.get().interval(), Duration::from_secs(5));
    }
}
