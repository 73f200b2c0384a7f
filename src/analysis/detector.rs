use crate::config::Config;
use crate::monitor::history::HistoryStore;
use crate::monitor::process::{Pid, ProcessSample};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Only this many of the largest processes are checked for spikes.
pub const SPIKE_SCAN_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    SystemThreshold {
        percent: f64,
    },
    ProcessSpike {
        pid: Pid,
        name: String,
        percent: f64,
        /// Growth over the window average, in percent.
        change_percent: f64,
    },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::SystemThreshold { percent } => {
                write!(f, "System memory usage reached {:.1}%!", percent)
            }
            Alert::ProcessSpike { pid, name, percent, .. } => write!(
                f,
                "Process [{}] (PID {}) memory spike! Current: {:.1}%",
                name, pid, percent
            ),
        }
    }
}

/// Threshold and spike rules, re-evaluated from scratch every tick.
pub struct AlertEngine;

impl AlertEngine {
    pub fn new() -> Self {
        Self
    }

    /// System alert first, then spikes in scan order.
    pub fn evaluate(
        &self,
        system_percent: f64,
        samples: &[ProcessSample],
        history: &HistoryStore,
        config: &Config,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if system_percent >= config.memory_threshold {
            alerts.push(Alert::SystemThreshold {
                percent: system_percent,
            });
        }

        for sample in samples.iter().take(SPIKE_SCAN_LIMIT) {
            if let Some(change) = self.spike_change(sample, history, config.spike_check_window) {
                if change > config.memory_spike_threshold {
                    alerts.push(Alert::ProcessSpike {
                        pid: sample.pid,
                        name: sample.name.clone(),
                        percent: sample.memory_percent,
                        change_percent: change,
                    });
                }
            }
        }

        alerts
    }

    /// Relative change of the current percent against the average of the
    /// window preceding the newest history point. `None` when the pid lacks
    /// a full window or that average is zero.
    pub fn spike_change(
        &self,
        sample: &ProcessSample,
        history: &HistoryStore,
        window: usize,
    ) -> Option<f64> {
        let series = history.process_series(sample.pid)?;
        if window < 2 || series.len() < window {
            return None;
        }

        let old: Vec<f64> = series
            .recent(window)
            .take(window - 1)
            .map(|p| p.percent)
            .collect();
        let average = old.iter().sum::<f64>() / old.len() as f64;
        if average <= 0.0 {
            return None;
        }
        Some((sample.memory_percent - average) / average * 100.0)
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}
