use crate::analysis::{group, Alert, AlertEngine, ProcessGroup};
use crate::config::Config;
use crate::error::SampleError;
use crate::monitor::history::{HistoryPoint, HistoryStore};
use crate::monitor::memory::SystemSampler;
use crate::monitor::process::{Pid, ProcessSample, ProcessSampler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// State published after every tick. Never mutated once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub tick: u64,
    pub captured_at: Option<DateTime<Utc>>,
    pub system_percent: f64,
    pub groups: Vec<ProcessGroup>,
    /// Flat process list in canonical order (largest first).
    pub processes: Vec<ProcessSample>,
    pub system_history: Vec<f64>,
    pub alerts: Vec<Alert>,
}

impl MonitorSnapshot {
    pub fn alert_messages(&self) -> Vec<String> {
        self.alerts.iter().map(ToString::to_string).collect()
    }

    pub fn top_processes(&self, n: usize) -> &[ProcessSample] {
        &self.processes[..n.min(self.processes.len())]
    }

    pub fn top_groups(&self, n: usize) -> &[ProcessGroup] {
        &self.groups[..n.min(self.groups.len())]
    }
}

/// Raw sampler results for one tick.
#[derive(Debug)]
pub struct TickSample {
    pub taken_at: DateTime<Utc>,
    pub system: Result<f64, SampleError>,
    pub processes: Result<Vec<ProcessSample>, SampleError>,
}

/// The two blocking samplers of a monitor.
#[derive(Clone)]
pub struct Samplers {
    pub system: Arc<dyn SystemSampler>,
    pub process: Arc<dyn ProcessSampler>,
}

impl Samplers {
    pub fn new(system: Arc<dyn SystemSampler>, process: Arc<dyn ProcessSampler>) -> Self {
        Self { system, process }
    }

    /// Samplers for the running platform.
    pub fn platform() -> Self {
        Self {
            system: Arc::from(crate::monitor::memory::default_system_sampler()),
            process: Arc::new(crate::monitor::process::PsProcessSampler::new()),
        }
    }

    /// Run both samplers (blocking: spawns the process lister).
    pub fn sample(&self) -> TickSample {
        let taken_at = Utc::now();
        let system = self.system.sample();
        let processes = self.process.list_processes();
        TickSample {
            taken_at,
            system,
            processes,
        }
    }
}

/// Owns the history and the last published state; folds each tick's samples
/// into a new snapshot.
pub struct MonitorCollector {
    engine: AlertEngine,
    history: HistoryStore,
    snapshot: Arc<MonitorSnapshot>,
}

impl MonitorCollector {
    pub fn new(config: &Config) -> Self {
        Self {
            engine: AlertEngine::new(),
            history: HistoryStore::new(config.history_length),
            snapshot: Arc::new(MonitorSnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> Arc<MonitorSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn process_history(&self, pid: Pid) -> Vec<HistoryPoint> {
        self.history.process(pid)
    }

    pub fn latest_name_for(&self, pid: Pid) -> Option<String> {
        self.history.latest_name_for(pid)
    }

    /// Sample and apply in one call.
    pub fn collect(&mut self, samplers: &Samplers, config: &Config) -> Arc<MonitorSnapshot> {
        self.apply(samplers.sample(), config)
    }

    /// Fold one tick into the state. A failed sampler leaves the part of the
    /// state it feeds exactly as the previous tick published it.
    pub fn apply(&mut self, sample: TickSample, config: &Config) -> Arc<MonitorSnapshot> {
        self.history.set_capacity(config.history_length);
        let tick = self.history.advance_tick();

        let mut next = MonitorSnapshot {
            tick,
            captured_at: Some(sample.taken_at),
            ..(*self.snapshot).clone()
        };

        match sample.system {
            Ok(percent) => {
                self.history.append_system(percent);
                next.system_percent = percent;
            }
            Err(e) => warn!("Tick {}: keeping last system reading: {}", tick, e),
        }

        match sample.processes {
            Ok(processes) => {
                next.groups = group(&processes);
                for process in &processes {
                    self.history.append_process(
                        process.pid,
                        HistoryPoint {
                            name: process.name.clone(),
                            percent: process.memory_percent,
                            memory_mb: process.memory_mb,
                            timestamp: sample.taken_at,
                        },
                    );
                }
                next.alerts =
                    self.engine
                        .evaluate(next.system_percent, &processes, &self.history, config);
                next.processes = processes;

                // Only a listing that succeeded can show a pid has gone.
                if config.prune_after_ticks > 0 {
                    let pruned = self.history.prune_unseen(config.prune_after_ticks);
                    if pruned > 0 {
                        debug!("Pruned history of {} vanished processes", pruned);
                    }
                }
            }
            Err(e) => warn!("Tick {}: keeping previous process state: {}", tick, e),
        }

        next.system_history = self.history.system();
        self.snapshot = Arc::new(next);
        Arc::clone(&self.snapshot)
    }
}
