//! Periodic driver for the collector

use crate::config::SharedConfig;
use crate::monitor::collector::{MonitorCollector, MonitorSnapshot, Samplers};
use crate::monitor::history::HistoryPoint;
use crate::monitor::process::Pid;
use crate::notifier::Notifier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

pub const ALERT_NOTIFICATION_TITLE: &str = "Memory alert";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
}

struct MonitorInner {
    samplers: Samplers,
    collector: Mutex<MonitorCollector>,
    config: Arc<SharedConfig>,
    notifier: Arc<dyn Notifier>,
    published: watch::Sender<Arc<MonitorSnapshot>>,
    // Set while the published alert set is non-empty.
    alert_latched: AtomicBool,
}

impl MonitorInner {
    /// One full tick. Never interrupted once begun.
    async fn tick(&self) {
        let samplers = self.samplers.clone();
        let sample = match tokio::task::spawn_blocking(move || samplers.sample()).await {
            Ok(sample) => sample,
            Err(e) => {
                error!("Sampling task failed: {}", e);
                return;
            }
        };

        let config = self.config.get();
        let snapshot = self
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(sample, &config);
        debug!(
            "Tick {}: system {:.1}%, {} groups, {} alerts",
            snapshot.tick,
            snapshot.system_percent,
            snapshot.groups.len(),
            snapshot.alerts.len()
        );

        self.published.send_replace(Arc::clone(&snapshot));
        self.notify_on_new_alerts(&snapshot, config.notifications_enabled);
    }

    /// One notification per alert episode; re-armed by a tick without alerts.
    fn notify_on_new_alerts(&self, snapshot: &MonitorSnapshot, enabled: bool) {
        let has_alerts = !snapshot.alerts.is_empty();
        let was_latched = self.alert_latched.swap(has_alerts, Ordering::SeqCst);
        if !has_alerts || was_latched || !enabled {
            return;
        }

        let body = snapshot.alert_messages().join("\n");
        let notifier = Arc::clone(&self.notifier);
        tokio::task::spawn_blocking(move || notifier.notify(ALERT_NOTIFICATION_TITLE, &body));
    }
}

struct RunningLoop {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Stopped/Running state machine around the periodic tick.
pub struct Monitor {
    inner: Arc<MonitorInner>,
    running: tokio::sync::Mutex<Option<RunningLoop>>,
    is_running: AtomicBool,
}

impl Monitor {
    pub fn new(config: Arc<SharedConfig>, samplers: Samplers, notifier: Arc<dyn Notifier>) -> Self {
        let collector = MonitorCollector::new(&config.get());
        let (published, _) = watch::channel(collector.snapshot());
        Self {
            inner: Arc::new(MonitorInner {
                samplers,
                collector: Mutex::new(collector),
                config,
                notifier,
                published,
                alert_latched: AtomicBool::new(false),
            }),
            running: tokio::sync::Mutex::new(None),
            is_running: AtomicBool::new(false),
        }
    }

    /// Sample once right away, then keep ticking every `monitor_interval`.
    /// Does nothing when already running.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Monitor already running");
            return;
        }

        self.inner.tick().await;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), shutdown_rx));
        *running = Some(RunningLoop { shutdown, handle });
        self.is_running.store(true, Ordering::SeqCst);
        info!(
            "Monitoring started (interval {:.1}s)",
            self.inner.config.get().monitor_interval
        );
    }

    /// Stop scheduling ticks. Waits for an in-flight tick to finish. Does
    /// nothing when already stopped.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            debug!("Monitor already stopped");
            return;
        };
        let _ = running.shutdown.send(());
        if let Err(e) = running.handle.await {
            error!("Monitor loop ended abnormally: {}", e);
        }
        self.is_running.store(false, Ordering::SeqCst);
        info!("Monitoring stopped");
    }

    pub fn state(&self) -> MonitorState {
        if self.is_running.load(Ordering::SeqCst) {
            MonitorState::Running
        } else {
            MonitorState::Stopped
        }
    }

    pub fn config(&self) -> &Arc<SharedConfig> {
        &self.inner.config
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Arc<MonitorSnapshot> {
        Arc::clone(&self.inner.published.borrow())
    }

    /// Receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MonitorSnapshot>> {
        self.inner.published.subscribe()
    }

    pub fn process_history(&self, pid: Pid) -> Vec<HistoryPoint> {
        self.inner
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .process_history(pid)
    }

    pub fn latest_name_for(&self, pid: Pid) -> Option<String> {
        self.inner
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest_name_for(pid)
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

// A changed interval is picked up after the tick that observes it; the period
// already running is not cut short.
async fn run_loop(inner: Arc<MonitorInner>, mut shutdown: oneshot::Receiver<()>) {
    let mut period = inner.config.get().interval();
    let mut interval = ticker(period);

    loop {
        // Shutdown wins over a tick that came due during a slow tick.
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        inner.tick().await;

        let configured = inner.config.get().interval();
        if configured != period {
            info!("Sampling interval changed: {:?} -> {:?}", period, configured);
            period = configured;
            interval = ticker(period);
        }
    }
}
