//! Scripted samplers and a recording notifier shared by the integration tests

#![allow(dead_code)]

use memwatch::monitor::{ProcessSample, ProcessSampler, SystemSampler};
use memwatch::notifier::Notifier;
use memwatch::SampleError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn proc(pid: i32, name: &str, percent: f64) -> ProcessSample {
    ProcessSample {
        pid,
        parent_pid: 1,
        name: name.to_string(),
        memory_percent: percent,
        memory_mb: percent * 160.0,
    }
}

/// Replays queued readings; once the queue is drained the last reading repeats.
pub struct ScriptedSystem {
    readings: Mutex<VecDeque<Option<f64>>>,
    last: Mutex<Option<f64>>,
    pub calls: AtomicUsize,
}

impl ScriptedSystem {
    pub fn new(readings: Vec<Option<f64>>) -> Self {
        Self {
            readings: Mutex::new(readings.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn steady(percent: f64) -> Self {
        Self::new(vec![Some(percent)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SystemSampler for ScriptedSystem {
    fn sample(&self) -> Result<f64, SampleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.readings.lock().unwrap().pop_front() {
            *last = next;
        }
        last.ok_or_else(|| SampleError::StatsUnavailable("scripted failure".to_string()))
    }
}

/// Constant reading that takes `delay` to produce.
pub struct SlowSystem {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowSystem {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SystemSampler for SlowSystem {
    fn sample(&self) -> Result<f64, SampleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(50.0)
    }
}

pub struct ScriptedProcesses {
    lists: Mutex<VecDeque<Option<Vec<ProcessSample>>>>,
    last: Mutex<Option<Vec<ProcessSample>>>,
}

impl ScriptedProcesses {
    pub fn new(lists: Vec<Option<Vec<ProcessSample>>>) -> Self {
        Self {
            lists: Mutex::new(lists.into()),
            last: Mutex::new(None),
        }
    }

    pub fn steady(list: Vec<ProcessSample>) -> Self {
        Self::new(vec![Some(list)])
    }
}

impl ProcessSampler for ScriptedProcesses {
    fn list_processes(&self) -> Result<Vec<ProcessSample>, SampleError> {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.lists.lock().unwrap().pop_front() {
            *last = next;
        }
        last.clone()
            .ok_or_else(|| SampleError::ProcessListUnavailable("scripted failure".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}
