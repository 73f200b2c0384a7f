use crate::monitor::process::Pid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// One captured process measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub name: String,
    pub percent: f64,
    pub memory_mb: f64,
    pub timestamp: DateTime<Utc>,
}

/// Fixed-capacity FIFO. Appends at the tail, evicts from the head.
#[derive(Debug, Clone)]
pub struct HistorySeries<T> {
    points: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> HistorySeries<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: T) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&T> {
        self.points.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.points.iter()
    }

    /// The newest `n` points, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.points.iter().skip(self.points.len().saturating_sub(n))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.points.iter().cloned().collect()
    }
}

#[derive(Debug, Clone)]
struct ProcessSeries {
    series: HistorySeries<HistoryPoint>,
    last_seen_tick: u64,
}

/// Bounded series for the whole system and for every pid seen so far.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    capacity: usize,
    tick: u64,
    system: HistorySeries<f64>,
    processes: HashMap<Pid, ProcessSeries>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            system: HistorySeries::new(capacity),
            processes: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the bound; existing series are trimmed to it.
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return;
        }
        self.capacity = capacity;
        self.system.set_capacity(capacity);
        for entry in self.processes.values_mut() {
            entry.series.set_capacity(capacity);
        }
    }

    /// Start a new tick; process appends are stamped with it.
    pub fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn append_system(&mut self, percent: f64) {
        self.system.push(percent);
    }

    pub fn append_process(&mut self, pid: Pid, point: HistoryPoint) {
        let capacity = self.capacity;
        let tick = self.tick;
        let entry = self.processes.entry(pid).or_insert_with(|| ProcessSeries {
            series: HistorySeries::new(capacity),
            last_seen_tick: tick,
        });
        entry.series.push(point);
        entry.last_seen_tick = tick;
    }

    pub fn system(&self) -> Vec<f64> {
        self.system.to_vec()
    }

    pub fn process(&self, pid: Pid) -> Vec<HistoryPoint> {
        self.processes
            .get(&pid)
            .map(|p| p.series.to_vec())
            .unwrap_or_default()
    }

    pub fn process_series(&self, pid: Pid) -> Option<&HistorySeries<HistoryPoint>> {
        self.processes.get(&pid).map(|p| &p.series)
    }

    pub fn latest_name_for(&self, pid: Pid) -> Option<String> {
        self.processes
            .get(&pid)
            .and_then(|p| p.series.last())
            .map(|point| point.name.clone())
    }

    pub fn tracked_pids(&self) -> usize {
        self.processes.len()
    }

    /// Drop pids not observed during the last `max_age` ticks. Returns how
    /// many series were removed.
    pub fn prune_unseen(&mut self, max_age: u64) -> usize {
        let before = self.processes.len();
        let tick = self.tick;
        self.processes
            .retain(|_, entry| tick.saturating_sub(entry.last_seen_tick) < max_age);
        before - self.processes.len()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_HISTORY_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(name: &str, percent: f64) -> HistoryPoint {
        HistoryPoint {
            name: name.to_string(),
            percent,
            memory_mb: percent * 10.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn series_keeps_last_capacity_points() {
        let mut series = HistorySeries::new(60);
        for i in 0..75 {
            series.push(i as f64);
            assert!(series.len() <= 60);
        }
        let expected: Vec<f64> = (15..75).map(|i| i as f64).collect();
        assert_eq!(series.to_vec(), expected);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut series = HistorySeries::new(10);
        for i in 0..6 {
            series.push(i);
        }
        assert_eq!(series.recent(3).copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(series.recent(20).count(), 6);
    }

    #[test]
    fn shrinking_capacity_trims_oldest() {
        let mut store = HistoryStore::new(5);
        for i in 0..5 {
            store.append_system(i as f64);
            store.append_process(7, point("p", i as f64));
        }
        store.set_capacity(2);
        assert_eq!(store.system(), vec![3.0, 4.0]);
        let percents: Vec<f64> = store.process(7).iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![3.0, 4.0]);
    }

    #[test]
    fn process_series_are_lazy_and_keyed_by_pid() {
        let mut store = HistoryStore::new(3);
        assert!(store.process(42).is_empty());
        assert_eq!(store.latest_name_for(42), None);

        store.append_process(42, point("old-name", 1.0));
        store.append_process(42, point("new-name", 2.0));
        assert_eq!(store.process(42).len(), 2);
        assert_eq!(store.latest_name_for(42).as_deref(), Some("new-name"));
        assert!(store.process(43).is_empty());
    }

    #[test]
    fn stale_series_stay_until_pruned() {
        let mut store = HistoryStore::new(3);
        store.advance_tick();
        store.append_process(1, point("a", 1.0));
        store.append_process(2, point("b", 1.0));
        for _ in 0..3 {
            store.advance_tick();
            store.append_process(1, point("a", 1.0));
        }
        assert_eq!(store.tracked_pids(), 2);
        assert_eq!(store.process(2).len(), 1);

        assert_eq!(store.prune_unseen(3), 1);
        assert_eq!(store.tracked_pids(), 1);
        assert!(store.process(2).is_empty());
    }
}
