use crate::monitor::process::ProcessSample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role markers removed from process names, applied in this order.
pub const ROLE_MARKERS: &[&str] = &[" Helper", " (GPU)", " (Renderer)", " Web Content"];

/// Multi-process applications, matched case-sensitively by substring.
/// First match wins, so the order is the priority.
pub const APP_FAMILIES: &[(&str, &str)] = &[
    ("Google Chrome", "Google Chrome"),
    ("Safari", "Safari"),
    ("Firefox", "Firefox"),
    ("Code", "VS Code"),
    ("Electron", "VS Code"),
    ("Slack", "Slack"),
    ("Discord", "Discord"),
    ("Xcode", "Xcode"),
];

/// Processes collapsed under one application name for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessGroup {
    pub key: String,
    pub base_name: String,
    pub processes: Vec<ProcessSample>,
}

impl ProcessGroup {
    pub fn total_memory_percent(&self) -> f64 {
        self.processes.iter().map(|p| p.memory_percent).sum()
    }

    pub fn total_memory_mb(&self) -> f64 {
        self.processes.iter().map(|p| p.memory_mb).sum()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }
}

/// Logical application name for a process name.
pub fn base_name(name: &str) -> String {
    let stripped = ROLE_MARKERS
        .iter()
        .fold(name.to_string(), |acc, marker| acc.replace(marker, ""));

    APP_FAMILIES
        .iter()
        .find(|(needle, _)| stripped.contains(needle))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(stripped)
}

/// Partition samples into groups, largest aggregate first. Members keep their
/// input order.
pub fn group(samples: &[ProcessSample]) -> Vec<ProcessGroup> {
    let mut by_name: BTreeMap<String, Vec<ProcessSample>> = BTreeMap::new();
    for sample in samples {
        by_name
            .entry(base_name(&sample.name))
            .or_default()
            .push(sample.clone());
    }

    let mut groups: Vec<ProcessGroup> = by_name
        .into_iter()
        .map(|(key, processes)| ProcessGroup {
            base_name: key.clone(),
            key,
            processes,
        })
        .collect();
    // Stable over the key-ordered map, so ties stay alphabetical.
    groups.sort_by(|a, b| b.total_memory_percent().total_cmp(&a.total_memory_percent()));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pid: i32, name: &str, percent: f64) -> ProcessSample {
        ProcessSample {
            pid,
            parent_pid: 1,
            name: name.to_string(),
            memory_percent: percent,
            memory_mb: percent * 160.0,
        }
    }

    #[test]
    fn strips_roles_then_collapses_families() {
        assert_eq!(base_name("Google Chrome Helper (Renderer)"), "Google Chrome");
        assert_eq!(base_name("Google Chrome Helper (GPU)"), "Google Chrome");
        assert_eq!(base_name("Visual Studio Code Helper"), "VS Code");
        assert_eq!(base_name("Electron"), "VS Code");
        assert_eq!(base_name("Safari Web Content"), "Safari");
        assert_eq!(base_name("Slack Helper (Renderer)"), "Slack");
        assert_eq!(base_name("Xcode"), "Xcode");
        assert_eq!(base_name("postgres"), "postgres");
        assert_eq!(base_name("Mail Helper"), "Mail");
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(base_name("google chrome"), "google chrome");
        assert_eq!(base_name("vscode"), "vscode");
    }

    #[test]
    fn every_sample_lands_in_exactly_one_group() {
        let samples = vec![
            sample(1, "Google Chrome", 10.0),
            sample(2, "Google Chrome Helper (Renderer)", 4.5),
            sample(3, "postgres", 6.0),
            sample(4, "Google Chrome Helper (GPU)", 1.5),
            sample(5, "postgres", 2.0),
            sample(6, "kernel_task", 3.0),
        ];
        let groups = group(&samples);

        let member_count: usize = groups.iter().map(|g| g.process_count()).sum();
        assert_eq!(member_count, samples.len());
        assert!(groups.iter().all(|g| !g.processes.is_empty()));

        let total_in: f64 = samples.iter().map(|s| s.memory_percent).sum();
        let total_out: f64 = groups.iter().map(|g| g.total_memory_percent()).sum();
        assert!((total_in - total_out).abs() < 1e-9);

        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Google Chrome", "postgres", "kernel_task"]);

        let chrome = &groups[0];
        assert_eq!(chrome.base_name, "Google Chrome");
        assert_eq!(
            chrome.processes.iter().map(|p| p.pid).collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
        assert!((chrome.total_memory_mb() - 16.0 * 160.0).abs() < 1e-9);
    }

    #[test]
    fn equal_totals_are_ordered_by_key() {
        let samples = vec![sample(1, "zsh", 1.0), sample(2, "bash", 1.0)];
        let keys: Vec<String> = group(&samples).into_iter().map(|g| g.key).collect();
        assert_eq!(keys, vec!["bash", "zsh"]);
    }

    #[test]
    fn empty_input_gives_no_groups() {
        assert!(group(&[]).is_empty());
    }
}
