use crate::error::SampleError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// Samples at or below this share of memory are dropped as noise.
pub const NOISE_FLOOR_PERCENT: f64 = 0.1;

pub type Pid = i32;

/// One process observed during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub pid: Pid,
    pub parent_pid: Pid,
    pub name: String,
    pub memory_percent: f64,
    pub memory_mb: f64,
}

pub trait ProcessSampler: Send + Sync {
    /// Processes above the noise floor, sorted by descending memory percent.
    fn list_processes(&self) -> Result<Vec<ProcessSample>, SampleError>;
}

/// Lists processes through `ps`.
pub struct PsProcessSampler {
    program: String,
}

impl PsProcessSampler {
    pub fn new() -> Self {
        Self {
            program: "ps".to_string(),
        }
    }

    /// Use a different `ps` binary (absolute path or name on `PATH`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self) -> Result<String, SampleError> {
        let child = Command::new(&self.program)
            .args(["-A", "-o", "pid,ppid,rss,%mem,comm"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                SampleError::ProcessListUnavailable(format!("failed to spawn {}: {}", self.program, e))
            })?;
        let mut lister = ListerGuard { child: Some(child) };

        let mut output = String::new();
        if let Some(stdout) = lister.stdout() {
            stdout.read_to_string(&mut output).map_err(|e| {
                SampleError::ProcessListUnavailable(format!("failed to read {} output: {}", self.program, e))
            })?;
        }

        let status = lister.wait().map_err(|e| {
            SampleError::ProcessListUnavailable(format!("failed to wait for {}: {}", self.program, e))
        })?;
        if !status.success() {
            return Err(SampleError::ProcessListUnavailable(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        Ok(output)
    }
}

impl Default for PsProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler for PsProcessSampler {
    fn list_processes(&self) -> Result<Vec<ProcessSample>, SampleError> {
        let output = self.run()?;
        if !has_records(&output) {
            return Err(SampleError::ProcessListUnavailable(
                "process lister produced no parseable records".to_string(),
            ));
        }
        Ok(parse_ps_output(&output))
    }
}

/// Owns the spawned lister. Whatever path leaves `run`, the child is killed
/// if still running and always reaped.
struct ListerGuard {
    child: Option<Child>,
}

impl ListerGuard {
    fn stdout(&mut self) -> Option<&mut std::process::ChildStdout> {
        self.child.as_mut().and_then(|c| c.stdout.as_mut())
    }

    fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        match self.child.take() {
            Some(mut child) => child.wait(),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "lister already reaped",
            )),
        }
    }
}

impl Drop for ListerGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn has_records(output: &str) -> bool {
    output.lines().skip(1).any(|l| parse_ps_line(l).is_some())
}

/// Parse `ps -o pid,ppid,rss,%mem,comm` output (header line first).
/// Unparsable lines are skipped. The result is filtered and sorted.
pub fn parse_ps_output(output: &str) -> Vec<ProcessSample> {
    let mut samples: Vec<ProcessSample> = output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let sample = parse_ps_line(line);
            if sample.is_none() && !line.trim().is_empty() {
                debug!("Skipping malformed process record: {:?}", line);
            }
            sample
        })
        .filter(|s| s.memory_percent > NOISE_FLOOR_PERCENT)
        .collect();
    sort_by_memory(&mut samples);
    samples
}

pub fn parse_ps_line(line: &str) -> Option<ProcessSample> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }

    let pid: Pid = parts[0].parse().ok()?;
    let parent_pid: Pid = parts[1].parse().ok()?;
    let rss_kb: f64 = parts[2].parse().ok()?;
    let memory_percent: f64 = parts[3].parse().ok()?;
    if !rss_kb.is_finite() || !memory_percent.is_finite() {
        return None;
    }

    let command = parts[4..].join(" ");
    Some(ProcessSample {
        pid,
        parent_pid,
        name: base_command_name(&command).to_string(),
        memory_percent: memory_percent.clamp(0.0, 100.0),
        memory_mb: rss_kb.max(0.0) / 1024.0,
    })
}

/// Final path component of a command ("/usr/bin/foo" -> "foo").
pub fn base_command_name(command: &str) -> &str {
    command
        .rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or(command)
}

/// Canonical order: descending memory percent. Stable, so equal percents keep
/// lister order.
pub fn sort_by_memory(samples: &mut [ProcessSample]) {
    samples.sort_by(|a, b| b.memory_percent.total_cmp(&a.memory_percent));
}
