use crate::error::SampleError;

/// Host memory sampling
pub trait SystemSampler: Send + Sync {
    /// Current used/total memory percentage.
    fn sample(&self) -> Result<f64, SampleError>;
}

/// Memory counters in bytes, split the way the kernel reports page states.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryStats {
    pub active: u64,
    pub inactive: u64,
    pub wired: u64,
    pub compressed: u64,
    pub free: u64,
}

impl MemoryStats {
    pub fn from_pages(
        page_size: u64,
        active: u64,
        inactive: u64,
        wired: u64,
        compressed: u64,
        free: u64,
    ) -> Self {
        Self {
            active: active * page_size,
            inactive: inactive * page_size,
            wired: wired * page_size,
            compressed: compressed * page_size,
            free: free * page_size,
        }
    }

    pub fn used(&self) -> u64 {
        self.active + self.wired + self.compressed
    }

    pub fn total(&self) -> u64 {
        self.used() + self.free + self.inactive
    }

    pub fn used_percent(&self) -> Result<f64, SampleError> {
        let total = self.total();
        if total == 0 {
            return Err(SampleError::StatsUnavailable(
                "kernel reported zero total memory".to_string(),
            ));
        }
        Ok((self.used() as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
    }
}

/// Reads `/proc/meminfo`. There is no compressor on Linux, so unevictable plus
/// unreclaimable slab stands in for wired memory.
#[cfg(target_os = "linux")]
pub struct ProcMeminfoSampler;

#[cfg(target_os = "linux")]
impl ProcMeminfoSampler {
    pub fn new() -> Self {
        Self
    }

    pub fn collect(&self) -> Result<MemoryStats, SampleError> {
        use procfs::Current;

        let info = procfs::Meminfo::current()
            .map_err(|e| SampleError::StatsUnavailable(e.to_string()))?;
        Ok(MemoryStats {
            active: info.active,
            inactive: info.inactive,
            wired: info.unevictable.unwrap_or(0) + info.s_unreclaim.unwrap_or(0),
            compressed: 0,
            free: info.mem_free,
        })
    }
}

#[cfg(target_os = "linux")]
impl Default for ProcMeminfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl SystemSampler for ProcMeminfoSampler {
    fn sample(&self) -> Result<f64, SampleError> {
        self.collect()?.used_percent()
    }
}

/// Runs `vm_stat` and converts its page counts.
pub struct VmStatSampler;

impl VmStatSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VmStatSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler for VmStatSampler {
    fn sample(&self) -> Result<f64, SampleError> {
        let output = std::process::Command::new("vm_stat")
            .output()
            .map_err(|e| SampleError::StatsUnavailable(format!("failed to run vm_stat: {}", e)))?;
        if !output.status.success() {
            return Err(SampleError::StatsUnavailable(format!(
                "vm_stat exited with {}",
                output.status
            )));
        }
        parse_vm_stat(&String::from_utf8_lossy(&output.stdout))?.used_percent()
    }
}

/// Parse `vm_stat` output. The page size comes from the header line
/// ("Mach Virtual Memory Statistics: (page size of 16384 bytes)").
pub fn parse_vm_stat(output: &str) -> Result<MemoryStats, SampleError> {
    let mut page_size = None;
    let (mut active, mut inactive, mut wired, mut compressed, mut free) =
        (None, None, None, None, None);

    for line in output.lines() {
        if let Some(rest) = line.split("page size of ").nth(1) {
            page_size = rest
                .split_whitespace()
                .next()
                .and_then(|n| n.parse::<u64>().ok());
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(pages) = value.trim().trim_end_matches('.').parse::<u64>() else {
            continue;
        };
        match key.trim() {
            "Pages active" => active = Some(pages),
            "Pages inactive" => inactive = Some(pages),
            "Pages wired down" => wired = Some(pages),
            "Pages occupied by compressor" => compressed = Some(pages),
            "Pages free" => free = Some(pages),
            _ => {}
        }
    }

    let missing = |field: &str| SampleError::StatsUnavailable(format!("vm_stat output lacks {}", field));
    Ok(MemoryStats::from_pages(
        page_size.unwrap_or_else(system_page_size),
        active.ok_or_else(|| missing("active pages"))?,
        inactive.ok_or_else(|| missing("inactive pages"))?,
        wired.ok_or_else(|| missing("wired pages"))?,
        compressed.unwrap_or(0),
        free.ok_or_else(|| missing("free pages"))?,
    ))
}

fn system_page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

/// Portable fallback backed by `sysinfo`.
pub struct SysinfoSampler {
    system: std::sync::Mutex<sysinfo::System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        Self {
            system: std::sync::Mutex::new(system),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler for SysinfoSampler {
    fn sample(&self) -> Result<f64, SampleError> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| SampleError::StatsUnavailable("sampler state poisoned".to_string()))?;
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(SampleError::StatsUnavailable(
                "sysinfo reported zero total memory".to_string(),
            ));
        }
        Ok((system.used_memory() as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
    }
}

/// The best sampler for the running platform.
pub fn default_system_sampler() -> Box<dyn SystemSampler> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcMeminfoSampler::new())
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(VmStatSampler::new())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Box::new(SysinfoSampler::new())
    }
}
