//! Platform collaborators: core power control and per-core statistics
//!
//! The controller only talks to these traits. `SysfsCpu` backs them with the
//! Linux CPU hotplug sysfs interface, `/proc/stat` and cpufreq.

use crate::config::SysfsConfig;
use crate::error::{HotplugError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Changes and observes core power state
pub trait PowerControl: Send + Sync {
    /// Power a core on
    fn bring_core_online(&self, core: usize) -> Result<()>;

    /// Power a core off
    fn take_core_offline(&self, core: usize) -> Result<()>;

    /// Whether a core is currently powered on
    fn is_core_online(&self, core: usize) -> bool;
}

/// Cumulative idle and wall time of a core, in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub wall: u64,
}

/// Current and maximum operating frequency of a core, in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreqPolicy {
    pub cur: u64,
    pub max: u64,
}

/// Supplies per-core load statistics
pub trait StatsSource: Send + Sync {
    /// Cumulative idle/wall time. With `io_is_busy`, time waiting on I/O
    /// counts as busy instead of idle.
    fn idle_and_wall_time(&self, core: usize, io_is_busy: bool) -> CpuTimes;

    /// Frequency policy, or `NoPolicy` when the core has none
    fn frequency_policy(&self, core: usize) -> Result<FreqPolicy>;
}

/// Everything the controller needs from the system
pub trait Platform: PowerControl + StatsSource {}

impl<T: PowerControl + StatsSource> Platform for T {}

/// Linux sysfs/procfs backed platform
pub struct SysfsCpu {
    cpu_root: PathBuf,
    proc_stat: PathBuf,
}

impl SysfsCpu {
    /// Create new sysfs platform
    pub fn new(config: &SysfsConfig) -> Self {
        Self {
            cpu_root: PathBuf::from(&config.cpu_root),
            proc_stat: PathBuf::from(&config.proc_stat),
        }
    }

    fn core_dir(&self, core: usize) -> PathBuf {
        self.cpu_root.join(format!("cpu{}", core))
    }

    fn write_online(&self, core: usize, value: &str) -> Result<()> {
        let path = self.core_dir(core).join("online");
        fs::write(&path, value).map_err(|source| HotplugError::CoreControl { core, source })?;
        debug!("cpu{} online <- {}", core, value);
        Ok(())
    }
}

impl PowerControl for SysfsCpu {
    fn bring_core_online(&self, core: usize) -> Result<()> {
        self.write_online(core, "1")
    }

    fn take_core_offline(&self, core: usize) -> Result<()> {
        self.write_online(core, "0")
    }

    fn is_core_online(&self, core: usize) -> bool {
        let path = self.core_dir(core).join("online");
        match fs::read_to_string(&path) {
            Ok(content) => content.trim() == "1",
            // Cores without an online file cannot be hotplugged and are always up
            Err(_) => self.core_dir(core).exists(),
        }
    }
}

impl StatsSource for SysfsCpu {
    fn idle_and_wall_time(&self, core: usize, io_is_busy: bool) -> CpuTimes {
        fs::read_to_string(&self.proc_stat)
            .ok()
            .and_then(|stat| parse_proc_stat(&stat, core, io_is_busy))
            .map(|ticks| CpuTimes {
                idle: ticks_to_usecs(ticks.idle),
                wall: ticks_to_usecs(ticks.wall),
            })
            .unwrap_or_default()
    }

    fn frequency_policy(&self, core: usize) -> Result<FreqPolicy> {
        let cpufreq = self.core_dir(core).join("cpufreq");
        let cur = read_u64(&cpufreq.join("scaling_cur_freq"));
        let max = read_u64(&cpufreq.join("cpuinfo_max_freq"));

        match (cur, max) {
            (Some(cur), Some(max)) if max > 0 => Ok(FreqPolicy { cur, max }),
            _ => Err(HotplugError::NoPolicy(core)),
        }
    }
}

/// Parse the `cpuN` line of `/proc/stat` into idle/wall ticks
fn parse_proc_stat(content: &str, core: usize, io_is_busy: bool) -> Option<CpuTimes> {
    let label = format!("cpu{}", core);

    let line = content
        .lines()
        .find(|line| line.split_whitespace().next() == Some(label.as_str()))?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();

    // user nice system idle iowait irq softirq steal
    if fields.len() < 8 {
        return None;
    }

    let wall: u64 = fields[..8].iter().sum();
    let idle = if io_is_busy {
        fields[3]
    } else {
        fields[3] + fields[4]
    };

    Some(CpuTimes { idle, wall })
}

fn ticks_to_usecs(ticks: u64) -> u64 {
    static CLK_TCK: OnceLock<u64> = OnceLock::new();

    let hz = *CLK_TCK.get_or_init(|| {
        // SAFETY: sysconf has no preconditions
        let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if hz > 0 {
            hz as u64
        } else {
            100
        }
    });

    ticks.saturating_mul(1_000_000) / hz
}

fn read_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
