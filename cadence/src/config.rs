//! Configuration for the Cadence hotplug daemon

use crate::error::{HotplugError, Result as HotplugResult};
use crate::rates::UpdateRates;
use crate::thresholds::{LittleLimits, ThresholdTable};
use crate::topology::Topology;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Core layout
    #[serde(default)]
    pub topology: Topology,

    /// Runtime tunables (initial values)
    #[serde(default)]
    pub tunables: Tunables,

    /// Kernel interface paths
    #[serde(default)]
    pub sysfs: SysfsConfig,

    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Hotplug policy tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunables {
    /// Start the controller at boot
    #[serde(default)]
    pub enabled: bool,

    /// Cycles averaged into the smoothed load
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// How long a core brought online is protected from going offline (ms)
    #[serde(default = "default_down_lock_duration")]
    pub down_lock_duration_ms: u64,

    /// Minimum online little cores
    #[serde(default = "default_min_cpus_online")]
    pub min_cpus_online: usize,

    /// Maximum online little cores (clamped to the little cluster size)
    #[serde(default = "default_max_cpus_online")]
    pub max_cpus_online: usize,

    /// Little cores kept online while the display is off
    #[serde(default = "default_max_cpus_online_susp")]
    pub max_cpus_online_susp: usize,

    /// Cores at or above this load are not taken offline (0 disables)
    #[serde(default)]
    pub offline_load: u32,

    /// Single-core load that jumps straight to the maximum
    #[serde(default = "default_fast_lane_load")]
    pub fast_lane_load: u32,

    /// Grace delay before big cores come online (ms)
    #[serde(default = "default_big_core_up_delay")]
    pub big_core_up_delay_ms: u64,

    /// Cycle delay table
    #[serde(default)]
    pub update_rates: UpdateRates,

    /// Little-cluster hysteresis table
    #[serde(default)]
    pub load_levels: ThresholdTable,

    /// Count I/O wait as busy time
    #[serde(default)]
    pub io_is_busy: bool,

    /// Keep the first big core powered
    #[serde(default)]
    pub prevent_big_off: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            enabled: false,
            history_size: default_history_size(),
            down_lock_duration_ms: default_down_lock_duration(),
            min_cpus_online: default_min_cpus_online(),
            max_cpus_online: default_max_cpus_online(),
            max_cpus_online_susp: default_max_cpus_online_susp(),
            offline_load: 0,
            fast_lane_load: default_fast_lane_load(),
            big_core_up_delay_ms: default_big_core_up_delay(),
            update_rates: UpdateRates::default(),
            load_levels: ThresholdTable::default(),
            io_is_busy: false,
            prevent_big_off: false,
        }
    }
}

impl Tunables {
    pub fn down_lock_duration(&self) -> Duration {
        Duration::from_millis(self.down_lock_duration_ms)
    }

    pub fn big_core_up_delay(&self) -> Duration {
        Duration::from_millis(self.big_core_up_delay_ms)
    }

    /// Count limits for the little-cluster decision
    pub fn little_limits(&self, topology: &Topology) -> LittleLimits {
        LittleLimits {
            min_online: self.min_cpus_online,
            max_online: self.max_cpus_online,
            fast_lane_load: self.fast_lane_load,
            total: topology.little_cores,
        }
    }

    /// Shrink core counts that exceed the little cluster
    pub fn fit_to(&mut self, topology: &Topology) {
        let little = topology.little_cores;
        if self.max_cpus_online > little {
            warn!(
                "max_cpus_online {} exceeds little cluster, using {}",
                self.max_cpus_online, little
            );
            self.max_cpus_online = little;
        }
        if self.max_cpus_online_susp > little {
            self.max_cpus_online_susp = little;
        }
        if self.min_cpus_online > self.max_cpus_online {
            self.min_cpus_online = self.max_cpus_online;
        }
    }

    /// Check the tunables against a topology
    pub fn validate(&self, topology: &Topology) -> HotplugResult<()> {
        let little = topology.little_cores;
        if self.history_size == 0 {
            return Err(HotplugError::Startup("history_size must be at least 1".into()));
        }
        if self.min_cpus_online == 0 || self.min_cpus_online > little {
            return Err(HotplugError::invalid(format!(
                "min_cpus_online must be within 1..={}",
                little
            )));
        }
        if self.max_cpus_online == 0 || self.max_cpus_online > little {
            return Err(HotplugError::invalid(format!(
                "max_cpus_online must be within 1..={}",
                little
            )));
        }
        if self.min_cpus_online > self.max_cpus_online {
            return Err(HotplugError::invalid("min_cpus_online exceeds max_cpus_online"));
        }
        if self.max_cpus_online_susp == 0 || self.max_cpus_online_susp > little {
            return Err(HotplugError::invalid(format!(
                "max_cpus_online_susp must be within 1..={}",
                little
            )));
        }
        Ok(())
    }
}

/// Kernel interface paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysfsConfig {
    /// CPU device directory (`cpuN/online`, `cpuN/cpufreq`)
    #[serde(default = "default_cpu_root")]
    pub cpu_root: String,

    /// Per-core jiffies
    #[serde(default = "default_proc_stat")]
    pub proc_stat: String,

    /// Backlight class directory for display power events
    #[serde(default = "default_backlight_dir")]
    pub backlight_dir: String,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            cpu_root: default_cpu_root(),
            proc_stat: default_proc_stat(),
            backlight_dir: default_backlight_dir(),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Socket path
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Delay before the first cycle when enabled at boot (ms)
    #[serde(default = "default_start_delay")]
    pub start_delay_ms: u64,

    /// Backlight poll interval (ms)
    #[serde(default = "default_display_poll")]
    pub display_poll_ms: u64,

    /// Wake override lifetime (ms)
    #[serde(default = "default_wake_timeout")]
    pub wake_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_level: default_log_level(),
            start_delay_ms: default_start_delay(),
            display_poll_ms: default_display_poll(),
            wake_timeout_ms: default_wake_timeout(),
        }
    }
}

impl DaemonConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn display_poll_interval(&self) -> Duration {
        Duration::from_millis(self.display_poll_ms.max(1))
    }

    pub fn wake_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_timeout_ms)
    }
}

// Default value functions
fn default_history_size() -> usize {
    10
}

fn default_down_lock_duration() -> u64 {
    1000
}

fn default_min_cpus_online() -> usize {
    2
}

fn default_max_cpus_online() -> usize {
    4
}

fn default_max_cpus_online_susp() -> usize {
    2
}

fn default_fast_lane_load() -> u32 {
    99
}

fn default_big_core_up_delay() -> u64 {
    1200
}

fn default_cpu_root() -> String {
    "/sys/devices/system/cpu".to_string()
}

fn default_proc_stat() -> String {
    "/proc/stat".to_string()
}

fn default_backlight_dir() -> String {
    "/sys/class/backlight".to_string()
}

fn default_socket_path() -> String {
    "/run/cadence/cadence.sock".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_start_delay() -> u64 {
    20000
}

fn default_display_poll() -> u64 {
    500
}

fn default_wake_timeout() -> u64 {
    2000
}

impl CadenceConfig {
    /// Load configuration from file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_yaml::from_str::<Self>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        config.topology.validate()?;
        config.tunables.fit_to(&config.topology);
        config.tunables.validate(&config.topology)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::LoadLevel;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = CadenceConfig::default();
        let t = &config.tunables;
        assert!(!t.enabled);
        assert_eq!(t.history_size, 10);
        assert_eq!(t.down_lock_duration(), Duration::from_millis(1000));
        assert_eq!((t.min_cpus_online, t.max_cpus_online, t.max_cpus_online_susp), (2, 4, 2));
        assert_eq!(t.fast_lane_load, 99);
        assert_eq!(t.big_core_up_delay(), Duration::from_millis(1200));
        assert_eq!(t.update_rates, UpdateRates::default());
        assert_eq!(config.daemon.start_delay(), Duration::from_secs(20));
        assert_eq!(config.daemon.wake_timeout(), Duration::from_secs(2));
        assert!(t.validate(&config.topology).is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = CadenceConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.tunables, Tunables::default());
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cadence.yaml");
        std::fs::write(
            &path,
            "topology:\n  little_cores: 2\n  big_cores: 2\n\
             tunables:\n  enabled: true\n  update_rates: [400, 100, 200]\n  \
             load_levels:\n    - {up: 80, down: 0}\n    - {up: 200, down: 60}\n",
        )
        .unwrap();

        let config = CadenceConfig::load(&path).unwrap();
        assert!(config.tunables.enabled);
        // Clamped to the 2-core little cluster
        assert_eq!(config.tunables.max_cpus_online, 2);
        assert_eq!(Vec::<LoadLevel>::from(config.tunables.load_levels.clone()).len(), 2);
        assert_eq!(config.tunables.update_rates.delay_for(150), Duration::from_millis(200));
        assert_eq!(config.daemon.socket_path, "/run/cadence/cadence.sock");
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cadence.yaml");

        std::fs::write(&path, "tunables:\n  history_size: 0\n").unwrap();
        assert!(CadenceConfig::load(&path).is_err());

        std::fs::write(&path, "tunables:\n  update_rates: [400, 100]\n").unwrap();
        assert!(CadenceConfig::load(&path).is_err());

        std::fs::write(&path, "topology:\n  little_cores: 0\n").unwrap();
        assert!(CadenceConfig::load(&path).is_err());
    }

    #[test]
    fn test_validate_bounds() {
        let topology = Topology::default();
        let mut t = Tunables::default();
        t.min_cpus_online = 0;
        assert!(t.validate(&topology).unwrap_err().is_invalid_argument());

        let mut t = Tunables::default();
        t.min_cpus_online = 4;
        t.max_cpus_online = 3;
        assert!(t.validate(&topology).is_err());

        let mut t = Tunables::default();
        t.max_cpus_online_susp = 5;
        assert!(t.validate(&topology).is_err());
    }
}
