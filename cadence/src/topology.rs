//! Cluster topology
//!
//! Cores are numbered little cluster first, then big cluster:
//! `0..little_cores` are little, `little_cores..little_cores + big_cores` are big.

use crate::error::{HotplugError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// The always-on boot core. Never taken offline.
pub const BOOT_CORE: usize = 0;

/// Two-cluster core layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Number of little cores (includes the boot core)
    #[serde(default = "default_little_cores")]
    pub little_cores: usize,

    /// Number of big cores
    #[serde(default = "default_big_cores")]
    pub big_cores: usize,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            little_cores: default_little_cores(),
            big_cores: default_big_cores(),
        }
    }
}

fn default_little_cores() -> usize {
    4
}

fn default_big_cores() -> usize {
    2
}

impl Topology {
    /// Create a topology, rejecting layouts without a boot core
    pub fn new(little_cores: usize, big_cores: usize) -> Result<Self> {
        let topology = Self {
            little_cores,
            big_cores,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Check the layout is usable
    pub fn validate(&self) -> Result<()> {
        if self.little_cores == 0 {
            return Err(HotplugError::Startup(
                "little cluster must contain the boot core".into(),
            ));
        }
        Ok(())
    }

    /// Total number of possible cores
    pub fn total(&self) -> usize {
        self.little_cores + self.big_cores
    }

    /// Indices of the little cluster
    pub fn little(&self) -> Range<usize> {
        0..self.little_cores
    }

    /// Indices of the big cluster
    pub fn big(&self) -> Range<usize> {
        self.little_cores..self.total()
    }

    /// Little cores eligible for offlining (everything but the boot core)
    pub fn little_hotpluggable(&self) -> impl Iterator<Item = usize> {
        self.little().filter(|&core| core != BOOT_CORE)
    }

    /// Every core except the boot core
    pub fn hotpluggable(&self) -> impl Iterator<Item = usize> {
        (0..self.total()).filter(|&core| core != BOOT_CORE)
    }

    /// The big core kept powered by the `prevent_big_off` override
    pub fn first_big(&self) -> Option<usize> {
        (self.big_cores > 0).then_some(self.little_cores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let topology = Topology::default();
        assert_eq!(topology.total(), 6);
        assert_eq!(topology.little(), 0..4);
        assert_eq!(topology.big(), 4..6);
        assert_eq!(topology.first_big(), Some(4));
        assert!(topology.little().contains(&3));
        assert!(topology.big().contains(&5));
    }

    #[test]
    fn test_boot_core_not_hotpluggable() {
        let topology = Topology::default();
        let little: Vec<_> = topology.little_hotpluggable().collect();
        assert_eq!(little, vec![1, 2, 3]);
        assert!(!topology.hotpluggable().any(|c| c == BOOT_CORE));
    }

    #[test]
    fn test_rejects_empty_little_cluster() {
        assert!(Topology::new(0, 2).is_err());
        assert_eq!(Topology::new(2, 0).unwrap().first_big(), None);
    }
}
