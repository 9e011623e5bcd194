//! Little-cluster threshold engine
//!
//! Maps the smoothed cluster load to a target number of online little cores
//! using a hysteresis table. Entry `i` describes the band in which `i + 1`
//! cores should be online: `down_threshold < load <= up_threshold`.

use crate::error::{HotplugError, Result};
use crate::history::LoadSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One hysteresis band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadLevel {
    #[serde(rename = "up")]
    pub up_threshold: u32,
    #[serde(rename = "down")]
    pub down_threshold: u32,
}

impl LoadLevel {
    pub const fn new(up_threshold: u32, down_threshold: u32) -> Self {
        Self {
            up_threshold,
            down_threshold,
        }
    }

    /// Whether `load` falls inside this band
    pub fn contains(&self, load: u32) -> bool {
        load > self.down_threshold && load <= self.up_threshold
    }
}

/// Hysteresis table indexed by `online count - 1`.
///
/// Entries can be overwritten at runtime; the number of entries cannot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LoadLevel>", into = "Vec<LoadLevel>")]
pub struct ThresholdTable {
    levels: Vec<LoadLevel>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            levels: vec![
                LoadLevel::new(65, 0),
                LoadLevel::new(120, 50),
                LoadLevel::new(190, 100),
                LoadLevel::new(410, 170),
            ],
        }
    }
}

impl TryFrom<Vec<LoadLevel>> for ThresholdTable {
    type Error = HotplugError;

    fn try_from(levels: Vec<LoadLevel>) -> Result<Self> {
        Self::new(levels)
    }
}

impl From<ThresholdTable> for Vec<LoadLevel> {
    fn from(table: ThresholdTable) -> Self {
        table.levels
    }
}

impl ThresholdTable {
    /// Build a table, validating every band
    pub fn new(levels: Vec<LoadLevel>) -> Result<Self> {
        if levels.is_empty() {
            return Err(HotplugError::invalid("load table must have at least one level"));
        }
        if let Some((i, _)) = levels
            .iter()
            .enumerate()
            .find(|(_, l)| l.down_threshold > l.up_threshold)
        {
            return Err(HotplugError::invalid(format!(
                "load level {}: down threshold above up threshold",
                i
            )));
        }
        Ok(Self { levels })
    }

    /// Level describing `count` online cores
    pub fn level_for(&self, count: usize) -> Option<&LoadLevel> {
        count.checked_sub(1).and_then(|i| self.levels.get(i))
    }

    /// Overwrite one entry
    pub fn set(&mut self, index: usize, up_threshold: u32, down_threshold: u32) -> Result<()> {
        if down_threshold > up_threshold {
            return Err(HotplugError::invalid(format!(
                "down threshold {} above up threshold {}",
                down_threshold, up_threshold
            )));
        }
        let level = self
            .levels
            .get_mut(index)
            .ok_or_else(|| HotplugError::invalid(format!("load level {} out of range", index)))?;
        *level = LoadLevel::new(up_threshold, down_threshold);
        Ok(())
    }

    /// First band at or above `min_count` containing `load`, as a core count
    pub fn lookup(&self, load: u32, min_count: usize) -> Option<usize> {
        self.levels
            .iter()
            .enumerate()
            .skip(min_count.saturating_sub(1))
            .find(|(_, level)| level.contains(load))
            .map(|(i, _)| i + 1)
    }
}

impl fmt::Display for ThresholdTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, level) in self.levels.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{} {} {}", i, level.up_threshold, level.down_threshold)?;
        }
        Ok(())
    }
}

/// Count limits applied on top of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LittleLimits {
    pub min_online: usize,
    pub max_online: usize,
    pub fast_lane_load: u32,
    /// Size of the little cluster
    pub total: usize,
}

/// Which rule produced a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPath {
    /// A single core crossed the fast-lane load
    FastLane,
    /// Minimum equals the cluster size
    PinnedHigh,
    /// Only one core permitted
    PinnedLow,
    /// Regular table lookup
    Table,
}

/// Target online little-core count for this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LittleDecision {
    pub target: usize,
    pub path: DecisionPath,
}

/// Derive the little-cluster target from this cycle's load snapshot
pub fn little_target(
    snapshot: &LoadSnapshot,
    table: &ThresholdTable,
    limits: &LittleLimits,
) -> LittleDecision {
    let (target, path) = if snapshot.max_core_load >= limits.fast_lane_load {
        (limits.max_online, DecisionPath::FastLane)
    } else if limits.min_online == limits.total {
        (limits.min_online, DecisionPath::PinnedHigh)
    } else if limits.max_online == 1 {
        (1, DecisionPath::PinnedLow)
    } else {
        let target = table.lookup(snapshot.average_load, 1).unwrap_or(0);
        (target, DecisionPath::Table)
    };

    LittleDecision {
        target: target.clamp(limits.min_online, limits.max_online),
        path,
    }
}
