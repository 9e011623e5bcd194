//! Little-cluster executor
//!
//! Moves the number of online little cores toward the target one core at a
//! time. Growing picks offline cores in ascending order; shrinking always
//! picks the least loaded online core and gives up for this cycle as soon as
//! that core is down-locked or a gate refuses.

use crate::hotplug::Hotplugger;
use crate::sampler::CoreLoad;
use crate::thresholds::ThresholdTable;
use crate::topology::Topology;
use tracing::debug;

/// Bring little cores online until `target` is reached, never beyond
/// `max_online`
pub fn scale_up(hp: &mut Hotplugger<'_>, topology: &Topology, target: usize, max_online: usize) {
    let online = hp.online_in(topology.little());
    if target <= online || online >= max_online {
        return;
    }

    for core in topology.little_hotpluggable() {
        if hp.is_online(core) {
            continue;
        }
        if target <= hp.online_in(topology.little()) {
            break;
        }
        hp.up(core);
    }
}

/// Conditions that must hold before the least loaded core may go offline
pub struct OfflineGate<'a> {
    /// Per-core loads of the last window, indexed by core
    pub loads: &'a [CoreLoad],
    /// Smoothed cluster load this cycle
    pub average_load: u32,
    pub table: &'a ThresholdTable,
    /// Cores at or above this load stay online (0 disables the gate)
    pub offline_load: u32,
}

impl OfflineGate<'_> {
    /// Least loaded online little core other than the boot core
    pub fn lowest_load_core(&self, hp: &Hotplugger<'_>, topology: &Topology) -> Option<(usize, u32)> {
        topology
            .little_hotpluggable()
            .filter(|&core| hp.is_online(core))
            .map(|core| (core, self.loads.get(core).map(CoreLoad::scaled_load).unwrap_or(0)))
            .min_by_key(|&(_, load)| load)
    }

    /// Whether removing a core carrying `load` out of `online` is allowed
    pub fn permits(&self, load: u32, online: usize) -> bool {
        let projected = self.average_load.saturating_sub(load);
        if let Some(level) = self.table.level_for(online.saturating_sub(1)) {
            if projected > level.up_threshold {
                return false;
            }
        }

        !(self.offline_load > 0 && load >= self.offline_load)
    }
}

/// Take little cores offline until `target` is reached, never below
/// `min_online`
pub fn scale_down(
    hp: &mut Hotplugger<'_>,
    topology: &Topology,
    target: usize,
    min_online: usize,
    gate: &OfflineGate<'_>,
) {
    let online = hp.online_in(topology.little());
    if target >= online || online <= min_online {
        return;
    }

    for _ in topology.little_hotpluggable() {
        let Some((core, load)) = gate.lowest_load_core(hp, topology) else {
            break;
        };

        let online = hp.online_in(topology.little());
        if !gate.permits(load, online) {
            debug!("cpu{}: offline refused (load {}, cluster {})", core, load, gate.average_load);
            break;
        }
        if hp.is_locked(core) {
            debug!("cpu{}: down-locked", core);
            break;
        }
        if !hp.down(core) {
            break;
        }
        if target >= hp.online_in(topology.little()) {
            break;
        }
    }
}
