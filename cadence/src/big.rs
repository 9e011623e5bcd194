//! Big-cluster delay controller
//!
//! Big cores follow little-cluster occupancy: a full little cluster wants the
//! whole big cluster, one short of full wants half of it, anything less wants
//! none. Powering big cores up is debounced by a grace delay so a single load
//! spike does not wake them; powering down is immediate except for
//! down-locked cores.

use crate::hotplug::Hotplugger;
use crate::topology::Topology;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Debounce state for big-core up requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BigReadiness {
    /// No pending up request
    #[default]
    Idle,
    /// An up request was seen at this instant; grace delay running
    ArmedAt(Instant),
    /// Grace delay elapsed; the next up request executes immediately
    Ready,
}

impl BigReadiness {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ArmedAt(_) => "armed",
            Self::Ready => "ready",
        }
    }
}

/// Big-cluster policy knobs for one cycle
#[derive(Debug, Clone, Copy)]
pub struct BigPolicy {
    /// Grace delay before the first up request of a burst executes
    pub up_delay: Duration,
    /// Keep the first big core powered (`prevent_big_off`)
    pub keep_first_online: bool,
}

/// Big cores wanted for `online_little` online little cores
pub fn big_target(topology: &Topology, online_little: usize) -> usize {
    if online_little == topology.little_cores {
        topology.big_cores
    } else if online_little + 1 == topology.little_cores {
        topology.big_cores / 2
    } else {
        0
    }
}

/// Move the big cluster toward the target implied by little occupancy.
///
/// A pending up request is dropped as soon as the target is met again, so
/// only consecutive up requests count toward the grace delay.
pub fn rebalance(
    hp: &mut Hotplugger<'_>,
    topology: &Topology,
    readiness: &mut BigReadiness,
    policy: &BigPolicy,
    now: Instant,
) {
    let online_little = hp.online_in(topology.little());
    let online_big = hp.online_in(topology.big());
    let target = big_target(topology, online_little);

    if target > online_big {
        big_up(hp, topology, readiness, target, policy.up_delay, now);
    } else if target < online_big {
        big_down(hp, topology, readiness, target, policy.keep_first_online);
    } else {
        *readiness = BigReadiness::Idle;
    }
}

/// Handle an up request: arm on first sight, execute once the grace delay
/// has passed
pub fn big_up(
    hp: &mut Hotplugger<'_>,
    topology: &Topology,
    readiness: &mut BigReadiness,
    target: usize,
    up_delay: Duration,
    now: Instant,
) {
    match *readiness {
        BigReadiness::Idle => {
            debug!("big up request armed (target {})", target);
            *readiness = BigReadiness::ArmedAt(now);
            return;
        }
        BigReadiness::ArmedAt(since) => {
            if now.duration_since(since) <= up_delay {
                return;
            }
            *readiness = BigReadiness::Ready;
        }
        BigReadiness::Ready => {}
    }

    for core in topology.big() {
        if hp.is_online(core) {
            continue;
        }
        if target <= hp.online_in(topology.big()) {
            break;
        }
        hp.up(core);
    }

    // Stay ready if a core refused, so the next cycle retries without a new grace delay
    if hp.online_in(topology.big()) >= target {
        *readiness = BigReadiness::Idle;
    }
}

/// Handle a down request: drop any pending up request and offline unlocked
/// big cores until `target` remain
pub fn big_down(
    hp: &mut Hotplugger<'_>,
    topology: &Topology,
    readiness: &mut BigReadiness,
    target: usize,
    keep_first_online: bool,
) {
    *readiness = BigReadiness::Idle;

    let quota = topology.big_cores.saturating_sub(target);
    let keep = if keep_first_online {
        topology.first_big()
    } else {
        None
    };

    for core in topology.big() {
        if Some(core) == keep {
            if !hp.is_online(core) {
                hp.up_unlocked(core);
            }
            continue;
        }
        if !hp.is_online(core) || hp.is_locked(core) {
            continue;
        }
        let offline = topology.big_cores - hp.online_in(topology.big());
        if quota <= offline {
            break;
        }
        hp.down(core);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::DownLocks;
    use crate::platform::sim::SimCpu;

    const DELAY: Duration = Duration::from_millis(1200);
    const POLICY: BigPolicy = BigPolicy {
        up_delay: DELAY,
        keep_first_online: false,
    };

    fn sim_with_bigs_off() -> SimCpu {
        let sim = SimCpu::new(6);
        sim.set_online(4, false);
        sim.set_online(5, false);
        sim
    }

    #[test]
    fn test_target_from_occupancy() {
        let topology = Topology::default();
        assert_eq!(big_target(&topology, 4), 2);
        assert_eq!(big_target(&topology, 3), 1);
        assert_eq!(big_target(&topology, 2), 0);
        assert_eq!(big_target(&topology, 1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_up_is_debounced() {
        let topology = Topology::default();
        let sim = sim_with_bigs_off();
        let mut locks = DownLocks::new(6);
        let mut hp = Hotplugger::new(&sim, &mut locks, Duration::from_millis(1000));
        let mut readiness = BigReadiness::Idle;
        let start = Instant::now();

        rebalance(&mut hp, &topology, &mut readiness, &POLICY, start);
        assert_eq!(readiness, BigReadiness::ArmedAt(start));
        assert_eq!(hp.online_in(topology.big()), 0);

        // Still inside the grace delay
        rebalance(&mut hp, &topology, &mut readiness, &POLICY, start + DELAY);
        assert_eq!(hp.online_in(topology.big()), 0);

        rebalance(&mut hp, &topology, &mut readiness, &POLICY, start + DELAY + Duration::from_millis(1));
        assert_eq!(hp.online_in(topology.big()), 2);
        assert_eq!(readiness, BigReadiness::Idle);
        assert!(hp.is_locked(4) && hp.is_locked(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_isolated_spike_never_powers_big() {
        let topology = Topology::default();
        let sim = sim_with_bigs_off();
        let mut locks = DownLocks::new(6);
        let mut hp = Hotplugger::new(&sim, &mut locks, Duration::from_millis(1000));
        let mut readiness = BigReadiness::Idle;
        let start = Instant::now();

        rebalance(&mut hp, &topology, &mut readiness, &POLICY, start);
        assert_eq!(readiness, BigReadiness::ArmedAt(start));

        // Occupancy drops with the big cluster already off: target met, request dropped
        sim.set_online(3, false);
        sim.set_online(2, false);
        rebalance(&mut hp, &topology, &mut readiness, &POLICY, start + Duration::from_millis(200));
        assert_eq!(readiness, BigReadiness::Idle);

        // A later single spike only arms again
        sim.set_online(2, true);
        sim.set_online(3, true);
        let later = start + Duration::from_secs(10);
        rebalance(&mut hp, &topology, &mut readiness, &POLICY, later);
        assert_eq!(hp.online_in(topology.big()), 0);
        assert_eq!(readiness, BigReadiness::ArmedAt(later));
    }

    #[tokio::test(start_paused = true)]
    async fn test_down_request_resets_readiness() {
        let topology = Topology::default();
        let sim = SimCpu::new(6);
        let mut locks = DownLocks::new(6);
        let mut hp = Hotplugger::new(&sim, &mut locks, Duration::from_millis(1000));
        let mut readiness = BigReadiness::ArmedAt(Instant::now());

        big_down(&mut hp, &topology, &mut readiness, 0, false);
        assert_eq!(readiness, BigReadiness::Idle);
        assert_eq!(hp.online_in(topology.big()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_core_stays_ready() {
        let topology = Topology::default();
        let sim = sim_with_bigs_off();
        sim.refuse_online(5);
        let mut locks = DownLocks::new(6);
        let mut hp = Hotplugger::new(&sim, &mut locks, Duration::from_millis(1000));
        let mut readiness = BigReadiness::ArmedAt(Instant::now());

        big_up(&mut hp, &topology, &mut readiness, 2, DELAY, Instant::now() + DELAY * 2);
        assert_eq!(hp.online_in(topology.big()), 1);
        assert_eq!(readiness, BigReadiness::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_down_skips_locked_and_kept() {
        let topology = Topology::default();
        let sim = SimCpu::new(6);
        let mut locks = DownLocks::new(6);
        locks.apply(5, Duration::from_millis(1000));
        let mut hp = Hotplugger::new(&sim, &mut locks, Duration::from_millis(1000));
        let mut readiness = BigReadiness::Ready;

        big_down(&mut hp, &topology, &mut readiness, 0, false);
        assert_eq!(readiness, BigReadiness::Idle);
        assert_eq!(sim.online_cores(), vec![0, 1, 2, 3, 5]);

        sim.set_online(4, false);
        big_down(&mut hp, &topology, &mut readiness, 0, true);
        // First big core is brought back and kept
        assert!(sim.online_cores().contains(&4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_cluster_down() {
        let topology = Topology::default();
        let sim = SimCpu::new(6);
        sim.set_online(3, false);
        let mut locks = DownLocks::new(6);
        let mut hp = Hotplugger::new(&sim, &mut locks, Duration::from_millis(1000));
        let mut readiness = BigReadiness::Idle;

        rebalance(&mut hp, &topology, &mut readiness, &POLICY, Instant::now());
        assert_eq!(hp.online_in(topology.big()), 1);
        assert_eq!(sim.online_cores(), vec![0, 1, 2, 5]);
    }
}
