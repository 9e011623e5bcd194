//! Hotplug controller
//!
//! Owns the two pieces of shared state and drives the decision cycle:
//!
//! - **statistics**: load history and per-core samples, guarded by `stats`
//! - **policy**: enabled flag, power state, big readiness, down-locks and the
//!   cycle task handle, guarded by `policy`
//!
//! Tunables sit behind their own read/write lock so attribute reads never
//! wait for a cycle. Locks are always taken in the order policy, tunables,
//! stats.
//!
//! The cycle is a single task that samples, decides, sleeps for the
//! load-dependent update rate and repeats. Power transitions take the policy
//! lock and cancel-and-wait that task, so no cycle can be mid-flight while
//! cores are parked or restored.

use crate::big::{self, BigPolicy, BigReadiness};
use crate::config::{DaemonConfig, Tunables};
use crate::display::DisplayEvent;
use crate::error::Result;
use crate::history::{LoadHistory, LoadStats};
use crate::hotplug::Hotplugger;
use crate::little::{self, OfflineGate};
use crate::lock::DownLocks;
use crate::platform::Platform;
use crate::power::{PowerLabel, PowerState, PowerTransition, TickAction};
use crate::scheduler::{self, TaskHandle};
use crate::thresholds::{self, LittleDecision};
use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Policy and target state
struct PolicyState {
    enabled: bool,
    power: PowerState,
    /// Last display state reported, even while disabled
    display: DisplayEvent,
    readiness: BigReadiness,
    locks: DownLocks,
    cycle: Option<TaskHandle>,
    last_decision: Option<LittleDecision>,
}

struct Inner {
    platform: Arc<dyn Platform>,
    topology: Topology,
    policy: Mutex<PolicyState>,
    tunables: RwLock<Tunables>,
    stats: Mutex<Option<LoadStats>>,
    start_delay: Duration,
    wake_timeout: Duration,
}

/// Snapshot of the controller for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub enabled: bool,
    pub power: PowerLabel,
    pub display: DisplayEvent,
    pub average_load: u32,
    pub max_core_load: u32,
    pub online_little: usize,
    pub online_big: usize,
    /// Little target chosen by the last cycle
    pub little_target: Option<usize>,
    pub big_readiness: String,
    pub cycle_scheduled: bool,
}

/// Cheaply cloneable handle to the hotplug controller
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// Create a stopped controller
    pub fn new(
        platform: Arc<dyn Platform>,
        topology: Topology,
        tunables: Tunables,
        daemon: &DaemonConfig,
    ) -> Result<Self> {
        topology.validate()?;
        tunables.validate(&topology)?;

        let policy = PolicyState {
            enabled: false,
            power: PowerState::Active,
            display: DisplayEvent::Unblanked,
            readiness: BigReadiness::Idle,
            locks: DownLocks::new(topology.total()),
            cycle: None,
            last_decision: None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                platform,
                topology,
                policy: Mutex::new(policy),
                tunables: RwLock::new(tunables),
                stats: Mutex::new(None),
                start_delay: daemon.start_delay(),
                wake_timeout: daemon.wake_timeout(),
            }),
        })
    }

    /// Start at boot if configured; the first cycle waits for the start delay
    pub async fn launch(&self) -> Result<()> {
        let enabled = self.inner.tunables.read().await.enabled;
        if !enabled {
            info!("Hotplug controller disabled at boot");
            return Ok(());
        }
        self.start(self.inner.start_delay).await
    }

    /// Enable the controller and schedule the first cycle after `first_delay`.
    /// A running controller is left alone.
    pub async fn start(&self, first_delay: Duration) -> Result<()> {
        let mut guard = self.inner.policy.lock().await;
        let policy = &mut *guard;
        if policy.enabled {
            return Ok(());
        }

        let tunables = self.inner.tunables.read().await;
        let history = match LoadHistory::new(tunables.history_size) {
            Ok(history) => history,
            Err(e) => {
                error!("Failed to start hotplug controller: {}", e);
                return Err(e);
            }
        };
        *self.inner.stats.lock().await = Some(LoadStats::new(history, self.inner.topology.total()));

        policy.enabled = true;
        policy.power = PowerState::Active;
        policy.readiness = BigReadiness::Idle;
        policy.last_decision = None;
        self.bring_all_online(policy, Some(tunables.down_lock_duration()));
        policy.cycle = Some(self.arm_cycle(first_delay));

        info!(
            "Hotplug controller started ({} little + {} big cores, first cycle in {:?})",
            self.inner.topology.little_cores, self.inner.topology.big_cores, first_delay
        );
        Ok(())
    }

    /// Disable the controller: cancel the cycle and every down-lock, drop the
    /// statistics and bring every core online
    pub async fn stop(&self) {
        let mut guard = self.inner.policy.lock().await;
        let policy = &mut *guard;
        if !policy.enabled {
            return;
        }

        policy.enabled = false;
        if let Some(cycle) = policy.cycle.take() {
            cycle.cancel_and_wait().await;
        }
        policy.locks.cancel_all();
        policy.power = PowerState::Active;
        policy.readiness = BigReadiness::Idle;
        policy.last_decision = None;
        *self.inner.stats.lock().await = None;

        self.bring_all_online(policy, None);
        info!("Hotplug controller stopped");
    }

    pub async fn is_enabled(&self) -> bool {
        self.inner.policy.lock().await.enabled
    }

    /// Feed a display power event
    pub async fn handle_display(&self, event: DisplayEvent) {
        let mut guard = self.inner.policy.lock().await;
        let policy = &mut *guard;
        policy.display = event;
        if !policy.enabled {
            return;
        }

        match policy.power.on_display(event) {
            Some(PowerTransition::Suspend) => {
                if let Some(cycle) = policy.cycle.take() {
                    cycle.cancel_and_wait().await;
                }
                let tunables = self.inner.tunables.read().await;
                self.suspend_cores(policy, &tunables);
                info!(
                    "Display off: suspended with {} little cores",
                    self.online_count(self.inner.topology.little())
                );
            }
            Some(PowerTransition::Resume) => {
                if let Some(cycle) = policy.cycle.take() {
                    cycle.cancel_and_wait().await;
                }
                let tunables = self.inner.tunables.read().await;
                self.bring_all_online(policy, Some(tunables.down_lock_duration()));
                policy.cycle = Some(self.arm_cycle(Duration::ZERO));
                info!("Display on: resumed");
            }
            _ => {}
        }
    }

    /// External wake trigger: while suspended, bring every core online for
    /// a short override window
    pub async fn wake(&self) {
        let mut guard = self.inner.policy.lock().await;
        let policy = &mut *guard;
        if !policy.enabled {
            return;
        }

        if let Some(PowerTransition::WakeOverride) = policy.power.on_wake(Instant::now()) {
            self.bring_all_online(policy, None);
            let delay = {
                let tunables = self.inner.tunables.read().await;
                let load = self.current_load().await;
                tunables.update_rates.delay_for(load)
            };
            if let Some(old) = policy.cycle.take() {
                old.cancel();
            }
            policy.cycle = Some(self.arm_cycle(delay));
            info!("Wake override for {:?}", self.inner.wake_timeout);
        }
    }

    /// Current smoothed load (0 while stopped)
    pub async fn current_load(&self) -> u32 {
        self.inner
            .stats
            .lock()
            .await
            .as_ref()
            .map(LoadStats::average_load)
            .unwrap_or(0)
    }

    pub async fn status(&self) -> ControllerStatus {
        let policy = self.inner.policy.lock().await;
        let snapshot = self
            .inner
            .stats
            .lock()
            .await
            .as_ref()
            .map(|stats| stats.last())
            .unwrap_or_default();

        ControllerStatus {
            enabled: policy.enabled,
            power: policy.power.label(),
            display: policy.display,
            average_load: snapshot.average_load,
            max_core_load: snapshot.max_core_load,
            online_little: self.online_count(self.inner.topology.little()),
            online_big: self.online_count(self.inner.topology.big()),
            little_target: policy.last_decision.map(|d| d.target),
            big_readiness: policy.readiness.label().to_string(),
            cycle_scheduled: policy.cycle.as_ref().map(|c| !c.is_finished()).unwrap_or(false),
        }
    }

    pub(crate) fn topology(&self) -> &Topology {
        &self.inner.topology
    }

    pub(crate) fn tunables(&self) -> &RwLock<Tunables> {
        &self.inner.tunables
    }

    fn arm_cycle(&self, delay: Duration) -> TaskHandle {
        let controller = self.clone();
        scheduler::schedule_after(delay, async move { controller.cycle_loop().await })
    }

    async fn cycle_loop(self) {
        while let Some(delay) = self.run_cycle().await {
            tokio::time::sleep(delay).await;
        }
    }

    /// One decision cycle. Returns the delay before the next one, or `None`
    /// when cycling should stop.
    pub(crate) async fn run_cycle(&self) -> Option<Duration> {
        let mut guard = self.inner.policy.lock().await;
        let policy = &mut *guard;
        if !policy.enabled {
            return None;
        }

        let tunables = self.inner.tunables.read().await;
        let topology = self.inner.topology;
        let now = Instant::now();

        match policy.power.on_tick(now, self.inner.wake_timeout, policy.display) {
            TickAction::Run => {}
            TickAction::Halt => {
                policy.cycle = None;
                return None;
            }
            TickAction::Defer => {
                let load = self.current_load().await;
                return Some(tunables.update_rates.delay_for(load));
            }
            TickAction::Resuspend => {
                self.suspend_cores(policy, &tunables);
                policy.cycle = None;
                info!("Wake override expired, display still off: suspended again");
                return None;
            }
            TickAction::Release => info!("Wake override expired, display on: resuming cycle"),
        }

        let mut stats_guard = self.inner.stats.lock().await;
        let stats = stats_guard.as_mut()?;
        let platform = self.inner.platform.as_ref();
        let snapshot = stats.update(platform, &topology, tunables.io_is_busy);

        let mut hp = Hotplugger::new(platform, &mut policy.locks, tunables.down_lock_duration());

        if tunables.prevent_big_off {
            if let Some(core) = topology.first_big() {
                if !hp.is_online(core) {
                    hp.up_unlocked(core);
                }
            }
        }

        let limits = tunables.little_limits(&topology);
        let decision = thresholds::little_target(&snapshot, &tunables.load_levels, &limits);
        let online = hp.online_in(topology.little());
        debug!(
            "load {} (max core {}), {} little online, target {} via {:?}",
            snapshot.average_load, snapshot.max_core_load, online, decision.target, decision.path
        );

        if decision.target > online {
            little::scale_up(&mut hp, &topology, decision.target, limits.max_online);
        } else if decision.target < online {
            let gate = OfflineGate {
                loads: stats.cores(),
                average_load: snapshot.average_load,
                table: &tunables.load_levels,
                offline_load: tunables.offline_load,
            };
            little::scale_down(&mut hp, &topology, decision.target, limits.min_online, &gate);
        }

        let big_policy = BigPolicy {
            up_delay: tunables.big_core_up_delay(),
            keep_first_online: tunables.prevent_big_off,
        };
        big::rebalance(&mut hp, &topology, &mut policy.readiness, &big_policy, now);

        policy.last_decision = Some(decision);
        Some(tunables.update_rates.delay_for(snapshot.average_load))
    }

    /// Park cores for a blanked display: at most `max_cpus_online_susp`
    /// little cores and no big cores except a kept one
    fn suspend_cores(&self, policy: &mut PolicyState, tunables: &Tunables) {
        let topology = &self.inner.topology;
        let mut hp = Hotplugger::new(
            self.inner.platform.as_ref(),
            &mut policy.locks,
            tunables.down_lock_duration(),
        );

        for core in topology.little_hotpluggable() {
            if hp.online_in(topology.little()) <= tunables.max_cpus_online_susp {
                break;
            }
            if hp.is_online(core) {
                hp.down(core);
            }
        }

        let keep = if tunables.prevent_big_off {
            topology.first_big()
        } else {
            None
        };
        for core in topology.big() {
            if Some(core) != keep && hp.is_online(core) {
                hp.down(core);
            }
        }

        policy.readiness = BigReadiness::Idle;
    }

    /// Bring every offline core except the boot core online, down-locking
    /// each one when `lock` is set
    fn bring_all_online(&self, policy: &mut PolicyState, lock: Option<Duration>) {
        let mut hp = Hotplugger::new(
            self.inner.platform.as_ref(),
            &mut policy.locks,
            lock.unwrap_or_default(),
        );

        for core in self.inner.topology.hotpluggable() {
            if hp.is_online(core) {
                continue;
            }
            if lock.is_some() {
                hp.up(core);
            } else {
                hp.up_unlocked(core);
            }
        }
    }

    fn online_count(&self, cores: std::ops::Range<usize>) -> usize {
        cores
            .filter(|&core| self.inner.platform.is_core_online(core))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::SimCpu;
    use crate::thresholds::DecisionPath;

    const PARKED: Duration = Duration::from_secs(3600);

    fn controller_with(sim: &Arc<SimCpu>, tunables: Tunables) -> Controller {
        Controller::new(sim.clone(), Topology::default(), tunables, &DaemonConfig::default()).unwrap()
    }

    fn tunables() -> Tunables {
        Tunables {
            history_size: 1,
            ..Tunables::default()
        }
    }

    /// Advance every little core by one window with the given busy percentages
    fn run_little(sim: &SimCpu, busy: [u64; 4]) {
        for (core, pct) in busy.into_iter().enumerate() {
            sim.run(core, 1000, pct);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_brings_cores_online() {
        let sim = Arc::new(SimCpu::new(6));
        sim.set_online(3, false);
        sim.set_online(5, false);
        let controller = controller_with(&sim, tunables());

        controller.start(PARKED).await.unwrap();
        assert_eq!(sim.online_cores(), vec![0, 1, 2, 3, 4, 5]);

        let status = controller.status().await;
        assert!(status.enabled);
        assert!(status.cycle_scheduled);
        assert_eq!(status.power, PowerLabel::Active);

        // Restarting is a no-op
        controller.start(Duration::ZERO).await.unwrap();
        assert!(controller.is_enabled().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_respects_boot_flag() {
        let sim = Arc::new(SimCpu::new(6));
        let controller = controller_with(&sim, tunables());
        controller.launch().await.unwrap();
        assert!(!controller.is_enabled().await);

        let enabled = Tunables {
            enabled: true,
            ..tunables()
        };
        let controller = controller_with(&sim, enabled);
        controller.launch().await.unwrap();
        assert!(controller.is_enabled().await);
    }

    #[test]
    fn test_invalid_tunables_rejected() {
        let sim = Arc::new(SimCpu::new(6));
        let bad = Tunables {
            history_size: 0,
            ..Tunables::default()
        };
        assert!(Controller::new(sim, Topology::default(), bad, &DaemonConfig::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_restores_all_cores() {
        let sim = Arc::new(SimCpu::new(6));
        let controller = controller_with(&sim, tunables());
        controller.start(PARKED).await.unwrap();

        sim.set_online(2, false);
        sim.set_online(4, false);
        controller.stop().await;

        assert_eq!(sim.online_cores().len(), 6);
        let status = controller.status().await;
        assert!(!status.enabled);
        assert!(!status.cycle_scheduled);
        assert_eq!(controller.current_load().await, 0);
        assert_eq!(controller.run_cycle().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_ignored_while_disabled() {
        let sim = Arc::new(SimCpu::new(6));
        let controller = controller_with(&sim, tunables());

        controller.handle_display(DisplayEvent::Blanked).await;
        controller.wake().await;
        assert_eq!(sim.online_cores().len(), 6);

        let status = controller.status().await;
        assert_eq!(status.power, PowerLabel::Active);
        assert_eq!(status.display, DisplayEvent::Blanked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_parks_cores() {
        let sim = Arc::new(SimCpu::new(6));
        let controller = controller_with(&sim, tunables());
        controller.start(PARKED).await.unwrap();
        sim.set_online(3, false);

        controller.handle_display(DisplayEvent::Blanked).await;

        // One little core (not the boot core) and both big cores go
        assert_eq!(sim.online_cores(), vec![0, 2]);
        let status = controller.status().await;
        assert_eq!(status.power, PowerLabel::Suspended);
        assert!(!status.cycle_scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_keeps_first_big_when_prevented() {
        let sim = Arc::new(SimCpu::new(6));
        let prevent = Tunables {
            prevent_big_off: true,
            ..tunables()
        };
        let controller = controller_with(&sim, prevent);
        controller.start(PARKED).await.unwrap();

        controller.handle_display(DisplayEvent::Blanked).await;
        assert_eq!(sim.online_cores(), vec![0, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_restores_and_cycles() {
        let sim = Arc::new(SimCpu::new(6));
        let controller = controller_with(&sim, tunables());
        controller.start(PARKED).await.unwrap();
        controller.handle_display(DisplayEvent::Blanked).await;

        controller.handle_display(DisplayEvent::Unblanked).await;
        assert_eq!(sim.online_cores().len(), 6);

        let status = controller.status().await;
        assert_eq!(status.power, PowerLabel::Active);
        assert!(status.cycle_scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_override_expires() {
        let sim = Arc::new(SimCpu::new(6));
        let controller = controller_with(&sim, tunables());
        controller.start(PARKED).await.unwrap();
        controller.handle_display(DisplayEvent::Blanked).await;

        controller.wake().await;
        assert_eq!(sim.online_cores().len(), 6);
        assert_eq!(controller.status().await.power, PowerLabel::WakeOverride);

        // Ticks inside the window defer without touching cores
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(sim.online_cores().len(), 6);
        assert!(controller.status().await.cycle_scheduled);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sim.online_cores(), vec![0, 3]);
        let status = controller.status().await;
        assert_eq!(status.power, PowerLabel::Suspended);
        assert!(!status.cycle_scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_lane_jumps_to_max() {
        let sim = Arc::new(SimCpu::new(6));
        let controller = controller_with(&sim, tunables());
        controller.start(PARKED).await.unwrap();
        sim.set_online(2, false);
        sim.set_online(3, false);

        sim.run(0, 1000, 100);
        sim.run(1, 1000, 0);
        controller.run_cycle().await;

        assert_eq!(sim.online_cores(), vec![0, 1, 2, 3, 4, 5]);
        let policy = controller.inner.policy.lock().await;
        assert_eq!(policy.last_decision.map(|d| d.path), Some(DecisionPath::FastLane));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scale_down_waits_for_locks() {
        let sim = Arc::new(SimCpu::new(6));
        sim.set_online(2, false);
        let controller = controller_with(&sim, tunables());
        controller.start(PARKED).await.unwrap();

        // Cluster load 80 wants two little cores, but cpu2 was just onlined
        run_little(&sim, [40, 30, 5, 5]);
        let delay = controller.run_cycle().await;
        assert_eq!(delay, Some(Duration::from_millis(200)));
        assert_eq!(sim.online_cores(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(controller.current_load().await, 80);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        run_little(&sim, [40, 30, 5, 5]);
        controller.run_cycle().await;

        // Little cluster shrinks to two, which releases both big cores
        assert_eq!(sim.online_cores(), vec![0, 1]);
        let status = controller.status().await;
        assert_eq!(status.little_target, Some(2));
        assert_eq!(status.online_big, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_big_cluster_debounced_in_cycle() {
        let sim = Arc::new(SimCpu::new(6));
        let controller = controller_with(&sim, tunables());
        controller.start(PARKED).await.unwrap();
        sim.set_online(4, false);
        sim.set_online(5, false);

        // Load 300 keeps all four little cores, which asks for both big cores
        run_little(&sim, [75, 75, 75, 75]);
        controller.run_cycle().await;
        assert_eq!(controller.status().await.online_big, 0);
        assert_eq!(controller.status().await.big_readiness, "armed");

        tokio::time::sleep(Duration::from_millis(1300)).await;
        run_little(&sim, [75, 75, 75, 75]);
        controller.run_cycle().await;
        assert_eq!(controller.status().await.online_big, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_reschedules_itself() {
        let sim = Arc::new(SimCpu::new(6));
        let controller = controller_with(&sim, tunables());
        controller.start(Duration::ZERO).await.unwrap();

        tokio::time::sleep(Duration::from_millis(450)).await;
        let status = controller.status().await;
        assert!(status.cycle_scheduled);
        assert!(status.little_target.is_some());
    }
}
