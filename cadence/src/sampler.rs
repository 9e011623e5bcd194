//! Per-core load sampling
//!
//! Load is the busy percentage of a core scaled by `cur_freq / max_freq`, so
//! a core 100% busy at half its maximum frequency reports 50. Within one
//! sampling window several samples are folded into a wall-time weighted
//! average.

use crate::platform::{CpuTimes, FreqPolicy, StatsSource};
use crate::topology::Topology;
use tracing::debug;

/// Load bookkeeping for one core
#[derive(Debug, Clone, Default)]
pub struct CoreLoad {
    prev_idle: u64,
    prev_wall: u64,
    /// Weighted average of the current window
    avg_load: u32,
    /// Wall time covered by the current window; zero means no sample yet
    window: u64,
    /// Load of the last finished window
    last_load: u32,
}

impl CoreLoad {
    /// Fold a new idle/wall sample into the current window.
    ///
    /// Returns `false` when the sample was discarded because the clock did
    /// not advance or idle time outran wall time.
    pub fn update(&mut self, times: CpuTimes, freq: FreqPolicy) -> bool {
        let wall_delta = times.wall.wrapping_sub(self.prev_wall);
        let idle_delta = times.idle.wrapping_sub(self.prev_idle);
        self.prev_wall = times.wall;
        self.prev_idle = times.idle;

        if wall_delta == 0 || wall_delta < idle_delta || freq.max == 0 {
            return false;
        }

        let busy_pct = 100 * (wall_delta - idle_delta) / wall_delta;
        let load = (busy_pct * freq.cur / freq.max) as u32;

        if self.window == 0 {
            self.avg_load = load;
            self.window = wall_delta;
        } else {
            let weighted = self.avg_load as u64 * self.window + load as u64 * wall_delta;
            self.avg_load = (weighted / (self.window + wall_delta)) as u32;
            self.window += wall_delta;
        }

        true
    }

    /// Close the window: publish its average as the core's load and start
    /// a new one.
    pub fn finish_window(&mut self) -> u32 {
        self.last_load = self.avg_load;
        self.avg_load = 0;
        self.window = 0;
        self.last_load
    }

    /// Frequency-scaled load of the last finished window
    pub fn scaled_load(&self) -> u32 {
        self.last_load
    }
}

/// Aggregate of one sampling pass over the little cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterSample {
    /// Sum of per-core scaled loads
    pub total_load: u32,
    /// Highest per-core scaled load
    pub max_load: u32,
    /// Online little cores that were sampled
    pub online: usize,
}

/// Sample every online little core and close its window
pub fn sample_little_cluster<S: StatsSource + ?Sized>(
    source: &S,
    online: impl Fn(usize) -> bool,
    cores: &mut [CoreLoad],
    topology: &Topology,
    io_is_busy: bool,
) -> ClusterSample {
    let mut sample = ClusterSample::default();

    for core in topology.little() {
        if !online(core) {
            continue;
        }
        sample.online += 1;

        let pcpu = &mut cores[core];
        match source.frequency_policy(core) {
            Ok(freq) => {
                let times = source.idle_and_wall_time(core, io_is_busy);
                if !pcpu.update(times, freq) {
                    debug!("cpu{}: clock anomaly, sample skipped", core);
                }
            }
            Err(e) => debug!("cpu{}: {}, sample skipped", core, e),
        }

        let load = pcpu.finish_window();
        sample.total_load += load;
        sample.max_load = sample.max_load.max(load);
    }

    sample
}
