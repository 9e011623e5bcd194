//! Load history and aggregation
//!
//! Each cycle produces one aggregate sample (the sum of scaled loads over the
//! online little cores). Samples go into a fixed-size ring; the smoothed load
//! is the mean over the whole ring.

use crate::error::{HotplugError, Result};
use crate::platform::Platform;
use crate::sampler::{self, CoreLoad};
use crate::topology::Topology;
use serde::{Deserialize, Serialize};

/// Fixed-capacity ring of per-cycle aggregate loads
#[derive(Debug, Clone)]
pub struct LoadHistory {
    samples: Vec<u32>,
    cursor: usize,
    average: u32,
}

impl LoadHistory {
    /// Allocate a history of `size` slots
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(HotplugError::Startup("history size must be at least 1".into()));
        }
        Ok(Self {
            samples: vec![0; size],
            cursor: 0,
            average: 0,
        })
    }

    /// Record a sample and return the new moving average.
    ///
    /// With a single slot there is no smoothing: the average is the sample.
    pub fn push(&mut self, sample: u32) -> u32 {
        let size = self.samples.len();
        if size == 1 {
            self.samples[0] = sample;
            self.average = sample;
            return sample;
        }

        self.samples[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % size;

        let sum: u64 = self.samples.iter().map(|&s| s as u64).sum();
        self.average = (sum / size as u64) as u32;
        self.average
    }

    /// Current moving average
    pub fn average(&self) -> u32 {
        self.average
    }
}

/// Result of one aggregation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    /// Smoothed aggregate load of the little cluster
    pub average_load: u32,
    /// Highest scaled load of any single little core this cycle
    pub max_core_load: u32,
    /// Little cores online when the cycle sampled
    pub online_little: usize,
}

/// Statistics owned by a running controller: history plus per-core samples
#[derive(Debug)]
pub struct LoadStats {
    history: LoadHistory,
    cores: Vec<CoreLoad>,
    last: LoadSnapshot,
}

impl LoadStats {
    /// Create statistics for `total_cores` cores
    pub fn new(history: LoadHistory, total_cores: usize) -> Self {
        Self {
            history,
            cores: vec![CoreLoad::default(); total_cores],
            last: LoadSnapshot::default(),
        }
    }

    /// Sample the little cluster and fold the result into the history
    pub fn update(
        &mut self,
        platform: &dyn Platform,
        topology: &Topology,
        io_is_busy: bool,
    ) -> LoadSnapshot {
        let sample = sampler::sample_little_cluster(
            platform,
            |core| platform.is_core_online(core),
            &mut self.cores,
            topology,
            io_is_busy,
        );

        self.last = LoadSnapshot {
            average_load: self.history.push(sample.total_load),
            max_core_load: sample.max_load,
            online_little: sample.online,
        };
        self.last
    }

    /// Per-core load records, indexed by core
    pub fn cores(&self) -> &[CoreLoad] {
        &self.cores
    }

    /// Snapshot of the most recent cycle
    pub fn last(&self) -> LoadSnapshot {
        self.last
    }

    /// Current smoothed load
    pub fn average_load(&self) -> u32 {
        self.history.average()
    }
}
