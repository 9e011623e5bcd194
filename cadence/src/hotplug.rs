//! Core power transitions
//!
//! Wraps the platform's power control with the controller's rules: failures
//! are logged and treated as "nothing happened", and cores brought online
//! can be down-locked in the same step.

use crate::lock::DownLocks;
use crate::platform::Platform;
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, warn};

/// Power operations for one cycle or one power-state transition
pub struct Hotplugger<'a> {
    platform: &'a dyn Platform,
    locks: &'a mut DownLocks,
    lock_duration: Duration,
}

impl<'a> Hotplugger<'a> {
    pub fn new(platform: &'a dyn Platform, locks: &'a mut DownLocks, lock_duration: Duration) -> Self {
        Self {
            platform,
            locks,
            lock_duration,
        }
    }

    pub fn is_online(&self, core: usize) -> bool {
        self.platform.is_core_online(core)
    }

    pub fn is_locked(&self, core: usize) -> bool {
        self.locks.is_locked(core)
    }

    /// Online cores within `cores`
    pub fn online_in(&self, cores: Range<usize>) -> usize {
        cores.filter(|&core| self.platform.is_core_online(core)).count()
    }

    /// Bring a core online and down-lock it
    pub fn up(&mut self, core: usize) -> bool {
        if !self.up_unlocked(core) {
            return false;
        }
        self.locks.apply(core, self.lock_duration);
        true
    }

    /// Bring a core online without a down-lock
    pub fn up_unlocked(&mut self, core: usize) -> bool {
        match self.platform.bring_core_online(core) {
            Ok(()) => {
                debug!("cpu{} up", core);
                true
            }
            Err(e) => {
                warn!("Failed to bring cpu{} online: {}", core, e);
                false
            }
        }
    }

    /// Take a core offline
    pub fn down(&mut self, core: usize) -> bool {
        match self.platform.take_core_offline(core) {
            Ok(()) => {
                debug!("cpu{} down", core);
                true
            }
            Err(e) => {
                warn!("Failed to take cpu{} offline: {}", core, e);
                false
            }
        }
    }
}
