//! Down-lock guard
//!
//! A core brought online is locked for `down_lock_duration` so the next few
//! cycles cannot take it straight back down. Each lock expires through its
//! own one-shot timer; the timer only touches its own core's flag.

use crate::scheduler::{self, TaskHandle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Default)]
struct LockSlot {
    locked: AtomicBool,
    /// Bumped on every apply so a stale timer cannot clear a newer lock
    epoch: AtomicU64,
}

/// Per-core anti-flap locks
#[derive(Debug)]
pub struct DownLocks {
    slots: Arc<[LockSlot]>,
    timers: Vec<Option<TaskHandle>>,
}

impl DownLocks {
    /// Locks for `total_cores` cores, all clear
    pub fn new(total_cores: usize) -> Self {
        let slots: Vec<LockSlot> = (0..total_cores).map(|_| LockSlot::default()).collect();
        Self {
            slots: slots.into(),
            timers: (0..total_cores).map(|_| None).collect(),
        }
    }

    /// Lock `core` for `duration`, replacing any running lock
    pub fn apply(&mut self, core: usize, duration: Duration) {
        let Some(slot) = self.slots.get(core) else {
            return;
        };

        let epoch = slot.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        slot.locked.store(true, Ordering::Release);

        if let Some(old) = self.timers[core].take() {
            old.cancel();
        }

        let slots = Arc::clone(&self.slots);
        self.timers[core] = Some(scheduler::schedule_after(duration, async move {
            let slot = &slots[core];
            if slot.epoch.load(Ordering::Acquire) == epoch {
                slot.locked.store(false, Ordering::Release);
                trace!("cpu{} down-lock expired", core);
            }
        }));
    }

    /// Whether `core` is currently locked
    pub fn is_locked(&self, core: usize) -> bool {
        self.slots
            .get(core)
            .map(|slot| slot.locked.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Cancel every pending expiry and clear all locks
    pub fn cancel_all(&mut self) {
        for (slot, timer) in self.slots.iter().zip(self.timers.iter_mut()) {
            if let Some(timer) = timer.take() {
                timer.cancel();
            }
            slot.epoch.fetch_add(1, Ordering::AcqRel);
            slot.locked.store(false, Ordering::Release);
        }
    }
}

impl Drop for DownLocks {
    fn drop(&mut self) {
        for timer in self.timers.iter().flatten() {
            timer.cancel();
        }
    }
}
