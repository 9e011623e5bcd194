//! Cadence - CPU hotplug controller for big.LITTLE systems
//!
//! Decides once per sampling interval how many cores of each cluster stay
//! powered on:
//! - Frequency-normalized load sampling and moving-average smoothing
//! - Hysteresis threshold table for the little cluster
//! - Down-locks against online/offline flapping
//! - Debounced scaling of the big cluster
//! - Suspend/resume and wake override driven by display power events

pub mod attrs;
pub mod big;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod history;
pub mod hotplug;
pub mod ipc;
pub mod little;
pub mod lock;
pub mod platform;
pub mod power;
pub mod rates;
pub mod sampler;
pub mod scheduler;
pub mod thresholds;
pub mod topology;
