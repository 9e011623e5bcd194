//! Power state machine
//!
//! Tracks whether the controller is cycling normally, parked for a blanked
//! display, or parked with a short wake override on top. Only the state
//! transitions live here; the controller carries out the core changes each
//! transition asks for.

use crate::display::DisplayEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Controller power state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PowerState {
    /// Display on, cycle running
    #[default]
    Active,
    /// Display off, cores parked, no cycle scheduled
    Suspended,
    /// Still suspended for policy purposes, but a wake source brought every
    /// core online at `since`
    SuspendedWithTimeoutOverride { since: Instant },
}

impl PowerState {
    pub fn label(&self) -> PowerLabel {
        match self {
            Self::Active => PowerLabel::Active,
            Self::Suspended => PowerLabel::Suspended,
            Self::SuspendedWithTimeoutOverride { .. } => PowerLabel::WakeOverride,
        }
    }

    /// Apply a display event, returning the work it requires
    pub fn on_display(&mut self, event: DisplayEvent) -> Option<PowerTransition> {
        match (event, *self) {
            (DisplayEvent::Blanked, Self::Active) => {
                *self = Self::Suspended;
                Some(PowerTransition::Suspend)
            }
            (DisplayEvent::Unblanked, Self::Suspended)
            | (DisplayEvent::Unblanked, Self::SuspendedWithTimeoutOverride { .. }) => {
                *self = Self::Active;
                Some(PowerTransition::Resume)
            }
            _ => None,
        }
    }

    /// Apply an external wake trigger. Only a plain suspend can be overridden.
    pub fn on_wake(&mut self, now: Instant) -> Option<PowerTransition> {
        match *self {
            Self::Suspended => {
                *self = Self::SuspendedWithTimeoutOverride { since: now };
                Some(PowerTransition::WakeOverride)
            }
            _ => None,
        }
    }

    /// Decide what a firing cycle tick may do
    pub fn on_tick(&mut self, now: Instant, timeout: Duration, display: DisplayEvent) -> TickAction {
        match *self {
            Self::Active => TickAction::Run,
            Self::Suspended => TickAction::Halt,
            Self::SuspendedWithTimeoutOverride { since } => {
                if now.duration_since(since) <= timeout {
                    return TickAction::Defer;
                }
                match display {
                    DisplayEvent::Blanked => {
                        *self = Self::Suspended;
                        TickAction::Resuspend
                    }
                    DisplayEvent::Unblanked => {
                        *self = Self::Active;
                        TickAction::Release
                    }
                }
            }
        }
    }
}

/// Core work requested by a power transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTransition {
    /// Park cores and stop cycling
    Suspend,
    /// Bring every core online with fresh down-locks and cycle again
    Resume,
    /// Bring every core online without down-locks and arm the cycle
    WakeOverride,
}

/// Outcome of a cycle tick against the power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Normal decision cycle
    Run,
    /// Override still running: re-arm without deciding
    Defer,
    /// Suspended without override: do nothing, do not re-arm
    Halt,
    /// Override expired with the display still off
    Resuspend,
    /// Override expired with the display back on: cycle normally
    Release,
}

/// Serializable power state name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLabel {
    Active,
    Suspended,
    WakeOverride,
}
