//! Display power events
//!
//! The controller only cares whether the panel is blanked. On Linux the
//! backlight class exposes this as `bl_power` (0 unblanked, 4 powerdown);
//! the watcher polls it and forwards changes.

use crate::config::SysfsConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Display power notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayEvent {
    Blanked,
    #[default]
    Unblanked,
}

impl DisplayEvent {
    pub fn from_blanked(blanked: bool) -> Self {
        if blanked {
            Self::Blanked
        } else {
            Self::Unblanked
        }
    }
}

/// Interpret the contents of a `bl_power` file
pub fn parse_bl_power(raw: &str) -> Option<DisplayEvent> {
    let value: u32 = raw.trim().parse().ok()?;
    Some(DisplayEvent::from_blanked(value != 0))
}

/// Polls the first backlight device for blank/unblank changes
pub struct BacklightWatcher {
    device: Option<PathBuf>,
    interval: Duration,
    last: Option<DisplayEvent>,
}

impl BacklightWatcher {
    pub fn new(config: &SysfsConfig, interval: Duration) -> Self {
        let device = detect_device(Path::new(&config.backlight_dir));
        debug!("Backlight device for display events: {:?}", device);
        Self {
            device,
            interval,
            last: None,
        }
    }

    /// Read the current state, returning it if it differs from the last read
    pub fn poll(&mut self) -> Option<DisplayEvent> {
        let device = self.device.as_ref()?;
        let raw = fs::read_to_string(device.join("bl_power")).ok()?;
        let event = parse_bl_power(&raw)?;

        if self.last == Some(event) {
            return None;
        }
        self.last = Some(event);
        Some(event)
    }

    /// Forward changes to `tx` until the receiver goes away
    pub async fn run(mut self, tx: mpsc::Sender<DisplayEvent>) {
        let Some(device) = self.device.clone() else {
            warn!("No backlight device with bl_power found, display events limited to IPC");
            return;
        };
        info!("Watching {} for display power changes", device.display());

        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            if let Some(event) = self.poll() {
                debug!("Display event: {:?}", event);
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn detect_device(backlight_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(backlight_dir).ok()?;
    let mut devices: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.join("bl_power").exists())
        .collect();
    devices.sort();
    devices.into_iter().next()
}
