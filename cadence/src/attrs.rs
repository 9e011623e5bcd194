//! Textual tunable attributes
//!
//! Every runtime tunable can be read and written as a short string, in the
//! formats of the kernel driver's sysfs files. Writes are parsed and
//! validated in full before anything is changed.

use crate::config::Tunables;
use crate::controller::Controller;
use crate::error::{HotplugError, Result};
use crate::rates::UpdateRates;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A named tunable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Enabled,
    DownLockDuration,
    UpdateRates,
    LoadLevels,
    MinCpusOnline,
    MaxCpusOnline,
    MaxCpusOnlineSusp,
    OfflineLoad,
    FastLaneLoad,
    BigCoreUpDelay,
    IoIsBusy,
    PreventBigOff,
    CurrentLoad,
}

impl Attribute {
    pub const ALL: [Attribute; 13] = [
        Self::Enabled,
        Self::DownLockDuration,
        Self::UpdateRates,
        Self::LoadLevels,
        Self::MinCpusOnline,
        Self::MaxCpusOnline,
        Self::MaxCpusOnlineSusp,
        Self::OfflineLoad,
        Self::FastLaneLoad,
        Self::BigCoreUpDelay,
        Self::IoIsBusy,
        Self::PreventBigOff,
        Self::CurrentLoad,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::DownLockDuration => "down_lock_duration",
            Self::UpdateRates => "update_rates",
            Self::LoadLevels => "load_levels",
            Self::MinCpusOnline => "min_cpus_online",
            Self::MaxCpusOnline => "max_cpus_online",
            Self::MaxCpusOnlineSusp => "max_cpus_online_susp",
            Self::OfflineLoad => "offline_load",
            Self::FastLaneLoad => "fast_lane_load",
            Self::BigCoreUpDelay => "big_core_up_delay",
            Self::IoIsBusy => "io_is_busy",
            Self::PreventBigOff => "prevent_big_off",
            Self::CurrentLoad => "current_load",
        }
    }

    pub fn writable(&self) -> bool {
        !matches!(self, Self::CurrentLoad)
    }
}

impl FromStr for Attribute {
    type Err = HotplugError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|attr| attr.name() == name)
            .ok_or_else(|| HotplugError::UnknownAttribute(name.to_string()))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse an unsigned decimal value
pub fn parse_u32(value: &str) -> Result<u32> {
    let value = value.trim();
    value
        .parse()
        .map_err(|_| HotplugError::invalid(format!("not an unsigned integer: {:?}", value)))
}

/// Parse `0` or `1`
pub fn parse_bool(value: &str) -> Result<bool> {
    match parse_u32(value)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(HotplugError::invalid(format!("expected 0 or 1, got {}", other))),
    }
}

fn show_bool(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn show_tunable(t: &Tunables, attr: Attribute) -> Option<String> {
    let value = match attr {
        Attribute::DownLockDuration => t.down_lock_duration_ms.to_string(),
        Attribute::UpdateRates => t.update_rates.to_string(),
        Attribute::LoadLevels => t.load_levels.to_string(),
        Attribute::MinCpusOnline => t.min_cpus_online.to_string(),
        Attribute::MaxCpusOnline => t.max_cpus_online.to_string(),
        Attribute::MaxCpusOnlineSusp => t.max_cpus_online_susp.to_string(),
        Attribute::OfflineLoad => t.offline_load.to_string(),
        Attribute::FastLaneLoad => t.fast_lane_load.to_string(),
        Attribute::BigCoreUpDelay => t.big_core_up_delay_ms.to_string(),
        Attribute::IoIsBusy => show_bool(t.io_is_busy),
        Attribute::PreventBigOff => show_bool(t.prevent_big_off),
        Attribute::Enabled | Attribute::CurrentLoad => return None,
    };
    Some(value)
}

impl Controller {
    /// Read an attribute
    pub async fn show(&self, attr: Attribute) -> String {
        match attr {
            Attribute::Enabled => show_bool(self.is_enabled().await),
            Attribute::CurrentLoad => self.current_load().await.to_string(),
            _ => show_tunable(&*self.tunables().read().await, attr).unwrap_or_default(),
        }
    }

    /// Write an attribute. Takes effect on the next cycle.
    pub async fn store(&self, attr: Attribute, value: &str) -> Result<()> {
        let little = self.topology().little_cores;
        let count = |value: &str| -> Result<usize> {
            let v = parse_u32(value)? as usize;
            if v == 0 || v > little {
                return Err(HotplugError::invalid(format!(
                    "{} out of range 1..={}",
                    v, little
                )));
            }
            Ok(v)
        };

        match attr {
            Attribute::Enabled => {
                let enable = parse_bool(value)?;
                if enable == self.is_enabled().await {
                    return Ok(());
                }
                if enable {
                    self.start(Duration::ZERO).await?;
                } else {
                    self.stop().await;
                }
                self.tunables().write().await.enabled = enable;
            }
            Attribute::DownLockDuration => {
                let ms = parse_u32(value)?;
                self.tunables().write().await.down_lock_duration_ms = ms as u64;
            }
            Attribute::UpdateRates => {
                let rates: UpdateRates = value.parse()?;
                self.tunables().write().await.update_rates = rates;
            }
            Attribute::LoadLevels => {
                let fields: Vec<&str> = value.split_whitespace().collect();
                let [index, up, down] = fields.as_slice() else {
                    return Err(HotplugError::invalid("expected \"index up down\""));
                };
                let (index, up, down) = (parse_u32(index)?, parse_u32(up)?, parse_u32(down)?);
                self.tunables()
                    .write()
                    .await
                    .load_levels
                    .set(index as usize, up, down)?;
            }
            Attribute::MinCpusOnline => {
                let v = count(value)?;
                let mut t = self.tunables().write().await;
                if t.max_cpus_online < v {
                    t.max_cpus_online = v;
                }
                t.min_cpus_online = v;
            }
            Attribute::MaxCpusOnline => {
                let v = count(value)?;
                let mut t = self.tunables().write().await;
                if t.min_cpus_online > v {
                    t.min_cpus_online = v;
                }
                t.max_cpus_online = v;
            }
            Attribute::MaxCpusOnlineSusp => {
                let v = count(value)?;
                self.tunables().write().await.max_cpus_online_susp = v;
            }
            Attribute::OfflineLoad => {
                let v = parse_u32(value)?;
                self.tunables().write().await.offline_load = v;
            }
            Attribute::FastLaneLoad => {
                let v = parse_u32(value)?;
                self.tunables().write().await.fast_lane_load = v;
            }
            Attribute::BigCoreUpDelay => {
                let ms = parse_u32(value)?;
                self.tunables().write().await.big_core_up_delay_ms = ms as u64;
            }
            Attribute::IoIsBusy => {
                let v = parse_bool(value)?;
                self.tunables().write().await.io_is_busy = v;
            }
            Attribute::PreventBigOff => {
                let v = parse_bool(value)?;
                self.tunables().write().await.prevent_big_off = v;
            }
            Attribute::CurrentLoad => return Err(HotplugError::ReadOnly(attr.name())),
        }

        tracing::debug!("{} <- {:?}", attr, value.trim());
        Ok(())
    }
}
