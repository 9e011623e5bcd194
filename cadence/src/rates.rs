//! Adaptive sampling rate
//!
//! The rate table alternates delays and load breakpoints:
//! `rate0 load1:rate1 load2:rate2 ...`. The delay used is the one paired with
//! the highest breakpoint not exceeding the current load, `rate0` below the
//! first breakpoint.

use crate::error::{HotplugError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default delay between cycles (ms)
pub const DEFAULT_UPDATE_RATE: u32 = 200;

/// Load-to-delay lookup table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct UpdateRates(Vec<u32>);

impl Default for UpdateRates {
    fn default() -> Self {
        Self(vec![DEFAULT_UPDATE_RATE])
    }
}

impl UpdateRates {
    /// Build a table from raw tokens; the token count must be odd
    pub fn new(tokens: Vec<u32>) -> Result<Self> {
        if tokens.len() % 2 == 0 {
            return Err(HotplugError::invalid(format!(
                "update rates need an odd number of tokens, got {}",
                tokens.len()
            )));
        }
        Ok(Self(tokens))
    }

    /// Delay to wait before the next cycle at `load`
    pub fn delay_for(&self, load: u32) -> Duration {
        let rates = &self.0;
        let mut i = 0;
        while i + 1 < rates.len() && load >= rates[i + 1] {
            i += 2;
        }
        Duration::from_millis(rates[i] as u64)
    }
}

impl FromStr for UpdateRates {
    type Err = HotplugError;

    fn from_str(s: &str) -> Result<Self> {
        let tokens = s
            .trim()
            .split([' ', ':'])
            .map(|token| {
                token
                    .parse::<u32>()
                    .map_err(|_| HotplugError::invalid(format!("bad update rate token: {:?}", token)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(tokens)
    }
}

impl TryFrom<Vec<u32>> for UpdateRates {
    type Error = HotplugError;

    fn try_from(tokens: Vec<u32>) -> Result<Self> {
        Self::new(tokens)
    }
}

impl From<UpdateRates> for Vec<u32> {
    fn from(rates: UpdateRates) -> Self {
        rates.0
    }
}

impl fmt::Display for UpdateRates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                // Breakpoints sit at odd indices and bind to the following rate
                f.write_str(if i % 2 == 0 { ":" } else { " " })?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_rate() {
        let rates = UpdateRates::default();
        assert_eq!(rates.delay_for(0), Duration::from_millis(200));
        assert_eq!(rates.delay_for(10_000), Duration::from_millis(200));
    }

    #[test]
    fn test_piecewise_lookup() {
        let rates: UpdateRates = "400 100:200 300:50".parse().unwrap();
        assert_eq!(rates.delay_for(0), Duration::from_millis(400));
        assert_eq!(rates.delay_for(99), Duration::from_millis(400));
        assert_eq!(rates.delay_for(100), Duration::from_millis(200));
        assert_eq!(rates.delay_for(299), Duration::from_millis(200));
        assert_eq!(rates.delay_for(300), Duration::from_millis(50));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("400 100".parse::<UpdateRates>().is_err());
        assert!("400 abc:200".parse::<UpdateRates>().is_err());
        assert!("".parse::<UpdateRates>().is_err());
        assert!("400  100:200".parse::<UpdateRates>().is_err());
        assert!("-5".parse::<UpdateRates>().is_err());
    }

    #[test]
    fn test_display_format() {
        let rates: UpdateRates = "400 100:200 300:50\n".parse().unwrap();
        assert_eq!(rates.to_string(), "400 100:200 300:50");
        assert_eq!(rates, UpdateRates::new(vec![400, 100, 200, 300, 50]).unwrap());
    }
}
