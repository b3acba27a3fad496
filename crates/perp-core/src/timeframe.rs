//! Candle timeframes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::CoreError;

/// Candle interval used for signal evaluation and scheduling.
///
/// Serialized as the exchange interval string (`"1m"`, `"15m"`, `"1h"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H8,
    H12,
    D1,
}

impl Timeframe {
    const ALL: [(Timeframe, &'static str, u64); 11] = [
        (Self::M1, "1m", 60),
        (Self::M3, "3m", 180),
        (Self::M5, "5m", 300),
        (Self::M15, "15m", 900),
        (Self::M30, "30m", 1_800),
        (Self::H1, "1h", 3_600),
        (Self::H2, "2h", 7_200),
        (Self::H4, "4h", 14_400),
        (Self::H8, "8h", 28_800),
        (Self::H12, "12h", 43_200),
        (Self::D1, "1d", 86_400),
    ];

    fn entry(&self) -> (Timeframe, &'static str, u64) {
        Self::ALL
            .iter()
            .copied()
            .find(|(tf, _, _)| tf == self)
            .unwrap_or((Self::H1, "1h", 3_600))
    }

    /// Interval string as used by the exchange.
    pub fn as_str(&self) -> &'static str {
        self.entry().1
    }

    /// Length of one candle in seconds.
    pub fn seconds(&self) -> u64 {
        self.entry().2
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    pub fn chrono_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds() as i64)
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|(_, name, _)| *name == needle)
            .map(|(tf, _, _)| *tf)
            .ok_or_else(|| CoreError::InvalidTimeframe(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
