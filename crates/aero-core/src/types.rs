//! Shared types used across AeroGrid crates.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Purifier fan speed. Ordered from quietest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanSpeed {
    Low,
    Medium,
    High,
    Turbo,
}

impl FanSpeed {
    pub const ALL: [FanSpeed; 4] = [
        FanSpeed::Low,
        FanSpeed::Medium,
        FanSpeed::High,
        FanSpeed::Turbo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FanSpeed::Low => "low",
            FanSpeed::Medium => "medium",
            FanSpeed::High => "high",
            FanSpeed::Turbo => "turbo",
        }
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseValueError {
    kind: &'static str,
    value: String,
}

impl ParseValueError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl FromStr for FanSpeed {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "low" => Ok(FanSpeed::Low),
            "medium" => Ok(FanSpeed::Medium),
            "high" => Ok(FanSpeed::High),
            "turbo" => Ok(FanSpeed::Turbo),
            other => Err(ParseValueError::new("fan speed", other)),
        }
    }
}

/// Pollutant reading a control loop can be driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Pm1_0,
    #[default]
    Pm2_5,
    Pm10,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Pm1_0 => "pm1_0",
            Metric::Pm2_5 => "pm2_5",
            Metric::Pm10 => "pm10",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pm1_0" | "pm1" => Ok(Metric::Pm1_0),
            "pm2_5" | "pm25" => Ok(Metric::Pm2_5),
            "pm10" => Ok(Metric::Pm10),
            other => Err(ParseValueError::new("metric", other)),
        }
    }
}

/// Power state reported by a purifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
}

/// Operating mode reported by a purifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    Auto,
    Manual,
}

/// Unix timestamp in seconds.
pub type EpochSecs = u64;

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> EpochSecs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_speed_is_totally_ordered() {
        assert!(FanSpeed::Low < FanSpeed::Medium);
        assert!(FanSpeed::Medium < FanSpeed::High);
        assert!(FanSpeed::High < FanSpeed::Turbo);
    }

    #[test]
    fn fan_speed_parses_its_own_display() {
        for speed in FanSpeed::ALL {
            assert_eq!(speed.to_string().parse::<FanSpeed>(), Ok(speed));
        }
        assert!("ludicrous".parse::<FanSpeed>().is_err());
    }

    #[test]
    fn fan_speed_serializes_snake_case() {
        let json = serde_json::to_string(&FanSpeed::Turbo).unwrap();
        assert_eq!(json, "\"turbo\"");
    }

    #[test]
    fn metric_accepts_short_aliases() {
        assert_eq!("pm25".parse::<Metric>(), Ok(Metric::Pm2_5));
        assert_eq!("pm1".parse::<Metric>(), Ok(Metric::Pm1_0));
        assert_eq!(Metric::default(), Metric::Pm2_5);
    }

    #[test]
    fn epoch_secs_reads_the_wall_clock() {
        assert!(epoch_secs() > 1_600_000_000);
    }
}
