//! aerogrid.toml configuration parser.
//!
//! The file is optional: every field has a default, and `AEROGRID_*`
//! environment variables override whatever the file says. Values are only
//! checked by [`ControlConfig::validate`], which the control loop calls at
//! the start of every cycle so a bad deployment shows up in the audit log
//! instead of crashing the daemon.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::Metric;

const ENV_PREFIX: &str = "AEROGRID_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("monitor_device_id is not configured")]
    MissingMonitorDevice,

    #[error("vendor credentials are not configured")]
    MissingCredentials,

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for one control loop instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    /// Master switch. A disabled loop exits without touching the audit log.
    pub enabled: bool,
    /// Compute and record decisions without sending device commands.
    pub dry_run: bool,
    /// Sensor whose readings drive the fan speed.
    pub monitor_device_id: String,
    /// Purifiers to control. Empty means every purifier on the account.
    pub target_device_ids: Vec<String>,
    pub metric: Metric,
    /// Hysteresis margin around each speed boundary (µg/m³).
    pub deadband: f64,
    pub min_dwell_minutes: f64,
    /// Minimum readings in the 5-minute window for it to count.
    pub min_samples: u32,
    pub max_sample_age_seconds: u64,
    /// Error streak at which the loop starts warning loudly.
    pub alert_error_streak: u32,
    pub vendor: VendorConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dry_run: false,
            monitor_device_id: String::new(),
            target_device_ids: Vec::new(),
            metric: Metric::Pm2_5,
            deadband: 2.0,
            min_dwell_minutes: 10.0,
            min_samples: 3,
            max_sample_age_seconds: 360,
            alert_error_streak: 3,
            vendor: VendorConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VendorConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.purifier-cloud.example/v1".to_string(),
            timeout_secs: 10,
            username: None,
            password: None,
        }
    }
}

impl fmt::Debug for VendorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorConfig")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Vendor account login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ControlConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: ControlConfig = toml::from_str(content)?;
        config.target_device_ids = dedupe_ids(config.target_device_ids.iter().map(String::as_str));
        config.monitor_device_id = config.monitor_device_id.trim().to_string();
        Ok(config)
    }

    /// Apply `AEROGRID_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparsable values are logged and ignored; range checks are left to
    /// [`validate`](Self::validate).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty())
        };

        if let Some(v) = get("ENABLED") {
            override_with(&mut self.enabled, "ENABLED", &v, parse_bool);
        }
        if let Some(v) = get("DRY_RUN") {
            override_with(&mut self.dry_run, "DRY_RUN", &v, parse_bool);
        }
        if let Some(v) = get("MONITOR_DEVICE_ID") {
            self.monitor_device_id = v.trim().to_string();
        }
        if let Some(v) = get("TARGET_DEVICE_IDS") {
            self.target_device_ids = dedupe_ids(v.split(','));
        }
        if let Some(v) = get("METRIC") {
            override_with(&mut self.metric, "METRIC", &v, |s| s.parse().ok());
        }
        if let Some(v) = get("DEADBAND") {
            override_with(&mut self.deadband, "DEADBAND", &v, parse_finite);
        }
        if let Some(v) = get("MIN_DWELL_MINUTES") {
            override_with(&mut self.min_dwell_minutes, "MIN_DWELL_MINUTES", &v, parse_finite);
        }
        if let Some(v) = get("MIN_SAMPLES") {
            override_with(&mut self.min_samples, "MIN_SAMPLES", &v, |s| s.trim().parse().ok());
        }
        if let Some(v) = get("MAX_SAMPLE_AGE_SECONDS") {
            override_with(
                &mut self.max_sample_age_seconds,
                "MAX_SAMPLE_AGE_SECONDS",
                &v,
                |s| s.trim().parse().ok(),
            );
        }
        if let Some(v) = get("ALERT_ERROR_STREAK") {
            override_with(&mut self.alert_error_streak, "ALERT_ERROR_STREAK", &v, |s| {
                s.trim().parse().ok()
            });
        }
        if let Some(v) = get("VENDOR_BASE_URL") {
            self.vendor.base_url = v.trim().to_string();
        }
        if let Some(v) = get("VENDOR_TIMEOUT_SECS") {
            override_with(&mut self.vendor.timeout_secs, "VENDOR_TIMEOUT_SECS", &v, |s| {
                s.trim().parse().ok()
            });
        }
        if let Some(v) = get("VENDOR_USERNAME") {
            self.vendor.username = Some(v);
        }
        if let Some(v) = get("VENDOR_PASSWORD") {
            self.vendor.password = Some(v);
        }
    }

    /// Check the fields the control loop depends on.
    ///
    /// Credentials are checked by the control loop after the telemetry
    /// window, not here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_device_id.trim().is_empty() {
            return Err(ConfigError::MissingMonitorDevice);
        }
        if !self.deadband.is_finite() || self.deadband < 0.0 {
            return Err(ConfigError::Invalid {
                field: "deadband",
                reason: format!("must be a non-negative number, got {}", self.deadband),
            });
        }
        if !self.min_dwell_minutes.is_finite() || self.min_dwell_minutes < 0.0 {
            return Err(ConfigError::Invalid {
                field: "min_dwell_minutes",
                reason: format!(
                    "must be a non-negative number, got {}",
                    self.min_dwell_minutes
                ),
            });
        }
        if self.min_samples < 1 {
            return Err(ConfigError::Invalid {
                field: "min_samples",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_sample_age_seconds < 1 {
            return Err(ConfigError::Invalid {
                field: "max_sample_age_seconds",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Vendor login, if both halves are present.
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.vendor.username.as_deref().unwrap_or("").trim();
        let password = self.vendor.password.as_deref().unwrap_or("");
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn min_dwell_seconds(&self) -> u64 {
        (self.min_dwell_minutes.max(0.0) * 60.0).floor() as u64
    }
}

fn override_with<T, P>(slot: &mut T, name: &str, raw: &str, parse: P)
where
    P: Fn(&str) -> Option<T>,
{
    match parse(raw) {
        Some(value) => *slot = value,
        None => warn!(var = %format!("{ENV_PREFIX}{name}"), value = %raw, "ignoring unparsable override"),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Trim, drop empties, and de-duplicate while keeping first-seen order.
fn dedupe_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.map(str::trim)
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn valid_config() -> ControlConfig {
        ControlConfig {
            enabled: true,
            monitor_device_id: "monitor-1".to_string(),
            ..ControlConfig::default()
        }
    }

    #[test]
    fn test_parse_minimal() {
        let config = ControlConfig::from_toml_str("enabled = true\n").unwrap();
        assert!(config.enabled);
        assert_eq!(config.min_samples, 3);
        assert_eq!(config.max_sample_age_seconds, 360);
        assert_eq!(config.metric, Metric::Pm2_5);
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
enabled = true
dry_run = true
monitor_device_id = " monitor-1 "
target_device_ids = ["a", "b", "a", " "]
metric = "pm10"
deadband = 1.5
min_dwell_minutes = 5
min_samples = 2
max_sample_age_seconds = 120

[vendor]
base_url = "http://localhost:9000"
username = "user@example.com"
password = "hunter2"
"#;
        let config = ControlConfig::from_toml_str(toml_str).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.monitor_device_id, "monitor-1");
        assert_eq!(config.target_device_ids, vec!["a", "b"]);
        assert_eq!(config.metric, Metric::Pm10);
        assert_eq!(config.min_dwell_seconds(), 300);
        assert_eq!(config.vendor.base_url, "http://localhost:9000");
        assert!(config.credentials().is_some());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aerogrid.toml");
        std::fs::write(&path, "monitor_device_id = \"m\"\n").unwrap();
        let config = ControlConfig::from_file(&path).unwrap();
        assert_eq!(config.monitor_device_id, "m");

        let missing = ControlConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ControlConfig::default();
        config.apply_overrides(lookup(&[
            ("AEROGRID_ENABLED", "yes"),
            ("AEROGRID_DRY_RUN", "ON"),
            ("AEROGRID_MONITOR_DEVICE_ID", "monitor-9"),
            ("AEROGRID_TARGET_DEVICE_IDS", "x, y,,x"),
            ("AEROGRID_DEADBAND", "3.5"),
            ("AEROGRID_MIN_DWELL_MINUTES", "0.5"),
            ("AEROGRID_VENDOR_USERNAME", "u"),
            ("AEROGRID_VENDOR_PASSWORD", "p"),
        ]));

        assert!(config.enabled);
        assert!(config.dry_run);
        assert_eq!(config.monitor_device_id, "monitor-9");
        assert_eq!(config.target_device_ids, vec!["x", "y"]);
        assert_eq!(config.deadband, 3.5);
        assert_eq!(config.min_dwell_seconds(), 30);
        assert_eq!(
            config.credentials(),
            Some(Credentials {
                username: "u".to_string(),
                password: "p".to_string(),
            })
        );
    }

    #[test]
    fn test_unparsable_override_keeps_previous_value() {
        let mut config = valid_config();
        config.apply_overrides(lookup(&[
            ("AEROGRID_ENABLED", "maybe"),
            ("AEROGRID_DEADBAND", "wide"),
            ("AEROGRID_MIN_SAMPLES", "-1"),
        ]));
        assert!(config.enabled);
        assert_eq!(config.deadband, 2.0);
        assert_eq!(config.min_samples, 3);
    }

    #[test]
    fn test_validate_requires_monitor() {
        let config = ControlConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingMonitorDevice)
        ));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = valid_config();
        config.deadband = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "deadband", .. })
        ));

        let mut config = valid_config();
        config.min_samples = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "min_samples", .. })
        ));

        let mut config = valid_config();
        config.max_sample_age_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.min_dwell_minutes = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_need_both_halves() {
        let mut config = valid_config();
        config.vendor.username = Some("  ".to_string());
        config.vendor.password = Some("p".to_string());
        assert!(config.credentials().is_none());

        config.vendor.username = Some("u".to_string());
        config.vendor.password = Some(String::new());
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = valid_config();
        config.vendor.password = Some("hunter2".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
