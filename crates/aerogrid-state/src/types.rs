//! Domain types for the AeroGrid state store.
//!
//! These types represent telemetry readings, the control run audit log,
//! and the persisted vendor session. All types are serializable to/from
//! JSON for storage in redb tables.

use std::fmt;

use aero_core::{EpochSecs, FanSpeed, Metric};
use serde::{Deserialize, Serialize};

// ── Telemetry ─────────────────────────────────────────────────────

/// One reading reported by a monitoring sensor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TelemetrySample {
    pub device_id: String,
    /// Unix timestamp (seconds) of the reading.
    pub ts: EpochSecs,
    pub pm1_0: Option<f64>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
}

impl TelemetrySample {
    /// Build the composite key for the samples table.
    pub fn table_key(&self) -> String {
        sample_key(&self.device_id, self.ts)
    }

    /// Reading for the given metric, if the sensor reported one.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Pm1_0 => self.pm1_0,
            Metric::Pm2_5 => self.pm2_5,
            Metric::Pm10 => self.pm10,
        }
    }
}

pub(crate) fn sample_key(device_id: &str, ts: EpochSecs) -> String {
    format!("{device_id}:{ts:020}")
}

/// Aggregate of one metric over a time window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryWindow {
    /// Mean of the non-null readings, `None` when there were none.
    pub average: Option<f64>,
    pub sample_count: u32,
    /// Timestamp of the newest reading counted.
    pub last_sample_ts: Option<EpochSecs>,
}

// ── Control log ───────────────────────────────────────────────────

/// Terminal status of a recorded control run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    SkippedStale,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::SkippedStale => "skipped_stale",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the append-only control audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlRun {
    pub run_ts: EpochSecs,
    pub run_status: RunStatus,
    pub monitor_device_id: Option<String>,
    /// Comma-joined ids of the purifiers addressed this run.
    pub target_device_ids: Option<String>,
    pub average: Option<f64>,
    pub sample_count: Option<u32>,
    pub last_sample_ts: Option<EpochSecs>,
    pub previous_speed: Option<FanSpeed>,
    pub target_speed: Option<FanSpeed>,
    /// Speed believed to be in force on the devices after this run.
    pub effective_speed: Option<FanSpeed>,
    pub speed_changed: bool,
    /// When the effective speed last changed. Carried forward otherwise.
    pub effective_change_ts: Option<EpochSecs>,
    pub error_streak: u32,
    pub error_message: Option<String>,
    pub created_ts: EpochSecs,
}

// ── Vendor session ────────────────────────────────────────────────

/// Authenticated session with the purifier vendor's cloud API.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorSession {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which the access token stops working.
    pub access_expires_at: EpochSecs,
}

impl fmt::Debug for VendorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorSession")
            .field("user_id", &self.user_id)
            .field("access_expires_at", &self.access_expires_at)
            .finish_non_exhaustive()
    }
}

/// Vendor session as persisted, with the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    pub session: VendorSession,
    pub updated_ts: EpochSecs,
}
