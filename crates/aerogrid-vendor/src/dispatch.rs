//! Applies a target speed to a set of purifiers.
//!
//! Each device is driven independently to `power=on, mode=manual,
//! airflow=target`, issuing only the commands whose attribute differs.
//! Failures are collected per device and reduced into one report once
//! every device has been attempted.

use aero_core::{DeviceMode, FanSpeed, MAX_ERROR_CHARS, PowerState, truncate_chars};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::VendorApi;
use crate::error::VendorResult;

/// Commands actually issued to one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceActions {
    pub powered_on: bool,
    pub set_manual: bool,
    pub airflow_set: bool,
}

impl DeviceActions {
    /// True when the device was already in the desired state.
    pub fn is_noop(&self) -> bool {
        !(self.powered_on || self.set_manual || self.airflow_set)
    }
}

/// Result of driving one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOutcome {
    pub device_id: String,
    /// Error text is truncated to [`MAX_ERROR_CHARS`].
    pub result: Result<DeviceActions, String>,
}

/// Consolidated failure for a dispatch where at least one device failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to control {failed}/{total} devices: {detail}")]
pub struct DispatchFailure {
    pub failed: usize,
    pub total: usize,
    /// `device_id: reason` entries joined with ` | `.
    pub detail: String,
}

/// Per-device outcomes of one dispatch, in input order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub target: Option<FanSpeed>,
    pub dry_run: bool,
    pub outcomes: Vec<DeviceOutcome>,
}

impl DispatchReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(_) => None,
            Err(reason) => Some((o.device_id.as_str(), reason.as_str())),
        })
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// Count of devices that needed at least one command.
    pub fn changed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.result, Ok(actions) if !actions.is_noop()))
            .count()
    }

    /// Reduce to an overall result: `Err` if any device failed.
    pub fn into_result(self) -> Result<Self, DispatchFailure> {
        let failed = self.failed_count();
        if failed == 0 {
            return Ok(self);
        }
        let detail = self
            .failures()
            .map(|(id, reason)| format!("{id}: {reason}"))
            .collect::<Vec<_>>()
            .join(" | ");
        Err(DispatchFailure {
            failed,
            total: self.outcomes.len(),
            detail,
        })
    }
}

/// Drives purifiers to a target speed through a [`VendorApi`].
pub struct Dispatcher<'a, V> {
    vendor: &'a V,
    dry_run: bool,
}

impl<'a, V: VendorApi> Dispatcher<'a, V> {
    pub fn new(vendor: &'a V, dry_run: bool) -> Self {
        Self { vendor, dry_run }
    }

    /// Apply `target` to every device in order. Never short-circuits.
    pub async fn apply(&self, device_ids: &[String], target: FanSpeed) -> DispatchReport {
        if self.dry_run {
            info!(
                speed = %target,
                devices = device_ids.len(),
                "dry run, no vendor commands issued"
            );
            return DispatchReport {
                target: Some(target),
                dry_run: true,
                outcomes: Vec::new(),
            };
        }

        let mut outcomes = Vec::with_capacity(device_ids.len());
        for device_id in device_ids {
            let result = match self.drive(device_id, target).await {
                Ok(actions) => {
                    debug!(%device_id, ?actions, "device at target");
                    Ok(actions)
                }
                Err(e) => {
                    warn!(%device_id, error = %e, "device command failed");
                    Err(truncate_chars(&e.to_string(), MAX_ERROR_CHARS))
                }
            };
            outcomes.push(DeviceOutcome {
                device_id: device_id.clone(),
                result,
            });
        }

        DispatchReport {
            target: Some(target),
            dry_run: false,
            outcomes,
        }
    }

    async fn drive(&self, device_id: &str, target: FanSpeed) -> VendorResult<DeviceActions> {
        let state = self.vendor.get_state(device_id).await?;
        let mut actions = DeviceActions::default();

        if state.power != PowerState::On {
            self.vendor.set_power_on(device_id).await?;
            actions.powered_on = true;
        }
        if state.mode != DeviceMode::Manual {
            self.vendor.set_mode_manual(device_id).await?;
            actions.set_manual = true;
        }
        if state.airflow != Some(target) {
            self.vendor.set_airflow(device_id, target).await?;
            actions.airflow_set = true;
        }
        Ok(actions)
    }
}
