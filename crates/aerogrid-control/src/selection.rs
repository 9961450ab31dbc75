//! Target device selection.

use aerogrid_vendor::VendorDevice;

use crate::error::{ControlError, ControlResult};

/// Resolve the purifiers to address this cycle.
///
/// An empty `configured` list selects every device on the account.
/// Otherwise every configured id must exist on the account.
pub fn select_devices(configured: &[String], account: &[VendorDevice]) -> ControlResult<Vec<String>> {
    if account.is_empty() {
        return Err(ControlError::DeviceSelection(
            "vendor account reports no devices".to_string(),
        ));
    }

    if configured.is_empty() {
        let mut ids: Vec<String> = Vec::with_capacity(account.len());
        for device in account {
            if !ids.contains(&device.device_id) {
                ids.push(device.device_id.clone());
            }
        }
        return Ok(ids);
    }

    let missing: Vec<&str> = configured
        .iter()
        .filter(|id| !account.iter().any(|d| &d.device_id == *id))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(ControlError::DeviceSelection(format!(
            "configured target device ids were not found: {}",
            missing.join(", ")
        )));
    }
    Ok(configured.to_vec())
}
