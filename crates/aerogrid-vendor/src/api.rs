//! The vendor API surface the control loop depends on.
//!
//! Account calls (`login`, `refresh`, `list_devices`) work with a
//! [`VendorSession`]; device calls address a purifier by id only, the way
//! the vendor's device endpoints do.

use std::future::Future;
use std::sync::Arc;

use aero_core::{Credentials, DeviceMode, FanSpeed, PowerState};
use aerogrid_state::VendorSession;
use serde::{Deserialize, Serialize};

use crate::error::VendorResult;

/// A purifier registered on the vendor account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorDevice {
    pub device_id: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Current state of a purifier as the vendor reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub power: PowerState,
    pub mode: DeviceMode,
    /// `None` when the device reports an airflow outside the four
    /// controllable speeds (e.g. a sleep setting).
    pub airflow: Option<FanSpeed>,
}

/// Operations against the purifier vendor's cloud.
///
/// Implemented over HTTP by [`HttpVendorClient`](crate::HttpVendorClient);
/// tests supply scripted fakes.
pub trait VendorApi: Send + Sync {
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = VendorResult<VendorSession>> + Send;

    fn refresh(
        &self,
        session: &VendorSession,
    ) -> impl Future<Output = VendorResult<VendorSession>> + Send;

    fn list_devices(
        &self,
        session: &VendorSession,
    ) -> impl Future<Output = VendorResult<Vec<VendorDevice>>> + Send;

    fn get_state(&self, device_id: &str) -> impl Future<Output = VendorResult<DeviceState>> + Send;

    fn set_power_on(&self, device_id: &str) -> impl Future<Output = VendorResult<()>> + Send;

    fn set_mode_manual(&self, device_id: &str) -> impl Future<Output = VendorResult<()>> + Send;

    fn set_airflow(
        &self,
        device_id: &str,
        speed: FanSpeed,
    ) -> impl Future<Output = VendorResult<()>> + Send;
}

impl<T: VendorApi> VendorApi for Arc<T> {
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = VendorResult<VendorSession>> + Send {
        (**self).login(credentials)
    }

    fn refresh(
        &self,
        session: &VendorSession,
    ) -> impl Future<Output = VendorResult<VendorSession>> + Send {
        (**self).refresh(session)
    }

    fn list_devices(
        &self,
        session: &VendorSession,
    ) -> impl Future<Output = VendorResult<Vec<VendorDevice>>> + Send {
        (**self).list_devices(session)
    }

    fn get_state(&self, device_id: &str) -> impl Future<Output = VendorResult<DeviceState>> + Send {
        (**self).get_state(device_id)
    }

    fn set_power_on(&self, device_id: &str) -> impl Future<Output = VendorResult<()>> + Send {
        (**self).set_power_on(device_id)
    }

    fn set_mode_manual(&self, device_id: &str) -> impl Future<Output = VendorResult<()>> + Send {
        (**self).set_mode_manual(device_id)
    }

    fn set_airflow(
        &self,
        device_id: &str,
        speed: FanSpeed,
    ) -> impl Future<Output = VendorResult<()>> + Send {
        (**self).set_airflow(device_id, speed)
    }
}
