//! Control loop error types.

use aero_core::ConfigError;
use aerogrid_state::StateError;
use aerogrid_vendor::{DispatchFailure, VendorError};
use thiserror::Error;

/// Everything that can end a control cycle early.
///
/// All variants except [`ControlError::State`] raised while writing the
/// audit row are recorded in the control log rather than returned.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("device selection failed: {0}")]
    DeviceSelection(String),

    #[error("stale telemetry: {0}")]
    StaleData(String),

    #[error("vendor session error: {0}")]
    Session(#[from] VendorError),

    #[error("{0}")]
    DeviceCommand(#[from] DispatchFailure),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type ControlResult<T> = Result<T, ControlError>;
