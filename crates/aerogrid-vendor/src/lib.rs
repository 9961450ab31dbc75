//! Purifier vendor cloud client.
//!
//! [`VendorApi`] is the seam the control loop talks through.
//! [`HttpVendorClient`] implements it against the vendor's JSON API;
//! [`SessionResolver`] keeps an account session alive across cycles and
//! [`Dispatcher`] drives each purifier to a target speed.

pub mod api;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod session;

pub use api::{DeviceState, VendorApi, VendorDevice};
pub use client::HttpVendorClient;
pub use dispatch::{DeviceActions, DeviceOutcome, DispatchFailure, DispatchReport, Dispatcher};
pub use error::{VendorError, VendorResult};
pub use session::{EXPIRY_MARGIN_SECS, ResolvedSession, SessionResolver, SessionSource};
