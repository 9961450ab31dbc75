//! The purifier fan control loop.
//!
//! Each cycle runs strictly in order:
//!
//! ```text
//! latest audit row → snapshot
//! telemetry window (now-300s, now] → stale? → skipped_stale
//! hysteresis → dwell → target speed
//! session resolve → persist session → select devices → dispatch
//! append audit row
//! ```
//!
//! [`ControlLoop::run`] repeats the cycle on an interval and sweeps audit
//! rows older than 30 days.

pub mod control_loop;
pub mod error;
pub mod selection;
pub mod snapshot;
pub mod window;

pub use control_loop::{ControlLoop, RETENTION_SECS, RunOutcome};
pub use error::{ControlError, ControlResult};
pub use selection::select_devices;
pub use snapshot::ControlSnapshot;
pub use window::{WINDOW_SECS, read_window};
