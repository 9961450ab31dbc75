//! Pollutant-driven fan speed selection.
//!
//! Pure functions only: no clock, no I/O, no state between calls. The
//! control loop feeds in the previous effective speed and the current
//! window average and gets back the speed to command.
//!
//! # Policy
//!
//! ```text
//! window stale?            → skip the cycle (checked before anything else)
//! no previous speed        → baseline map:
//!                              avg < 10        low
//!                              10 ≤ avg < 20   medium
//!                              20 ≤ avg ≤ 30   high
//!                              avg > 30        turbo
//! previous speed known     → same boundaries, shifted by ±deadband
//!                            depending on direction of travel
//! target ≠ previous        → held at previous until min dwell elapsed
//! ```

pub mod speed;

pub use speed::{
    BASELINE, HIGH_TURBO_BOUNDARY, LOW_MEDIUM_BOUNDARY, MEDIUM_HIGH_BOUNDARY, Thresholds,
    apply_dwell, choose_with_hysteresis, is_stale, map_to_speed,
};
