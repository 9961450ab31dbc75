//! Maps a pollutant window onto a fan speed.

use aero_core::{EpochSecs, FanSpeed};

/// Boundary between `low` and `medium` (µg/m³).
pub const LOW_MEDIUM_BOUNDARY: f64 = 10.0;

/// Boundary between `medium` and `high` (µg/m³). Tuned per deployment;
/// this build uses 20.
pub const MEDIUM_HIGH_BOUNDARY: f64 = 20.0;

/// Upper edge of `high`; readings strictly above it select `turbo`.
pub const HIGH_TURBO_BOUNDARY: f64 = 30.0;

/// The three speed boundaries, lowest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub low_medium: f64,
    pub medium_high: f64,
    pub high_turbo: f64,
}

/// Boundaries every control loop in this build uses.
pub const BASELINE: Thresholds = Thresholds {
    low_medium: LOW_MEDIUM_BOUNDARY,
    medium_high: MEDIUM_HIGH_BOUNDARY,
    high_turbo: HIGH_TURBO_BOUNDARY,
};

impl Thresholds {
    /// Memoryless mapping. Lower boundaries are inclusive; the top of
    /// `high` is inclusive too.
    pub fn map(&self, avg: f64) -> FanSpeed {
        if avg < self.low_medium {
            FanSpeed::Low
        } else if avg < self.medium_high {
            FanSpeed::Medium
        } else if avg <= self.high_turbo {
            FanSpeed::High
        } else {
            FanSpeed::Turbo
        }
    }

    /// Mapping with a deadband around every boundary.
    ///
    /// Climbing past a boundary requires `boundary + deadband`; falling
    /// below it requires `boundary - deadband`. Which side applies depends
    /// on the speed currently in force.
    pub fn with_hysteresis(&self, avg: f64, previous: Option<FanSpeed>, deadband: f64) -> FanSpeed {
        let Some(previous) = previous else {
            return self.map(avg);
        };

        let up_to_medium = self.low_medium + deadband;
        let up_to_high = self.medium_high + deadband;
        let up_to_turbo = self.high_turbo + deadband;

        let down_to_low = self.low_medium - deadband;
        let down_to_medium = self.medium_high - deadband;
        let down_from_turbo = self.high_turbo - deadband;

        match previous {
            FanSpeed::Low => {
                if avg < up_to_medium {
                    FanSpeed::Low
                } else if avg < up_to_high {
                    FanSpeed::Medium
                } else if avg <= up_to_turbo {
                    FanSpeed::High
                } else {
                    FanSpeed::Turbo
                }
            }
            FanSpeed::Medium => {
                if avg < down_to_low {
                    FanSpeed::Low
                } else if avg < up_to_high {
                    FanSpeed::Medium
                } else if avg <= up_to_turbo {
                    FanSpeed::High
                } else {
                    FanSpeed::Turbo
                }
            }
            FanSpeed::High => {
                if avg < down_to_low {
                    FanSpeed::Low
                } else if avg < down_to_medium {
                    FanSpeed::Medium
                } else if avg <= up_to_turbo {
                    FanSpeed::High
                } else {
                    FanSpeed::Turbo
                }
            }
            FanSpeed::Turbo => {
                if avg < down_to_low {
                    FanSpeed::Low
                } else if avg < down_to_medium {
                    FanSpeed::Medium
                } else if avg <= down_from_turbo {
                    FanSpeed::High
                } else {
                    FanSpeed::Turbo
                }
            }
        }
    }
}

/// [`Thresholds::map`] over [`BASELINE`].
pub fn map_to_speed(avg: f64) -> FanSpeed {
    BASELINE.map(avg)
}

/// [`Thresholds::with_hysteresis`] over [`BASELINE`].
pub fn choose_with_hysteresis(avg: f64, previous: Option<FanSpeed>, deadband: f64) -> FanSpeed {
    BASELINE.with_hysteresis(avg, previous, deadband)
}

/// Hold the previous speed until it has been in force for `min_dwell_secs`.
///
/// With no previous speed or no record of when it was set there is nothing
/// to hold, so the target passes through.
pub fn apply_dwell(
    target: FanSpeed,
    previous: Option<FanSpeed>,
    previous_change_ts: Option<EpochSecs>,
    now: EpochSecs,
    min_dwell_secs: u64,
) -> FanSpeed {
    let (Some(previous), Some(changed_at)) = (previous, previous_change_ts) else {
        return target;
    };
    if target == previous {
        return previous;
    }
    // A change timestamp in the future counts as zero elapsed.
    if now.saturating_sub(changed_at) < min_dwell_secs {
        previous
    } else {
        target
    }
}

/// Whether a window is too thin or too old to act on.
pub fn is_stale(
    sample_count: u32,
    last_sample_ts: Option<EpochSecs>,
    now: EpochSecs,
    min_samples: u32,
    max_age_secs: u64,
) -> bool {
    if sample_count < min_samples {
        return true;
    }
    match last_sample_ts {
        None => true,
        Some(ts) => now.saturating_sub(ts) > max_age_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FanSpeed::*;

    #[test]
    fn baseline_mapping_boundaries() {
        assert_eq!(map_to_speed(0.0), Low);
        assert_eq!(map_to_speed(9.9), Low);
        assert_eq!(map_to_speed(10.0), Medium);
        assert_eq!(map_to_speed(19.9), Medium);
        assert_eq!(map_to_speed(20.0), High);
        assert_eq!(map_to_speed(30.0), High);
        assert_eq!(map_to_speed(30.1), Turbo);
        assert_eq!(map_to_speed(500.0), Turbo);
    }

    #[test]
    fn mapping_is_monotonic() {
        let mut last = Low;
        let mut avg = 0.0;
        while avg < 60.0 {
            let speed = map_to_speed(avg);
            assert!(speed >= last, "speed went down at {avg}");
            last = speed;
            avg += 0.25;
        }
    }

    #[test]
    fn hysteresis_without_previous_is_baseline() {
        for avg in [0.0, 9.99, 10.0, 21.0, 30.0, 31.0] {
            assert_eq!(choose_with_hysteresis(avg, None, 2.0), map_to_speed(avg));
        }
    }

    #[test]
    fn hysteresis_applies_deadband() {
        assert_eq!(choose_with_hysteresis(22.0, Some(Medium), 2.0), High);
        assert_eq!(choose_with_hysteresis(21.9, Some(Medium), 2.0), Medium);
        assert_eq!(choose_with_hysteresis(17.9, Some(High), 2.0), Medium);
        assert_eq!(choose_with_hysteresis(28.0, Some(Turbo), 2.0), High);
        assert_eq!(choose_with_hysteresis(7.9, Some(Medium), 2.0), Low);
    }

    #[test]
    fn hysteresis_from_low() {
        assert_eq!(choose_with_hysteresis(11.9, Some(Low), 2.0), Low);
        assert_eq!(choose_with_hysteresis(12.0, Some(Low), 2.0), Medium);
        assert_eq!(choose_with_hysteresis(22.0, Some(Low), 2.0), High);
        assert_eq!(choose_with_hysteresis(32.0, Some(Low), 2.0), High);
        assert_eq!(choose_with_hysteresis(32.1, Some(Low), 2.0), Turbo);
    }

    #[test]
    fn hysteresis_from_high() {
        assert_eq!(choose_with_hysteresis(7.9, Some(High), 2.0), Low);
        assert_eq!(choose_with_hysteresis(18.0, Some(High), 2.0), High);
        assert_eq!(choose_with_hysteresis(32.0, Some(High), 2.0), High);
        assert_eq!(choose_with_hysteresis(32.1, Some(High), 2.0), Turbo);
    }

    #[test]
    fn hysteresis_from_turbo() {
        assert_eq!(choose_with_hysteresis(28.1, Some(Turbo), 2.0), Turbo);
        assert_eq!(choose_with_hysteresis(17.9, Some(Turbo), 2.0), Medium);
        assert_eq!(choose_with_hysteresis(5.0, Some(Turbo), 2.0), Low);
    }

    #[test]
    fn medium_holds_inside_its_band() {
        let deadband = 2.0;
        let lo = LOW_MEDIUM_BOUNDARY - deadband;
        let hi = MEDIUM_HIGH_BOUNDARY + deadband;
        let mut avg = lo;
        while avg < hi {
            assert_eq!(
                choose_with_hysteresis(avg, Some(Medium), deadband),
                Medium,
                "left medium at {avg}"
            );
            avg += 0.1;
        }
    }

    #[test]
    fn oscillation_around_boundary_does_not_flip() {
        // Hovering around 20 must not bounce between medium and high.
        let readings = [19.5, 20.5, 19.8, 21.0, 19.0, 20.9];
        let mut speed = Some(Medium);
        for avg in readings {
            speed = Some(choose_with_hysteresis(avg, speed, 2.0));
        }
        assert_eq!(speed, Some(Medium));

        let mut speed = Some(High);
        for avg in readings {
            speed = Some(choose_with_hysteresis(avg, speed, 2.0));
        }
        assert_eq!(speed, Some(High));
    }

    #[test]
    fn zero_deadband_matches_baseline() {
        for prev in FanSpeed::ALL {
            for avg in [5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 30.5] {
                assert_eq!(
                    choose_with_hysteresis(avg, Some(prev), 0.0),
                    map_to_speed(avg),
                    "prev={prev} avg={avg}"
                );
            }
        }
    }

    #[test]
    fn dwell_suppresses_early_change() {
        assert_eq!(apply_dwell(High, Some(Medium), Some(1_000), 1_599, 600), Medium);
        assert_eq!(apply_dwell(High, Some(Medium), Some(1_000), 1_600, 600), High);
    }

    #[test]
    fn dwell_passes_through_without_history() {
        assert_eq!(apply_dwell(Turbo, None, None, 1_000, 600), Turbo);
        assert_eq!(apply_dwell(Turbo, Some(Low), None, 1_000, 600), Turbo);
    }

    #[test]
    fn dwell_unchanged_target_returns_previous() {
        assert_eq!(apply_dwell(Low, Some(Low), Some(999), 1_000, 600), Low);
    }

    #[test]
    fn dwell_zero_allows_immediate_change() {
        assert_eq!(apply_dwell(Low, Some(Turbo), Some(1_000), 1_000, 0), Low);
    }

    #[test]
    fn dwell_future_change_ts_holds() {
        assert_eq!(apply_dwell(Low, Some(High), Some(2_000), 1_000, 60), High);
    }

    #[test]
    fn staleness_rules() {
        assert!(is_stale(2, Some(1_000), 1_100, 3, 360));
        assert!(is_stale(3, None, 1_100, 3, 360));
        assert!(is_stale(3, Some(600), 1_100, 3, 360));
        assert!(!is_stale(3, Some(900), 1_100, 3, 360));
        // Exactly max age is still fresh.
        assert!(!is_stale(3, Some(740), 1_100, 3, 360));
    }
}
