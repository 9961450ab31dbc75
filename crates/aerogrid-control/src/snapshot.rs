//! State carried from one control cycle to the next.

use aero_core::{EpochSecs, FanSpeed};
use aerogrid_state::ControlRun;

/// What the previous cycle left in force.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlSnapshot {
    pub speed: Option<FanSpeed>,
    pub change_ts: Option<EpochSecs>,
    pub error_streak: u32,
}

impl ControlSnapshot {
    /// Recover the snapshot from the latest audit row, if there is one.
    pub fn from_latest(run: Option<&ControlRun>) -> Self {
        match run {
            Some(run) => Self {
                speed: run.effective_speed,
                change_ts: run.effective_change_ts,
                error_streak: run.error_streak,
            },
            None => Self::default(),
        }
    }

    pub fn next_streak(&self) -> u32 {
        self.error_streak.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerogrid_state::RunStatus;

    #[test]
    fn defaults_without_history() {
        let snapshot = ControlSnapshot::from_latest(None);
        assert_eq!(snapshot, ControlSnapshot::default());
        assert_eq!(snapshot.next_streak(), 1);
    }

    #[test]
    fn reads_effective_fields() {
        let run = ControlRun {
            run_ts: 1_000,
            run_status: RunStatus::Error,
            monitor_device_id: Some("m1".to_string()),
            target_device_ids: None,
            average: None,
            sample_count: None,
            last_sample_ts: None,
            previous_speed: Some(FanSpeed::High),
            target_speed: None,
            effective_speed: Some(FanSpeed::High),
            speed_changed: false,
            effective_change_ts: Some(400),
            error_streak: 4,
            error_message: Some("boom".to_string()),
            created_ts: 1_000,
        };
        let snapshot = ControlSnapshot::from_latest(Some(&run));
        assert_eq!(snapshot.speed, Some(FanSpeed::High));
        assert_eq!(snapshot.change_ts, Some(400));
        assert_eq!(snapshot.error_streak, 4);
    }
}
