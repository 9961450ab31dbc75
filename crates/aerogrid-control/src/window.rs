//! Telemetry window reader.

use aero_core::{EpochSecs, Metric};
use aerogrid_state::{StateResult, StateStore, TelemetryWindow};

/// Width of the averaging window in seconds.
pub const WINDOW_SECS: u64 = 300;

/// Aggregate `metric` for `device_id` over `(now - 300, now]`.
pub fn read_window(
    store: &StateStore,
    device_id: &str,
    metric: Metric,
    now: EpochSecs,
) -> StateResult<TelemetryWindow> {
    store.metric_window(device_id, metric, now.saturating_sub(WINDOW_SECS), now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerogrid_state::TelemetrySample;

    fn pm25(store: &StateStore, device: &str, ts: u64, value: f64) {
        store
            .put_sample(&TelemetrySample {
                device_id: device.to_string(),
                ts,
                pm2_5: Some(value),
                ..TelemetrySample::default()
            })
            .unwrap();
    }

    #[test]
    fn window_is_open_at_start_closed_at_end() {
        let store = StateStore::open_in_memory().unwrap();
        pm25(&store, "m1", 700, 100.0); // exactly now - 300: excluded
        pm25(&store, "m1", 701, 10.0);
        pm25(&store, "m1", 1_000, 20.0);
        pm25(&store, "m1", 1_001, 100.0); // future: excluded

        let window = read_window(&store, "m1", Metric::Pm2_5, 1_000).unwrap();
        assert_eq!(window.sample_count, 2);
        assert_eq!(window.average, Some(15.0));
        assert_eq!(window.last_sample_ts, Some(1_000));
    }

    #[test]
    fn empty_window() {
        let store = StateStore::open_in_memory().unwrap();
        let window = read_window(&store, "m1", Metric::Pm2_5, 1_000).unwrap();
        assert_eq!(window, TelemetryWindow::default());
    }

    #[test]
    fn early_clock_does_not_underflow() {
        let store = StateStore::open_in_memory().unwrap();
        pm25(&store, "m1", 50, 8.0);
        let window = read_window(&store, "m1", Metric::Pm2_5, 100).unwrap();
        assert_eq!(window.sample_count, 1);
    }
}
