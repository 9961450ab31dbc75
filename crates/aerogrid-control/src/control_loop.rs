//! The fan control cycle.
//!
//! One call to [`ControlLoop::run_once`] reads the previous state from the
//! audit log, decides a speed from the telemetry window, pushes it to the
//! purifiers and appends exactly one audit row (none when disabled).

use std::fmt;
use std::time::Duration;

use aero_core::{
    ConfigError, ControlConfig, EpochSecs, FanSpeed, MAX_ERROR_CHARS, epoch_secs, truncate_chars,
};
use aerogrid_policy::{apply_dwell, choose_with_hysteresis, is_stale};
use aerogrid_state::{ControlRun, RunStatus, StateStore, TelemetryWindow};
use aerogrid_vendor::{Dispatcher, SessionResolver, VendorApi};
use tracing::{debug, error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::selection::select_devices;
use crate::snapshot::ControlSnapshot;
use crate::window::read_window;

/// Audit rows older than this are purged by the periodic runner.
pub const RETENTION_SECS: u64 = 30 * 24 * 60 * 60;

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The loop is switched off; nothing was recorded.
    Disabled,
    Success { target_speed: FanSpeed, average: f64 },
    SkippedStale { reason: String },
    Error { reason: String },
}

impl RunOutcome {
    /// Status of the audit row written for this outcome.
    pub fn status(&self) -> Option<RunStatus> {
        match self {
            RunOutcome::Disabled => None,
            RunOutcome::Success { .. } => Some(RunStatus::Success),
            RunOutcome::SkippedStale { .. } => Some(RunStatus::SkippedStale),
            RunOutcome::Error { .. } => Some(RunStatus::Error),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Disabled => f.write_str("disabled"),
            RunOutcome::Success {
                target_speed,
                average,
            } => write!(f, "success: {target_speed} (avg {average:.1})"),
            RunOutcome::SkippedStale { reason } => write!(f, "skipped_stale: {reason}"),
            RunOutcome::Error { reason } => write!(f, "error: {reason}"),
        }
    }
}

/// Facts gathered while a cycle progresses, used to fill the audit row
/// however the cycle ends.
#[derive(Debug, Default)]
struct CycleTrace {
    window: Option<TelemetryWindow>,
    device_ids: Option<String>,
}

/// A decided and applied speed.
struct Applied {
    target: FanSpeed,
    average: f64,
}

/// Drives one monitor/purifier group.
pub struct ControlLoop<V> {
    store: StateStore,
    vendor: V,
    config: ControlConfig,
}

impl<V: VendorApi> ControlLoop<V> {
    pub fn new(store: StateStore, vendor: V, config: ControlConfig) -> Self {
        Self {
            store,
            vendor,
            config,
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one cycle at `now`.
    ///
    /// Returns `Err` only when the audit log itself cannot be read or
    /// written; every other failure is recorded as a row.
    pub async fn run_once(&self, now: EpochSecs) -> ControlResult<RunOutcome> {
        if !self.config.enabled {
            info!("control loop disabled, skipping cycle");
            return Ok(RunOutcome::Disabled);
        }

        let snapshot = ControlSnapshot::from_latest(self.store.latest_control_run()?.as_ref());
        debug!(
            speed = ?snapshot.speed,
            change_ts = ?snapshot.change_ts,
            error_streak = snapshot.error_streak,
            "loaded control snapshot"
        );

        let mut trace = CycleTrace::default();
        let result = self.cycle(now, &snapshot, &mut trace).await;
        let mut run = self.base_row(now, &snapshot, &trace);

        let outcome = match result {
            Ok(applied) => {
                let changed = snapshot.speed != Some(applied.target);
                run.run_status = RunStatus::Success;
                run.target_speed = Some(applied.target);
                run.effective_speed = Some(applied.target);
                run.speed_changed = changed;
                run.effective_change_ts = if changed {
                    Some(now)
                } else {
                    snapshot.change_ts.or(Some(now))
                };
                run.error_streak = 0;
                RunOutcome::Success {
                    target_speed: applied.target,
                    average: applied.average,
                }
            }
            Err(ControlError::StaleData(reason)) => {
                run.run_status = RunStatus::SkippedStale;
                run.error_message = Some(truncate_chars(&reason, MAX_ERROR_CHARS));
                RunOutcome::SkippedStale { reason }
            }
            Err(e) => {
                let reason = truncate_chars(&e.to_string(), MAX_ERROR_CHARS);
                error!(error = %reason, "control cycle failed");
                run.error_message = Some(reason.clone());
                RunOutcome::Error { reason }
            }
        };

        let id = self.store.append_control_run(&run)?;
        info!(
            id,
            status = %run.run_status,
            target_speed = ?run.target_speed,
            effective = ?run.effective_speed,
            changed = run.speed_changed,
            error_streak = run.error_streak,
            "control cycle recorded"
        );

        let threshold = self.config.alert_error_streak;
        if threshold > 0 && run.error_streak >= threshold {
            warn!(
                error_streak = run.error_streak,
                threshold,
                last_error = run.error_message.as_deref().unwrap_or(""),
                "control loop error streak at alert threshold"
            );
        }

        Ok(outcome)
    }

    async fn cycle(
        &self,
        now: EpochSecs,
        snapshot: &ControlSnapshot,
        trace: &mut CycleTrace,
    ) -> ControlResult<Applied> {
        let config = &self.config;
        config.validate()?;

        let window = read_window(&self.store, &config.monitor_device_id, config.metric, now)?;
        trace.window = Some(window);

        let average = match window.average {
            Some(avg)
                if !is_stale(
                    window.sample_count,
                    window.last_sample_ts,
                    now,
                    config.min_samples,
                    config.max_sample_age_seconds,
                ) =>
            {
                avg
            }
            _ => return Err(ControlError::StaleData(stale_reason(&window, now, config))),
        };

        let credentials = config
            .credentials()
            .ok_or(ControlError::Config(ConfigError::MissingCredentials))?;

        let wanted = choose_with_hysteresis(average, snapshot.speed, config.deadband);
        let target = apply_dwell(
            wanted,
            snapshot.speed,
            snapshot.change_ts,
            now,
            config.min_dwell_seconds(),
        );
        if wanted != target {
            debug!(%wanted, held = %target, "speed change held by minimum dwell");
        }
        debug!(average, target_speed = %target, metric = %config.metric, "speed decided");

        let stored = self.store.get_session()?;
        let resolved = SessionResolver::new(&self.vendor)
            .resolve(&credentials, stored.as_ref().map(|s| &s.session), now)
            .await?;
        self.store.put_session(&resolved.session, now)?;

        let device_ids = select_devices(&config.target_device_ids, &resolved.devices)?;
        trace.device_ids = Some(device_ids.join(","));

        let report = Dispatcher::new(&self.vendor, config.dry_run)
            .apply(&device_ids, target)
            .await
            .into_result()?;
        debug!(
            devices = device_ids.len(),
            changed = report.changed_count(),
            dry_run = report.dry_run,
            "dispatch complete"
        );

        Ok(Applied { target, average })
    }

    /// Row for a cycle that did not change anything. Success overwrites the
    /// speed fields.
    fn base_row(&self, now: EpochSecs, snapshot: &ControlSnapshot, trace: &CycleTrace) -> ControlRun {
        let monitor = self.config.monitor_device_id.trim();
        ControlRun {
            run_ts: now,
            run_status: RunStatus::Error,
            monitor_device_id: (!monitor.is_empty()).then(|| monitor.to_string()),
            target_device_ids: trace.device_ids.clone(),
            average: trace.window.and_then(|w| w.average),
            sample_count: trace.window.map(|w| w.sample_count),
            last_sample_ts: trace.window.and_then(|w| w.last_sample_ts),
            previous_speed: snapshot.speed,
            target_speed: None,
            effective_speed: snapshot.speed,
            speed_changed: false,
            effective_change_ts: snapshot.change_ts,
            error_streak: snapshot.next_streak(),
            error_message: None,
            created_ts: now,
        }
    }

    /// Run a cycle every `interval` until `shutdown` fires, purging expired
    /// audit rows after each one.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            monitor = %self.config.monitor_device_id,
            dry_run = self.config.dry_run,
            "control loop started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(epoch_secs()).await;
                }
                _ = shutdown.changed() => {
                    info!("control loop shutting down");
                    break;
                }
            }
        }
    }

    async fn tick(&self, now: EpochSecs) {
        match self.run_once(now).await {
            Ok(outcome) => info!(%outcome, "control cycle finished"),
            Err(e) => error!(error = %e, "control cycle could not be recorded"),
        }

        match self.store.purge_control_runs_before(now.saturating_sub(RETENTION_SECS)) {
            Ok(0) => {}
            Ok(purged) => info!(purged, "expired control runs purged"),
            Err(e) => warn!(error = %e, "control run retention sweep failed"),
        }
    }
}

fn stale_reason(window: &TelemetryWindow, now: EpochSecs, config: &ControlConfig) -> String {
    if window.sample_count < config.min_samples {
        return format!(
            "{} samples in window, need {}",
            window.sample_count, config.min_samples
        );
    }
    match window.last_sample_ts {
        Some(ts) if now.saturating_sub(ts) > config.max_sample_age_seconds => format!(
            "last sample is {}s old, limit {}s",
            now.saturating_sub(ts),
            config.max_sample_age_seconds
        ),
        _ => "no usable readings in window".to_string(),
    }
}
