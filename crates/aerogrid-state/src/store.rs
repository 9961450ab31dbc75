//! redb-backed state persistence for AeroGrid.
//!
//! Provides typed operations over telemetry samples, the control run log,
//! and the vendor session. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use aero_core::{EpochSecs, Metric};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        txn.open_table(CONTROL_LOG).map_err(map_err!(Table))?;
        txn.open_table(VENDOR_SESSION).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Samples ────────────────────────────────────────────────────

    /// Insert a telemetry sample. A second sample for the same device and
    /// second replaces the first.
    pub fn put_sample(&self, sample: &TelemetrySample) -> StateResult<()> {
        let key = sample.table_key();
        let value = serde_json::to_vec(sample).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Mean, count and newest timestamp of `metric` for `device_id` over
    /// the half-open interval `(from_exclusive, to_inclusive]`.
    ///
    /// Samples without a reading for `metric` are ignored.
    pub fn metric_window(
        &self,
        device_id: &str,
        metric: Metric,
        from_exclusive: EpochSecs,
        to_inclusive: EpochSecs,
    ) -> StateResult<TelemetryWindow> {
        if from_exclusive >= to_inclusive {
            return Ok(TelemetryWindow::default());
        }
        let lo = sample_key(device_id, from_exclusive + 1);
        let hi = sample_key(device_id, to_inclusive);

        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;

        let mut sum = 0.0;
        let mut count: u32 = 0;
        let mut last_ts: Option<EpochSecs> = None;
        for entry in table
            .range(lo.as_str()..=hi.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let sample: TelemetrySample =
                serde_json::from_slice(value.value()).map_err(map_err!(Corrupt))?;
            // Keys of an id like "{device_id}:<digits>" sort inside this range.
            if sample.device_id != device_id {
                continue;
            }
            if let Some(reading) = sample.value(metric) {
                sum += reading;
                count += 1;
                last_ts = Some(last_ts.map_or(sample.ts, |ts| ts.max(sample.ts)));
            }
        }

        Ok(TelemetryWindow {
            average: (count > 0).then(|| sum / f64::from(count)),
            sample_count: count,
            last_sample_ts: last_ts,
        })
    }

    // ── Control log ────────────────────────────────────────────────

    /// Append a control run. Returns the id assigned to it.
    pub fn append_control_run(&self, run: &ControlRun) -> StateResult<u64> {
        let value = serde_json::to_vec(run).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id;
        {
            let mut table = txn.open_table(CONTROL_LOG).map_err(map_err!(Table))?;
            id = match table.last().map_err(map_err!(Read))? {
                Some((key, _)) => key.value() + 1,
                None => 1,
            };
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id, status = %run.run_status, "control run appended");
        Ok(id)
    }

    /// The most recently appended control run, if any.
    pub fn latest_control_run(&self) -> StateResult<Option<ControlRun>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CONTROL_LOG).map_err(map_err!(Table))?;
        match table.last().map_err(map_err!(Read))? {
            Some((_, value)) => {
                let run: ControlRun =
                    serde_json::from_slice(value.value()).map_err(map_err!(Corrupt))?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    /// Up to `limit` control runs, newest first, with their ids.
    pub fn recent_control_runs(&self, limit: usize) -> StateResult<Vec<(u64, ControlRun)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CONTROL_LOG).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            if results.len() >= limit {
                break;
            }
            let (key, value) = entry.map_err(map_err!(Read))?;
            let run: ControlRun =
                serde_json::from_slice(value.value()).map_err(map_err!(Corrupt))?;
            results.push((key.value(), run));
        }
        Ok(results)
    }

    /// Delete control runs whose `run_ts` is older than `cutoff`.
    /// Returns the number deleted.
    pub fn purge_control_runs_before(&self, cutoff: EpochSecs) -> StateResult<u32> {
        // Collect ids in a read transaction first.
        let ids: Vec<u64> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(CONTROL_LOG).map_err(map_err!(Table))?;
            let mut ids = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let run: ControlRun =
                    serde_json::from_slice(value.value()).map_err(map_err!(Corrupt))?;
                if run.run_ts < cutoff {
                    ids.push(key.value());
                }
            }
            ids
        };
        if ids.is_empty() {
            return Ok(0);
        }
        // Delete in a write transaction.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = ids.len() as u32;
        {
            let mut table = txn.open_table(CONTROL_LOG).map_err(map_err!(Table))?;
            for id in &ids {
                table.remove(*id).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count, cutoff, "control runs purged");
        Ok(count)
    }

    // ── Vendor session ─────────────────────────────────────────────

    /// Overwrite the stored vendor session.
    pub fn put_session(&self, session: &VendorSession, now: EpochSecs) -> StateResult<()> {
        let stored = StoredSession {
            session: session.clone(),
            updated_ts: now,
        };
        let value = serde_json::to_vec(&stored).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(VENDOR_SESSION).map_err(map_err!(Table))?;
            table
                .insert(SESSION_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(user_id = %session.user_id, "vendor session stored");
        Ok(())
    }

    /// The stored vendor session, if one was ever written.
    pub fn get_session(&self) -> StateResult<Option<StoredSession>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VENDOR_SESSION).map_err(map_err!(Table))?;
        match table.get(SESSION_KEY).map_err(map_err!(Read))? {
            Some(guard) => {
                let stored: StoredSession =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Corrupt))?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }
}
