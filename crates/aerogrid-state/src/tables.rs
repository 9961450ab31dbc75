//! redb table definitions for the AeroGrid state store.
//!
//! Values are JSON-serialized domain types stored as `&[u8]`.

use redb::TableDefinition;

/// Telemetry samples keyed by `{device_id}:{ts:020}`.
///
/// Zero-padding the timestamp makes lexicographic key order match time
/// order, so a window query is a single range scan.
pub const SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("samples");

/// Append-only control run log keyed by a monotonically increasing id.
pub const CONTROL_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("control_log");

/// Singleton vendor session keyed by [`SESSION_KEY`].
pub const VENDOR_SESSION: TableDefinition<&str, &[u8]> = TableDefinition::new("vendor_session");

pub const SESSION_KEY: &str = "current";
