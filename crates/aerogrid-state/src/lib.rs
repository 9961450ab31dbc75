//! Embedded state store for AeroGrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for telemetry samples, the control run audit log, and the vendor
//! session.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Sample keys are `{device_id}:{ts:020}` so a time window for one device is
//! a contiguous key range. Control runs are keyed by an auto-incrementing
//! `u64`, which makes "latest run" a `last()` lookup and keeps appends
//! ordered even when two runs share a timestamp.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. redb serializes write transactions
//! and holds an exclusive lock on the database file.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
