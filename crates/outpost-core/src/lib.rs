//! outpost-core - Core library for Outpost
//!
//! This crate contains the vector clock, the synchronized record model, the
//! record store adapters, and the sync engine (ingest, delta pull, conflict
//! resolution) used by the API server and the operator CLI.

pub mod clock;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod sync;

pub use clock::{ClockOrdering, VectorClock};
pub use error::{Error, Result};
pub use models::{RecordKey, SyncRecord};
pub use store::{MemoryRecordStore, RecordStore};
pub use sync::SyncEngine;
