//! Sync engine: flushes queued scans and audit logs to the ERP
//!
//! - [`SyncEngine`]: one single-flight sync cycle + snapshot refresh
//! - [`SyncWorker`]: periodic driver owned by the guard, stopped by a
//!   `CancellationToken`

mod engine;
mod worker;

pub use engine::{CycleOutcome, FlightGate, SyncEngine, SyncReport};
pub use worker::SyncWorker;
