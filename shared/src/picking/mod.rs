//! Strict picking data model
//!
//! - [`Snapshot`]: immutable server description of the operation
//! - [`Session`]: local scan queue + audit log for one device/picking pair
//! - [`rpc`]: request/response payloads of the ERP methods

pub mod rpc;
pub mod session;
pub mod snapshot;

/// ERP record ids are plain integers
pub type PickingId = i64;
pub type LocationId = i64;
pub type ProductId = i64;
pub type LotId = i64;
pub type LineId = i64;

pub use rpc::{
    OfflineScan, OfflineSyncResponse, RpcStatus, ScanDetails, SnapshotResponse,
    StrictScanRequest, StrictScanResponse,
};
pub use session::{LogEntry, LogEventType, ScanEntry, Session, SyncStatus};
pub use snapshot::{
    LocationRef, LotRef, OperationKind, ProductRef, Snapshot, SnapshotLine, Tracking,
};
