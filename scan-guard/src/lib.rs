//! Scan Guard - strict barcode validation for warehouse picking
//!
//! Sits between the scanner and the host inventory application: every token
//! goes through [`PickingGuard::on_scan`], is checked against the picking
//! snapshot and the current location lock, and only valid scans reach the
//! ERP. Scans are kept in an encrypted local session and synced once the
//! server is reachable again.

pub mod config;
pub mod crypto;
pub mod error;
pub mod guard;
pub mod logger;
pub mod notify;
pub mod remote;
pub mod session;
pub mod snapshot;
pub mod storage;
pub mod sync;
pub mod validator;

pub use config::{GuardConfig, LocationPolicy, LocationSide};
pub use error::{GuardError, GuardResult};
pub use guard::{PickingGuard, ScanOutcome};
pub use notify::{Dialog, DialogKind, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use remote::{JsonRpcBackend, PickingBackend, RemoteError, RemoteResult};
pub use session::RestoreOutcome;
pub use storage::LocalStorage;
pub use sync::{CycleOutcome, SyncReport};
pub use validator::{Decision, LineProgress, Rejection};

// Re-export shared types for convenience
pub use shared::picking;
pub use shared::ErrorCode;
