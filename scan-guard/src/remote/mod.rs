//! Remote authority (ERP) boundary
//!
//! [`PickingBackend`] is the seam between the guard and the server. The
//! production implementation is [`JsonRpcBackend`]; tests plug in their own.

mod jsonrpc;

pub use jsonrpc::JsonRpcBackend;

use async_trait::async_trait;
use shared::picking::{
    LogEntry, OfflineScan, OfflineSyncResponse, PickingId, SnapshotResponse, StrictScanRequest,
    StrictScanResponse,
};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Transport failure (connection refused, DNS, 5xx, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// No answer within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Server processed the call and raised an error
    #[error("Server error: {0}")]
    Server(String),

    /// Answer received but not understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Failures that mean "offline": queue and retry later
    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Calls exposed by the ERP for strict picking
#[async_trait]
pub trait PickingBackend: Send + Sync {
    /// `get_picking_snapshot`
    async fn fetch_snapshot(&self, picking_id: PickingId) -> RemoteResult<SnapshotResponse>;

    /// `action_scan_product_strict`
    async fn submit_strict_scan(
        &self,
        request: &StrictScanRequest,
    ) -> RemoteResult<StrictScanResponse>;

    /// `process_offline_scans`
    async fn submit_offline_scans(
        &self,
        picking_id: PickingId,
        scans: &[OfflineScan],
    ) -> RemoteResult<OfflineSyncResponse>;

    /// `action_sync_logs`
    async fn submit_offline_logs(
        &self,
        picking_id: PickingId,
        logs: &[LogEntry],
    ) -> RemoteResult<bool>;

    /// `action_log_scan_event`, best-effort
    async fn log_scan_event(&self, barcode: &str, status: &str, message: &str) -> RemoteResult<()>;
}

/// Run a remote call with a deadline; expiry maps to [`RemoteError::Timeout`]
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(timeout)),
    }
}
