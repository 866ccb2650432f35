//! Payloads exchanged with the ERP `stock.picking` methods

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::session::ScanEntry;
use super::snapshot::Snapshot;
use super::{LineId, LocationId, LotId, PickingId};

/// `status` field of ERP responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcStatus {
    Success,
    #[serde(other)]
    Error,
}

impl RpcStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RpcStatus::Success)
    }
}

/// `get_picking_snapshot(picking_id)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub status: RpcStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Snapshot>,
}

/// `action_scan_product_strict(picking_id, barcode, location_id, lot_id?, scan_id=)`
///
/// `scan_id` is the same id a later `process_offline_scans` replay carries,
/// so the server counts the scan once when the answer was lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrictScanRequest {
    pub scan_id: String,
    pub picking_id: PickingId,
    pub barcode: String,
    pub location_id: LocationId,
    pub lot_id: Option<LotId>,
}

/// Authoritative line state returned with a successful strict scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanDetails {
    #[serde(default)]
    pub line_id: Option<LineId>,
    #[serde(default)]
    pub qty_done: Option<Decimal>,
    #[serde(default)]
    pub qty_remaining: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrictScanResponse {
    pub status: RpcStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub details: Option<ScanDetails>,
}

/// One queued scan in a `process_offline_scans` batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineScan {
    pub scan_id: String,
    pub barcode: String,
    pub location_id: LocationId,
    pub lot_id: Option<LotId>,
    pub timestamp: i64,
}

impl From<&ScanEntry> for OfflineScan {
    fn from(entry: &ScanEntry) -> Self {
        Self {
            scan_id: entry.scan_id.clone(),
            barcode: entry.barcode.clone(),
            location_id: entry.locked_location_id,
            lot_id: entry.lot_id,
            timestamp: entry.timestamp,
        }
    }
}

/// `process_offline_scans(picking_id, scans)`, all-or-nothing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSyncResponse {
    pub status: RpcStatus,
    #[serde(default)]
    pub message: Option<String>,
}
