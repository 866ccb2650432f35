//! Scan session: locally persisted record of one device's scans for one picking

use serde::{Deserialize, Serialize};

use super::{LineId, LocationId, LotId, PickingId};
use crate::error::ErrorCode;

/// Result of the last remote submission of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

/// One scan attempt that passed local validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    /// Unique within the session, doubles as the server-side idempotency key
    pub scan_id: String,
    pub barcode: String,
    pub locked_location_id: LocationId,
    #[serde(default)]
    pub lot_id: Option<LotId>,
    /// Snapshot line the scan was counted against
    #[serde(default)]
    pub line_id: Option<LineId>,
    /// Unix millis
    pub timestamp: i64,
    pub synced: bool,
    #[serde(default)]
    pub last_sync_status: Option<SyncStatus>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ScanEntry {
    pub fn new(
        barcode: impl Into<String>,
        locked_location_id: LocationId,
        lot_id: Option<LotId>,
        line_id: Option<LineId>,
    ) -> Self {
        Self {
            scan_id: uuid::Uuid::new_v4().to_string(),
            barcode: barcode.into(),
            locked_location_id,
            lot_id,
            line_id,
            timestamp: crate::util::now_millis(),
            synced: false,
            last_sync_status: None,
            error_code: None,
            error_message: None,
        }
    }
}

/// Audit event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventType {
    Scan,
    ValidationFail,
    Override,
    Error,
}

impl std::fmt::Display for LogEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogEventType::Scan => write!(f, "scan"),
            LogEventType::ValidationFail => write!(f, "validation_fail"),
            LogEventType::Override => write!(f, "override"),
            LogEventType::Error => write!(f, "error"),
        }
    }
}

/// Audit log entry, append-only (only `synced` ever changes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix millis
    pub timestamp: i64,
    pub event_type: LogEventType,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub reason_code: Option<ErrorCode>,
    #[serde(default)]
    pub details: Option<String>,
    pub synced: bool,
}

impl LogEntry {
    pub fn new(event_type: LogEventType) -> Self {
        Self {
            timestamp: crate::util::now_millis(),
            event_type,
            barcode: None,
            reason_code: None,
            details: None,
            synced: false,
        }
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    pub fn with_reason(mut self, code: ErrorCode) -> Self {
        self.reason_code = Some(code);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Session for one device + picking pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// `<picking_id>_<created_at>`, best-effort unique
    pub id: String,
    pub picking_id: PickingId,
    pub created_at: i64,
    #[serde(default)]
    pub scans: Vec<ScanEntry>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl Session {
    pub fn new(picking_id: PickingId) -> Self {
        let created_at = crate::util::now_millis();
        Self {
            id: format!("{picking_id}_{created_at}"),
            picking_id,
            created_at,
            scans: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn has_unsynced(&self) -> bool {
        self.scans.iter().any(|s| !s.synced) || self.logs.iter().any(|l| !l.synced)
    }
}
