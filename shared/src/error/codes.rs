//! Unified error codes for strict picking
//!
//! Error codes are shared between the scan client, the audit log and the ERP
//! side, so they are plain `u16` values on the wire. Organized by range:
//! - 1xxx: Scan validation rejections
//! - 2xxx: Stock errors
//! - 3xxx: Session / local storage errors
//! - 4xxx: Remote errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 1xxx: Scan validation ====================
    /// Picking snapshot has not been loaded yet
    SystemNotReady = 1001,
    /// Location or item does not belong to the locked location
    WrongLocation = 1002,
    /// A product or lot was scanned before any location
    LocationRequired = 1003,
    /// Every line at the scanned location is already done
    LocationComplete = 1004,
    /// Product is lot/serial tracked, the lot barcode must be scanned
    LotRequired = 1005,
    /// Lot does not match the lot reserved at this location
    LotMismatch = 1006,
    /// Unknown barcode or item not part of the picking
    UnauthorizedItem = 1007,
    /// Reserved quantity already fully scanned
    QuantityExceeded = 1008,

    // ==================== 2xxx: Stock ====================
    /// Available quantity at source is below the reserved quantity
    InsufficientStock = 2001,

    // ==================== 3xxx: Session ====================
    /// Stored session could neither be decrypted nor parsed
    SessionCorrupt = 3001,
    /// Local storage read/write failed
    StorageError = 3002,
    /// Encryption or decryption failed
    EncryptionFailed = 3003,
    /// Scan id already present in the session
    DuplicateScan = 3004,

    // ==================== 4xxx: Remote ====================
    /// Remote call failed or timed out
    NetworkUnavailable = 4001,
    /// Picking snapshot could not be loaded
    SnapshotUnavailable = 4002,
    /// Remote authority explicitly rejected the scan
    RemoteRejected = 4003,
    /// Remote returned a payload we could not understand
    InvalidResponse = 4004,

    // ==================== 9xxx: System ====================
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Scan validation rejections (1xxx) are per-scan outcomes, never failures
    #[inline]
    pub const fn is_rejection(&self) -> bool {
        let code = self.code();
        code >= 1000 && code < 2000
    }

    pub const fn message(&self) -> &'static str {
        match self {
            // Scan validation
            ErrorCode::SystemNotReady => "System is not ready, picking data is still loading",
            ErrorCode::WrongLocation => "This location does not belong to the selected picking",
            ErrorCode::LocationRequired => "Please scan a location first",
            ErrorCode::LocationComplete => "Nothing left to pick at this location",
            ErrorCode::LotRequired => "This product is tracked, please scan the lot/serial barcode",
            ErrorCode::LotMismatch => "This lot is not the one reserved at this location",
            ErrorCode::UnauthorizedItem => "Item is not part of this picking",
            ErrorCode::QuantityExceeded => "Reserved quantity already scanned",

            // Stock
            ErrorCode::InsufficientStock => "Insufficient stock at source location",

            // Session
            ErrorCode::SessionCorrupt => "Stored scan session is corrupt",
            ErrorCode::StorageError => "Local storage error",
            ErrorCode::EncryptionFailed => "Session encryption failed",
            ErrorCode::DuplicateScan => "Scan already recorded",

            // Remote
            ErrorCode::NetworkUnavailable => "Server unreachable, scan queued",
            ErrorCode::SnapshotUnavailable => "Picking data could not be loaded",
            ErrorCode::RemoteRejected => "Scan rejected by server",
            ErrorCode::InvalidResponse => "Invalid response from server",

            // System
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // Scan validation
            1001 => Ok(ErrorCode::SystemNotReady),
            1002 => Ok(ErrorCode::WrongLocation),
            1003 => Ok(ErrorCode::LocationRequired),
            1004 => Ok(ErrorCode::LocationComplete),
            1005 => Ok(ErrorCode::LotRequired),
            1006 => Ok(ErrorCode::LotMismatch),
            1007 => Ok(ErrorCode::UnauthorizedItem),
            1008 => Ok(ErrorCode::QuantityExceeded),

            // Stock
            2001 => Ok(ErrorCode::InsufficientStock),

            // Session
            3001 => Ok(ErrorCode::SessionCorrupt),
            3002 => Ok(ErrorCode::StorageError),
            3003 => Ok(ErrorCode::EncryptionFailed),
            3004 => Ok(ErrorCode::DuplicateScan),

            // Remote
            4001 => Ok(ErrorCode::NetworkUnavailable),
            4002 => Ok(ErrorCode::SnapshotUnavailable),
            4003 => Ok(ErrorCode::RemoteRejected),
            4004 => Ok(ErrorCode::InvalidResponse),

            // System
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}
