//! Guard-level errors

use shared::ErrorCode;
use thiserror::Error;

use crate::remote::RemoteError;
use crate::session::SessionError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum GuardError {
    /// Snapshot load failed; scanning stays blocked until a reload succeeds
    #[error("Snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    /// Pre-flight stock check failed; the picking may not start
    #[error("Picking blocked: {0}")]
    PreflightBlocked(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GuardError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GuardError::SnapshotUnavailable(_) => ErrorCode::SnapshotUnavailable,
            GuardError::PreflightBlocked(_) => ErrorCode::InsufficientStock,
            GuardError::Storage(_) => ErrorCode::StorageError,
            GuardError::Session(SessionError::DuplicateScan(_)) => ErrorCode::DuplicateScan,
            GuardError::Session(SessionError::Crypto(_)) => ErrorCode::EncryptionFailed,
            GuardError::Session(_) => ErrorCode::StorageError,
            GuardError::Remote(e) if e.is_network() => ErrorCode::NetworkUnavailable,
            GuardError::Remote(RemoteError::InvalidResponse(_)) => ErrorCode::InvalidResponse,
            GuardError::Remote(_) => ErrorCode::RemoteRejected,
            GuardError::Config(_) => ErrorCode::ConfigError,
        }
    }
}

pub type GuardResult<T> = Result<T, GuardError>;
