//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// - 1xxx: Scan validation rejections
/// - 2xxx: Stock errors
/// - 3xxx: Session errors
/// - 4xxx: Remote errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Scan validation rejections (1xxx)
    Validation,
    /// Stock errors (2xxx)
    Stock,
    /// Session / local storage errors (3xxx)
    Session,
    /// Remote errors (4xxx)
    Remote,
    /// System errors (everything else)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            1000..2000 => Self::Validation,
            2000..3000 => Self::Stock,
            3000..4000 => Self::Session,
            4000..5000 => Self::Remote,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Stock => "stock",
            Self::Session => "session",
            Self::Remote => "remote",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}
