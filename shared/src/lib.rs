//! Shared types for strict picking
//!
//! Data model and wire payloads used by the scan client and the ERP side,
//! plus the unified error code taxonomy.

pub mod error;
pub mod picking;
pub mod util;

// Re-exports
pub use error::{ErrorCategory, ErrorCode};
