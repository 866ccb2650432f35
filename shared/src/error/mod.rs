//! Unified error codes for strict picking
//!
//! - [`ErrorCode`]: Standardized numeric codes for every rejection and failure
//! - [`ErrorCategory`]: Classification of codes by range
//!
//! # Example
//!
//! ```
//! use shared::error::{ErrorCategory, ErrorCode};
//!
//! let code = ErrorCode::LocationRequired;
//! assert!(code.is_rejection());
//! assert_eq!(code.category(), ErrorCategory::Validation);
//! assert_eq!(u16::from(code), 1003);
//! ```

mod category;
mod codes;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
