//! # oldpho-core
//!
//! Deterministic building blocks for the OldPho restoration pipeline.
//!
//! This crate answers two questions without doing any I/O:
//! - What went wrong? ([`classify`] turns any failure into [`ErrorDetails`])
//! - What do callers see? (the shared value types in [`types`])
//!
//! ## Example
//!
//! ```rust
//! use oldpho_core::{classify_message, ErrorCode, Locale};
//!
//! let details = classify_message("HTTP 429 Too Many Requests", Locale::En);
//! assert_eq!(details.code, ErrorCode::RateLimitExceeded);
//! assert!(!details.retryable);
//! ```

pub mod errors;
pub mod types;

pub use errors::{
    classify, classify_message, code_for_message, details_for_code, ErrorCategory, ErrorCode,
    ErrorDetails, Locale, LocalizedMessage, Severity, UnsupportedLocale, UserFacingError,
};
pub use types::{ProcessingResult, ProviderInfo, ProviderStatsSnapshot, QueueStatus, RestoredImage};
