//! Error taxonomy for the restoration pipeline.
//!
//! Every failure that crosses the classification boundary becomes an
//! [`ErrorDetails`]: a stable code, a category, a severity, a retry hint and
//! a localized message with suggestions. Raw upstream text is kept in
//! `message` for logs but never shown to end users.

mod classifier;
mod locale;

pub use classifier::{classify, classify_message, code_for_message, details_for_code};
pub use locale::{Locale, LocalizedMessage, UnsupportedLocale};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes.
///
/// Serialized as `SCREAMING_SNAKE_CASE` (e.g. `REPLICATE_QUOTA_EXCEEDED`),
/// which is the form HTTP adapters and analytics consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // API
    ReplicateApiError,
    ReplicateQuotaExceeded,
    ReplicateModelUnavailable,
    ReplicateInvalidInput,

    // Processing
    ProcessingTimeout,
    ProcessingFailed,

    // Validation
    InvalidImageFormat,
    ImageTooLarge,
    CorruptedImage,
    NsfwContentDetected,

    // Rate limiting
    RateLimitExceeded,
    DailyLimitExceeded,
    MonthlyLimitExceeded,

    // Network
    NetworkError,
    ConnectionTimeout,
    ServiceUnavailable,

    // Auth
    AuthRequired,
    SessionExpired,
    InvalidCredentials,

    // System
    StorageError,
    CacheError,
    DatabaseError,
    UnknownError,
}

impl ErrorCode {
    /// Every code, in declaration order.
    pub const ALL: [ErrorCode; 23] = [
        ErrorCode::ReplicateApiError,
        ErrorCode::ReplicateQuotaExceeded,
        ErrorCode::ReplicateModelUnavailable,
        ErrorCode::ReplicateInvalidInput,
        ErrorCode::ProcessingTimeout,
        ErrorCode::ProcessingFailed,
        ErrorCode::InvalidImageFormat,
        ErrorCode::ImageTooLarge,
        ErrorCode::CorruptedImage,
        ErrorCode::NsfwContentDetected,
        ErrorCode::RateLimitExceeded,
        ErrorCode::DailyLimitExceeded,
        ErrorCode::MonthlyLimitExceeded,
        ErrorCode::NetworkError,
        ErrorCode::ConnectionTimeout,
        ErrorCode::ServiceUnavailable,
        ErrorCode::AuthRequired,
        ErrorCode::SessionExpired,
        ErrorCode::InvalidCredentials,
        ErrorCode::StorageError,
        ErrorCode::CacheError,
        ErrorCode::DatabaseError,
        ErrorCode::UnknownError,
    ];

    /// Wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ReplicateApiError => "REPLICATE_API_ERROR",
            ErrorCode::ReplicateQuotaExceeded => "REPLICATE_QUOTA_EXCEEDED",
            ErrorCode::ReplicateModelUnavailable => "REPLICATE_MODEL_UNAVAILABLE",
            ErrorCode::ReplicateInvalidInput => "REPLICATE_INVALID_INPUT",
            ErrorCode::ProcessingTimeout => "PROCESSING_TIMEOUT",
            ErrorCode::ProcessingFailed => "PROCESSING_FAILED",
            ErrorCode::InvalidImageFormat => "INVALID_IMAGE_FORMAT",
            ErrorCode::ImageTooLarge => "IMAGE_TOO_LARGE",
            ErrorCode::CorruptedImage => "CORRUPTED_IMAGE",
            ErrorCode::NsfwContentDetected => "NSFW_CONTENT_DETECTED",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::DailyLimitExceeded => "DAILY_LIMIT_EXCEEDED",
            ErrorCode::MonthlyLimitExceeded => "MONTHLY_LIMIT_EXCEEDED",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ConnectionTimeout => "CONNECTION_TIMEOUT",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Category this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            ReplicateApiError | ReplicateQuotaExceeded | ReplicateModelUnavailable
            | ReplicateInvalidInput => ErrorCategory::Api,
            ProcessingTimeout | ProcessingFailed => ErrorCategory::Processing,
            InvalidImageFormat | ImageTooLarge | CorruptedImage | NsfwContentDetected => {
                ErrorCategory::Validation
            }
            RateLimitExceeded | DailyLimitExceeded | MonthlyLimitExceeded => {
                ErrorCategory::RateLimit
            }
            NetworkError | ConnectionTimeout | ServiceUnavailable => ErrorCategory::Network,
            AuthRequired | SessionExpired | InvalidCredentials => ErrorCategory::Auth,
            StorageError | CacheError | DatabaseError | UnknownError => ErrorCategory::System,
        }
    }

    /// Severity used for escalation.
    pub fn severity(&self) -> Severity {
        use ErrorCode::*;
        match self {
            ReplicateQuotaExceeded | DatabaseError => Severity::Critical,
            ReplicateApiError | ReplicateModelUnavailable | ServiceUnavailable
            | InvalidCredentials | StorageError => Severity::High,
            ReplicateInvalidInput | ProcessingTimeout | ProcessingFailed | NsfwContentDetected
            | RateLimitExceeded | DailyLimitExceeded | MonthlyLimitExceeded | NetworkError
            | ConnectionTimeout | AuthRequired | UnknownError => Severity::Medium,
            InvalidImageFormat | ImageTooLarge | CorruptedImage | SessionExpired | CacheError => {
                Severity::Low
            }
        }
    }

    /// Whether retrying the same operation can plausibly succeed.
    ///
    /// Network failures and transient API/processing/system failures are
    /// retryable. Validation, rate limiting and auth never are; neither are
    /// quota exhaustion, rejected input, or unrecognized errors.
    pub fn retryable(&self) -> bool {
        use ErrorCode::*;
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::RateLimit | ErrorCategory::Auth => false,
            ErrorCategory::Network => true,
            ErrorCategory::Api | ErrorCategory::Processing | ErrorCategory::System => {
                !matches!(self, ReplicateQuotaExceeded | ReplicateInvalidInput | UnknownError)
            }
        }
    }

    /// Codes that mean a provider is exhausted for now and should be benched.
    pub fn trips_provider_circuit(&self) -> bool {
        matches!(
            self,
            ErrorCode::ReplicateQuotaExceeded
                | ErrorCode::RateLimitExceeded
                | ErrorCode::DailyLimitExceeded
                | ErrorCode::MonthlyLimitExceeded
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Api,
    Network,
    Validation,
    RateLimit,
    Processing,
    Auth,
    System,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Api => "api",
            ErrorCategory::Network => "network",
            ErrorCategory::Validation => "validation",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Processing => "processing",
            ErrorCategory::Auth => "auth",
            ErrorCategory::System => "system",
        };
        f.write_str(s)
    }
}

/// Error severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and critical errors are escalated beyond plain logging.
    pub fn escalates(&self) -> bool {
        *self >= Severity::High
    }
}

/// A classified error. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,

    /// Technical message, for logs only
    pub message: String,

    /// Localized message safe to show to users
    pub user_message: String,

    pub retryable: bool,
    pub severity: Severity,
    pub category: ErrorCategory,
    pub timestamp: DateTime<Utc>,

    /// Actionable suggestions, localized
    pub suggestions: Vec<String>,
}

impl ErrorDetails {
    /// Strip internal details for an outward-facing response.
    pub fn to_user_response(&self) -> UserFacingError {
        UserFacingError {
            code: self.code,
            message: self.user_message.clone(),
            retryable: self.retryable,
            suggestions: self.suggestions.clone(),
        }
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)
    }
}

/// What an HTTP adapter may return to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    pub suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde() {
        for code in ErrorCode::ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_retryable_by_category() {
        assert!(ErrorCode::NetworkError.retryable());
        assert!(ErrorCode::ProcessingTimeout.retryable());
        assert!(ErrorCode::ReplicateModelUnavailable.retryable());
        assert!(!ErrorCode::InvalidImageFormat.retryable());
        assert!(!ErrorCode::RateLimitExceeded.retryable());
        assert!(!ErrorCode::InvalidCredentials.retryable());
        assert!(!ErrorCode::ReplicateQuotaExceeded.retryable());
    }

    #[test]
    fn test_circuit_tripping_codes() {
        assert!(ErrorCode::ReplicateQuotaExceeded.trips_provider_circuit());
        assert!(ErrorCode::RateLimitExceeded.trips_provider_circuit());
        assert!(!ErrorCode::NetworkError.trips_provider_circuit());
        assert!(!ErrorCode::ProcessingFailed.trips_provider_circuit());
    }

    #[test]
    fn test_severity_escalation() {
        assert!(Severity::Critical.escalates());
        assert!(Severity::High.escalates());
        assert!(!Severity::Medium.escalates());
        assert!(!Severity::Low.escalates());
    }

    #[test]
    fn test_user_response_hides_technical_message() {
        let details = details_for_code(
            ErrorCode::NetworkError,
            "ECONNREFUSED 10.0.0.7:443",
            Locale::En,
        );
        let response = details.to_user_response();
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("10.0.0.7"));
        assert_eq!(response.code, ErrorCode::NetworkError);
    }
}
