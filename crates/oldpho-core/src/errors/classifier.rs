//! Message-based error classification.
//!
//! Rules are matched in order against the full error text (including the
//! source chain); the first match wins. Anything unmatched becomes
//! `UNKNOWN_ERROR`, so classification is total and never fails.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use std::error::Error as StdError;

use super::locale::{self, Locale};
use super::{ErrorCode, ErrorDetails};

lazy_static! {
    static ref RULES: Vec<(Regex, ErrorCode)> = vec![
        // API limits come first: "quota" messages often also mention rate limits.
        (
            Regex::new(r"(?i)quota|insufficient (credit|fund|balance)|billing (hard )?limit|payment required|\b402\b").unwrap(),
            ErrorCode::ReplicateQuotaExceeded,
        ),
        (
            Regex::new(r"(?i)daily (limit|quota|cap)").unwrap(),
            ErrorCode::DailyLimitExceeded,
        ),
        (
            Regex::new(r"(?i)monthly (limit|quota|cap)").unwrap(),
            ErrorCode::MonthlyLimitExceeded,
        ),
        (
            Regex::new(r"(?i)rate[ _-]?limit|too many requests|\b429\b|throttl").unwrap(),
            ErrorCode::RateLimitExceeded,
        ),
        (
            Regex::new(r"(?i)model\b.{0,40}\b(unavailable|not found|does not exist|is loading|offline)|version .{0,40}not found").unwrap(),
            ErrorCode::ReplicateModelUnavailable,
        ),
        (
            Regex::new(r"(?i)invalid[ _]input|unprocessable|\b422\b").unwrap(),
            ErrorCode::ReplicateInvalidInput,
        ),

        // Connection timeouts are network failures, not processing timeouts.
        (
            Regex::new(r"(?i)connection tim(ed )?out|connect timeout|etimedout").unwrap(),
            ErrorCode::ConnectionTimeout,
        ),
        (
            Regex::new(r"(?i)timeout|timed out|deadline exceeded").unwrap(),
            ErrorCode::ProcessingTimeout,
        ),
        (
            Regex::new(r"(?i)processing failed|prediction (failed|canceled|cancelled)|restoration failed").unwrap(),
            ErrorCode::ProcessingFailed,
        ),

        // Validation
        (
            Regex::new(r"(?i)invalid (image )?format|unsupported (image |file )?(format|type)|not a valid image|unrecognized image").unwrap(),
            ErrorCode::InvalidImageFormat,
        ),
        (
            Regex::new(r"(?i)too large|file size|payload too large|exceeds (the )?(maximum|max) size|\b413\b").unwrap(),
            ErrorCode::ImageTooLarge,
        ),
        (
            Regex::new(r"(?i)corrupt|truncated image|malformed image").unwrap(),
            ErrorCode::CorruptedImage,
        ),
        (
            Regex::new(r"(?i)nsfw|inappropriate|explicit content|content policy|safety system").unwrap(),
            ErrorCode::NsfwContentDetected,
        ),

        // Network
        (
            Regex::new(r"(?i)service unavailable|bad gateway|\b50[234]\b|overloaded").unwrap(),
            ErrorCode::ServiceUnavailable,
        ),
        (
            Regex::new(r"(?i)network|fetch failed|econnrefused|econnreset|enotfound|socket hang up|connection (refused|reset|closed|error)|dns|unreachable").unwrap(),
            ErrorCode::NetworkError,
        ),

        // Auth
        (
            Regex::new(r"(?i)(session|token|jwt) (has )?expired").unwrap(),
            ErrorCode::SessionExpired,
        ),
        (
            Regex::new(r"(?i)invalid (api )?(key|token|credential)|incorrect api key|unauthori[sz]ed|authentication failed|\b401\b").unwrap(),
            ErrorCode::InvalidCredentials,
        ),
        (
            Regex::new(r"(?i)auth(entication)? required|not authenticated|login required|forbidden|\b403\b|not configured|missing (api )?(key|token|credential)").unwrap(),
            ErrorCode::AuthRequired,
        ),

        // System
        (
            Regex::new(r"(?i)database|prisma|\bsql|postgres").unwrap(),
            ErrorCode::DatabaseError,
        ),
        (
            Regex::new(r"(?i)cache").unwrap(),
            ErrorCode::CacheError,
        ),
        (
            Regex::new(r"(?i)storage|bucket|\bs3\b|disk|enospc|no space left").unwrap(),
            ErrorCode::StorageError,
        ),

        // Anything else the upstream API reported
        (
            Regex::new(r"(?i)replicate|openai|api error|upstream|\b5\d\d\b").unwrap(),
            ErrorCode::ReplicateApiError,
        ),
    ];
}

/// Map a raw error message to its code. Empty or unmatched text is
/// `UNKNOWN_ERROR`.
pub fn code_for_message(message: &str) -> ErrorCode {
    RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(message))
        .map(|(_, code)| *code)
        .unwrap_or(ErrorCode::UnknownError)
}

/// Classify a raw error message.
pub fn classify_message(message: &str, locale: Locale) -> ErrorDetails {
    let code = code_for_message(message);
    tracing::trace!(code = %code, "classified error message");
    details_for_code(code, message, locale)
}

/// Classify an error, including every error in its source chain.
pub fn classify<E>(error: &E, locale: Locale) -> ErrorDetails
where
    E: StdError + ?Sized,
{
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    classify_message(&text, locale)
}

/// Build the details for a known code.
pub fn details_for_code(code: ErrorCode, message: &str, locale: Locale) -> ErrorDetails {
    let localized = locale::lookup(code, locale);
    let message = if message.is_empty() {
        code.as_str().to_string()
    } else {
        message.to_string()
    };

    ErrorDetails {
        code,
        message,
        user_message: localized.message.to_string(),
        retryable: code.retryable(),
        severity: code.severity(),
        category: code.category(),
        timestamp: Utc::now(),
        suggestions: localized.suggestions.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCategory, Severity};
    use proptest::prelude::*;

    #[test]
    fn test_quota_detection() {
        let details = classify_message(
            "Replicate: You have exceeded your monthly spend quota",
            Locale::En,
        );
        assert_eq!(details.code, ErrorCode::ReplicateQuotaExceeded);
        assert_eq!(details.category, ErrorCategory::Api);
        assert_eq!(details.severity, Severity::Critical);
        assert!(!details.retryable);
    }

    #[test]
    fn test_rate_limit_detection() {
        assert_eq!(code_for_message("HTTP 429 Too Many Requests"), ErrorCode::RateLimitExceeded);
        assert_eq!(code_for_message("rate limit exceeded"), ErrorCode::RateLimitExceeded);
        assert_eq!(code_for_message("daily limit reached"), ErrorCode::DailyLimitExceeded);
        assert_eq!(code_for_message("Monthly limit reached"), ErrorCode::MonthlyLimitExceeded);
    }

    #[test]
    fn test_first_match_wins() {
        // Both "quota" and "rate limit" appear; quota is checked first.
        assert_eq!(
            code_for_message("rate limit hit because quota was exhausted"),
            ErrorCode::ReplicateQuotaExceeded
        );
        // Connection timeout is checked before the generic timeout rule.
        assert_eq!(code_for_message("connection timed out"), ErrorCode::ConnectionTimeout);
        assert_eq!(code_for_message("request timed out after 30s"), ErrorCode::ProcessingTimeout);
    }

    #[test]
    fn test_validation_codes() {
        assert_eq!(code_for_message("Unsupported image format: tiff"), ErrorCode::InvalidImageFormat);
        assert_eq!(code_for_message("File too large (12MB)"), ErrorCode::ImageTooLarge);
        assert_eq!(code_for_message("corrupted JPEG data"), ErrorCode::CorruptedImage);
        assert_eq!(code_for_message("NSFW content detected"), ErrorCode::NsfwContentDetected);
    }

    #[test]
    fn test_network_and_auth_codes() {
        assert_eq!(code_for_message("fetch failed: ECONNREFUSED"), ErrorCode::NetworkError);
        assert_eq!(code_for_message("503 Service Unavailable"), ErrorCode::ServiceUnavailable);
        assert_eq!(code_for_message("401 Unauthorized"), ErrorCode::InvalidCredentials);
        assert_eq!(code_for_message("session expired"), ErrorCode::SessionExpired);
        assert_eq!(code_for_message("login required"), ErrorCode::AuthRequired);
        assert_eq!(
            code_for_message("Provider not configured: replicate token missing"),
            ErrorCode::AuthRequired
        );
    }

    #[test]
    fn test_system_codes() {
        assert_eq!(code_for_message("database connection pool exhausted"), ErrorCode::DatabaseError);
        assert_eq!(code_for_message("cache write failed"), ErrorCode::CacheError);
        assert_eq!(code_for_message("ENOSPC: no space left on device"), ErrorCode::StorageError);
    }

    #[test]
    fn test_unknown_fallback() {
        let details = classify_message("something odd happened", Locale::En);
        assert_eq!(details.code, ErrorCode::UnknownError);
        assert_eq!(details.category, ErrorCategory::System);
        assert!(!details.user_message.is_empty());
    }

    #[test]
    fn test_empty_message_is_total() {
        let details = classify_message("", Locale::Vi);
        assert_eq!(details.code, ErrorCode::UnknownError);
        assert_eq!(details.message, "UNKNOWN_ERROR");
        assert!(!details.user_message.is_empty());
    }

    #[test]
    fn test_source_chain_is_considered() {
        #[derive(Debug)]
        struct Outer(std::io::Error);

        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "restore request failed")
            }
        }

        impl StdError for Outer {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "ECONNREFUSED",
        ));
        assert_eq!(classify(&err, Locale::En).code, ErrorCode::NetworkError);
    }

    #[test]
    fn test_localized_output() {
        let en = classify_message("rate limit exceeded", Locale::En);
        let vi = classify_message("rate limit exceeded", Locale::Vi);
        assert_eq!(en.code, vi.code);
        assert_ne!(en.user_message, vi.user_message);
        assert!(!vi.suggestions.is_empty());
    }

    proptest! {
        #[test]
        fn prop_classification_is_total(message in ".*") {
            let details = classify_message(&message, Locale::En);
            prop_assert!(!details.user_message.is_empty());
            prop_assert!(!details.message.is_empty());
            prop_assert_eq!(details.category, details.code.category());
            prop_assert_eq!(details.retryable, details.code.retryable());
        }
    }
}
