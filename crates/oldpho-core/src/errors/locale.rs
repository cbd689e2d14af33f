//! Localized user-facing messages for error codes.
//!
//! English is the default locale and is complete. Other locales may cover
//! only a subset of codes; missing entries fall back to English.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::ErrorCode;

/// Supported locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Vi,
}

/// Returned when parsing an unknown locale tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported locale: {0}")]
pub struct UnsupportedLocale(pub String);

impl Locale {
    /// Best-effort mapping from a language tag (`vi`, `vi-VN`, `en_US`).
    /// Unknown tags map to the default locale.
    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Vi => "vi",
        }
    }
}

impl FromStr for Locale {
    type Err = UnsupportedLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let primary = s
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Ok(Locale::En),
            "vi" => Ok(Locale::Vi),
            _ => Err(UnsupportedLocale(s.to_string())),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message and its suggestions in one locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalizedMessage {
    pub message: &'static str,
    pub suggestions: &'static [&'static str],
}

const fn entry(message: &'static str, suggestions: &'static [&'static str]) -> LocalizedMessage {
    LocalizedMessage {
        message,
        suggestions,
    }
}

/// Look up a code, falling back to English.
pub(crate) fn lookup(code: ErrorCode, locale: Locale) -> LocalizedMessage {
    let found = match locale {
        Locale::En => Some(english(code)),
        Locale::Vi => vietnamese(code),
    };
    found.unwrap_or_else(|| english(code))
}

fn english(code: ErrorCode) -> LocalizedMessage {
    use ErrorCode::*;
    match code {
        ReplicateApiError => entry(
            "The restoration service returned an error.",
            &["Please try again in a few minutes", "Contact support if the problem persists"],
        ),
        ReplicateQuotaExceeded => entry(
            "The restoration service is temporarily over capacity.",
            &["Please try again later", "We are switching to a backup service"],
        ),
        ReplicateModelUnavailable => entry(
            "The restoration model is currently unavailable.",
            &["Please try again in a few minutes"],
        ),
        ReplicateInvalidInput => entry(
            "The restoration service could not accept this image.",
            &["Try a different photo", "Make sure the image is a JPG or PNG"],
        ),
        ProcessingTimeout => entry(
            "Processing took too long and was stopped.",
            &["Try a smaller image", "Please try again"],
        ),
        ProcessingFailed => entry(
            "We could not restore this photo.",
            &["Please try again", "Try a photo with better lighting or resolution"],
        ),
        InvalidImageFormat => entry(
            "This file format is not supported.",
            &["Upload a JPG, PNG or WebP image"],
        ),
        ImageTooLarge => entry(
            "The image is too large.",
            &["Upload an image smaller than 10MB", "Resize the image before uploading"],
        ),
        CorruptedImage => entry(
            "The image file appears to be damaged.",
            &["Re-scan or re-export the photo", "Try a different copy of the file"],
        ),
        NsfwContentDetected => entry(
            "This image cannot be processed because it may contain inappropriate content.",
            &["Upload a different photo"],
        ),
        RateLimitExceeded => entry(
            "Too many requests. Please slow down.",
            &["Wait a minute before trying again"],
        ),
        DailyLimitExceeded => entry(
            "You have reached your daily restoration limit.",
            &["Try again tomorrow", "Upgrade your plan for more restorations"],
        ),
        MonthlyLimitExceeded => entry(
            "You have reached your monthly restoration limit.",
            &["Upgrade your plan for more restorations"],
        ),
        NetworkError => entry(
            "A network error occurred.",
            &["Check your internet connection", "Please try again"],
        ),
        ConnectionTimeout => entry(
            "The connection timed out.",
            &["Check your internet connection", "Please try again"],
        ),
        ServiceUnavailable => entry(
            "The service is temporarily unavailable.",
            &["Please try again in a few minutes"],
        ),
        AuthRequired => entry(
            "Please sign in to continue.",
            &["Sign in with your account"],
        ),
        SessionExpired => entry(
            "Your session has expired.",
            &["Sign in again"],
        ),
        InvalidCredentials => entry(
            "Authentication failed.",
            &["Check your credentials and sign in again"],
        ),
        StorageError => entry(
            "We could not store your image.",
            &["Please try again later"],
        ),
        CacheError => entry(
            "A temporary storage error occurred.",
            &["Please try again"],
        ),
        DatabaseError => entry(
            "A server error occurred.",
            &["Please try again later", "Contact support if the problem persists"],
        ),
        UnknownError => entry(
            "An unexpected error occurred.",
            &["Please try again", "Contact support if the problem persists"],
        ),
    }
}

fn vietnamese(code: ErrorCode) -> Option<LocalizedMessage> {
    use ErrorCode::*;
    let found = match code {
        ReplicateQuotaExceeded => entry(
            "Dịch vụ phục hồi ảnh tạm thời quá tải.",
            &["Vui lòng thử lại sau", "Chúng tôi đang chuyển sang dịch vụ dự phòng"],
        ),
        ProcessingTimeout => entry(
            "Quá trình xử lý mất quá nhiều thời gian.",
            &["Hãy thử với ảnh nhỏ hơn", "Vui lòng thử lại"],
        ),
        ProcessingFailed => entry(
            "Không thể phục hồi ảnh này.",
            &["Vui lòng thử lại"],
        ),
        InvalidImageFormat => entry(
            "Định dạng tệp không được hỗ trợ.",
            &["Hãy tải lên ảnh JPG, PNG hoặc WebP"],
        ),
        ImageTooLarge => entry(
            "Ảnh quá lớn.",
            &["Hãy tải lên ảnh nhỏ hơn 10MB"],
        ),
        NsfwContentDetected => entry(
            "Không thể xử lý ảnh này vì có thể chứa nội dung không phù hợp.",
            &["Hãy tải lên một ảnh khác"],
        ),
        RateLimitExceeded => entry(
            "Quá nhiều yêu cầu. Vui lòng chậm lại.",
            &["Đợi một phút rồi thử lại"],
        ),
        DailyLimitExceeded => entry(
            "Bạn đã đạt giới hạn phục hồi trong ngày.",
            &["Hãy thử lại vào ngày mai", "Nâng cấp gói để phục hồi nhiều ảnh hơn"],
        ),
        NetworkError => entry(
            "Đã xảy ra lỗi mạng.",
            &["Kiểm tra kết nối internet", "Vui lòng thử lại"],
        ),
        AuthRequired => entry(
            "Vui lòng đăng nhập để tiếp tục.",
            &["Đăng nhập bằng tài khoản của bạn"],
        ),
        UnknownError => entry(
            "Đã xảy ra lỗi không mong muốn.",
            &["Vui lòng thử lại"],
        ),
        _ => return None,
    };
    Some(found)
}
