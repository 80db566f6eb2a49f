use std::time::Duration;

use thiserror::Error;

/// Message fragments the remote service uses when it rejects a key.
///
/// Only consulted when a response carries no structured reason; message text
/// is not a stable contract, so a miss here surfaces as a plain remote failure.
pub const CREDENTIAL_SIGNATURES: &[&str] =
    &["API key not valid", "Requested entity was not found."];

const CREDENTIAL_REASONS: &[&str] = &[
    "API_KEY_INVALID",
    "API_KEY_EXPIRED",
    "API_KEY_SERVICE_BLOCKED",
];

pub type StudioResult<T> = Result<T, StudioError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StudioError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Credential(String),

    #[error("{0}")]
    Remote(String),

    #[error("Video generation failed or returned no link.")]
    MissingResult,

    #[error("Failed to download video: {0}")]
    Download(String),

    #[error("Video generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Video generation was cancelled")]
    Cancelled,

    #[error("{0} is already in progress")]
    Busy(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StudioError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential(_))
    }

    /// Stable category name used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Credential(_) => "credential",
            Self::Remote(_) | Self::MissingResult => "remote",
            Self::Download(_) => "download",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Busy(_) => "busy",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<reqwest::Error> for StudioError {
    fn from(err: reqwest::Error) -> Self {
        Self::Remote(err.to_string())
    }
}

impl From<std::io::Error> for StudioError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Classifies a failure reported by the remote service.
///
/// Structured signals (an auth reason code, or an auth status on a 401/403)
/// win; the message-substring check is the fallback.
pub fn classify_remote_failure(
    http_status: Option<u16>,
    api_status: Option<&str>,
    reasons: &[String],
    message: &str,
) -> StudioError {
    let reason_match = reasons
        .iter()
        .any(|reason| CREDENTIAL_REASONS.contains(&reason.as_str()));
    let status_match = matches!(http_status, Some(401 | 403))
        && matches!(api_status, Some("UNAUTHENTICATED" | "PERMISSION_DENIED"));
    if reason_match || status_match || matches_credential_signature(message) {
        return StudioError::Credential(message.to_string());
    }
    StudioError::Remote(message.to_string())
}

pub fn matches_credential_signature(message: &str) -> bool {
    CREDENTIAL_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}
