//! Common error types for Questline components.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::totp::OtpError;
use crate::types::CodeRejection;

/// Common errors across Questline components
#[derive(Debug, Error)]
pub enum QuestlineError {
    /// Backing store connection/operation error
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Mission, code, or other record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identity may not attempt this mission right now
    #[error("Not eligible: {reason}")]
    NotEligible {
        reason: String,
        next_available: Option<DateTime<Utc>>,
    },

    /// Submitted mission code was rejected
    #[error("Code rejected: {}", .0.message())]
    CodeRejected(CodeRejection),

    /// Balance does not cover a spend
    #[error("Insufficient credits: balance {balance}, cost {cost}")]
    InsufficientCredits { balance: i64, cost: i64 },

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Authentication/authorization error
    #[error("Auth error: {0}")]
    Unauthorized(String),

    /// One-time code computation failed
    #[error("OTP error: {0}")]
    Otp(#[from] OtpError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuestlineError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Store(_) => 503,
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::NotEligible { .. } => 403,
            Self::CodeRejected(_) => 400,
            Self::InsufficientCredits { .. } => 402,
            Self::RateLimited(_) => 429,
            Self::Unauthorized(_) => 401,
            Self::Otp(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Short machine-readable kind for API responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store_unavailable",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::NotEligible { .. } => "not_eligible",
            Self::CodeRejected(rejection) => rejection.kind(),
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::RateLimited(_) => "rate_limited",
            Self::Unauthorized(_) => "unauthorized",
            Self::Otp(_) => "otp",
            Self::Internal(_) => "internal",
        }
    }

    /// Message safe to show an end user
    pub fn public_message(&self) -> String {
        match self {
            Self::NotEligible { reason, .. } => reason.clone(),
            Self::CodeRejected(rejection) => rejection.message().to_string(),
            Self::InsufficientCredits { balance, cost } => format!(
                "Not enough credits. Required: {}, available: {}.",
                cost, balance
            ),
            Self::InvalidInput(msg)
            | Self::NotFound(msg)
            | Self::RateLimited(msg)
            | Self::Unauthorized(msg) => msg.clone(),
            Self::Store(_) => "Service temporarily unavailable. Please try again.".to_string(),
            Self::Otp(_) | Self::Internal(_) => "Internal server error.".to_string(),
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::RateLimited(_))
    }
}
