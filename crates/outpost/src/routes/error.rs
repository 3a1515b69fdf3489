//! JSON error responses.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use questline_common::QuestlineError;

/// Handler error rendered as `{success: false, error, message}`
#[derive(Debug)]
pub struct ApiError(pub QuestlineError);

impl From<QuestlineError> for ApiError {
    fn from(err: QuestlineError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_available: Option<DateTime<Utc>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Client errors are already visible in the trace layer
        if status.is_server_error() {
            tracing::error!(error = %self.0, kind = self.0.kind(), "Request failed");
        }

        let next_available = match &self.0 {
            QuestlineError::NotEligible { next_available, .. } => *next_available,
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            error: self.0.kind(),
            message: self.0.public_message(),
            next_available,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after_secs(&self.0) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Suggested wait before retrying, for retryable errors only
fn retry_after_secs(err: &QuestlineError) -> Option<u64> {
    if !err.is_retryable() {
        return None;
    }
    match err {
        // Limiter windows are one minute long
        QuestlineError::RateLimited(_) => Some(60),
        _ => Some(5),
    }
}
