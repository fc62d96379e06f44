//! API error taxonomy and the structured response envelope.
//!
//! Every user-facing route funnels failures through [`ApiError`], which maps
//! each error class to an HTTP status and a `{"success":false,"error":...}`
//! body. Internal detail (stack traces, credentials) never reaches the wire.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad input shape or length (field-specific message).
    #[error("{0}")]
    Validation(String),

    /// Tweet reference that matches no known URL shape.
    #[error("invalid tweet URL: {0}")]
    InvalidUrl(String),

    /// Tweet, agent, or claim code absent.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate handle or already-claimed agent.
    #[error("{0}")]
    Conflict(String),

    /// Missing/invalid API key, or the social API rejected our credential.
    #[error("{0}")]
    AuthFailed(String),

    /// Fixed-window budget exhausted for this identifier.
    #[error("rate limit exceeded")]
    RateLimited { retry_after_ms: i64 },

    /// Non-2xx from an external dependency.
    #[error("upstream returned {status}: {detail}")]
    Upstream { status: u16, detail: String },

    /// External dependency did not answer within the call timeout.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal errors get logged in full but echoed back as a generic class.
        let message = match &self {
            ApiError::Internal(e) => {
                tracing::error!("internal error: {:#}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({ "success": false, "error": message });

        if let ApiError::RateLimited { retry_after_ms } = &self {
            body["retryAfterMs"] = json!(retry_after_ms);
            let retry_secs = (retry_after_ms / 1000).max(1);
            return (
                status,
                [(header::RETRY_AFTER, retry_secs.to_string())],
                Json(body),
            )
                .into_response();
        }

        (status, Json(body)).into_response()
    }
}

/// Map reqwest failures onto the taxonomy: timeouts are surfaced distinctly
/// so callers can tell "slow upstream" from "broken upstream".
impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::UpstreamTimeout(e.to_string())
        } else {
            ApiError::Upstream {
                status: e.status().map(|s| s.as_u16()).unwrap_or(502),
                detail: e.to_string(),
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
