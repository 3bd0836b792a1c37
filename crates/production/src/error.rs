//! HTTP error mapping for the webhook endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use certchain_core::CoreError;
use thiserror::Error;

/// Webhook failures as seen by the sender. Bodies never carry details.
#[derive(Debug, Error)]
pub enum WebhookHttpError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WebhookHttpError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the request counter.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "unauthorized",
            Self::InvalidPayload(_) => "invalid",
            Self::Internal(_) => "error",
        }
    }
}

impl From<CoreError> for WebhookHttpError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SignatureVerification => Self::InvalidSignature,
            CoreError::Validation(m) => Self::InvalidPayload(m),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for WebhookHttpError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::InvalidSignature => "Invalid signature",
            Self::InvalidPayload(_) => "Invalid payload",
            Self::Internal(_) => "Internal server error",
        };
        (self.status_code(), body).into_response()
    }
}
