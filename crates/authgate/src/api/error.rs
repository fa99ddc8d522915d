//! Handler errors rendered as `{ "error": ..., "code": ... }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Upstream provider error: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status and stable machine-readable code.
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::BadGateway(_) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        let error = self.to_string();

        if status.is_server_error() {
            tracing::error!(code, %error, "request failed");
        } else if status == StatusCode::BAD_GATEWAY {
            tracing::warn!(code, %error, "provider request failed");
        } else {
            tracing::debug!(code, %error, "request rejected");
        }

        (status, Json(ErrorResponse { error, code })).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingSession => Self::unauthorized("No active session"),
            AuthError::TokenExpired => Self::unauthorized("Session has expired"),
            AuthError::InvalidToken(msg) => Self::Unauthorized(format!("Invalid token: {msg}")),
            AuthError::InvalidSessionUpdate(msg) => Self::BadRequest(msg),
            AuthError::OAuth(msg) => Self::BadGateway(msg),
            AuthError::ProviderNotConfigured(provider) => {
                Self::NotFound(format!("Sign-in provider '{provider}' is not configured"))
            }
            AuthError::Internal(msg) => Self::Internal(msg),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
