//! Authentication errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Failures while resolving or issuing a session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No session token on the request.
    #[error("no active session")]
    MissingSession,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    /// Session update payload produced an unusable token.
    #[error("invalid session update: {0}")]
    InvalidSessionUpdate(String),

    /// GitHub token or profile request failed.
    #[error("oauth error: {0}")]
    OAuth(String),

    #[error("provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::MissingSession => (StatusCode::UNAUTHORIZED, "missing_session"),
            AuthError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
            AuthError::InvalidSessionUpdate(_) => {
                (StatusCode::BAD_REQUEST, "invalid_session_update")
            }
            AuthError::OAuth(_) => (StatusCode::BAD_GATEWAY, "oauth_error"),
            AuthError::ProviderNotConfigured(_) => (StatusCode::NOT_FOUND, "provider_not_configured"),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let body = Json(AuthErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}
