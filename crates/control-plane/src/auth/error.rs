// Authentication error taxonomy
// Decision: One variant per client-visible failure; messages never reveal whether a username exists
// Decision: Server errors log their cause and return a generic message

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;
use thiserror::Error;

use crate::api::ErrorResponse;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Role mismatch")]
    RoleMismatch,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token expired")]
    Expired,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Too many login attempts, try again later")]
    RateLimited { retry_after: Duration },

    #[error("Invalid or expired reset token")]
    InvalidOrExpiredToken,

    #[error("Registration is disabled")]
    SignupDisabled,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// An external dependency (e.g. the classifier) failed
    #[error("Upstream service unavailable")]
    Upstream(String),

    #[error("Internal server error")]
    Server(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AuthError::DuplicateUsername => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::Unauthenticated
            | AuthError::InvalidToken
            | AuthError::Expired => StatusCode::UNAUTHORIZED,
            AuthError::RoleMismatch | AuthError::Forbidden | AuthError::SignupDisabled => {
                StatusCode::FORBIDDEN
            }
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AuthError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::DuplicateUsername => "DUPLICATE_USERNAME",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::RoleMismatch => "ROLE_MISMATCH",
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::Expired => "TOKEN_EXPIRED",
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::RateLimited { .. } => "RATE_LIMITED",
            AuthError::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            AuthError::SignupDisabled => "SIGNUP_DISABLED",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::Upstream(_) => "UPSTREAM_ERROR",
            AuthError::Server(_) => "SERVER_ERROR",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Server(e) => tracing::error!(error = ?e, "Request failed"),
            AuthError::Upstream(e) => tracing::warn!(error = %e, "Upstream call failed"),
            _ => {}
        }

        let status = self.status();
        let body = ErrorResponse::new(self.to_string(), self.code());
        let mut response = (status, Json(body)).into_response();

        if let AuthError::RateLimited { retry_after } = &self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
