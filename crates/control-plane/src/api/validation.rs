// Input validation for auth and report APIs
//
// Hard limits, not configurable. Credentials are checked before any
// storage access so malformed input never reaches the hasher or the DB.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use vigil_core::Role;

use crate::auth::AuthError;

// =============================================================================
// Limits
// =============================================================================

pub const MIN_USERNAME_CHARS: usize = 3;
pub const MAX_USERNAME_CHARS: usize = 32;

pub const MIN_PASSWORD_CHARS: usize = 8;
/// Upper bound keeps Argon2 input bounded
pub const MAX_PASSWORD_CHARS: usize = 128;

/// Maximum size of a report submitted for classification.
pub const MAX_REPORT_TEXT_BYTES: usize = 100 * 1024; // 100 KB

fn username_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").ok())
        .as_ref()
}

// =============================================================================
// Validation Functions
// =============================================================================

pub fn validate_username(username: &str) -> Result<(), AuthError> {
    let chars = username.chars().count();
    if !(MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&chars) {
        return Err(AuthError::validation(format!(
            "Username must be {MIN_USERNAME_CHARS}-{MAX_USERNAME_CHARS} characters"
        )));
    }
    if !username_pattern().is_some_and(|p| p.is_match(username)) {
        return Err(AuthError::validation(
            "Username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let chars = password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&chars) {
        return Err(AuthError::validation(format!(
            "Password must be {MIN_PASSWORD_CHARS}-{MAX_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn parse_role(role: &str) -> Result<Role, AuthError> {
    role.parse()
        .map_err(|_| AuthError::validation("Role must be one of: user, commander, admin"))
}

pub fn validate_report_text(text: &str) -> Result<(), AuthError> {
    if text.trim().is_empty() {
        return Err(AuthError::validation("Report text must not be empty"));
    }
    if text.len() > MAX_REPORT_TEXT_BYTES {
        tracing::warn!(
            "Report text exceeds limit: {} bytes (max: {})",
            text.len(),
            MAX_REPORT_TEXT_BYTES
        );
        return Err(AuthError::validation("Report text exceeds allowed size"));
    }
    Ok(())
}

// =============================================================================
// JSON extractor
// =============================================================================

/// `Json<T>` whose rejection is a `VALIDATION_ERROR` body instead of axum's plain text
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AuthError {
    tracing::debug!(error = %rejection.body_text(), "Rejected request body");
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            AuthError::validation("Expected Content-Type: application/json")
        }
        JsonRejection::JsonDataError(_) => {
            AuthError::validation("Request body is missing required fields")
        }
        _ => AuthError::validation("Request body is not valid JSON"),
    }
}
