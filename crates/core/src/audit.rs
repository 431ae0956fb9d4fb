// Audit event types
// Decision: Actions are a closed enum stored as SCREAMING_SNAKE_CASE strings
// Decision: Metadata is free-form JSON so reasons can evolve without migrations

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Security-relevant action recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Register,
    RegisterFailed,
    LoginSuccess,
    LoginFailed,
    LoginRoleMismatch,
    LoginRateLimited,
    RefreshSuccess,
    RefreshInvalid,
    RefreshExpired,
    /// An already-rotated refresh token was presented again
    RefreshReplay,
    Logout,
    ForbiddenAccess,
    PasswordResetRequested,
    PasswordResetCompleted,
    PasswordResetFailed,
    RoleChanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown audit action: {0}")]
pub struct UnknownAuditAction(pub String);

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Register => "REGISTER",
            AuditAction::RegisterFailed => "REGISTER_FAILED",
            AuditAction::LoginSuccess => "LOGIN_SUCCESS",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::LoginRoleMismatch => "LOGIN_ROLE_MISMATCH",
            AuditAction::LoginRateLimited => "LOGIN_RATE_LIMITED",
            AuditAction::RefreshSuccess => "REFRESH_SUCCESS",
            AuditAction::RefreshInvalid => "REFRESH_INVALID",
            AuditAction::RefreshExpired => "REFRESH_EXPIRED",
            AuditAction::RefreshReplay => "REFRESH_REPLAY",
            AuditAction::Logout => "LOGOUT",
            AuditAction::ForbiddenAccess => "FORBIDDEN_ACCESS",
            AuditAction::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            AuditAction::PasswordResetCompleted => "PASSWORD_RESET_COMPLETED",
            AuditAction::PasswordResetFailed => "PASSWORD_RESET_FAILED",
            AuditAction::RoleChanged => "ROLE_CHANGED",
        }
    }

    const ALL: [AuditAction; 16] = [
        AuditAction::Register,
        AuditAction::RegisterFailed,
        AuditAction::LoginSuccess,
        AuditAction::LoginFailed,
        AuditAction::LoginRoleMismatch,
        AuditAction::LoginRateLimited,
        AuditAction::RefreshSuccess,
        AuditAction::RefreshInvalid,
        AuditAction::RefreshExpired,
        AuditAction::RefreshReplay,
        AuditAction::Logout,
        AuditAction::ForbiddenAccess,
        AuditAction::PasswordResetRequested,
        AuditAction::PasswordResetCompleted,
        AuditAction::PasswordResetFailed,
        AuditAction::RoleChanged,
    ];
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = UnknownAuditAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        AuditAction::ALL
            .into_iter()
            .find(|action| action.as_str() == wanted)
            .ok_or_else(|| UnknownAuditAction(s.to_string()))
    }
}

/// A single audit log entry before it is persisted
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub action: AuditAction,
    pub metadata: Value,
    pub success: bool,
    pub ip: Option<String>,
}

impl AuditEvent {
    fn new(action: AuditAction, success: bool) -> Self {
        Self {
            user_id: None,
            username: None,
            action,
            metadata: Value::Object(Map::new()),
            success,
            ip: None,
        }
    }

    pub fn success(action: AuditAction) -> Self {
        Self::new(action, true)
    }

    pub fn failure(action: AuditAction) -> Self {
        Self::new(action, false)
    }

    /// Attach the acting user
    pub fn user(mut self, id: Uuid, username: impl Into<String>) -> Self {
        self.user_id = Some(id);
        self.username = Some(username.into());
        self
    }

    /// Attach an account id when the username is not at hand
    pub fn user_id(mut self, id: Uuid) -> Self {
        self.user_id = Some(id);
        self
    }

    /// Attach a username without a resolved account (e.g. failed login)
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Add a metadata field
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}
