// Database models (internal, may differ from public DTOs)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;
use vigil_core::Role;

// ============================================
// Users
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    /// Parsed role; the column is constrained, so failure means a corrupt row
    pub fn role(&self) -> Result<Role> {
        self.role
            .parse()
            .with_context(|| format!("user {} has invalid role", self.id))
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserRow {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Returned by `create_user` when the username is taken
#[derive(Debug, Clone, Error)]
#[error("username already exists: {0}")]
pub struct DuplicateUsername(pub String);

// ============================================
// Refresh tokens
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRow {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct CreateRefreshTokenRow {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Replacement token to insert when rotating
#[derive(Debug, Clone)]
pub struct RotateRefreshToken {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a compare-and-swap rotation attempt
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// Old token revoked, new token stored
    Rotated {
        user: UserRow,
        token: RefreshTokenRow,
    },
    NotFound,
    /// Token was already revoked (replay of a rotated or logged-out token)
    Revoked { user_id: Uuid },
    Expired { user_id: Uuid },
}

// ============================================
// Password reset tokens
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetTokenRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePasswordResetTokenRow {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================
// Audit log
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub action: String,
    pub metadata: sqlx::types::JsonValue,
    pub success: bool,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: i64,
}
