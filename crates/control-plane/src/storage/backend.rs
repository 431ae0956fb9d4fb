// Storage backend abstraction
// Decision: Use enum dispatch for simplicity over trait objects
//
// This module provides a unified StorageBackend enum that can work with
// either PostgreSQL (production) or in-memory (dev mode) storage.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;
use vigil_core::{AuditEvent, Role};

use super::memory::InMemoryDatabase;
use super::models::*;
use super::repositories::Database;

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(Database),
    /// In-memory database (dev mode)
    InMemory(Arc<InMemoryDatabase>),
}

impl StorageBackend {
    /// Connect to PostgreSQL and apply migrations
    pub async fn postgres(database_url: &str) -> Result<Self> {
        let db = Database::from_url(database_url).await?;
        db.migrate().await?;
        Ok(Self::Postgres(db))
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryDatabase::new()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::InMemory(_) => "memory",
        }
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(&self, input: CreateUserRow) -> Result<UserRow> {
        match self {
            Self::Postgres(db) => db.create_user(input).await,
            Self::InMemory(db) => db.create_user(input).await,
        }
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<UserRow>> {
        match self {
            Self::Postgres(db) => db.get_user(id).await,
            Self::InMemory(db) => db.get_user(id).await,
        }
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        match self {
            Self::Postgres(db) => db.get_user_by_username(username).await,
            Self::InMemory(db) => db.get_user_by_username(username).await,
        }
    }

    pub async fn list_users(&self) -> Result<Vec<UserRow>> {
        match self {
            Self::Postgres(db) => db.list_users().await,
            Self::InMemory(db) => db.list_users().await,
        }
    }

    pub async fn update_user_role(&self, id: Uuid, role: Role) -> Result<Option<UserRow>> {
        match self {
            Self::Postgres(db) => db.update_user_role(id, role).await,
            Self::InMemory(db) => db.update_user_role(id, role).await,
        }
    }

    // ============================================
    // Refresh Tokens
    // ============================================

    pub async fn create_refresh_token(
        &self,
        input: CreateRefreshTokenRow,
    ) -> Result<RefreshTokenRow> {
        match self {
            Self::Postgres(db) => db.create_refresh_token(input).await,
            Self::InMemory(db) => db.create_refresh_token(input).await,
        }
    }

    pub async fn get_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRow>> {
        match self {
            Self::Postgres(db) => db.get_refresh_token_by_hash(token_hash).await,
            Self::InMemory(db) => db.get_refresh_token_by_hash(token_hash).await,
        }
    }

    pub async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        replacement: RotateRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome> {
        match self {
            Self::Postgres(db) => db.rotate_refresh_token(old_hash, replacement, now).await,
            Self::InMemory(db) => db.rotate_refresh_token(old_hash, replacement, now).await,
        }
    }

    pub async fn revoke_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRow>> {
        match self {
            Self::Postgres(db) => db.revoke_refresh_token(token_hash).await,
            Self::InMemory(db) => db.revoke_refresh_token(token_hash).await,
        }
    }

    pub async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> Result<u64> {
        match self {
            Self::Postgres(db) => db.revoke_user_refresh_tokens(user_id).await,
            Self::InMemory(db) => db.revoke_user_refresh_tokens(user_id).await,
        }
    }

    pub async fn delete_expired_refresh_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match self {
            Self::Postgres(db) => db.delete_expired_refresh_tokens(cutoff).await,
            Self::InMemory(db) => db.delete_expired_refresh_tokens(cutoff).await,
        }
    }

    // ============================================
    // Password Reset Tokens
    // ============================================

    pub async fn create_password_reset_token(
        &self,
        input: CreatePasswordResetTokenRow,
    ) -> Result<PasswordResetTokenRow> {
        match self {
            Self::Postgres(db) => db.create_password_reset_token(input).await,
            Self::InMemory(db) => db.create_password_reset_token(input).await,
        }
    }

    pub async fn consume_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRow>> {
        match self {
            Self::Postgres(db) => {
                db.consume_password_reset(token_hash, new_password_hash, now)
                    .await
            }
            Self::InMemory(db) => {
                db.consume_password_reset(token_hash, new_password_hash, now)
                    .await
            }
        }
    }

    pub async fn delete_stale_password_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        match self {
            Self::Postgres(db) => db.delete_stale_password_reset_tokens(now).await,
            Self::InMemory(db) => db.delete_stale_password_reset_tokens(now).await,
        }
    }

    // ============================================
    // Audit Log
    // ============================================

    pub async fn insert_audit_log(&self, event: &AuditEvent) -> Result<()> {
        match self {
            Self::Postgres(db) => db.insert_audit_log(event).await,
            Self::InMemory(db) => db.insert_audit_log(event).await,
        }
    }

    pub async fn list_audit_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogRow>> {
        match self {
            Self::Postgres(db) => db.list_audit_logs(filter).await,
            Self::InMemory(db) => db.list_audit_logs(filter).await,
        }
    }
}
