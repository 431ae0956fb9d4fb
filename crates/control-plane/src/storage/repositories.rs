// PostgreSQL repository for the credential store
// Decision: Rotation and password reset run as single transactions guarded by
// conditional updates, so concurrent callers get exactly one winner.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;
use vigil_core::{AuditEvent, Role};

use super::models::*;

const USER_COLUMNS: &str = "id, username, password_hash, role, created_at, updated_at";
const REFRESH_TOKEN_COLUMNS: &str =
    "id, user_id, token_hash, expires_at, revoked, revoked_at, replaced_by, created_at";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(&self, input: CreateUserRow) -> Result<UserRow> {
        let result = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, username, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(&input.username)
        .bind(&input.password_hash)
        .bind(input.role.as_str())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DuplicateUsername(input.username).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_users(&self) -> Result<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn update_user_role(&self, id: Uuid, role: Role) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET role = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ============================================
    // Refresh tokens
    // ============================================

    pub async fn create_refresh_token(
        &self,
        input: CreateRefreshTokenRow,
    ) -> Result<RefreshTokenRow> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {REFRESH_TOKEN_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(input.user_id)
        .bind(&input.token_hash)
        .bind(input.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRow>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            "SELECT {REFRESH_TOKEN_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Revoke `old_hash` and store its replacement in one transaction.
    ///
    /// The revoke is a compare-and-swap on `revoked = FALSE`; a concurrent
    /// rotation of the same token blocks on the row lock and then sees no
    /// matching row.
    pub async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        replacement: RotateRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = $2
            WHERE token_hash = $1 AND revoked = FALSE AND expires_at > $2
            RETURNING id, user_id
            "#,
        )
        .bind(old_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((old_id, user_id)) = revoked else {
            let existing = sqlx::query_as::<_, (Uuid, bool, DateTime<Utc>)>(
                "SELECT user_id, revoked, expires_at FROM refresh_tokens WHERE token_hash = $1",
            )
            .bind(old_hash)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            return Ok(match existing {
                None => RotationOutcome::NotFound,
                Some((user_id, true, _)) => RotationOutcome::Revoked { user_id },
                Some((user_id, false, _)) => RotationOutcome::Expired { user_id },
            });
        };

        let user = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user else {
            tx.rollback().await?;
            return Ok(RotationOutcome::NotFound);
        };

        let token = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REFRESH_TOKEN_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.expires_at)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE refresh_tokens SET replaced_by = $2 WHERE id = $1")
            .bind(old_id)
            .bind(token.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(RotationOutcome::Rotated { user, token })
    }

    /// Revoke a single token. Returns the row whether or not it was already revoked.
    pub async fn revoke_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRow>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(&format!(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = COALESCE(revoked_at, NOW())
            WHERE token_hash = $1
            RETURNING {REFRESH_TOKEN_COLUMNS}
            "#
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE user_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete refresh tokens that expired before `cutoff`
    pub async fn delete_expired_refresh_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // ============================================
    // Password reset tokens
    // ============================================

    pub async fn create_password_reset_token(
        &self,
        input: CreatePasswordResetTokenRow,
    ) -> Result<PasswordResetTokenRow> {
        let row = sqlx::query_as::<_, PasswordResetTokenRow>(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token_hash, expires_at, used, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.user_id)
        .bind(&input.token_hash)
        .bind(input.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Consume a reset token, set the new password hash and revoke the
    /// user's refresh tokens, all in one transaction.
    ///
    /// Returns `None` if the token is unknown, used or expired.
    pub async fn consume_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRow>> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query_as::<_, (Uuid,)>(
            r#"
            UPDATE password_reset_tokens
            SET used = TRUE
            WHERE token_hash = $1 AND used = FALSE AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id,)) = consumed else {
            tx.rollback().await?;
            return Ok(None);
        };

        let user = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = $3
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(new_password_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = $2
            WHERE user_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(user)
    }

    pub async fn delete_stale_password_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM password_reset_tokens WHERE used = TRUE OR expires_at < $1")
                .bind(now)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    // ============================================
    // Audit log
    // ============================================

    pub async fn insert_audit_log(&self, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, username, action, metadata, success, ip)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(event.user_id)
        .bind(&event.username)
        .bind(event.action.as_str())
        .bind(&event.metadata)
        .bind(event.success)
        .bind(&event.ip)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_audit_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogRow>> {
        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT id, user_id, username, action, metadata, success, ip, created_at
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR action = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(filter.user_id)
        .bind(&filter.action)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
