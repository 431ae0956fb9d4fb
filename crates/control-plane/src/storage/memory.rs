// In-memory storage implementation for dev mode
// Decision: Use parking_lot for thread-safe access
// Decision: UUIDs generated via uuid v7 (time-ordered)
//
// Multi-table operations (rotation, password reset) take every lock they need
// up front, in the fixed order users → refresh_tokens → password_reset_tokens,
// so they are atomic with respect to each other.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;
use vigil_core::{AuditEvent, Role};

use super::models::*;

/// In-memory database for dev mode
/// All data is stored in memory and lost on restart
#[derive(Default)]
pub struct InMemoryDatabase {
    users: RwLock<HashMap<Uuid, UserRow>>,
    refresh_tokens: RwLock<HashMap<Uuid, RefreshTokenRow>>,
    password_reset_tokens: RwLock<HashMap<Uuid, PasswordResetTokenRow>>,
    audit_logs: RwLock<Vec<AuditLogRow>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(&self, input: CreateUserRow) -> Result<UserRow> {
        let mut users = self.users.write();
        if users.values().any(|u| u.username == input.username) {
            return Err(DuplicateUsername(input.username).into());
        }

        let now = Self::now();
        let id = Uuid::now_v7();
        let row = UserRow {
            id,
            username: input.username,
            password_hash: input.password_hash,
            role: input.role.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        users.insert(id, row.clone());
        Ok(row)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<UserRow>> {
        Ok(self.users.read().get(&id).cloned())
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    pub async fn list_users(&self) -> Result<Vec<UserRow>> {
        let mut result: Vec<_> = self.users.read().values().cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    pub async fn update_user_role(&self, id: Uuid, role: Role) -> Result<Option<UserRow>> {
        let mut users = self.users.write();
        if let Some(user) = users.get_mut(&id) {
            user.role = role.as_str().to_string();
            user.updated_at = Self::now();
            return Ok(Some(user.clone()));
        }
        Ok(None)
    }

    // ============================================
    // Refresh tokens
    // ============================================

    pub async fn create_refresh_token(
        &self,
        input: CreateRefreshTokenRow,
    ) -> Result<RefreshTokenRow> {
        let row = RefreshTokenRow {
            id: Uuid::now_v7(),
            user_id: input.user_id,
            token_hash: input.token_hash,
            expires_at: input.expires_at,
            revoked: false,
            revoked_at: None,
            replaced_by: None,
            created_at: Self::now(),
        };
        self.refresh_tokens.write().insert(row.id, row.clone());
        Ok(row)
    }

    pub async fn get_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRow>> {
        Ok(self
            .refresh_tokens
            .read()
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    pub async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        replacement: RotateRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome> {
        let users = self.users.read();
        let mut tokens = self.refresh_tokens.write();

        let Some(old) = tokens.values_mut().find(|t| t.token_hash == old_hash) else {
            return Ok(RotationOutcome::NotFound);
        };

        if old.revoked {
            return Ok(RotationOutcome::Revoked {
                user_id: old.user_id,
            });
        }
        if old.is_expired_at(now) {
            return Ok(RotationOutcome::Expired {
                user_id: old.user_id,
            });
        }

        let Some(user) = users.get(&old.user_id).cloned() else {
            return Ok(RotationOutcome::NotFound);
        };

        let token = RefreshTokenRow {
            id: Uuid::now_v7(),
            user_id: old.user_id,
            token_hash: replacement.token_hash,
            expires_at: replacement.expires_at,
            revoked: false,
            revoked_at: None,
            replaced_by: None,
            created_at: now,
        };

        old.revoked = true;
        old.revoked_at = Some(now);
        old.replaced_by = Some(token.id);

        tokens.insert(token.id, token.clone());
        Ok(RotationOutcome::Rotated { user, token })
    }

    pub async fn revoke_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRow>> {
        let mut tokens = self.refresh_tokens.write();
        let Some(token) = tokens.values_mut().find(|t| t.token_hash == token_hash) else {
            return Ok(None);
        };
        if !token.revoked {
            token.revoked = true;
            token.revoked_at = Some(Self::now());
        }
        Ok(Some(token.clone()))
    }

    pub async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> Result<u64> {
        let now = Self::now();
        let mut count = 0;
        for token in self
            .refresh_tokens
            .write()
            .values_mut()
            .filter(|t| t.user_id == user_id && !t.revoked)
        {
            token.revoked = true;
            token.revoked_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    pub async fn delete_expired_refresh_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tokens = self.refresh_tokens.write();
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at >= cutoff);
        Ok((before - tokens.len()) as u64)
    }

    // ============================================
    // Password reset tokens
    // ============================================

    pub async fn create_password_reset_token(
        &self,
        input: CreatePasswordResetTokenRow,
    ) -> Result<PasswordResetTokenRow> {
        let row = PasswordResetTokenRow {
            id: Uuid::now_v7(),
            user_id: input.user_id,
            token_hash: input.token_hash,
            expires_at: input.expires_at,
            used: false,
            created_at: Self::now(),
        };
        self.password_reset_tokens
            .write()
            .insert(row.id, row.clone());
        Ok(row)
    }

    pub async fn consume_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRow>> {
        let mut users = self.users.write();
        let mut refresh_tokens = self.refresh_tokens.write();
        let mut reset_tokens = self.password_reset_tokens.write();

        let Some(reset) = reset_tokens
            .values_mut()
            .find(|t| t.token_hash == token_hash && !t.used && t.expires_at > now)
        else {
            return Ok(None);
        };
        reset.used = true;

        let Some(user) = users.get_mut(&reset.user_id) else {
            return Ok(None);
        };
        user.password_hash = new_password_hash.to_string();
        user.updated_at = now;

        for token in refresh_tokens
            .values_mut()
            .filter(|t| t.user_id == user.id && !t.revoked)
        {
            token.revoked = true;
            token.revoked_at = Some(now);
        }

        Ok(Some(user.clone()))
    }

    pub async fn delete_stale_password_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tokens = self.password_reset_tokens.write();
        let before = tokens.len();
        tokens.retain(|_, t| !t.used && t.expires_at >= now);
        Ok((before - tokens.len()) as u64)
    }

    // ============================================
    // Audit log
    // ============================================

    pub async fn insert_audit_log(&self, event: &AuditEvent) -> Result<()> {
        self.audit_logs.write().push(AuditLogRow {
            id: Uuid::now_v7(),
            user_id: event.user_id,
            username: event.username.clone(),
            action: event.action.as_str().to_string(),
            metadata: event.metadata.clone(),
            success: event.success,
            ip: event.ip.clone(),
            created_at: Self::now(),
        });
        Ok(())
    }

    pub async fn list_audit_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogRow>> {
        let logs = self.audit_logs.read();
        Ok(logs
            .iter()
            .rev()
            .filter(|l| filter.user_id.map_or(true, |id| l.user_id == Some(id)))
            .filter(|l| filter.action.as_deref().map_or(true, |a| l.action == a))
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vigil_core::AuditAction;

    async fn seed_user(db: &InMemoryDatabase, username: &str) -> UserRow {
        db.create_user(CreateUserRow {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
        })
        .await
        .unwrap()
    }

    fn replacement(hash: &str) -> RotateRefreshToken {
        RotateRefreshToken {
            token_hash: hash.to_string(),
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_is_typed() {
        let db = InMemoryDatabase::new();
        seed_user(&db, "alice").await;

        let err = db
            .create_user(CreateUserRow {
                username: "alice".to_string(),
                password_hash: "other".to_string(),
                role: Role::Admin,
            })
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<DuplicateUsername>().is_some());
    }

    #[tokio::test]
    async fn test_rotation_revokes_old_and_links_new() {
        let db = InMemoryDatabase::new();
        let user = seed_user(&db, "alice").await;
        let old = db
            .create_refresh_token(CreateRefreshTokenRow {
                user_id: user.id,
                token_hash: "old".to_string(),
                expires_at: Utc::now() + Duration::days(7),
            })
            .await
            .unwrap();

        let outcome = db
            .rotate_refresh_token("old", replacement("new"), Utc::now())
            .await
            .unwrap();
        let (owner, token) = match outcome {
            RotationOutcome::Rotated { user, token } => (user, token),
            other => panic!("expected rotation, got {:?}", other),
        };
        assert_eq!(owner.id, user.id);
        assert_eq!(token.token_hash, "new");

        let old = db.get_refresh_token_by_hash(&old.token_hash).await.unwrap().unwrap();
        assert!(old.revoked);
        assert_eq!(old.replaced_by, Some(token.id));

        let again = db
            .rotate_refresh_token("old", replacement("newer"), Utc::now())
            .await
            .unwrap();
        assert!(matches!(again, RotationOutcome::Revoked { user_id } if user_id == user.id));
    }

    #[tokio::test]
    async fn test_rotation_classifies_missing_and_expired() {
        let db = InMemoryDatabase::new();
        let user = seed_user(&db, "alice").await;
        db.create_refresh_token(CreateRefreshTokenRow {
            user_id: user.id,
            token_hash: "stale".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
        })
        .await
        .unwrap();

        let missing = db
            .rotate_refresh_token("nope", replacement("x"), Utc::now())
            .await
            .unwrap();
        assert!(matches!(missing, RotationOutcome::NotFound));

        let expired = db
            .rotate_refresh_token("stale", replacement("y"), Utc::now())
            .await
            .unwrap();
        assert!(matches!(expired, RotationOutcome::Expired { .. }));
    }

    #[tokio::test]
    async fn test_password_reset_is_single_use() {
        let db = InMemoryDatabase::new();
        let user = seed_user(&db, "alice").await;
        db.create_refresh_token(CreateRefreshTokenRow {
            user_id: user.id,
            token_hash: "session".to_string(),
            expires_at: Utc::now() + Duration::days(7),
        })
        .await
        .unwrap();
        db.create_password_reset_token(CreatePasswordResetTokenRow {
            user_id: user.id,
            token_hash: "reset".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap();

        let updated = db
            .consume_password_reset("reset", "new-hash", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.password_hash, "new-hash");

        let session = db.get_refresh_token_by_hash("session").await.unwrap().unwrap();
        assert!(session.revoked, "reset should end existing sessions");

        let second = db
            .consume_password_reset("reset", "another", Utc::now())
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_audit_logs_newest_first_with_filters() {
        let db = InMemoryDatabase::new();
        let id = Uuid::now_v7();
        db.insert_audit_log(&AuditEvent::success(AuditAction::LoginSuccess).user(id, "alice"))
            .await
            .unwrap();
        db.insert_audit_log(&AuditEvent::failure(AuditAction::LoginFailed).username("bob"))
            .await
            .unwrap();
        db.insert_audit_log(&AuditEvent::success(AuditAction::Logout).user(id, "alice"))
            .await
            .unwrap();

        let all = db
            .list_audit_logs(&AuditLogFilter {
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, "LOGOUT");

        let alice = db
            .list_audit_logs(&AuditLogFilter {
                user_id: Some(id),
                action: Some("LOGIN_SUCCESS".to_string()),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(alice.len(), 1);
    }
}
