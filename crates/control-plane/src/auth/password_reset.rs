// Password reset flow
// Decision: Reset tokens are opaque, single-use and stored only as a SHA-256 hash
// Decision: Notification runs on a detached task so the request path takes the same
// time whether or not the account exists
// Decision: Completing a reset revokes every refresh token of the account

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;
use vigil_core::{ResetNotice, ResetNotifier};

use super::jwt::{generate_opaque_token, hash_token};
use crate::storage::{password::hash_password, CreatePasswordResetTokenRow, StorageBackend, UserRow};

pub enum ResetRequestOutcome {
    /// Token stored; `delivery` completes once the notifier returns
    Issued {
        user_id: Uuid,
        delivery: JoinHandle<()>,
    },
    UnknownUser,
}

#[derive(Clone)]
pub struct PasswordResetService {
    db: StorageBackend,
    notifier: Arc<dyn ResetNotifier>,
    token_lifetime: std::time::Duration,
    url_base: String,
}

impl PasswordResetService {
    pub fn new(
        db: StorageBackend,
        notifier: Arc<dyn ResetNotifier>,
        token_lifetime: std::time::Duration,
        url_base: impl Into<String>,
    ) -> Self {
        Self {
            db,
            notifier,
            token_lifetime,
            url_base: url_base.into(),
        }
    }

    fn reset_link(&self, token: &str) -> String {
        let separator = if self.url_base.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.url_base, separator, token)
    }

    pub async fn request_reset(&self, username: &str) -> Result<ResetRequestOutcome> {
        let Some(user) = self.db.get_user_by_username(username).await? else {
            return Ok(ResetRequestOutcome::UnknownUser);
        };

        let token = generate_opaque_token();
        let expires_at = Utc::now() + Duration::from_std(self.token_lifetime)?;
        self.db
            .create_password_reset_token(CreatePasswordResetTokenRow {
                user_id: user.id,
                token_hash: hash_token(&token),
                expires_at,
            })
            .await?;

        let notice = ResetNotice {
            user_id: user.id,
            username: user.username.clone(),
            link: self.reset_link(&token),
            token,
            expires_at,
        };
        let notifier = self.notifier.clone();
        let delivery = tokio::spawn(async move {
            if let Err(e) = notifier.send_reset_link(&notice).await {
                tracing::error!(user_id = %notice.user_id, error = ?e, "Failed to deliver reset link");
            }
        });

        Ok(ResetRequestOutcome::Issued {
            user_id: user.id,
            delivery,
        })
    }

    /// Set a new password. Returns `None` when the token is unknown, used or expired.
    pub async fn complete_reset(&self, token: &str, new_password: &str) -> Result<Option<UserRow>> {
        let password_hash = hash_password(new_password)?;
        self.db
            .consume_password_reset(&hash_token(token), &password_hash, Utc::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{password::verify_password, CreateRefreshTokenRow, CreateUserRow};
    use vigil_core::{MemoryNotifier, Role};

    async fn setup() -> (PasswordResetService, Arc<MemoryNotifier>, UserRow) {
        let db = StorageBackend::in_memory();
        let notifier = Arc::new(MemoryNotifier::new());
        let user = db
            .create_user(CreateUserRow {
                username: "alice".to_string(),
                password_hash: hash_password("pw123456").unwrap(),
                role: Role::User,
            })
            .await
            .unwrap();
        let service = PasswordResetService::new(
            db,
            notifier.clone(),
            std::time::Duration::from_secs(3600),
            "http://localhost:3000/reset-password",
        );
        (service, notifier, user)
    }

    async fn issue(service: &PasswordResetService, username: &str) {
        match service.request_reset(username).await.unwrap() {
            ResetRequestOutcome::Issued { delivery, .. } => delivery.await.unwrap(),
            ResetRequestOutcome::UnknownUser => panic!("expected a token for {username}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_user_sends_nothing() {
        let (service, notifier, _) = setup().await;
        assert!(matches!(
            service.request_reset("mallory").await.unwrap(),
            ResetRequestOutcome::UnknownUser
        ));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reset_link_carries_token() {
        let (service, notifier, user) = setup().await;
        issue(&service, "alice").await;

        let notice = notifier.last_for("alice").unwrap();
        assert_eq!(notice.user_id, user.id);
        assert_eq!(
            notice.link,
            format!("http://localhost:3000/reset-password?token={}", notice.token)
        );
    }

    #[tokio::test]
    async fn test_token_is_single_use_and_revokes_sessions() {
        let (service, notifier, user) = setup().await;
        service
            .db
            .create_refresh_token(CreateRefreshTokenRow {
                user_id: user.id,
                token_hash: hash_token("session"),
                expires_at: Utc::now() + Duration::days(1),
            })
            .await
            .unwrap();
        issue(&service, "alice").await;
        let token = notifier.last_for("alice").unwrap().token;

        let updated = service
            .complete_reset(&token, "new-password-1")
            .await
            .unwrap()
            .unwrap();
        assert!(verify_password("new-password-1", &updated.password_hash).unwrap());

        let session = service
            .db
            .get_refresh_token_by_hash(&hash_token("session"))
            .await
            .unwrap()
            .unwrap();
        assert!(session.revoked);

        assert!(service
            .complete_reset(&token, "another-password")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (mut service, notifier, _) = setup().await;
        service.token_lifetime = std::time::Duration::ZERO;
        issue(&service, "alice").await;
        let token = notifier.last_for("alice").unwrap().token;

        assert!(service
            .complete_reset(&token, "new-password-1")
            .await
            .unwrap()
            .is_none());
    }
}
