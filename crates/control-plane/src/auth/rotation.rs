// Session issuance and refresh-token rotation
// Decision: A refresh token is single-use; every successful refresh revokes it and
// issues a successor inside one storage transaction
// Decision: Replays of revoked tokens are reported separately so they can be audited

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::jwt::{generate_opaque_token, hash_token, JwtService};
use crate::storage::{
    CreateRefreshTokenRow, RefreshTokenRow, RotateRefreshToken, RotationOutcome,
    StorageBackend, UserRow,
};

/// Token pair returned after successful authentication
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("refresh token not recognized")]
    Invalid,
    #[error("refresh token already revoked")]
    Replay { user_id: Uuid },
    #[error("refresh token expired")]
    Expired { user_id: Uuid },
    #[error(transparent)]
    Server(#[from] anyhow::Error),
}

/// A rotated session: the new pair plus the user it belongs to
#[derive(Debug, Clone)]
pub struct RefreshedSession {
    pub user: UserRow,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct SessionService {
    jwt: Arc<JwtService>,
    db: StorageBackend,
}

impl SessionService {
    pub fn new(jwt: Arc<JwtService>, db: StorageBackend) -> Self {
        Self { jwt, db }
    }

    fn refresh_expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Ok(now + Duration::from_std(self.jwt.refresh_token_lifetime())?)
    }

    fn token_pair(&self, user: &UserRow, refresh_token: String) -> Result<TokenPair> {
        let access_token = self
            .jwt
            .generate_access_token(user.id, &user.username, user.role()?)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_lifetime_secs(),
        })
    }

    /// Start a new session (new issuance chain) for an authenticated user
    pub async fn issue_session(&self, user: &UserRow) -> Result<TokenPair> {
        let refresh_token = generate_opaque_token();

        self.db
            .create_refresh_token(CreateRefreshTokenRow {
                user_id: user.id,
                token_hash: hash_token(&refresh_token),
                expires_at: self.refresh_expiry(Utc::now())?,
            })
            .await?;

        self.token_pair(user, refresh_token)
    }

    /// Exchange a refresh token for a new pair. The presented token is revoked.
    pub async fn refresh(&self, presented: &str) -> Result<RefreshedSession, RefreshError> {
        let now = Utc::now();
        let refresh_token = generate_opaque_token();
        let replacement = RotateRefreshToken {
            token_hash: hash_token(&refresh_token),
            expires_at: self.refresh_expiry(now)?,
        };

        match self
            .db
            .rotate_refresh_token(&hash_token(presented), replacement, now)
            .await?
        {
            RotationOutcome::Rotated { user, token } => {
                tracing::debug!(user_id = %user.id, token_id = %token.id, "Refresh token rotated");
                let tokens = self.token_pair(&user, refresh_token)?;
                Ok(RefreshedSession { user, tokens })
            }
            RotationOutcome::NotFound => Err(RefreshError::Invalid),
            RotationOutcome::Revoked { user_id } => Err(RefreshError::Replay { user_id }),
            RotationOutcome::Expired { user_id } => Err(RefreshError::Expired { user_id }),
        }
    }

    /// Revoke a refresh token. Unknown and already-revoked tokens are not errors.
    pub async fn revoke(&self, presented: &str) -> Result<Option<RefreshTokenRow>> {
        self.db.revoke_refresh_token(&hash_token(presented)).await
    }
}
