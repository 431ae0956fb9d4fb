// Password-reset notification seam
// Decision: Delivery (email, chat, ...) is external; the control plane only sees this trait

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

/// Everything a notifier needs to deliver a reset link
#[derive(Debug, Clone)]
pub struct ResetNotice {
    pub user_id: Uuid,
    pub username: String,
    /// Plaintext single-use token (only ever exists in transit)
    pub token: String,
    /// Link the user follows to complete the reset
    pub link: String,
    pub expires_at: DateTime<Utc>,
}

/// Delivers password-reset links to account owners
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset_link(&self, notice: &ResetNotice) -> Result<()>;
}

/// Notifier for local development: writes the link to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset_link(&self, notice: &ResetNotice) -> Result<()> {
        tracing::info!(
            user_id = %notice.user_id,
            username = %notice.username,
            expires_at = %notice.expires_at,
            "Password reset link issued"
        );
        tracing::debug!(link = %notice.link, "Password reset link");
        Ok(())
    }
}

/// Notifier that keeps every notice in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<ResetNotice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<ResetNotice> {
        self.sent.lock().clone()
    }

    /// Most recent notice delivered to `username`
    pub fn last_for(&self, username: &str) -> Option<ResetNotice> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|n| n.username == username)
            .cloned()
    }
}

#[async_trait]
impl ResetNotifier for MemoryNotifier {
    async fn send_reset_link(&self, notice: &ResetNotice) -> Result<()> {
        self.sent.lock().push(notice.clone());
        Ok(())
    }
}
