// Audit recorder
// Decision: Request handlers never wait on audit writes; events go through a bounded
// queue drained by a single writer task
// Decision: A full or closed queue drops the event with a local warning

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use vigil_core::AuditEvent;

use crate::storage::StorageBackend;

enum AuditMessage {
    Event(AuditEvent),
    /// Acknowledged once everything queued before it has been written
    Flush(oneshot::Sender<()>),
}

/// Handle for enqueueing audit events. Cheap to clone.
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::Sender<AuditMessage>,
}

impl AuditRecorder {
    /// Start the writer task. The task exits once every handle is dropped.
    pub fn spawn(db: StorageBackend, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_writer(db, rx));
        (Self { tx }, handle)
    }

    /// Enqueue an event without waiting
    pub fn record(&self, event: AuditEvent) {
        match self.tx.try_send(AuditMessage::Event(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(AuditMessage::Event(event))) => {
                tracing::warn!(action = %event.action, "Audit queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(AuditMessage::Event(event))) => {
                tracing::warn!(action = %event.action, "Audit writer stopped, dropping event");
            }
            Err(_) => {}
        }
    }

    /// Wait until every event recorded before this call has been written
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(AuditMessage::Flush(ack_tx)).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

async fn run_writer(db: StorageBackend, mut rx: mpsc::Receiver<AuditMessage>) {
    while let Some(message) = rx.recv().await {
        match message {
            AuditMessage::Event(event) => {
                if let Err(e) = db.insert_audit_log(&event).await {
                    tracing::error!(
                        action = %event.action,
                        error = ?e,
                        "Failed to write audit log entry"
                    );
                }
            }
            AuditMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("Audit writer stopped");
}
