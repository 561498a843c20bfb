// libs/appointment-cell/src/services/notification.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingCreated,
    AppointmentCompleted,
    AppointmentCancelled,
}

/// A pre-rendered message produced by a committed mutation, waiting to be sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationIntent {
    pub kind: NotificationKind,
    pub appointment_id: Uuid,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Delivery channel. Implementations only transport; they never decide what to send.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends notification intents in the background. Failures are logged and
/// dropped; nothing here can affect an already committed appointment.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Arc<dyn NotificationSender>,
}

impl NotificationDispatcher {
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    /// Spawns delivery and returns immediately. The handle is only useful for
    /// callers that want to observe the outcome; dropping it is fine.
    pub fn dispatch(&self, intents: Vec<NotificationIntent>) -> JoinHandle<DispatchReport> {
        let sender = Arc::clone(&self.sender);
        tokio::spawn(async move { deliver_all(sender, intents).await })
    }
}

async fn deliver_all(sender: Arc<dyn NotificationSender>, intents: Vec<NotificationIntent>) -> DispatchReport {
    let deliveries = intents.iter().map(|intent| {
        let sender = Arc::clone(&sender);
        async move {
            match sender.send(&intent.to, &intent.subject, &intent.body).await {
                Ok(()) => {
                    debug!("Sent {:?} notification for appointment {}", intent.kind, intent.appointment_id);
                    true
                }
                Err(e) => {
                    warn!(
                        "Failed to send {:?} notification for appointment {} to {}: {}",
                        intent.kind, intent.appointment_id, intent.to, e
                    );
                    false
                }
            }
        }
    });

    let outcomes = join_all(deliveries).await;
    let delivered = outcomes.iter().filter(|ok| **ok).count();
    DispatchReport {
        delivered,
        failed: outcomes.len() - delivered,
    }
}

/// Writes notifications to the `notifications` outbox table, where the
/// external mailer picks them up.
pub struct OutboxNotificationSender {
    supabase: Arc<SupabaseClient>,
    from: String,
}

impl OutboxNotificationSender {
    pub fn new(supabase: Arc<SupabaseClient>, from: &str) -> Self {
        Self {
            supabase,
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl NotificationSender for OutboxNotificationSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationError> {
        let row = json!({
            "id": Uuid::new_v4(),
            "sender": self.from,
            "recipient": to,
            "subject": subject,
            "body": body,
            "created_at": Utc::now().to_rfc3339()
        });

        self.supabase
            .request_with_headers::<Value>(
                Method::POST,
                "/rest/v1/notifications",
                None,
                Some(row),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map(|_| ())
            .map_err(|e| {
                if e.is_transient() {
                    NotificationError::Unavailable(e.to_string())
                } else {
                    NotificationError::Rejected(e.to_string())
                }
            })
    }
}

/// Logs notifications instead of sending them. Used when no outbox is configured.
#[derive(Debug, Default)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationError> {
        info!(recipient = to, subject = subject, "Notification: {}", body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakySender {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSender for FlakySender {
        async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), NotificationError> {
            if to.ends_with("@down.test") {
                return Err(NotificationError::Unavailable("smtp relay down".to_string()));
            }
            self.sent.lock().unwrap().push(to.to_string());
            Ok(())
        }
    }

    fn intent(to: &str) -> NotificationIntent {
        NotificationIntent {
            kind: NotificationKind::BookingCreated,
            appointment_id: Uuid::new_v4(),
            to: to.to_string(),
            subject: "New appointment".to_string(),
            body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_propagated() {
        let sender = Arc::new(FlakySender::default());
        let dispatcher = NotificationDispatcher::new(sender.clone());

        let report = dispatcher
            .dispatch(vec![intent("ok@example.com"), intent("x@down.test"), intent("also@example.com")])
            .await
            .unwrap();

        assert_eq!(report, DispatchReport { delivered: 2, failed: 1 });
        assert_eq!(sender.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_dispatch() {
        let dispatcher = NotificationDispatcher::new(Arc::new(LogNotificationSender));
        assert_eq!(dispatcher.dispatch(Vec::new()).await.unwrap(), DispatchReport::default());
    }
}
