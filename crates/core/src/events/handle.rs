use chrono::Utc;
use tokio::sync::mpsc;

use super::{Notification, NotificationEnvelope};

/// Handle for emitting notifications.
///
/// Cheaply cloneable. Delivery is fire-and-forget: a full or closed channel
/// is logged and never fails the caller.
#[derive(Clone)]
pub struct NotificationHandle {
    tx: mpsc::Sender<NotificationEnvelope>,
}

impl NotificationHandle {
    pub fn new(tx: mpsc::Sender<NotificationEnvelope>) -> Self {
        Self { tx }
    }

    /// A handle whose notifications go nowhere.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    pub async fn emit(&self, notification: Notification) {
        let envelope = NotificationEnvelope {
            timestamp: Utc::now(),
            notification,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::debug!(kind = e.0.notification.kind(), "Notification dropped, channel closed");
        }
    }

    /// Send without waiting. Returns false if the notification was dropped.
    pub fn try_emit(&self, notification: Notification) -> bool {
        let envelope = NotificationEnvelope {
            timestamp: Utc::now(),
            notification,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to emit notification: {}", e);
                false
            }
        }
    }
}
