use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::{Notification, NotificationEnvelope, NotificationHandle};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Destination for notifications (chat, e-mail, webhook...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, envelope: &NotificationEnvelope) -> Result<(), NotificationError>;
}

/// Writes every notification to the log.
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, envelope: &NotificationEnvelope) -> Result<(), NotificationError> {
        let n = &envelope.notification;
        match n {
            Notification::DownloadFailed { .. }
            | Notification::ImportFailed { .. }
            | Notification::SourceHealthDegraded { .. } => tracing::warn!(
                kind = n.kind(),
                target_id = n.target_id().map(|t| t.as_str()),
                notification = ?n,
                "Notification"
            ),
            _ => tracing::info!(
                kind = n.kind(),
                target_id = n.target_id().map(|t| t.as_str()),
                notification = ?n,
                "Notification"
            ),
        }
        Ok(())
    }
}

/// Background task fanning notifications out to every sink.
pub struct NotificationDispatcher {
    rx: mpsc::Receiver<NotificationEnvelope>,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl NotificationDispatcher {
    pub fn new(rx: mpsc::Receiver<NotificationEnvelope>, sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { rx, sinks }
    }

    /// Run until every handle is dropped. Spawn with `tokio::spawn`.
    pub async fn run(mut self) {
        info!(sinks = self.sinks.len(), "Notification dispatcher started");

        while let Some(envelope) = self.rx.recv().await {
            for sink in &self.sinks {
                if let Err(e) = sink.notify(&envelope).await {
                    error!(sink = sink.name(), kind = envelope.notification.kind(), error = %e, "Notification sink failed");
                }
            }
        }

        info!("Notification dispatcher shutting down");
    }
}

/// Create a handle and the dispatcher that drains it.
pub fn create_notification_system(
    sinks: Vec<Arc<dyn NotificationSink>>,
    buffer_size: usize,
) -> (NotificationHandle, NotificationDispatcher) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (NotificationHandle::new(tx), NotificationDispatcher::new(rx, sinks))
}
