//! User-facing notifications.
//!
//! Components emit [`Notification`]s through a [`NotificationHandle`]; the
//! [`NotificationDispatcher`] delivers them to every configured sink.

mod dispatcher;
mod handle;
mod types;

pub use dispatcher::{
    create_notification_system, LoggingNotificationSink, NotificationDispatcher, NotificationError,
    NotificationSink,
};
pub use handle::NotificationHandle;
pub use types::{Notification, NotificationEnvelope};
