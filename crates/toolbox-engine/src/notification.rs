use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::{Error, Result};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    /// Operation succeeded.
    Success,
    /// Nothing to do, or a partial result.
    Warning,
    /// Operation failed.
    Error,
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// A message for the notification sink. Display and auto-dismiss are the
/// sink's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity.
    pub kind: NotifyKind,
    /// Text shown to the user.
    pub message: String,
}

/// Sends notifications to the UI layer.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: UnboundedSender<Notification>,
}

impl NotificationDispatcher {
    /// Create a new dispatcher from a notification channel.
    pub fn new(tx: UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    /// Send a notification with the given kind and message.
    pub fn send(&self, kind: NotifyKind, message: String) -> Result<()> {
        // Always log notification displays at info level, regardless of kind.
        info!(kind = ?kind, text = %message, "notification_display");
        self.tx
            .send(Notification { kind, message })
            .map_err(|_| Error::ChannelClosed)
    }

    /// Send a success notification.
    pub fn success(&self, message: impl Into<String>) {
        self.fire(NotifyKind::Success, message.into());
    }

    /// Send a warning notification.
    pub fn warning(&self, message: impl Into<String>) {
        self.fire(NotifyKind::Warning, message.into());
    }

    /// Send an error notification.
    pub fn error(&self, message: impl Into<String>) {
        self.fire(NotifyKind::Error, message.into());
    }

    /// Fire-and-forget send; a closed sink only drops the message.
    fn fire(&self, kind: NotifyKind, message: String) {
        if self.send(kind, message).is_err() {
            debug!("notification sink closed; message dropped");
        }
    }
}
