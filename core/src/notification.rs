//! User-visible notifications emitted by the synchronizer.

use crate::preference::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The entity was added to favourites
    Added,
    /// The entity was removed from favourites
    Removed,
    /// The write failed and the toggle was rolled back
    Failed,
}

impl NotificationKind {
    /// Success kind for a committed value
    #[must_use]
    pub const fn for_value(value: bool) -> Self {
        if value { Self::Added } else { Self::Removed }
    }

    /// Whether this notification reports a failure
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Default human-readable message
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Added => "Event added to favourites",
            Self::Removed => "Event removed from favourites",
            Self::Failed => "Failed to update favourite status",
        }
    }
}

/// A toast-style message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Entity the notification is about
    pub entity_id: EntityId,
    /// What happened
    pub kind: NotificationKind,
    /// Message to display
    pub message: String,
    /// When the outcome was observed
    pub at: DateTime<Utc>,
}

impl Notification {
    /// Build a notification with the default message for `kind`
    #[must_use]
    pub fn new(entity_id: EntityId, kind: NotificationKind, at: DateTime<Utc>) -> Self {
        Self {
            entity_id,
            kind,
            message: kind.default_message().to_string(),
            at,
        }
    }
}

/// Sink for user-visible notifications
pub trait Notifier: Send + Sync {
    /// Emit a notification
    fn notify(&self, notification: Notification);
}
