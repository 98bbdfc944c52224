//! Broadcast notification sink.
//!
//! UI layers subscribe to a [`BroadcastNotifier`] and render each
//! [`Notification`] as a toast. Every notification is also logged, with
//! failures at `warn`.

use star_sync_core::notification::{Notification, Notifier};
use tokio::sync::broadcast;

/// Default number of notifications buffered per subscriber
const DEFAULT_CAPACITY: usize = 64;

/// [`Notifier`] that fans notifications out over a broadcast channel
///
/// Sending never blocks. Subscribers that fall behind lose the oldest
/// notifications; with no subscribers notifications are only logged.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    /// Create a notifier with the default buffer
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a notifier buffering `capacity` notifications per subscriber
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every notification emitted from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        if notification.kind.is_failure() {
            tracing::warn!(
                entity_id = %notification.entity_id,
                message = %notification.message,
                "Notification"
            );
        } else {
            tracing::info!(
                entity_id = %notification.entity_id,
                message = %notification.message,
                "Notification"
            );
        }

        metrics::counter!("star_sync.notifications", "kind" => kind_label(&notification))
            .increment(1);

        // No subscribers is fine: the log line above is the fallback.
        let _ = self.sender.send(notification);
    }
}

const fn kind_label(notification: &Notification) -> &'static str {
    use star_sync_core::notification::NotificationKind;

    match notification.kind {
        NotificationKind::Added => "added",
        NotificationKind::Removed => "removed",
        NotificationKind::Failed => "failed",
    }
}
