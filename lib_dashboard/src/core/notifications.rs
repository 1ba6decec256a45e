//! # Notification Queue
//!
//! Transient, user-visible messages kept apart from the business state.
//! New notifications are prepended; the view shows the first
//! [`VISIBLE_NOTIFICATIONS`] of them.
//!
//! A notification with a duration gets its own expiry task. The task holds
//! only a weak reference to the queue and a child of the queue's expiry
//! token, so `clear` (or dropping the queue) turns every pending expiry into
//! a no-op. Expiry removes by id, never by position.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::model::{generated_id, NewNotification, Notification};

/// Number of notifications a view shows at once.
pub const VISIBLE_NOTIFICATIONS: usize = 5;

struct QueueInner {
    list: watch::Sender<Vec<Notification>>,
    expiry: Mutex<CancellationToken>,
}

/// Shared handle to the notification list.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationQueue {
    /// An empty queue.
    pub fn new() -> Self {
        let (list, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(QueueInner {
                list,
                expiry: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Assigns an id and timestamp, prepends the notification and schedules
    /// its removal when it has a duration. Returns the assigned id.
    pub fn add(&self, new: NewNotification) -> String {
        let id = generated_id("ntf");
        let duration_ms = new.duration_ms;
        let notification = Notification {
            id: id.clone(),
            kind: new.kind,
            title: new.title,
            message: new.message,
            created_at: Utc::now(),
            duration_ms,
        };
        self.inner.list.send_modify(|list| list.insert(0, notification));

        if let Some(ms) = duration_ms {
            self.schedule_expiry(id.clone(), Duration::from_millis(ms));
        }
        id
    }

    fn schedule_expiry(&self, id: String, after: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime; notification {} will not expire on its own.", id);
            return;
        };
        let token = self.expiry_token().child_token();
        let queue: Weak<QueueInner> = Arc::downgrade(&self.inner);

        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if let Some(inner) = queue.upgrade() {
                        NotificationQueue { inner }.remove(&id);
                    }
                }
            }
        });
    }

    fn expiry_token(&self) -> CancellationToken {
        self.inner
            .expiry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Removes the notification with `id`. Unknown ids are ignored.
    pub fn remove(&self, id: &str) -> bool {
        self.inner.list.send_if_modified(|list| {
            let before = list.len();
            list.retain(|n| n.id != id);
            list.len() != before
        })
    }

    /// Empties the list and cancels every pending expiry.
    pub fn clear(&self) {
        self.cancel_expiries();
        self.inner.list.send_modify(|list| list.clear());
    }

    /// Cancels pending expiries without touching the list.
    pub fn cancel_expiries(&self) {
        let mut token = self
            .inner
            .expiry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        token.cancel();
        *token = CancellationToken::new();
    }

    /// All notifications, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.inner.list.borrow().clone()
    }

    /// The notifications a view shows: the newest [`VISIBLE_NOTIFICATIONS`].
    pub fn visible(&self) -> Vec<Notification> {
        self.inner
            .list
            .borrow()
            .iter()
            .take(VISIBLE_NOTIFICATIONS)
            .cloned()
            .collect()
    }

    /// Number of stored notifications.
    pub fn len(&self) -> usize {
        self.inner.list.borrow().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A receiver notified whenever the list changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.list.subscribe()
    }
}
