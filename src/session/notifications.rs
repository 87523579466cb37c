//! Time-decaying notification queue.
//!
//! Each notification is visible for a fixed window and then removed exactly once, either by
//! its expiry timer or by an earlier `dismiss`. Dismissal aborts the pending timer. Ids come
//! from a per-queue counter and are never reused, so a late timer can never remove a
//! different notification.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Unique notification identifier.
pub type NotificationId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

struct QueueInner {
    next_id: NotificationId,
    entries: Vec<Notification>,
    timers: HashMap<NotificationId, JoinHandle<()>>,
}

struct Shared {
    inner: Mutex<QueueInner>,
    published: watch::Sender<Vec<Notification>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove `id` if present and publish the new sequence.
    ///
    /// Called with `abort_timer = false` from the timer task itself.
    fn remove(&self, id: NotificationId, abort_timer: bool) -> bool {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|n| n.id != id);
        let removed = inner.entries.len() != before;

        if let Some(timer) = inner.timers.remove(&id) {
            if abort_timer {
                timer.abort();
            }
        }

        if removed {
            self.published.send_replace(inner.entries.clone());
        }
        removed
    }
}

/// Ordered queue of live notifications.
///
/// Cloning yields another handle to the same queue. Must be used from within a Tokio
/// runtime, since `enqueue` spawns the expiry timer.
#[derive(Clone)]
pub struct NotificationQueue {
    shared: Arc<Shared>,
    ttl: Duration,
}

impl NotificationQueue {
    pub fn new(ttl: Duration) -> Self {
        let (published, _) = watch::channel(Vec::new());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(QueueInner {
                    next_id: 1,
                    entries: Vec::new(),
                    timers: HashMap::new(),
                }),
                published,
            }),
            ttl,
        }
    }

    /// Append a notification and schedule its removal after the display window.
    pub fn enqueue(&self, message: impl Into<String>) -> NotificationId {
        let mut inner = self.shared.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let notification = Notification {
            id,
            message: message.into(),
            created_at: Utc::now(),
        };
        debug!("Notification {} queued: {}", id, notification.message);
        inner.entries.push(notification);

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let ttl = self.ttl;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(shared) = weak.upgrade() {
                if shared.remove(id, false) {
                    debug!("Notification {} expired", id);
                }
            }
        });
        inner.timers.insert(id, timer);

        self.shared.published.send_replace(inner.entries.clone());
        id
    }

    /// Remove a notification early. Unknown or already expired ids are ignored.
    pub fn dismiss(&self, id: NotificationId) {
        if self.shared.remove(id, true) {
            debug!("Notification {} dismissed", id);
        }
    }

    /// Live notifications in insertion order.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.shared.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observe the live sequence.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.shared.published.subscribe()
    }

    /// Number of expiry timers still pending.
    #[cfg(test)]
    pub fn pending_timers(&self) -> usize {
        self.shared.lock().timers.len()
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn ids_are_unique_and_order_is_insertion_order() {
        let queue = NotificationQueue::new(TTL);
        let a = queue.enqueue("first");
        let b = queue.enqueue("second");
        let c = queue.enqueue("third");

        assert!(a != b && b != c && a != c);
        let messages: Vec<_> = queue.snapshot().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_display_window() {
        let queue = NotificationQueue::new(TTL);
        let id = queue.enqueue("vote cast");

        tokio::time::sleep(TTL - Duration::from_millis(1)).await;
        assert!(queue.snapshot().iter().any(|n| n.id == id));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(queue.is_empty());
        assert_eq!(queue.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_entries_expire_independently() {
        let queue = NotificationQueue::new(TTL);
        queue.enqueue("early");
        tokio::time::sleep(Duration::from_secs(3)).await;
        queue.enqueue("late");

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let messages: Vec<_> = queue.snapshot().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["late"]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_removes_entry_and_cancels_timer() {
        let queue = NotificationQueue::new(TTL);
        let first = queue.enqueue("first");
        queue.enqueue("second");

        queue.dismiss(first);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending_timers(), 1);
        assert!(queue.snapshot().iter().all(|n| n.id != first));
    }

    #[tokio::test(start_paused = true)]
    async fn dismissing_unknown_id_is_a_noop() {
        let queue = NotificationQueue::new(TTL);
        queue.enqueue("only");
        queue.dismiss(9_999);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_timer_never_removes_a_newer_entry() {
        let queue = NotificationQueue::new(TTL);
        let old = queue.enqueue("old");
        queue.dismiss(old);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let newer = queue.enqueue("newer");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(queue.snapshot().len(), 1);
        assert_eq!(queue.snapshot()[0].id, newer);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_observe_enqueue_and_expiry() {
        let queue = NotificationQueue::new(TTL);
        let mut rx = queue.subscribe();

        queue.enqueue("hello");
        rx.changed().await.expect("queue alive");
        assert_eq!(rx.borrow_and_update().len(), 1);

        rx.changed().await.expect("queue alive");
        assert!(rx.borrow().is_empty());
    }
}
