use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::notification::model::{
    InboxKey, InboxSnapshot, NewNotification, Notification, NotificationError, NotificationId,
};
use crate::signal::ChangeBus;
use crate::storage::Storage;

/// Default cap on entries kept per inbox
pub const DEFAULT_MAX_PER_INBOX: usize = 20;

/// Typed access to the per-user notification inboxes.
///
/// Every mutation persists the new sequence and then publishes a change
/// signal, so a subscriber that reloads on the signal always sees the
/// post-mutation snapshot. Within one process mutations are serialized;
/// across processes sharing the same storage the last writer wins.
#[derive(Clone)]
pub struct NotificationStore {
    storage: Arc<dyn Storage>,
    bus: ChangeBus,
    max_per_inbox: usize,
    write_lock: Arc<Mutex<()>>,
}

impl NotificationStore {
    pub fn new(storage: Arc<dyn Storage>, bus: ChangeBus) -> Self {
        Self {
            storage,
            bus,
            max_per_inbox: DEFAULT_MAX_PER_INBOX,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_max_per_inbox(mut self, max_per_inbox: usize) -> Self {
        self.max_per_inbox = max_per_inbox.max(1);
        self
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Current inbox, newest first.
    ///
    /// Never fails: a missing key, unreadable storage or corrupt JSON all
    /// read as an empty inbox.
    pub async fn load(&self, key: InboxKey) -> Vec<Notification> {
        let raw = match self.storage.get(&key.storage_key()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read inbox {}: {}", key, e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Notification>>(&raw) {
            Ok(notifications) => notifications,
            Err(e) => {
                warn!("Discarding malformed inbox {}: {}", key, e);
                Vec::new()
            }
        }
    }

    pub async fn snapshot(&self, key: InboxKey) -> InboxSnapshot {
        InboxSnapshot::new(self.load(key).await)
    }

    pub async fn unread_count(&self, key: InboxKey) -> usize {
        self.snapshot(key).await.unread_count
    }

    /// Replace the whole inbox
    pub async fn save(
        &self,
        key: InboxKey,
        notifications: &[Notification],
    ) -> Result<InboxSnapshot, NotificationError> {
        let _guard = self.write_lock.lock().await;
        self.persist(key, notifications.to_vec()).await
    }

    /// Prepend a new notification and return it
    pub async fn append(
        &self,
        key: InboxKey,
        new: NewNotification,
    ) -> Result<Notification, NotificationError> {
        if new.message.trim().is_empty() {
            return Err(NotificationError::ValidationError(
                "Notification message cannot be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut notifications = self.load(key).await;

        let notification = Notification {
            id: next_id(&notifications, Utc::now().timestamp_millis()),
            kind: new.kind,
            message: new.message,
            created_at: Utc::now(),
            read: false,
        };
        notifications.insert(0, notification.clone());

        self.persist(key, notifications).await?;
        info!(
            "Appended {:?} notification {} to {}",
            notification.kind, notification.id, key
        );
        Ok(notification)
    }

    /// Mark one entry read; returns whether it was found
    pub async fn mark_read(
        &self,
        key: InboxKey,
        id: &NotificationId,
    ) -> Result<bool, NotificationError> {
        let _guard = self.write_lock.lock().await;
        let mut notifications = self.load(key).await;

        let Some(entry) = notifications.iter_mut().find(|n| &n.id == id) else {
            return Ok(false);
        };
        entry.read = true;

        self.persist(key, notifications).await?;
        Ok(true)
    }

    pub async fn mark_all_read(&self, key: InboxKey) -> Result<InboxSnapshot, NotificationError> {
        let _guard = self.write_lock.lock().await;
        let mut notifications = self.load(key).await;
        for notification in notifications.iter_mut() {
            notification.read = true;
        }
        self.persist(key, notifications).await
    }

    /// Delete one entry; returns whether it was found
    pub async fn remove(
        &self,
        key: InboxKey,
        id: &NotificationId,
    ) -> Result<bool, NotificationError> {
        let _guard = self.write_lock.lock().await;
        let mut notifications = self.load(key).await;

        let before = notifications.len();
        notifications.retain(|n| &n.id != id);
        if notifications.len() == before {
            return Ok(false);
        }

        self.persist(key, notifications).await?;
        Ok(true)
    }

    /// Drop the whole inbox
    pub async fn clear(&self, key: InboxKey) -> Result<(), NotificationError> {
        let _guard = self.write_lock.lock().await;
        self.storage.remove(&key.storage_key()).await?;
        self.bus.publish_local(key);
        info!("Cleared inbox {}", key);
        Ok(())
    }

    // Persist then signal. Callers hold the write lock.
    async fn persist(
        &self,
        key: InboxKey,
        mut notifications: Vec<Notification>,
    ) -> Result<InboxSnapshot, NotificationError> {
        notifications.truncate(self.max_per_inbox);

        let json = serde_json::to_string(&notifications)?;
        self.storage.set(&key.storage_key(), &json).await?;
        self.bus.publish_local(key);

        Ok(InboxSnapshot::new(notifications))
    }
}

/// Millisecond timestamp, bumped past every numeric id already in the inbox.
/// Falls back to a UUID once the numeric space is used up.
fn next_id(existing: &[Notification], now_millis: i64) -> NotificationId {
    let highest = existing.iter().filter_map(|n| n.id.as_i64()).max();
    match highest {
        Some(highest) if highest >= now_millis => match highest.checked_add(1) {
            Some(id) => NotificationId::from(id),
            None => NotificationId::new(Uuid::new_v4().to_string()),
        },
        _ => NotificationId::from(now_millis),
    }
}
