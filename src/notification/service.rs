use std::sync::Arc;
use tracing::{info, warn};

use crate::notification::model::{InboxKey, InboxSnapshot, NotificationError, NotificationId};
use crate::notification::store::NotificationStore;
use crate::remote::NotificationApi;

/// Local inbox with an optional backend mirror.
///
/// The local store is always the source of truth for readers. Backend calls
/// only ever follow a local change, and their failures are logged and
/// dropped.
#[derive(Clone)]
pub struct NotificationService {
    store: NotificationStore,
    remote: Option<Arc<dyn NotificationApi>>,
}

impl NotificationService {
    pub fn new(store: NotificationStore, remote: Option<Arc<dyn NotificationApi>>) -> Self {
        Self { store, remote }
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// Local snapshot, replaced by the backend's list when it answers with
    /// at least one entry
    pub async fn refresh(&self, key: InboxKey) -> InboxSnapshot {
        let local = self.store.snapshot(key).await;

        let Some(remote) = &self.remote else {
            return local;
        };

        match remote.get_all(key).await {
            Ok(notifications) if !notifications.is_empty() => {
                match self.store.save(key, &notifications).await {
                    Ok(snapshot) => {
                        info!(
                            "Replaced inbox {} with {} backend notifications",
                            key,
                            snapshot.notifications.len()
                        );
                        snapshot
                    }
                    Err(e) => {
                        warn!("Failed to store backend notifications for {}: {}", key, e);
                        local
                    }
                }
            }
            Ok(_) => local,
            Err(e) => {
                warn!("Backend unavailable, using local notifications for {}: {}", key, e);
                local
            }
        }
    }

    pub async fn mark_read(
        &self,
        key: InboxKey,
        id: &NotificationId,
    ) -> Result<bool, NotificationError> {
        let found = self.store.mark_read(key, id).await?;

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.mark_as_read(id).await {
                warn!("Failed to mirror read of notification {}: {}", id, e);
            }
        }
        Ok(found)
    }

    pub async fn mark_all_read(&self, key: InboxKey) -> Result<InboxSnapshot, NotificationError> {
        let snapshot = self.store.mark_all_read(key).await?;

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.mark_all_as_read(key).await {
                warn!("Failed to mirror read-all for {}: {}", key, e);
            }
        }
        Ok(snapshot)
    }

    pub async fn delete(
        &self,
        key: InboxKey,
        id: &NotificationId,
    ) -> Result<bool, NotificationError> {
        let found = self.store.remove(key, id).await?;

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(id).await {
                warn!("Failed to mirror delete of notification {}: {}", id, e);
            }
        }
        Ok(found)
    }

    /// Local only; the backend has no bulk delete
    pub async fn clear(&self, key: InboxKey) -> Result<(), NotificationError> {
        self.store.clear(key).await
    }
}
