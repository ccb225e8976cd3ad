use super::Widget;
use crate::notification::model::Notification;

/// Admin sidebar badge: unread new-order count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderBadge {
    count: usize,
}

impl OrderBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl Widget for OrderBadge {
    fn refresh(&mut self, notifications: &[Notification]) {
        self.count = notifications.iter().filter(|n| n.is_unread_order()).count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::model::{InboxKey, NewNotification, NotificationKind};
    use crate::notification::store::NotificationStore;
    use crate::signal::ChangeBus;
    use crate::storage::MemoryStorage;
    use crate::widget::{mount, MountOptions};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_counts_unread_orders_only() {
        let store = NotificationStore::new(Arc::new(MemoryStorage::new()), ChangeBus::new());
        let key = InboxKey::admin(1);
        store
            .append(key, NewNotification::new(NotificationKind::OrderPlaced, "Order #1"))
            .await
            .unwrap();
        store
            .append(key, NewNotification::new(NotificationKind::LowStock, "Low stock"))
            .await
            .unwrap();
        let second = store
            .append(key, NewNotification::new(NotificationKind::OrderPlaced, "Order #2"))
            .await
            .unwrap();

        let badge = mount(store.clone(), key, OrderBadge::new(), MountOptions::default()).await;
        assert_eq!(badge.view(|b| b.count()), 2);

        let mut updates = badge.updates();
        store.mark_read(key, &second.id).await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(badge.view(|b| b.count()), 1);

        badge.unmount().await;
    }
}
