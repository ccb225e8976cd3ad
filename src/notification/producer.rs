use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::notification::model::{
    InboxKey, NewNotification, Notification, NotificationError, NotificationKind,
};
use crate::notification::store::NotificationStore;

/// Marker key rewritten on every order placement. Only the fact that it
/// changed matters; consumers sharing the storage can watch it as a cheap
/// wake-up.
pub const NEW_ORDER_MARKER_KEY: &str = "newOrderNotification";

/// Order lifecycle as driven from the admin order screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Packed,
    #[serde(rename = "Out for Delivery", alias = "OutForDelivery")]
    OutForDelivery,
    Delivered,
    Cancelled,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderMarker<'a> {
    order_id: i64,
    customer_name: &'a str,
    timestamp: i64,
}

pub async fn customer_order_placed(
    store: &NotificationStore,
    customer_id: i64,
    order_id: i64,
) -> Result<Notification, NotificationError> {
    store
        .append(
            InboxKey::customer(customer_id),
            NewNotification::new(
                NotificationKind::OrderPlaced,
                format!("Your order #{} has been placed successfully", order_id),
            ),
        )
        .await
}

pub async fn customer_order_confirmed(
    store: &NotificationStore,
    customer_id: i64,
    order_id: i64,
) -> Result<Notification, NotificationError> {
    store
        .append(
            InboxKey::customer(customer_id),
            NewNotification::new(
                NotificationKind::OrderConfirmed,
                format!("Your order #{} has been confirmed", order_id),
            ),
        )
        .await
}

pub async fn customer_order_packed(
    store: &NotificationStore,
    customer_id: i64,
    order_id: i64,
) -> Result<Notification, NotificationError> {
    store
        .append(
            InboxKey::customer(customer_id),
            NewNotification::new(
                NotificationKind::OrderPacked,
                format!(
                    "Your order #{} has been packed and is ready for delivery",
                    order_id
                ),
            ),
        )
        .await
}

pub async fn customer_order_out_for_delivery(
    store: &NotificationStore,
    customer_id: i64,
    order_id: i64,
) -> Result<Notification, NotificationError> {
    store
        .append(
            InboxKey::customer(customer_id),
            NewNotification::new(
                NotificationKind::OrderOutForDelivery,
                format!("Your order #{} is out for delivery", order_id),
            ),
        )
        .await
}

pub async fn customer_order_delivered(
    store: &NotificationStore,
    customer_id: i64,
    order_id: i64,
) -> Result<Notification, NotificationError> {
    store
        .append(
            InboxKey::customer(customer_id),
            NewNotification::new(
                NotificationKind::OrderDelivered,
                format!("Your order #{} has been delivered", order_id),
            ),
        )
        .await
}

pub async fn customer_order_cancelled(
    store: &NotificationStore,
    customer_id: i64,
    order_id: i64,
) -> Result<Notification, NotificationError> {
    store
        .append(
            InboxKey::customer(customer_id),
            NewNotification::new(
                NotificationKind::OrderCancelled,
                format!("Your order #{} has been cancelled", order_id),
            ),
        )
        .await
}

pub async fn admin_new_order(
    store: &NotificationStore,
    admin_id: i64,
    order_id: i64,
    customer_name: &str,
) -> Result<Notification, NotificationError> {
    store
        .append(
            InboxKey::admin(admin_id),
            NewNotification::new(
                NotificationKind::OrderPlaced,
                format!("New order #{} received from {}", order_id, customer_name),
            ),
        )
        .await
}

pub async fn admin_low_stock(
    store: &NotificationStore,
    admin_id: i64,
    item_name: &str,
    quantity: i64,
) -> Result<Notification, NotificationError> {
    store
        .append(
            InboxKey::admin(admin_id),
            NewNotification::new(
                NotificationKind::LowStock,
                format!("Low stock alert: {} ({} items left)", item_name, quantity),
            ),
        )
        .await
}

pub async fn admin_order_delivered(
    store: &NotificationStore,
    admin_id: i64,
    order_id: i64,
) -> Result<Notification, NotificationError> {
    store
        .append(
            InboxKey::admin(admin_id),
            NewNotification::new(
                NotificationKind::OrderDelivered,
                format!("Order #{} delivered successfully", order_id),
            ),
        )
        .await
}

/// Checkout completed: tell the customer and the admin inbox, then touch
/// the wake-up marker
pub async fn place_order(
    store: &NotificationStore,
    customer_id: i64,
    customer_name: &str,
    admin_id: i64,
    order_id: i64,
) -> Result<Vec<Notification>, NotificationError> {
    let customer = customer_order_placed(store, customer_id, order_id).await?;
    let admin = admin_new_order(store, admin_id, order_id, customer_name).await?;

    let marker = serde_json::to_string(&NewOrderMarker {
        order_id,
        customer_name,
        timestamp: Utc::now().timestamp_millis(),
    })?;
    // The notifications are already stored; a missed wake-up only delays readers
    if let Err(e) = store.storage().set(NEW_ORDER_MARKER_KEY, &marker).await {
        warn!("Failed to write new order marker: {}", e);
    }

    info!(
        "Order {} placed by customer {}, admin {} notified",
        order_id, customer_id, admin_id
    );
    Ok(vec![customer, admin])
}

/// Notifications for an admin status update. Delivery also tells the admin.
pub async fn notify_status_change(
    store: &NotificationStore,
    customer_id: i64,
    admin_id: i64,
    order_id: i64,
    status: OrderStatus,
) -> Result<Vec<Notification>, NotificationError> {
    let sent = match status {
        OrderStatus::Pending => Vec::new(),
        OrderStatus::Confirmed => {
            vec![customer_order_confirmed(store, customer_id, order_id).await?]
        }
        OrderStatus::Packed => vec![customer_order_packed(store, customer_id, order_id).await?],
        OrderStatus::OutForDelivery => {
            vec![customer_order_out_for_delivery(store, customer_id, order_id).await?]
        }
        OrderStatus::Delivered => vec![
            customer_order_delivered(store, customer_id, order_id).await?,
            admin_order_delivered(store, admin_id, order_id).await?,
        ],
        OrderStatus::Cancelled => {
            vec![customer_order_cancelled(store, customer_id, order_id).await?]
        }
    };

    info!(
        "Order {} moved to {:?}, {} notifications sent",
        order_id,
        status,
        sent.len()
    );
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ChangeBus;
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::Arc;

    fn store() -> (NotificationStore, MemoryStorage) {
        let storage = MemoryStorage::new();
        (
            NotificationStore::new(Arc::new(storage.clone()), ChangeBus::new()),
            storage,
        )
    }

    #[tokio::test]
    async fn test_place_order_notifies_both_inboxes() {
        let (store, storage) = store();

        place_order(&store, 42, "Asha", 1, 501).await.unwrap();

        let customer = store.load(InboxKey::customer(42)).await;
        assert_eq!(customer.len(), 1);
        assert_eq!(customer[0].kind, NotificationKind::OrderPlaced);
        assert_eq!(
            customer[0].message,
            "Your order #501 has been placed successfully"
        );

        let admin = store.load(InboxKey::admin(1)).await;
        assert_eq!(admin.len(), 1);
        assert_eq!(admin[0].message, "New order #501 received from Asha");
        assert!(admin[0].is_unread_order());

        let marker = storage.get(NEW_ORDER_MARKER_KEY).await.unwrap().unwrap();
        assert!(marker.contains(r#""orderId":501"#));
        assert!(marker.contains(r#""customerName":"Asha""#));
    }

    #[tokio::test]
    async fn test_delivery_notifies_customer_and_admin() {
        let (store, _) = store();

        let sent = notify_status_change(&store, 42, 1, 501, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(sent.len(), 2);

        assert_eq!(
            store.load(InboxKey::customer(42)).await[0].message,
            "Your order #501 has been delivered"
        );
        assert_eq!(
            store.load(InboxKey::admin(1)).await[0].message,
            "Order #501 delivered successfully"
        );
    }

    #[tokio::test]
    async fn test_status_messages() {
        let (store, _) = store();
        let key = InboxKey::customer(7);

        notify_status_change(&store, 7, 1, 9, OrderStatus::Confirmed)
            .await
            .unwrap();
        notify_status_change(&store, 7, 1, 9, OrderStatus::Packed)
            .await
            .unwrap();
        notify_status_change(&store, 7, 1, 9, OrderStatus::OutForDelivery)
            .await
            .unwrap();
        notify_status_change(&store, 7, 1, 9, OrderStatus::Cancelled)
            .await
            .unwrap();
        let pending = notify_status_change(&store, 7, 1, 9, OrderStatus::Pending)
            .await
            .unwrap();
        assert!(pending.is_empty());

        let kinds: Vec<NotificationKind> = store.load(key).await.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationKind::OrderCancelled,
                NotificationKind::OrderOutForDelivery,
                NotificationKind::OrderPacked,
                NotificationKind::OrderConfirmed,
            ]
        );
        assert!(store.load(InboxKey::admin(1)).await.is_empty());
    }

    #[tokio::test]
    async fn test_low_stock_message() {
        let (store, _) = store();
        let n = admin_low_stock(&store, 1, "Sourdough", 3).await.unwrap();
        assert_eq!(n.kind, NotificationKind::LowStock);
        assert_eq!(n.message, "Low stock alert: Sourdough (3 items left)");
    }

    #[test]
    fn test_order_status_wire_names() {
        let status: OrderStatus = serde_json::from_str(r#""Out for Delivery""#).unwrap();
        assert_eq!(status, OrderStatus::OutForDelivery);
        let status: OrderStatus = serde_json::from_str(r#""OutForDelivery""#).unwrap();
        assert_eq!(status, OrderStatus::OutForDelivery);
    }
}
