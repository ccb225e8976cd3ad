use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::storage::StorageError;

/// Whose inbox a notification lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn from_str(role: &str) -> Result<Self, String> {
        match role.to_uppercase().as_str() {
            "CUSTOMER" => Ok(Role::Customer),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", role)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Customer
    }
}

/// Identifies a single inbox: one ordered sequence per (role, user)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxKey {
    pub role: Role,
    pub user_id: i64,
}

impl InboxKey {
    pub fn new(role: Role, user_id: i64) -> Self {
        Self { role, user_id }
    }

    pub fn customer(user_id: i64) -> Self {
        Self::new(Role::Customer, user_id)
    }

    pub fn admin(user_id: i64) -> Self {
        Self::new(Role::Admin, user_id)
    }

    /// Persistence key, e.g. `notifications_ADMIN_1`
    pub fn storage_key(&self) -> String {
        format!("notifications_{}_{}", self.role.as_str(), self.user_id)
    }
}

impl fmt::Display for InboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Closed set of notification tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    OrderPlaced,
    OrderConfirmed,
    OrderPacked,
    OrderOutForDelivery,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    LowStock,
    // Unrecognised tags from storage or the backend land here
    #[serde(other)]
    Info,
}

impl NotificationKind {
    /// Icon name used by clients when rendering the list
    pub fn icon(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "shopping-cart",
            NotificationKind::OrderConfirmed => "check-circle",
            NotificationKind::OrderPacked => "inventory",
            NotificationKind::OrderOutForDelivery | NotificationKind::OrderShipped => {
                "local-shipping"
            }
            NotificationKind::OrderDelivered => "check-circle",
            NotificationKind::OrderCancelled => "cancel",
            NotificationKind::LowStock => "warning",
            NotificationKind::Info => "info",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "Order placed",
            NotificationKind::OrderConfirmed => "Order confirmed",
            NotificationKind::OrderPacked => "Order packed",
            NotificationKind::OrderOutForDelivery => "Out for delivery",
            NotificationKind::OrderShipped => "Order shipped",
            NotificationKind::OrderDelivered => "Order delivered",
            NotificationKind::OrderCancelled => "Order cancelled",
            NotificationKind::LowStock => "Low stock",
            NotificationKind::Info => "Info",
        }
    }
}

/// Notification identifier.
///
/// Locally generated ids are millisecond timestamps; ids coming back from the
/// backend are database keys. Both are accepted as JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[schema(value_type = String, example = "1700000000000")]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value when the id is timestamp- or database-derived
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl From<i64> for NotificationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => NotificationId(n.to_string()),
            RawId::Text(s) => NotificationId(s),
        })
    }
}

/// A single inbox entry, persisted as camelCase JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,

    #[serde(rename = "type")]
    #[schema(value_type = String, example = "ORDER_PLACED")]
    pub kind: NotificationKind,

    #[schema(example = "New order #501 received from Asha")]
    pub message: String,

    #[schema(value_type = String, format = "date-time", example = "2024-05-01T12:00:00Z")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn is_unread_order(&self) -> bool {
        self.kind == NotificationKind::OrderPlaced && !self.read
    }
}

/// Producer input; id, timestamp and read flag are assigned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewNotification {
    #[serde(rename = "type")]
    #[schema(value_type = String, example = "INFO")]
    pub kind: NotificationKind,
    pub message: String,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// An inbox with its derived unread count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InboxSnapshot {
    pub notifications: Vec<Notification>,
    #[schema(example = "3")]
    pub unread_count: usize,
}

impl InboxSnapshot {
    pub fn new(notifications: Vec<Notification>) -> Self {
        let unread_count = unread_count(&notifications);
        Self {
            notifications,
            unread_count,
        }
    }
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}

/// Possible notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Notification not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),
}
