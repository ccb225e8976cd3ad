use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Widget;
use crate::notification::model::{unread_count, Notification, NotificationId};

/// Header bell: unread badge plus the dropdown list
#[derive(Debug, Clone, Default)]
pub struct NotificationBell {
    notifications: Vec<Notification>,
    unread_count: usize,
}

impl NotificationBell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_unread(&self) -> Option<&Notification> {
        self.notifications.iter().find(|n| !n.read)
    }

    /// What the bell shows at `now`
    pub fn render(&self, now: DateTime<Utc>) -> BellView {
        BellView {
            notifications: self
                .notifications
                .iter()
                .map(|n| BellEntry {
                    icon: n.kind.icon(),
                    label: n.kind.label(),
                    relative_time: relative_time(n.created_at, now),
                    notification: n.clone(),
                })
                .collect(),
            unread_count: self.unread_count,
            latest_unread: self.latest_unread().map(|n| n.id.clone()),
        }
    }
}

/// Rendered bell, as pushed to live clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BellView {
    pub notifications: Vec<BellEntry>,
    pub unread_count: usize,
    pub latest_unread: Option<NotificationId>,
}

/// One dropdown row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BellEntry {
    #[serde(flatten)]
    pub notification: Notification,
    pub icon: &'static str,
    pub label: &'static str,
    pub relative_time: String,
}

impl Widget for NotificationBell {
    fn refresh(&mut self, notifications: &[Notification]) {
        self.notifications = notifications.to_vec();
        self.unread_count = unread_count(notifications);
    }
}

/// "Just now", "5m ago", "3h ago", "2d ago", then the calendar date
fn relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created_at);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else if days < 7 {
        format!("{}d ago", days)
    } else {
        created_at.format("%Y-%m-%d").to_string()
    }
}
