use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::Widget;
use crate::alert::{AudioOutput, DesktopNotice, DesktopNotifier, Permission, Tone};
use crate::notification::model::{Notification, NotificationId};

pub const DEFAULT_AUTO_HIDE: Duration = Duration::from_secs(10);

/// Where "View" on the toast takes the admin
pub const ORDERS_ROUTE: &str = "/admin/orders";

#[derive(Debug, Clone, PartialEq)]
pub enum AlertState {
    Idle,
    Showing {
        notification: Notification,
        hide_at: Instant,
    },
}

/// Admin "new order" toast.
///
/// Shows the newest unread order-placed notification once per id, with a
/// chime and, when permitted, a desktop notification. The last shown id is
/// remembered so the same order seen again through a later reload never
/// re-triggers the toast.
pub struct OrderAlert {
    state: AlertState,
    last_shown: Option<NotificationId>,
    auto_hide: Duration,
    shown_count: u64,
    audio: Arc<dyn AudioOutput>,
    desktop: Arc<dyn DesktopNotifier>,
}

impl OrderAlert {
    pub fn new(audio: Arc<dyn AudioOutput>, desktop: Arc<dyn DesktopNotifier>) -> Self {
        // Ask once per session, only if the user has not decided yet
        if desktop.permission() == Permission::Default {
            desktop.request_permission();
        }

        Self {
            state: AlertState::Idle,
            last_shown: None,
            auto_hide: DEFAULT_AUTO_HIDE,
            shown_count: 0,
            audio,
            desktop,
        }
    }

    pub fn with_auto_hide(mut self, auto_hide: Duration) -> Self {
        self.auto_hide = auto_hide;
        self
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn showing(&self) -> Option<&Notification> {
        match &self.state {
            AlertState::Showing { notification, .. } => Some(notification),
            AlertState::Idle => None,
        }
    }

    /// How many times the toast has been raised
    pub fn shown_count(&self) -> u64 {
        self.shown_count
    }

    pub fn dismiss(&mut self) {
        self.state = AlertState::Idle;
    }

    /// "View" clicked: hide the toast and return the orders route
    pub fn view(&mut self) -> &'static str {
        self.dismiss();
        ORDERS_ROUTE
    }

    fn observe(&mut self, notifications: &[Notification], now: Instant) {
        // Inboxes are newest first
        let Some(latest) = notifications.iter().find(|n| n.is_unread_order()) else {
            return;
        };

        if self.last_shown.as_ref() == Some(&latest.id) {
            return;
        }

        self.last_shown = Some(latest.id.clone());
        self.state = AlertState::Showing {
            notification: latest.clone(),
            hide_at: now + self.auto_hide,
        };
        self.shown_count += 1;
        info!("Showing new order alert for notification {}", latest.id);

        self.raise_side_effects(latest);
    }

    fn raise_side_effects(&self, notification: &Notification) {
        if let Err(e) = self.audio.play(&Tone::order_chime()) {
            warn!("Could not play order chime: {}", e);
        }

        if self.desktop.permission() != Permission::Granted {
            return;
        }

        let notice = DesktopNotice {
            title: "New Order Received!".to_string(),
            body: notification.message.clone(),
            tag: "new-order".to_string(),
            require_interaction: false,
        };
        if let Err(e) = self.desktop.show(&notice) {
            warn!("Could not raise desktop notification: {}", e);
        }
    }
}

impl Widget for OrderAlert {
    fn refresh(&mut self, notifications: &[Notification]) {
        self.observe(notifications, Instant::now());
    }

    fn deadline(&self) -> Option<Instant> {
        match &self.state {
            AlertState::Showing { hide_at, .. } => Some(*hide_at),
            AlertState::Idle => None,
        }
    }

    fn on_deadline(&mut self, now: Instant) {
        if let AlertState::Showing { hide_at, .. } = &self.state {
            if now >= *hide_at {
                self.state = AlertState::Idle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertError, MockAudioOutput, MockDesktopNotifier};
    use crate::notification::model::{InboxKey, NewNotification, NotificationKind};
    use crate::notification::store::NotificationStore;
    use crate::signal::{ChangeBus, Origin};
    use crate::storage::MemoryStorage;
    use crate::widget::{mount, MountOptions};
    use chrono::Utc;

    fn order(id: i64, read: bool) -> Notification {
        Notification {
            id: id.into(),
            kind: NotificationKind::OrderPlaced,
            message: format!("New order #{} received from Asha", id),
            created_at: Utc::now(),
            read,
        }
    }

    fn quiet_audio(times: usize) -> Arc<MockAudioOutput> {
        let mut audio = MockAudioOutput::new();
        audio.expect_play().times(times).returning(|_| Ok(()));
        Arc::new(audio)
    }

    fn desktop(permission: Permission) -> MockDesktopNotifier {
        let mut desktop = MockDesktopNotifier::new();
        desktop.expect_permission().return_const(permission);
        desktop
    }

    #[tokio::test]
    async fn test_requests_permission_once_when_undecided() {
        let mut notifier = desktop(Permission::Default);
        notifier.expect_request_permission().times(1).return_const(());
        let _alert = OrderAlert::new(quiet_audio(0), Arc::new(notifier));
    }

    #[tokio::test]
    async fn test_does_not_request_when_decided() {
        let mut notifier = desktop(Permission::Denied);
        notifier.expect_request_permission().times(0);
        let _alert = OrderAlert::new(quiet_audio(0), Arc::new(notifier));
    }

    #[tokio::test]
    async fn test_same_order_is_shown_once() {
        let mut notifier = desktop(Permission::Granted);
        notifier
            .expect_show()
            .times(1)
            .withf(|notice| notice.tag == "new-order" && notice.body.contains("#2"))
            .returning(|_| Ok(()));
        let mut alert = OrderAlert::new(quiet_audio(1), Arc::new(notifier));

        let inbox = vec![order(2, false), order(1, false)];
        // Once through a change signal, once through a resync tick
        alert.refresh(&inbox);
        alert.refresh(&inbox);

        assert_eq!(alert.shown_count(), 1);
        assert_eq!(alert.showing().unwrap().id, NotificationId::from(2_i64));
    }

    #[tokio::test]
    async fn test_dismissed_order_does_not_come_back() {
        let mut alert = OrderAlert::new(quiet_audio(2), Arc::new(desktop(Permission::Denied)));

        alert.refresh(&[order(1, false)]);
        alert.dismiss();
        assert_eq!(alert.state(), &AlertState::Idle);

        alert.refresh(&[order(1, false)]);
        assert_eq!(alert.state(), &AlertState::Idle);

        // A newer order shows again
        alert.refresh(&[order(2, false), order(1, false)]);
        assert_eq!(alert.showing().unwrap().id, NotificationId::from(2_i64));
        assert_eq!(alert.view(), ORDERS_ROUTE);
        assert!(alert.showing().is_none());
    }

    #[tokio::test]
    async fn test_ignores_read_and_other_kinds() {
        let mut alert = OrderAlert::new(quiet_audio(0), Arc::new(desktop(Permission::Denied)));
        let mut low_stock = order(3, false);
        low_stock.kind = NotificationKind::LowStock;

        alert.refresh(&[low_stock, order(2, true)]);
        assert_eq!(alert.state(), &AlertState::Idle);
        assert_eq!(alert.shown_count(), 0);
    }

    #[tokio::test]
    async fn test_side_effect_failures_are_swallowed() {
        let mut audio = MockAudioOutput::new();
        audio
            .expect_play()
            .returning(|_| Err(AlertError::Unavailable("no device".to_string())));
        let mut notifier = desktop(Permission::Granted);
        notifier
            .expect_show()
            .returning(|_| Err(AlertError::Unavailable("blocked".to_string())));

        let mut alert = OrderAlert::new(Arc::new(audio), Arc::new(notifier));
        alert.refresh(&[order(1, false)]);
        assert!(alert.showing().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_hides_after_timeout() {
        let store = NotificationStore::new(Arc::new(MemoryStorage::new()), ChangeBus::new());
        let key = InboxKey::admin(1);
        let alert = OrderAlert::new(quiet_audio(1), Arc::new(desktop(Permission::Denied)))
            .with_auto_hide(Duration::from_secs(10));
        let handle = mount(store.clone(), key, alert, MountOptions::default()).await;
        let mut updates = handle.updates();

        store
            .append(
                key,
                NewNotification::new(NotificationKind::OrderPlaced, "New order #501"),
            )
            .await
            .unwrap();
        updates.changed().await.unwrap();
        assert!(handle.view(|a| a.showing().is_some()));

        tokio::time::advance(Duration::from_secs(11)).await;
        updates.changed().await.unwrap();
        assert_eq!(handle.view(|a| a.state().clone()), AlertState::Idle);

        handle.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloads_do_not_replay_shown_order() {
        let store = NotificationStore::new(Arc::new(MemoryStorage::new()), ChangeBus::new());
        let key = InboxKey::admin(1);
        let alert = OrderAlert::new(quiet_audio(1), Arc::new(desktop(Permission::Denied)))
            .with_auto_hide(Duration::from_secs(10));
        let handle = mount(
            store.clone(),
            key,
            alert,
            MountOptions {
                resync_interval: Some(Duration::from_secs(3)),
            },
        )
        .await;
        let mut updates = handle.updates();

        let placed = store
            .append(
                key,
                NewNotification::new(NotificationKind::OrderPlaced, "New order #501"),
            )
            .await
            .unwrap();
        updates.changed().await.unwrap();
        assert_eq!(handle.view(|a| a.shown_count()), 1);

        // A resync tick reloads the same inbox
        tokio::time::advance(Duration::from_secs(4)).await;
        updates.changed().await.unwrap();
        assert_eq!(handle.view(|a| a.shown_count()), 1);
        assert_eq!(handle.view(|a| a.showing().map(|n| n.id.clone())), Some(placed.id));

        handle.update(|a| a.dismiss());
        updates.borrow_and_update();

        // Neither a bridge resync nor the next tick brings it back
        store.bus().publish_resync(Origin::Bridge);
        updates.changed().await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        updates.changed().await.unwrap();
        assert_eq!(handle.view(|a| a.state().clone()), AlertState::Idle);
        assert_eq!(handle.view(|a| a.shown_count()), 1);

        handle.unmount().await;
    }
}
