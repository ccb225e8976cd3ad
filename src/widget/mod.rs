//! Consumer widgets: read models mounted on an inbox.
//!
//! [`mount`] loads the inbox once, then keeps the widget current from change
//! signals (plus an optional resync tick for storage shared without a
//! bridge). The returned [`WidgetHandle`] owns the background task: after
//! [`WidgetHandle::unmount`] returns, or once the handle is dropped, no
//! refresh, tick or deadline handler runs again.

pub mod badge;
pub mod bell;
pub mod order_alert;

use std::future::pending;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::notification::model::{InboxKey, Notification};
use crate::notification::store::NotificationStore;
use crate::signal::Wake;

pub use badge::OrderBadge;
pub use bell::NotificationBell;
pub use order_alert::OrderAlert;

pub trait Widget: Send + 'static {
    /// Recompute the view from the current inbox (newest first)
    fn refresh(&mut self, notifications: &[Notification]);

    /// Next moment the widget wants `on_deadline` called, if any
    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn on_deadline(&mut self, _now: Instant) {}
}

#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    /// Reload on a fixed period as well as on change signals
    pub resync_interval: Option<Duration>,
}

/// Owner of a mounted widget
pub struct WidgetHandle<W> {
    key: InboxKey,
    state: Arc<Mutex<W>>,
    updates: Arc<watch::Sender<u64>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<W: Widget> WidgetHandle<W> {
    /// Read the widget state
    pub fn view<R>(&self, f: impl FnOnce(&W) -> R) -> R {
        f(&lock(&self.state))
    }

    /// Act on the widget, e.g. a dismiss click
    pub fn update<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let result = f(&mut lock(&self.state));
        self.bump();
        result
    }

    /// Receiver that ticks after every refresh, deadline or update
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    fn bump(&self) {
        self.updates.send_modify(|v| *v += 1);
    }

    /// Stop the widget and wait until its task has finished
    pub async fn unmount(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Widget task for {} ended abnormally: {}", self.key, e);
                }
            }
        }
        debug!("Widget unmounted from {}", self.key);
    }
}

impl<W> Drop for WidgetHandle<W> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Mount `widget` on the inbox `key`.
///
/// The widget has seen the current inbox by the time this returns.
pub async fn mount<W: Widget>(
    store: NotificationStore,
    key: InboxKey,
    widget: W,
    options: MountOptions,
) -> WidgetHandle<W> {
    // Subscribe before the first load so no change slips in between
    let subscription = store.bus().subscribe(key);
    let state = Arc::new(Mutex::new(widget));
    let (updates, _) = watch::channel(0u64);
    let updates = Arc::new(updates);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let notifications = store.load(key).await;
    lock(&state).refresh(&notifications);
    updates.send_modify(|v| *v += 1);

    let resync = options.resync_interval.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let task = tokio::spawn(run(
        store,
        subscription,
        state.clone(),
        updates.clone(),
        shutdown_rx,
        resync,
    ));

    WidgetHandle {
        key,
        state,
        updates,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    }
}

async fn run<W: Widget>(
    store: NotificationStore,
    mut subscription: crate::signal::Subscription,
    state: Arc<Mutex<W>>,
    updates: Arc<watch::Sender<u64>>,
    mut shutdown: oneshot::Receiver<()>,
    mut resync: Option<Interval>,
) {
    let key = subscription.key();

    loop {
        let deadline = lock(&state).deadline();

        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            wake = subscription.changed() => match wake {
                Some(Wake::Lagged(skipped)) => {
                    debug!("Widget on {} lagged by {} signals, reloading", key, skipped);
                    reload(&store, key, &state).await;
                }
                Some(Wake::Resync(origin)) => {
                    debug!("Widget on {} resyncing after {:?}", key, origin);
                    reload(&store, key, &state).await;
                }
                Some(Wake::Changed(_)) => reload(&store, key, &state).await,
                None => break,
            },

            _ = tick(&mut resync) => reload(&store, key, &state).await,

            _ = until(deadline) => lock(&state).on_deadline(Instant::now()),
        }

        updates.send_modify(|v| *v += 1);
    }
}

async fn reload<W: Widget>(store: &NotificationStore, key: InboxKey, state: &Arc<Mutex<W>>) {
    let notifications = store.load(key).await;
    lock(state).refresh(&notifications);
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}

// A panicking widget must not take every later reader down with it
fn lock<W>(state: &Mutex<W>) -> MutexGuard<'_, W> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::model::{NewNotification, NotificationKind};
    use crate::signal::{ChangeBus, Origin};
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Counting {
        refreshes: Arc<AtomicUsize>,
        last_len: Arc<AtomicUsize>,
    }

    impl Widget for Counting {
        fn refresh(&mut self, notifications: &[Notification]) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.last_len.store(notifications.len(), Ordering::SeqCst);
        }
    }

    fn store() -> NotificationStore {
        NotificationStore::new(Arc::new(MemoryStorage::new()), ChangeBus::new())
    }

    fn info(message: &str) -> NewNotification {
        NewNotification::new(NotificationKind::Info, message)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_mount_loads_current_inbox() {
        let store = store();
        let key = InboxKey::customer(42);
        store.append(key, info("a")).await.unwrap();

        let widget = Counting::default();
        let handle = mount(store, key, widget.clone(), MountOptions::default()).await;

        assert_eq!(widget.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(handle.view(|w| w.last_len.load(Ordering::SeqCst)), 1);
        handle.unmount().await;
    }

    #[tokio::test]
    async fn test_refreshes_on_change_signal() {
        let store = store();
        let key = InboxKey::admin(1);
        let widget = Counting::default();
        let handle = mount(store.clone(), key, widget.clone(), MountOptions::default()).await;
        let mut updates = handle.updates();
        updates.borrow_and_update();

        store.append(key, info("a")).await.unwrap();
        updates.changed().await.unwrap();

        assert_eq!(widget.last_len.load(Ordering::SeqCst), 1);
        assert_eq!(widget.refreshes.load(Ordering::SeqCst), 2);

        // Other inboxes do not wake this widget
        store.append(InboxKey::admin(2), info("b")).await.unwrap();
        settle().await;
        assert_eq!(widget.refreshes.load(Ordering::SeqCst), 2);

        handle.unmount().await;
    }

    #[tokio::test]
    async fn test_bridge_resync_reloads() {
        let store = store();
        let key = InboxKey::customer(42);
        let widget = Counting::default();
        let handle = mount(store.clone(), key, widget.clone(), MountOptions::default()).await;
        let mut updates = handle.updates();
        updates.borrow_and_update();

        // Written by a peer whose per-inbox signal never arrived
        store
            .storage()
            .set(
                &key.storage_key(),
                r#"[{"id":1,"type":"INFO","message":"x","createdAt":"2024-05-01T12:00:00Z","read":false}]"#,
            )
            .await
            .unwrap();
        settle().await;
        assert_eq!(widget.last_len.load(Ordering::SeqCst), 0);

        store.bus().publish_resync(Origin::Bridge);
        updates.changed().await.unwrap();
        assert_eq!(widget.last_len.load(Ordering::SeqCst), 1);

        handle.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_interval_reloads() {
        let store = store();
        let key = InboxKey::customer(42);
        let widget = Counting::default();
        let handle = mount(
            store.clone(),
            key,
            widget.clone(),
            MountOptions {
                resync_interval: Some(Duration::from_secs(30)),
            },
        )
        .await;

        // A write that bypasses the bus, like another process sharing files
        store
            .storage()
            .set(
                &key.storage_key(),
                r#"[{"id":1,"type":"INFO","message":"x","createdAt":"2024-05-01T12:00:00Z","read":false}]"#,
            )
            .await
            .unwrap();
        settle().await;
        assert_eq!(widget.last_len.load(Ordering::SeqCst), 0);

        time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(widget.last_len.load(Ordering::SeqCst), 1);

        handle.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_runs_after_unmount() {
        let store = store();
        let key = InboxKey::admin(1);
        let widget = Counting::default();
        let handle = mount(
            store.clone(),
            key,
            widget.clone(),
            MountOptions {
                resync_interval: Some(Duration::from_secs(3)),
            },
        )
        .await;

        handle.unmount().await;
        let after_unmount = widget.refreshes.load(Ordering::SeqCst);

        store.append(key, info("late")).await.unwrap();
        time::advance(Duration::from_secs(10)).await;
        settle().await;

        assert_eq!(widget.refreshes.load(Ordering::SeqCst), after_unmount);
        // The subscription was released with the task
        assert_eq!(store.bus().receiver_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_widget() {
        let store = store();
        let key = InboxKey::admin(1);
        let widget = Counting::default();
        let handle = mount(
            store.clone(),
            key,
            widget.clone(),
            MountOptions {
                resync_interval: Some(Duration::from_secs(3)),
            },
        )
        .await;

        drop(handle);
        settle().await;
        let after_drop = widget.refreshes.load(Ordering::SeqCst);

        store.append(key, info("late")).await.unwrap();
        time::advance(Duration::from_secs(10)).await;
        settle().await;

        assert_eq!(widget.refreshes.load(Ordering::SeqCst), after_drop);
    }
}
