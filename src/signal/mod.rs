//! Change signalling for notification inboxes.
//!
//! Every store mutation publishes a [`ChangeSignal`] on the process-wide
//! [`ChangeBus`]. Consumers subscribe per inbox and reload on each signal.
//! A lagged receiver is reported as a change as well, so a burst of writes
//! can coalesce but never goes unnoticed. A [`Scope::All`] signal asks every
//! subscriber to reload; the cross-process bridge sends one whenever it may
//! have missed per-inbox signals.

pub mod redis_bridge;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use uuid::Uuid;

use crate::notification::model::InboxKey;

/// Broadcast channel capacity. Receivers that fall further behind than this
/// see a lag, which they treat as "reload".
pub const CHANNEL_CAPACITY: usize = 256;

/// Where a change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A mutation made by this process
    Local,
    /// A mutation relayed from another service instance
    Remote(Uuid),
    /// The cross-process bridge itself, after a gap in relayed signals
    Bridge,
}

/// Which inboxes a signal covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Inbox(InboxKey),
    /// Any inbox may have changed
    All,
}

/// "This inbox changed, reload it." Carries no payload on purpose; readers
/// always go back to the store for the post-mutation snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSignal {
    pub scope: Scope,
    pub origin: Origin,
}

/// What woke a subscription up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Changed(Origin),
    /// Signals were dropped for this receiver; state must be reloaded
    Lagged(u64),
    /// A [`Scope::All`] signal; state must be reloaded
    Resync(Origin),
}

#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeSignal>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a signal; returns how many receivers were reached
    pub fn publish(&self, signal: ChangeSignal) -> usize {
        // No subscribers is not an error
        let reached = self.sender.send(signal).unwrap_or(0);
        debug!(
            "Change on {:?} ({:?}) delivered to {} receivers",
            signal.scope, signal.origin, reached
        );
        reached
    }

    pub fn publish_local(&self, key: InboxKey) -> usize {
        self.publish(ChangeSignal {
            scope: Scope::Inbox(key),
            origin: Origin::Local,
        })
    }

    /// Ask every subscriber to reload
    pub fn publish_resync(&self, origin: Origin) -> usize {
        self.publish(ChangeSignal {
            scope: Scope::All,
            origin,
        })
    }

    /// Subscribe to changes of a single inbox
    pub fn subscribe(&self, key: InboxKey) -> Subscription {
        Subscription {
            key,
            receiver: self.sender.subscribe(),
        }
    }

    /// Raw receiver for every inbox, used by the cross-process bridge
    pub fn subscribe_all(&self) -> broadcast::Receiver<ChangeSignal> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Per-inbox view of the bus; dropping it unsubscribes
#[derive(Debug)]
pub struct Subscription {
    key: InboxKey,
    receiver: broadcast::Receiver<ChangeSignal>,
}

impl Subscription {
    pub fn key(&self) -> InboxKey {
        self.key
    }

    /// Wait for the next change to this inbox.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn changed(&mut self) -> Option<Wake> {
        loop {
            match self.receiver.recv().await {
                Ok(ChangeSignal {
                    scope: Scope::Inbox(key),
                    origin,
                }) if key == self.key => return Some(Wake::Changed(origin)),
                Ok(ChangeSignal {
                    scope: Scope::All,
                    origin,
                }) => return Some(Wake::Resync(origin)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => return Some(Wake::Lagged(skipped)),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_filters_by_inbox() {
        let bus = ChangeBus::new();
        let mut admin = bus.subscribe(InboxKey::admin(1));

        bus.publish_local(InboxKey::customer(42));
        bus.publish_local(InboxKey::admin(1));

        assert_eq!(admin.changed().await, Some(Wake::Changed(Origin::Local)));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = ChangeBus::new();
        assert_eq!(bus.publish_local(InboxKey::admin(1)), 0);

        let _sub = bus.subscribe(InboxKey::admin(1));
        assert_eq!(bus.publish_local(InboxKey::admin(1)), 1);
    }

    #[tokio::test]
    async fn test_lag_is_reported_as_change() {
        let bus = ChangeBus::with_capacity(2);
        let mut sub = bus.subscribe(InboxKey::admin(1));

        for _ in 0..5 {
            bus.publish_local(InboxKey::admin(1));
        }

        assert!(matches!(sub.changed().await, Some(Wake::Lagged(_))));
        // After the lag the newest signals are still delivered
        assert_eq!(sub.changed().await, Some(Wake::Changed(Origin::Local)));
    }

    #[tokio::test]
    async fn test_resync_reaches_every_inbox() {
        let bus = ChangeBus::new();
        let mut admin = bus.subscribe(InboxKey::admin(1));
        let mut customer = bus.subscribe(InboxKey::customer(42));

        bus.publish_resync(Origin::Bridge);

        assert_eq!(admin.changed().await, Some(Wake::Resync(Origin::Bridge)));
        assert_eq!(customer.changed().await, Some(Wake::Resync(Origin::Bridge)));
    }

    #[tokio::test]
    async fn test_closed_bus_ends_subscription() {
        let bus = ChangeBus::new();
        let mut sub = bus.subscribe(InboxKey::customer(7));
        drop(bus);
        assert_eq!(sub.changed().await, None);
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let bus = ChangeBus::new();
        let sub = bus.subscribe(InboxKey::customer(7));
        assert_eq!(bus.receiver_count(), 1);
        drop(sub);
        assert_eq!(bus.receiver_count(), 0);
    }
}
