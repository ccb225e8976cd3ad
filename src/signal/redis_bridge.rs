use futures::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle, time};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ChangeBus, ChangeSignal, Origin, Scope};
use crate::notification::model::InboxKey;

/// Redis channel carrying change signals between service instances
pub const CHANGE_CHANNEL: &str = "notifications:changed";

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Message published on [`CHANGE_CHANNEL`].
///
/// A message without a key means every inbox may have changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSignal {
    instance: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<InboxKey>,
}

/// Relays change signals across processes over Redis pub/sub.
///
/// Local-origin signals go out tagged with this instance's id; signals from
/// other instances come back in as [`Origin::Remote`]. An instance never
/// receives its own writes back, the same way a browser tab never sees the
/// storage event for its own write.
///
/// Pub/sub is fire and forget, so gaps are covered with resyncs: a lagged or
/// failed publish is followed by a keyless message, and every (re)subscribe
/// raises a local [`Scope::All`] signal.
pub struct RedisSignalBridge {
    client: Client,
    bus: ChangeBus,
    instance: Uuid,
}

/// Running bridge tasks; dropping the handle stops both directions
pub struct BridgeHandle {
    outbound: JoinHandle<()>,
    inbound: JoinHandle<()>,
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.outbound.abort();
        self.inbound.abort();
    }
}

impl RedisSignalBridge {
    pub fn new(client: Client, bus: ChangeBus) -> Self {
        Self {
            client,
            bus,
            instance: Uuid::new_v4(),
        }
    }

    pub fn spawn(self) -> BridgeHandle {
        info!("Starting Redis signal bridge as instance {}", self.instance);

        let outbound = tokio::spawn(publish_local_changes(
            self.client.clone(),
            self.bus.clone(),
            self.instance,
        ));
        let inbound = tokio::spawn(relay_remote_changes(self.client, self.bus, self.instance));

        BridgeHandle { outbound, inbound }
    }
}

/// What the outbound side should send next
#[derive(Debug, Clone, Copy, PartialEq)]
enum Outgoing {
    Skip,
    Send(Scope),
}

/// Local-origin signals go out; a pending gap widens the next one to all inboxes
fn next_outgoing(signal: &ChangeSignal, gap: bool) -> Outgoing {
    // Relayed signals are not echoed back out
    if signal.origin != Origin::Local {
        return Outgoing::Skip;
    }
    if gap {
        Outgoing::Send(Scope::All)
    } else {
        Outgoing::Send(signal.scope)
    }
}

async fn publish_local_changes(client: Client, bus: ChangeBus, instance: Uuid) {
    let mut receiver = bus.subscribe_all();
    let mut conn: Option<ConnectionManager> = None;
    // Set when peers may have missed one of our signals
    let mut gap = false;

    loop {
        let scope = match receiver.recv().await {
            Ok(signal) => match next_outgoing(&signal, gap) {
                Outgoing::Send(scope) => scope,
                Outgoing::Skip => continue,
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    "Bridge skipped {} local change signals, asking peers to resync",
                    skipped
                );
                Scope::All
            }
            Err(RecvError::Closed) => break,
        };

        let json = match encode_signal(instance, scope) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode change signal: {}", e);
                continue;
            }
        };

        if conn.is_none() {
            match client.get_connection_manager().await {
                Ok(manager) => conn = Some(manager),
                Err(e) => {
                    error!("Redis connection error while publishing change: {}", e);
                    gap = true;
                    continue;
                }
            }
        }

        if let Some(manager) = conn.as_mut() {
            let result: Result<(), redis::RedisError> = manager.publish(CHANGE_CHANNEL, &json).await;
            match result {
                Ok(()) => gap = false,
                Err(e) => {
                    error!("Failed to publish change for {:?}: {}", scope, e);
                    gap = true;
                }
            }
        }
    }
}

async fn relay_remote_changes(client: Client, bus: ChangeBus, instance: Uuid) {
    let mut delay = RECONNECT_BASE_DELAY;

    loop {
        match client.get_async_pubsub().await {
            Ok(mut pubsub) => {
                if let Err(e) = pubsub.subscribe(CHANGE_CHANNEL).await {
                    error!("Failed to subscribe to Redis channel: {}", e);
                } else {
                    info!("Subscribed to Redis channel: {}", CHANGE_CHANNEL);
                    delay = RECONNECT_BASE_DELAY;

                    // Anything published while we were not subscribed is lost
                    bus.publish_resync(Origin::Bridge);

                    let mut stream = pubsub.on_message();
                    while let Some(msg) = stream.next().await {
                        let payload: String = match msg.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                error!("Failed to get message payload: {}", e);
                                continue;
                            }
                        };

                        if let Some(signal) = decode_signal(&payload, instance) {
                            bus.publish(signal);
                        }
                    }
                    warn!("Redis change stream ended, reconnecting");
                }
            }
            Err(e) => error!("Failed to get Redis PubSub connection: {}", e),
        }

        time::sleep(delay).await;
        delay = (delay * 2).min(RECONNECT_MAX_DELAY);
    }
}

fn encode_signal(instance: Uuid, scope: Scope) -> Result<String, serde_json::Error> {
    let key = match scope {
        Scope::Inbox(key) => Some(key),
        Scope::All => None,
    };
    serde_json::to_string(&WireSignal { instance, key })
}

/// Turn a channel message into a local signal, dropping our own echoes
fn decode_signal(payload: &str, own_instance: Uuid) -> Option<ChangeSignal> {
    let wire: WireSignal = match serde_json::from_str(payload) {
        Ok(wire) => wire,
        Err(e) => {
            warn!("Ignoring malformed change signal: {}", e);
            return None;
        }
    };

    if wire.instance == own_instance {
        debug!("Ignoring our own change signal for {:?}", wire.key);
        return None;
    }

    Some(ChangeSignal {
        scope: wire.key.map_or(Scope::All, Scope::Inbox),
        origin: Origin::Remote(wire.instance),
    })
}
