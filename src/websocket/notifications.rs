use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{
    future::pending,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::{debug, error, info, warn};

use crate::alert::{
    tone::DEFAULT_SAMPLE_RATE, AlertError, AudioOutput, DesktopNotice, DesktopNotifier,
    Permission, Tone,
};
use crate::notification::model::{InboxKey, Notification, NotificationId, Role};
use crate::notification::store::NotificationStore;
use crate::widget::{
    bell::BellView, mount, MountOptions, NotificationBell, OrderAlert, OrderBadge, WidgetHandle,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const OUTBOX_CAPACITY: usize = 100;

/// Query parameters for WebSocket connections
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveFeedParams {
    user_id: Option<i64>,
    user_role: Option<String>,
    /// Browser notification permission as currently known to the client
    permission: Option<String>,
    /// Send the chime as a binary frame; on by default
    sound: Option<bool>,
}

/// Shared state behind the live feed endpoint
#[derive(Clone)]
pub struct LiveFeedState {
    pub store: NotificationStore,
    pub alert_auto_hide: Duration,
    pub admin_resync: Option<Duration>,
    pub customer_resync: Option<Duration>,
}

impl LiveFeedState {
    fn resync_for(&self, role: Role) -> Option<Duration> {
        match role {
            Role::Admin => self.admin_resync,
            Role::Customer => self.customer_resync,
        }
    }
}

/// Server to client frames
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedFrame {
    Inbox(BellView),
    Alert { notification: Notification },
    AlertHidden,
    /// Unread new-order count for the admin sidebar
    OrderBadge { count: usize },
    Desktop(DesktopNotice),
    RequestPermission,
    Navigate { route: String },
}

impl FeedFrame {
    fn into_message(self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(serde_json::to_string(&self)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAction {
    Dismiss,
    View,
}

/// Client to server frames
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Action { action: ClientAction },
    Permission { permission: Permission },
}

/// Plays the chime by shipping it to the client as a WAV frame
pub struct WsAudio {
    tx: mpsc::Sender<Message>,
    enabled: bool,
}

impl WsAudio {
    pub fn new(tx: mpsc::Sender<Message>, enabled: bool) -> Self {
        Self { tx, enabled }
    }
}

impl AudioOutput for WsAudio {
    fn play(&self, tone: &Tone) -> Result<(), AlertError> {
        if !self.enabled {
            return Ok(());
        }
        self.tx
            .try_send(Message::Binary(tone.to_wav(DEFAULT_SAMPLE_RATE)))
            .map_err(|e| AlertError::Unavailable(e.to_string()))
    }
}

/// Forwards desktop notices to the client, which owns the real permission
pub struct WsDesktop {
    tx: mpsc::Sender<Message>,
    permission: Arc<Mutex<Permission>>,
}

impl WsDesktop {
    pub fn new(tx: mpsc::Sender<Message>, permission: Permission) -> Self {
        Self {
            tx,
            permission: Arc::new(Mutex::new(permission)),
        }
    }

    pub fn set_permission(&self, permission: Permission) {
        match self.permission.lock() {
            Ok(mut guard) => *guard = permission,
            Err(poisoned) => *poisoned.into_inner() = permission,
        }
    }

    fn send(&self, frame: FeedFrame) -> Result<(), AlertError> {
        let message = frame
            .into_message()
            .map_err(|e| AlertError::Unavailable(e.to_string()))?;
        self.tx
            .try_send(message)
            .map_err(|e| AlertError::Unavailable(e.to_string()))
    }
}

impl DesktopNotifier for WsDesktop {
    fn permission(&self) -> Permission {
        match self.permission.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn request_permission(&self) {
        if let Err(e) = self.send(FeedFrame::RequestPermission) {
            warn!("Could not ask client for notification permission: {}", e);
        }
    }

    fn show(&self, notice: &DesktopNotice) -> Result<(), AlertError> {
        self.send(FeedFrame::Desktop(notice.clone()))
    }
}

/// Handle an invalid socket connection
async fn handle_invalid_socket(mut socket: WebSocket, error_message: String) {
    let body = serde_json::json!({ "error": error_message }).to_string();
    if let Err(e) = socket.send(Message::Text(body)).await {
        error!("Error sending error message on WS: {}", e);
    }

    let _ = socket.close().await;
}

async fn send_frame(tx: &mpsc::Sender<Message>, frame: FeedFrame) -> bool {
    match frame.into_message() {
        Ok(message) => tx.send(message).await.is_ok(),
        Err(e) => {
            error!("Failed to encode feed frame: {}", e);
            true
        }
    }
}

async fn next_update(rx: &mut Option<watch::Receiver<u64>>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => pending().await,
    }
}

fn inbox_frame(bell: &WidgetHandle<NotificationBell>) -> FeedFrame {
    FeedFrame::Inbox(bell.view(|b| b.render(Utc::now())))
}

/// Handle a connected inbox viewer
async fn handle_connection(
    socket: WebSocket,
    key: InboxKey,
    permission: Permission,
    sound: bool,
    state: LiveFeedState,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOX_CAPACITY);

    // Forward messages from channel to WebSocket
    let forward_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                error!("Error forwarding message to WebSocket: {}", e);
                break;
            }
        }
    });

    let tx_heartbeat = tx.clone();
    let heartbeat_task = tokio::spawn(async move {
        let mut interval = time::interval(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = tx_heartbeat.send(Message::Ping(vec![])).await {
                error!("Error sending heartbeat: {}", e);
                break;
            }
        }
    });

    let options = MountOptions {
        resync_interval: state.resync_for(key.role),
    };
    let bell = mount(
        state.store.clone(),
        key,
        NotificationBell::new(),
        options.clone(),
    )
    .await;
    let mut bell_updates = bell.updates();

    let desktop = Arc::new(WsDesktop::new(tx.clone(), permission));
    let (alert, badge) = match key.role {
        Role::Admin => {
            let widget = OrderAlert::new(
                Arc::new(WsAudio::new(tx.clone(), sound)),
                desktop.clone(),
            )
            .with_auto_hide(state.alert_auto_hide);
            (
                Some(mount(state.store.clone(), key, widget, options.clone()).await),
                Some(mount(state.store.clone(), key, OrderBadge::new(), options).await),
            )
        }
        Role::Customer => (None, None),
    };
    let mut alert_updates = alert.as_ref().map(|a| a.updates());
    let mut badge_updates = badge.as_ref().map(|b| b.updates());
    let mut badge_count = badge.as_ref().map(|b| b.view(|b| b.count()));
    let mut shown: Option<NotificationId> = None;

    if let Some(alert) = &alert {
        if let Some(notification) = alert.view(|a| a.showing().cloned()) {
            shown = Some(notification.id.clone());
            send_frame(&tx, FeedFrame::Alert { notification }).await;
        }
    }
    send_frame(&tx, inbox_frame(&bell)).await;
    if let Some(count) = badge_count {
        send_frame(&tx, FeedFrame::OrderBadge { count }).await;
    }

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket closed by client");
                        break;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("Received pong from client");
                        continue;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                };

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Permission { permission }) => {
                        info!("Client {} set notification permission to {:?}", key, permission);
                        desktop.set_permission(permission);
                    }
                    Ok(ClientMessage::Action { action }) => {
                        let Some(alert) = &alert else {
                            continue;
                        };
                        match action {
                            ClientAction::Dismiss => alert.update(|a| a.dismiss()),
                            ClientAction::View => {
                                let route = alert.update(|a| a.view());
                                let frame = FeedFrame::Navigate { route: route.to_string() };
                                if !send_frame(&tx, frame).await {
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => debug!("Ignoring client message {:?}: {}", text, e),
                }
            }
            changed = bell_updates.changed() => {
                if changed.is_err() || !send_frame(&tx, inbox_frame(&bell)).await {
                    break;
                }
            }
            changed = next_update(&mut badge_updates) => {
                let Some(badge) = &badge else {
                    continue;
                };
                if !changed {
                    break;
                }

                let count = badge.view(|b| b.count());
                if badge_count != Some(count) {
                    badge_count = Some(count);
                    if !send_frame(&tx, FeedFrame::OrderBadge { count }).await {
                        break;
                    }
                }
            }
            changed = next_update(&mut alert_updates) => {
                let Some(alert) = &alert else {
                    continue;
                };
                if !changed {
                    break;
                }

                let showing = alert.view(|a| a.showing().cloned());
                let frame = match (showing, &shown) {
                    (Some(notification), Some(id)) if &notification.id == id => None,
                    (Some(notification), _) => {
                        shown = Some(notification.id.clone());
                        Some(FeedFrame::Alert { notification })
                    }
                    (None, Some(_)) => {
                        shown = None;
                        Some(FeedFrame::AlertHidden)
                    }
                    (None, None) => None,
                };
                if let Some(frame) = frame {
                    if !send_frame(&tx, frame).await {
                        break;
                    }
                }
            }
        }
    }

    // Clean up
    forward_task.abort();
    heartbeat_task.abort();
    bell.unmount().await;
    if let Some(alert) = alert {
        alert.unmount().await;
    }
    if let Some(badge) = badge {
        badge.unmount().await;
    }

    info!("WebSocket connection closed for {}", key);
}

/// Live inbox feed for one user
#[utoipa::path(
    get,
    path = "/api/notifications/ws",
    tag = "notifications",
    params(
        ("userId" = i64, Query, description = "Inbox owner"),
        ("userRole" = Option<String>, Query, description = "CUSTOMER or ADMIN, defaults to CUSTOMER"),
        ("permission" = Option<String>, Query, description = "default, granted or denied"),
        ("sound" = Option<bool>, Query, description = "Send the order chime as a binary frame")
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol")
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<LiveFeedParams>,
    Extension(state): Extension<LiveFeedState>,
) -> impl IntoResponse {
    let Some(user_id) = params.user_id else {
        return ws.on_upgrade(|socket| async move {
            handle_invalid_socket(socket, "Missing userId".to_string()).await;
        });
    };

    let role = match params.user_role.as_deref().map(Role::from_str) {
        None => Role::Customer,
        Some(Ok(role)) => role,
        Some(Err(e)) => {
            return ws.on_upgrade(move |socket| async move {
                handle_invalid_socket(socket, e).await;
            });
        }
    };

    let key = InboxKey::new(role, user_id);
    let permission = params
        .permission
        .as_deref()
        .map(Permission::from_str)
        .unwrap_or(Permission::Default);
    let sound = params.sound.unwrap_or(true);

    info!("{} connected to notifications WebSocket", key);
    ws.on_upgrade(move |socket| async move {
        handle_connection(socket, key, permission, sound, state).await;
    })
}
