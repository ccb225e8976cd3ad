use axum::{
    routing::{delete, get, post, put},
    Extension, Router,
};
use std::sync::Arc;

use crate::notification::controller::{
    clear_notifications, create_notification, delete_notification, get_notifications,
    get_unread_notifications, mark_all_as_read, mark_as_read,
};
use crate::notification::service::NotificationService;
use crate::websocket::notifications::{ws_handler, LiveFeedState};

/// Create a router for notifications
pub fn routes(service: Arc<NotificationService>, live_feed: LiveFeedState) -> Router {
    Router::new()
        .route("/api/notifications", post(create_notification))
        .route("/api/notifications/ws", get(ws_handler))
        .route(
            "/api/notifications/:user_id",
            get(get_notifications).delete(clear_notifications),
        )
        .route(
            "/api/notifications/:user_id/unread",
            get(get_unread_notifications),
        )
        .route(
            "/api/notifications/:user_id/read-all",
            put(mark_all_as_read),
        )
        .route("/api/notifications/:user_id/:id", delete(delete_notification))
        .route("/api/notifications/:user_id/:id/read", put(mark_as_read))
        .layer(Extension(service))
        .layer(Extension(live_feed))
}
