use axum::{routing::post, Extension, Router};

use crate::notification::controller::{low_stock, order_placed, order_status_changed, AdminInbox};
use crate::notification::store::NotificationStore;

/// Producer endpoints driven by checkout and the admin order screen
pub fn routes(store: NotificationStore, admin: AdminInbox) -> Router {
    Router::new()
        .route("/api/orders/:order_id/placed", post(order_placed))
        .route("/api/orders/:order_id/status", post(order_status_changed))
        .route("/api/stock/low", post(low_stock))
        .layer(Extension(store))
        .layer(Extension(admin))
}
