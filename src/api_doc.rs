use utoipa::OpenApi;

/// API documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bakery Notification Hub API",
        version = "0.1.0",
        description = "Per-user notification inboxes with a live WebSocket feed"
    ),
    paths(
        crate::routes::health::health_check,
        // Inbox endpoints
        crate::notification::controller::create_notification,
        crate::notification::controller::get_notifications,
        crate::notification::controller::get_unread_notifications,
        crate::notification::controller::mark_as_read,
        crate::notification::controller::mark_all_as_read,
        crate::notification::controller::delete_notification,
        crate::notification::controller::clear_notifications,
        crate::websocket::notifications::ws_handler,
        // Producer endpoints
        crate::notification::controller::order_placed,
        crate::notification::controller::order_status_changed,
        crate::notification::controller::low_stock
    ),
    components(
        schemas(
            crate::routes::health::HealthResponse,
            crate::notification::model::Role,
            crate::notification::model::NotificationId,
            crate::notification::model::Notification,
            crate::notification::model::NewNotification,
            crate::notification::model::InboxSnapshot,
            crate::notification::controller::CreateNotificationRequest,
            crate::notification::controller::OrderPlacedRequest,
            crate::notification::controller::OrderStatusRequest,
            crate::notification::controller::LowStockRequest,
            crate::notification::controller::ErrorResponse
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "notifications", description = "Notification inbox endpoints"),
        (name = "orders", description = "Order and stock events that produce notifications")
    )
)]
pub struct ApiDoc;
