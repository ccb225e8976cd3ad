use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::notification::model::{
    InboxKey, InboxSnapshot, NewNotification, Notification, NotificationError, NotificationId,
    NotificationKind, Role,
};
use crate::notification::producer::{self, OrderStatus};
use crate::notification::service::NotificationService;
use crate::notification::store::NotificationStore;

/// Inbox that receives admin-side notifications from the producer endpoints
#[derive(Debug, Clone, Copy)]
pub struct AdminInbox(pub i64);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleQuery {
    user_role: Option<String>,
}

impl RoleQuery {
    fn key(&self, user_id: i64) -> Result<InboxKey, NotificationError> {
        let role = match self.user_role.as_deref() {
            Some(role) => Role::from_str(role).map_err(NotificationError::ValidationError)?,
            None => Role::Customer,
        };
        Ok(InboxKey::new(role, user_id))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    #[schema(example = 42)]
    pub user_id: i64,
    pub user_role: Option<Role>,
    #[serde(rename = "type")]
    #[schema(value_type = String, example = "ORDER_SHIPPED")]
    pub kind: NotificationKind,
    #[schema(example = "Your order #501 has been shipped")]
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacedRequest {
    #[schema(example = 42)]
    pub customer_id: i64,
    #[schema(example = "Asha")]
    pub customer_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusRequest {
    #[schema(example = 42)]
    pub customer_id: i64,
    #[schema(value_type = String, example = "Out for Delivery")]
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LowStockRequest {
    #[schema(example = "Sourdough")]
    pub item_name: String,
    #[schema(example = 3)]
    pub quantity: i64,
}

/// `{ success, message, data }` envelope returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
        })
    }

    fn with_message(message: &str, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = false)]
    pub success: bool,
    #[schema(example = "Notification not found")]
    pub message: String,
    #[schema(example = "NOT_FOUND")]
    pub code: String,
}

fn message_only(message: &str) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        message: Some(message.to_string()),
        data: None,
    })
}

// Map NotificationError to an HTTP response
fn notification_error_to_response(err: NotificationError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, message, code) = match err {
        NotificationError::StorageError(e) => {
            error!("Storage error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage error".to_string(),
                "STORAGE_ERROR",
            )
        }
        NotificationError::SerializationError(e) => {
            error!("Serialization error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process notification data".to_string(),
                "SERIALIZATION_ERROR",
            )
        }
        NotificationError::NotFound => (
            StatusCode::NOT_FOUND,
            "Notification not found".to_string(),
            "NOT_FOUND",
        ),
        NotificationError::ValidationError(message) => {
            (StatusCode::BAD_REQUEST, message, "VALIDATION_ERROR")
        }
    };

    (
        status,
        Json(ErrorResponse {
            success: false,
            message,
            code: code.to_string(),
        }),
    )
}

/// Create a notification in a user's inbox
#[utoipa::path(
    post,
    path = "/api/notifications",
    tag = "notifications",
    request_body = CreateNotificationRequest,
    responses(
        (status = 201, description = "Notification created", body = Notification),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn create_notification(
    Extension(service): Extension<Arc<NotificationService>>,
    Json(request): Json<CreateNotificationRequest>,
) -> impl IntoResponse {
    let key = InboxKey::new(request.user_role.unwrap_or_default(), request.user_id);
    info!("Creating {:?} notification for {}", request.kind, key);

    match service
        .store()
        .append(key, NewNotification::new(request.kind, request.message))
        .await
    {
        Ok(notification) => (
            StatusCode::CREATED,
            ApiResponse::with_message("Notification created successfully", notification),
        )
            .into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// List a user's notifications, newest first
#[utoipa::path(
    get,
    path = "/api/notifications/{userId}",
    tag = "notifications",
    params(
        ("userId" = i64, Path, description = "Inbox owner"),
        ("userRole" = Option<String>, Query, description = "CUSTOMER or ADMIN, defaults to CUSTOMER", example = "ADMIN")
    ),
    responses(
        (status = 200, description = "Inbox with unread count", body = InboxSnapshot),
        (status = 400, description = "Unknown role", body = ErrorResponse)
    )
)]
pub async fn get_notifications(
    Path(user_id): Path<i64>,
    Query(query): Query<RoleQuery>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> impl IntoResponse {
    let key = match query.key(user_id) {
        Ok(key) => key,
        Err(e) => return notification_error_to_response(e).into_response(),
    };

    ApiResponse::data(service.refresh(key).await).into_response()
}

/// Unread notifications only
#[utoipa::path(
    get,
    path = "/api/notifications/{userId}/unread",
    tag = "notifications",
    params(
        ("userId" = i64, Path, description = "Inbox owner"),
        ("userRole" = Option<String>, Query, description = "CUSTOMER or ADMIN, defaults to CUSTOMER", example = "ADMIN")
    ),
    responses(
        (status = 200, description = "Unread entries with their count", body = InboxSnapshot),
        (status = 400, description = "Unknown role", body = ErrorResponse)
    )
)]
pub async fn get_unread_notifications(
    Path(user_id): Path<i64>,
    Query(query): Query<RoleQuery>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> impl IntoResponse {
    let key = match query.key(user_id) {
        Ok(key) => key,
        Err(e) => return notification_error_to_response(e).into_response(),
    };

    let unread: Vec<Notification> = service
        .store()
        .load(key)
        .await
        .into_iter()
        .filter(|n| !n.read)
        .collect();
    ApiResponse::data(InboxSnapshot::new(unread)).into_response()
}

/// Mark one notification read
#[utoipa::path(
    put,
    path = "/api/notifications/{userId}/{id}/read",
    tag = "notifications",
    params(
        ("userId" = i64, Path, description = "Inbox owner"),
        ("id" = String, Path, description = "Notification id"),
        ("userRole" = Option<String>, Query, description = "CUSTOMER or ADMIN, defaults to CUSTOMER", example = "ADMIN")
    ),
    responses(
        (status = 200, description = "Marked as read"),
        (status = 404, description = "No such notification", body = ErrorResponse)
    )
)]
pub async fn mark_as_read(
    Path((user_id, id)): Path<(i64, String)>,
    Query(query): Query<RoleQuery>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> impl IntoResponse {
    let key = match query.key(user_id) {
        Ok(key) => key,
        Err(e) => return notification_error_to_response(e).into_response(),
    };

    match service.mark_read(key, &NotificationId::new(id)).await {
        Ok(true) => message_only("Notification marked as read").into_response(),
        Ok(false) => notification_error_to_response(NotificationError::NotFound).into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// Mark every notification in the inbox read
#[utoipa::path(
    put,
    path = "/api/notifications/{userId}/read-all",
    tag = "notifications",
    params(
        ("userId" = i64, Path, description = "Inbox owner"),
        ("userRole" = Option<String>, Query, description = "CUSTOMER or ADMIN, defaults to CUSTOMER", example = "ADMIN")
    ),
    responses(
        (status = 200, description = "All marked as read", body = InboxSnapshot),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn mark_all_as_read(
    Path(user_id): Path<i64>,
    Query(query): Query<RoleQuery>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> impl IntoResponse {
    let key = match query.key(user_id) {
        Ok(key) => key,
        Err(e) => return notification_error_to_response(e).into_response(),
    };

    match service.mark_all_read(key).await {
        Ok(snapshot) => {
            ApiResponse::with_message("All notifications marked as read", snapshot).into_response()
        }
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// Delete one notification
#[utoipa::path(
    delete,
    path = "/api/notifications/{userId}/{id}",
    tag = "notifications",
    params(
        ("userId" = i64, Path, description = "Inbox owner"),
        ("id" = String, Path, description = "Notification id"),
        ("userRole" = Option<String>, Query, description = "CUSTOMER or ADMIN, defaults to CUSTOMER", example = "ADMIN")
    ),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "No such notification", body = ErrorResponse)
    )
)]
pub async fn delete_notification(
    Path((user_id, id)): Path<(i64, String)>,
    Query(query): Query<RoleQuery>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> impl IntoResponse {
    let key = match query.key(user_id) {
        Ok(key) => key,
        Err(e) => return notification_error_to_response(e).into_response(),
    };

    match service.delete(key, &NotificationId::new(id)).await {
        Ok(true) => message_only("Notification deleted").into_response(),
        Ok(false) => notification_error_to_response(NotificationError::NotFound).into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// Drop a whole inbox
#[utoipa::path(
    delete,
    path = "/api/notifications/{userId}",
    tag = "notifications",
    params(
        ("userId" = i64, Path, description = "Inbox owner"),
        ("userRole" = Option<String>, Query, description = "CUSTOMER or ADMIN, defaults to CUSTOMER", example = "ADMIN")
    ),
    responses(
        (status = 200, description = "Inbox cleared"),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn clear_notifications(
    Path(user_id): Path<i64>,
    Query(query): Query<RoleQuery>,
    Extension(service): Extension<Arc<NotificationService>>,
) -> impl IntoResponse {
    let key = match query.key(user_id) {
        Ok(key) => key,
        Err(e) => return notification_error_to_response(e).into_response(),
    };

    match service.clear(key).await {
        Ok(()) => message_only("Notifications cleared").into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// Checkout completed: notify the customer and the admin inbox
#[utoipa::path(
    post,
    path = "/api/orders/{orderId}/placed",
    tag = "orders",
    params(("orderId" = i64, Path, description = "Order id")),
    request_body = OrderPlacedRequest,
    responses(
        (status = 201, description = "Notifications sent", body = Vec<Notification>),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn order_placed(
    Path(order_id): Path<i64>,
    Extension(store): Extension<NotificationStore>,
    Extension(AdminInbox(admin_id)): Extension<AdminInbox>,
    Json(request): Json<OrderPlacedRequest>,
) -> impl IntoResponse {
    if request.customer_name.trim().is_empty() {
        return notification_error_to_response(NotificationError::ValidationError(
            "Customer name cannot be empty".to_string(),
        ))
        .into_response();
    }

    match producer::place_order(
        &store,
        request.customer_id,
        &request.customer_name,
        admin_id,
        order_id,
    )
    .await
    {
        Ok(sent) => (StatusCode::CREATED, ApiResponse::data(sent)).into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// Admin moved an order to a new status
#[utoipa::path(
    post,
    path = "/api/orders/{orderId}/status",
    tag = "orders",
    params(("orderId" = i64, Path, description = "Order id")),
    request_body = OrderStatusRequest,
    responses(
        (status = 200, description = "Notifications sent for the new status", body = Vec<Notification>),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn order_status_changed(
    Path(order_id): Path<i64>,
    Extension(store): Extension<NotificationStore>,
    Extension(AdminInbox(admin_id)): Extension<AdminInbox>,
    Json(request): Json<OrderStatusRequest>,
) -> impl IntoResponse {
    match producer::notify_status_change(
        &store,
        request.customer_id,
        admin_id,
        order_id,
        request.status,
    )
    .await
    {
        Ok(sent) => ApiResponse::data(sent).into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// Stock for an item dropped below its threshold
#[utoipa::path(
    post,
    path = "/api/stock/low",
    tag = "orders",
    request_body = LowStockRequest,
    responses(
        (status = 201, description = "Admin notified", body = Notification),
        (status = 400, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn low_stock(
    Extension(store): Extension<NotificationStore>,
    Extension(AdminInbox(admin_id)): Extension<AdminInbox>,
    Json(request): Json<LowStockRequest>,
) -> impl IntoResponse {
    match producer::admin_low_stock(&store, admin_id, &request.item_name, request.quantity).await {
        Ok(notification) => (StatusCode::CREATED, ApiResponse::data(notification)).into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}
