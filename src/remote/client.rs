use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::notification::model::{InboxKey, Notification, NotificationId, NotificationKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend rejected request: {0}")]
    Rejected(String),
}

/// The storefront backend's notification endpoints
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn get_all(&self, key: InboxKey) -> Result<Vec<Notification>, RemoteError>;

    async fn mark_as_read(&self, id: &NotificationId) -> Result<(), RemoteError>;

    async fn mark_all_as_read(&self, key: InboxKey) -> Result<(), RemoteError>;

    async fn delete(&self, id: &NotificationId) -> Result<(), RemoteError>;
}

/// `{ success, message, data }` wrapper used by every backend response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<Option<T>, RemoteError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(RemoteError::Rejected(
                self.message.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

/// Backend notification row
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteNotification {
    id: NotificationId,
    message: String,
    #[serde(rename = "type")]
    kind: NotificationKind,
    #[serde(default)]
    read: Option<bool>,
    created_at: Option<String>,
}

impl From<RemoteNotification> for Notification {
    fn from(remote: RemoteNotification) -> Self {
        Notification {
            id: remote.id,
            kind: remote.kind,
            message: remote.message,
            created_at: remote
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            read: remote.read.unwrap_or(false),
        }
    }
}

/// The backend sends zone-less local timestamps; read those as UTC
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/notifications{}", self.base_url, path)
    }

    async fn send_unit(&self, request: reqwest::RequestBuilder) -> Result<(), RemoteError> {
        let envelope: Envelope<serde_json::Value> =
            request.send().await?.error_for_status()?.json().await?;
        envelope.into_result().map(|_| ())
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn get_all(&self, key: InboxKey) -> Result<Vec<Notification>, RemoteError> {
        debug!("Fetching backend notifications for {}", key);
        let envelope: Envelope<Vec<RemoteNotification>> = self
            .client
            .get(self.url(&format!("/{}", key.user_id)))
            .query(&[("userRole", key.role.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(envelope
            .into_result()?
            .unwrap_or_default()
            .into_iter()
            .map(Notification::from)
            .collect())
    }

    async fn mark_as_read(&self, id: &NotificationId) -> Result<(), RemoteError> {
        self.send_unit(self.client.put(self.url(&format!("/{}/read", id))))
            .await
    }

    async fn mark_all_as_read(&self, key: InboxKey) -> Result<(), RemoteError> {
        self.send_unit(
            self.client
                .put(self.url(&format!("/{}/read-all", key.user_id)))
                .query(&[("userRole", key.role.as_str())]),
        )
        .await
    }

    async fn delete(&self, id: &NotificationId) -> Result<(), RemoteError> {
        self.send_unit(self.client.delete(self.url(&format!("/{}", id))))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        routing::{delete, get, put},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::net::{SocketAddr, TcpListener};

    async fn spawn_backend(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(app.into_make_service())
                .await
                .unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_parse_backend_timestamps() {
        let naive = parse_timestamp("2024-05-01T12:30:00.123456").unwrap();
        assert_eq!(naive.to_rfc3339(), "2024-05-01T12:30:00.123456+00:00");
        let zoned = parse_timestamp("2024-05-01T14:30:00+02:00").unwrap();
        assert_eq!(zoned.to_rfc3339(), "2024-05-01T12:30:00+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_get_all_reads_envelope() {
        let app = Router::new().route(
            "/api/notifications/:user_id",
            get(
                |Path(user_id): Path<i64>, Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(user_id, 1);
                    assert_eq!(q.get("userRole").map(String::as_str), Some("ADMIN"));
                    Json(json!({
                        "success": true,
                        "data": [{
                            "id": 17,
                            "userId": 1,
                            "userRole": "ADMIN",
                            "message": "New order #501 received from Asha",
                            "type": "ORDER_PLACED",
                            "read": false,
                            "createdAt": "2024-05-01T12:00:00"
                        }]
                    }))
                },
            ),
        );
        let api = HttpNotificationApi::new(spawn_backend(app).await).unwrap();

        let notifications = api.get_all(InboxKey::admin(1)).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].id, NotificationId::from(17_i64));
        assert_eq!(notifications[0].kind, NotificationKind::OrderPlaced);
        assert!(!notifications[0].read);
    }

    #[tokio::test]
    async fn test_rejection_becomes_error() {
        let app = Router::new()
            .route(
                "/api/notifications/:id/read",
                put(|| async {
                    Json(json!({"success": false, "message": "Notification not found"}))
                }),
            )
            .route(
                "/api/notifications/:id",
                delete(|| async { Json(json!({"success": true, "message": "deleted"})) }),
            );
        let api = HttpNotificationApi::new(spawn_backend(app).await).unwrap();

        let err = api.mark_as_read(&"99".into()).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(ref m) if m == "Notification not found"));
        api.delete(&"99".into()).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let app = Router::new().route(
            "/api/notifications/:user_id/read-all",
            put(|| async {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(Value::Null),
                )
            }),
        );
        let api = HttpNotificationApi::new(spawn_backend(app).await).unwrap();

        assert!(matches!(
            api.mark_all_as_read(InboxKey::customer(42)).await,
            Err(RemoteError::Http(_))
        ));
    }
}
