mod alert;
mod api_doc;
mod config;
mod notification;
mod remote;
mod routes;
mod signal;
mod storage;
mod websocket;
mod widget;

use axum::{routing::get, Router};
use dotenv::dotenv;
use redis::Client;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_doc::ApiDoc;
use crate::config::{AppConfig, StorageKind};
use crate::notification::controller::AdminInbox;
use crate::notification::model::Role;
use crate::notification::service::NotificationService;
use crate::notification::store::NotificationStore;
use crate::remote::{HttpNotificationApi, NotificationApi};
use crate::signal::{redis_bridge::RedisSignalBridge, ChangeBus};
use crate::storage::{FileStorage, MemoryStorage, RedisStorage, Storage};
use crate::websocket::notifications::LiveFeedState;

async fn build_storage(config: &AppConfig) -> Result<Arc<dyn Storage>, Box<dyn std::error::Error>> {
    let storage: Arc<dyn Storage> = match (config.storage, config.redis_url.as_deref()) {
        (StorageKind::Redis, Some(url)) => {
            Arc::new(RedisStorage::open(url, config.redis_storage())?)
        }
        (StorageKind::File, _) => {
            info!("Storing inboxes under {}", config.data_dir.display());
            Arc::new(FileStorage::open(&config.data_dir).await?)
        }
        _ => {
            info!("Storing inboxes in memory");
            Arc::new(MemoryStorage::new())
        }
    };
    Ok(storage)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env();
    info!("Starting with {:?}", config);

    let bus = ChangeBus::new();
    let store = NotificationStore::new(build_storage(&config).await?, bus.clone())
        .with_max_per_inbox(config.max_per_inbox);

    // Relay change signals between instances sharing the same inboxes
    let _bridge = match &config.redis_url {
        Some(url) => match Client::open(url.as_str()) {
            Ok(client) => Some(RedisSignalBridge::new(client, bus.clone()).spawn()),
            Err(e) => {
                error!("Failed to open Redis client for change signals: {}", e);
                None
            }
        },
        None => {
            info!("No Redis URL configured, change signals stay in process");
            None
        }
    };

    let remote: Option<Arc<dyn NotificationApi>> = match &config.backend_api_url {
        Some(url) => match HttpNotificationApi::new(url.as_str()) {
            Ok(api) => {
                info!("Mirroring notifications to backend at {}", url);
                Some(Arc::new(api))
            }
            Err(e) => {
                warn!("Backend sync disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let notification_service = Arc::new(NotificationService::new(store.clone(), remote));
    let live_feed = LiveFeedState {
        store: store.clone(),
        alert_auto_hide: config.alert_auto_hide,
        admin_resync: config.resync_interval(Role::Admin),
        customer_resync: config.resync_interval(Role::Customer),
    };

    // Build the router
    let app = Router::new()
        // API documentation
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::routes())
        .merge(routes::notifications::routes(
            notification_service,
            live_feed,
        ))
        .merge(routes::orders::routes(
            store.clone(),
            AdminInbox(config.admin_id),
        ))
        .route("/", get(|| async { "Bakery notification hub" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Try different ports
    let mut port = config.port;
    let max_tries = 5;
    for attempt in 1..=max_tries {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        match axum::Server::try_bind(&addr) {
            Ok(server) => {
                info!("Server started at http://localhost:{}", port);
                info!("API Documentation: http://localhost:{}/docs", port);
                info!(
                    "Live notifications: ws://localhost:{}/api/notifications/ws?userId=<id>&userRole=<role>",
                    port
                );
                return server
                    .serve(app.into_make_service())
                    .await
                    .map_err(|e| e.into());
            }
            Err(e) => {
                warn!("Port {} unavailable: {}", port, e);
                if attempt == max_tries {
                    return Err("Failed to bind to any port".into());
                }
                port += 1;
            }
        }
    }

    Err("Failed to bind to any port".into())
}
