use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::notification::model::Role;
use crate::notification::store::DEFAULT_MAX_PER_INBOX;
use crate::storage::redis::RedisStorageConfig;
use crate::widget::order_alert::DEFAULT_AUTO_HIDE;

pub const DEFAULT_PORT: u16 = 9500;
pub const DEFAULT_DATA_DIR: &str = "data/notifications";

/// Where inboxes are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    File,
    Redis,
}

impl StorageKind {
    pub fn from_str(value: &str) -> Result<Self, String> {
        match value.to_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "file" => Ok(StorageKind::File),
            "redis" => Ok(StorageKind::Redis),
            _ => Err(format!("Unknown storage kind: {}", value)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageKind,
    pub data_dir: PathBuf,
    pub redis_url: Option<String>,
    /// Namespace for inbox keys in Redis
    pub redis_prefix: Option<String>,
    /// Expiry for inbox keys in Redis; none when unset or zero
    pub redis_ttl: Option<Duration>,
    pub backend_api_url: Option<String>,
    pub max_per_inbox: usize,
    pub admin_id: i64,
    pub alert_auto_hide: Duration,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::Memory,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            redis_url: None,
            redis_prefix: None,
            redis_ttl: None,
            backend_api_url: None,
            max_per_inbox: DEFAULT_MAX_PER_INBOX,
            admin_id: 1,
            alert_auto_hide: DEFAULT_AUTO_HIDE,
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    /// Read the process environment (after `.env` has been loaded)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let storage = match var("NOTIFY_STORAGE") {
            Some(value) => StorageKind::from_str(&value).unwrap_or_else(|e| {
                warn!("{}, using memory storage", e);
                defaults.storage
            }),
            // A configured Redis is used for storage unless told otherwise
            None if var("REDIS_URL").is_some() => StorageKind::Redis,
            None => defaults.storage,
        };

        let redis_url = var("REDIS_URL");
        let storage = if storage == StorageKind::Redis && redis_url.is_none() {
            warn!("NOTIFY_STORAGE=redis without REDIS_URL, using memory storage");
            StorageKind::Memory
        } else {
            storage
        };

        Self {
            storage,
            data_dir: var("NOTIFY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            redis_url,
            redis_prefix: var("NOTIFY_REDIS_PREFIX"),
            redis_ttl: match parse_or(
                "NOTIFY_REDIS_TTL_SECS",
                var("NOTIFY_REDIS_TTL_SECS"),
                0_u64,
            ) {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            backend_api_url: var("BACKEND_API_URL"),
            max_per_inbox: parse_or(
                "NOTIFY_MAX_PER_INBOX",
                var("NOTIFY_MAX_PER_INBOX"),
                defaults.max_per_inbox,
            )
            .max(1),
            admin_id: parse_or("NOTIFY_ADMIN_ID", var("NOTIFY_ADMIN_ID"), defaults.admin_id),
            alert_auto_hide: var("NOTIFY_ALERT_TIMEOUT_SECS")
                .map(|v| Duration::from_secs(parse_or("NOTIFY_ALERT_TIMEOUT_SECS", Some(v), 10)))
                .unwrap_or(defaults.alert_auto_hide),
            port: parse_or("PORT", var("PORT"), defaults.port),
        }
    }

    pub fn redis_storage(&self) -> RedisStorageConfig {
        RedisStorageConfig {
            ttl: self.redis_ttl,
            prefix: self.redis_prefix.clone(),
        }
    }

    /// Periodic reload for live widgets. Only needed when other processes
    /// write the same files and nothing relays their change signals.
    pub fn resync_interval(&self, role: Role) -> Option<Duration> {
        if self.storage != StorageKind::File || self.redis_url.is_some() {
            return None;
        }
        Some(match role {
            Role::Admin => Duration::from_secs(3),
            Role::Customer => Duration::from_secs(30),
        })
    }
}

fn parse_or<T: FromStr + Copy>(name: &str, value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: {:?}, using default", name, raw);
            default
        }),
        None => default,
    }
}
