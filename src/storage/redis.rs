use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

use super::{validate_key, Storage, StorageError};

// Redis storage configuration
#[derive(Debug, Clone, Default)]
pub struct RedisStorageConfig {
    /// Expire inbox keys after this long without a write
    pub ttl: Option<Duration>,
    /// Namespace prepended to every key, e.g. `bakery:`
    pub prefix: Option<String>,
}

/// Inboxes held in Redis so several service instances share them
#[derive(Debug, Clone)]
pub struct RedisStorage {
    client: Client,
    config: RedisStorageConfig,
}

impl RedisStorage {
    pub fn new(client: Client, config: RedisStorageConfig) -> Self {
        // Connection validation happens on first use
        Self { client, config }
    }

    /// Open a client for `url` without connecting yet
    pub fn open(url: &str, config: RedisStorageConfig) -> Result<Self, StorageError> {
        let client = Client::open(url)?;
        info!("Redis storage configured for {}", url);
        Ok(Self::new(client, config))
    }

    fn namespaced(&self, key: &str) -> String {
        match &self.config.prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = connection.get(self.namespaced(key)).await?;

        if result.is_some() {
            debug!("Redis hit for key: {}", key);
        } else {
            debug!("Redis miss for key: {}", key);
        }

        Ok(result)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let key = self.namespaced(key);

        match self.config.ttl {
            Some(ttl) => connection.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await?,
            None => connection.set::<_, _, ()>(key, value).await?,
        }

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.client
            .get_multiplexed_async_connection()
            .await?
            .del::<_, ()>(self.namespaced(key))
            .await?;
        Ok(())
    }
}
