pub mod file;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use self::redis::RedisStorage;

// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// String-keyed persistence primitive backing the notification inboxes.
///
/// Values are opaque strings (JSON arrays in practice). Implementations
/// must replace a value wholesale on `set`; there is no merge.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Keys end up as file names and Redis keys, so keep them to a safe alphabet
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
