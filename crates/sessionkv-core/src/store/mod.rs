pub mod memory_store;

#[cfg(feature = "file-backend")]
pub mod file_store;

#[cfg(feature = "redis-backend")]
pub mod redis_store;

#[cfg(feature = "dynamodb-backend")]
pub mod dynamo_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{BackendConfig, BackendKind};
use crate::error::StoreError;

pub use memory_store::MemoryStore;

#[cfg(feature = "file-backend")]
pub use file_store::FileStore;

#[cfg(feature = "redis-backend")]
pub use redis_store::RedisStore;

#[cfg(feature = "dynamodb-backend")]
pub use dynamo_store::DynamoStore;

/// Longest expiry any store will record (ten years). Larger TTLs are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Trait for the networked key-value service sessions are persisted in.
///
/// Single-key operations are expected to be atomic. Nothing spanning two
/// calls is.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Fetch a value. `Ok(None)` means the key does not exist (or expired).
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value and reset its expiration to `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Whether `compare_and_set` is implemented.
    fn supports_cas(&self) -> bool {
        false
    }

    /// Write `value` only if the stored bytes still equal `expected`.
    ///
    /// Returns `Ok(false)` when the value changed or the key disappeared.
    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: &[u8],
        _value: Vec<u8>,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported("compare_and_set"))
    }

    /// Remaining lifetime of a key, if the store tracks one.
    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        Ok(None)
    }

    /// Whether the store evicts expired entries by itself.
    fn native_ttl(&self) -> bool {
        true
    }

    /// List every stored key. Required for stores without native TTL.
    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unsupported("keys"))
    }

    /// Drop entries that have already expired but are still held.
    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Build the store selected by `config`.
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn BackingStore>, StoreError> {
    match config.kind {
        BackendKind::Memory => Ok(Arc::new(MemoryStore::new())),

        #[cfg(feature = "file-backend")]
        BackendKind::File => {
            let store = FileStore::open(config.file.dir_path()).await?;
            tracing::info!("File session store at {}", store.dir().display());
            Ok(Arc::new(store))
        }

        #[cfg(feature = "redis-backend")]
        BackendKind::Redis => {
            let redis = &config.redis;
            let store = RedisStore::connect(&redis.addr, &redis.password, redis.db).await?;
            Ok(Arc::new(store))
        }

        #[cfg(feature = "dynamodb-backend")]
        BackendKind::Dynamodb => {
            let dynamo = &config.dynamodb;
            let store = DynamoStore::connect(&dynamo.table, dynamo.endpoint_url.as_deref()).await;
            Ok(Arc::new(store))
        }

        #[allow(unreachable_patterns)]
        other => Err(StoreError::Unavailable(format!(
            "backend '{}' is not compiled in (enable its cargo feature)",
            other.as_str()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let store = connect(&BackendConfig::default()).await.unwrap();
        assert_eq!(store.name(), "memory");
        assert!(store.supports_cas());
    }

    #[cfg(not(feature = "redis-backend"))]
    #[tokio::test]
    async fn test_connect_disabled_backend() {
        let config = BackendConfig {
            kind: BackendKind::Redis,
            ..Default::default()
        };
        let err = connect(&config).await.err().unwrap();
        assert!(err.to_string().contains("redis"));
    }

    #[cfg(feature = "file-backend")]
    #[tokio::test]
    async fn test_connect_file_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sessions");
        let mut config = BackendConfig {
            kind: BackendKind::File,
            ..Default::default()
        };
        config.file.dir = dir.to_string_lossy().into_owned();

        let store = connect(&config).await.unwrap();
        assert_eq!(store.name(), "file");
        assert!(!store.native_ttl());
        assert!(dir.is_dir());
    }
}
