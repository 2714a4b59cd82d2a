pub mod gc;
pub mod handle;
pub mod provider;
pub mod record;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DEFAULT_TTL_SECS;
use crate::error::SessionError;

pub use gc::spawn_garbage_collector;
pub use handle::KvSession;
pub use provider::{provider_from_config, KvSessionProvider};
pub use record::{Record, TIME_ACCESSED};

/// How handle writes guard against concurrent updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Conditional write against the bytes that were read, re-applied on
    /// conflict. Falls back to a plain write on stores without CAS.
    Optimistic { max_retries: u32 },
    /// Plain GET then SET. Concurrent writers can lose updates.
    LastWriteWins,
}

/// What `read` does when the lookup fails for a reason other than "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadFallback {
    /// Only a missing key creates a session; backend errors propagate.
    #[default]
    NotFoundOnly,
    /// Any retrieval error falls back to creating a fresh session.
    AnyError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Expiration window applied on every write.
    pub ttl: Duration,
    pub write_mode: WriteMode,
    pub read_fallback: ReadFallback,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            write_mode: WriteMode::Optimistic { max_retries: 5 },
            read_fallback: ReadFallback::NotFoundOnly,
        }
    }
}

/// Lifecycle manager: creates, loads and destroys session handles.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Create an empty record for `id`, overwriting any existing one.
    async fn init(&self, id: &str) -> Result<Box<dyn Session>, SessionError>;

    /// Bind to the record for `id`, creating it if absent.
    async fn read(&self, id: &str) -> Result<Box<dyn Session>, SessionError>;

    /// Delete the record for `id`.
    async fn destroy(&self, id: &str) -> Result<(), SessionError>;

    /// Best-effort eviction of records idle longer than `max_lifetime`.
    ///
    /// On stores without native TTL, idleness is judged by `timeAccessed`,
    /// which only `init` and `set` advance. A session that only sees
    /// `delete` calls can therefore be evicted even though each delete
    /// refreshed its store TTL.
    ///
    /// Returns how many records were removed; failures are logged, never
    /// returned.
    async fn garbage_collect(&self, max_lifetime: Duration) -> usize;
}

/// Attribute access for one session. Every call round-trips to the store.
#[async_trait]
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    /// The full current record.
    async fn record(&self) -> Result<Record, SessionError>;

    async fn get(&self, key: &str) -> Result<Value, SessionError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), SessionError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), SessionError>;
}

/// Typed helpers on top of [`Session`].
#[async_trait]
pub trait SessionExt: Session {
    async fn get_as<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T, SessionError> {
        let value = self.get(key).await?;
        serde_json::from_value(value).map_err(SessionError::Decode)
    }

    async fn set_as<T: Serialize + Sync + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SessionError> {
        let value = serde_json::to_value(value).map_err(SessionError::Encode)?;
        self.set(key, value).await
    }
}

impl<S: Session + ?Sized> SessionExt for S {}
