use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::handle::KvSession;
use super::record::{self, Record};
use super::{ReadFallback, Session, SessionOptions, SessionProvider};
use crate::config::Config;
use crate::error::SessionError;
use crate::store::{self, BackingStore};

/// Session provider over any [`BackingStore`].
///
/// The store handle is the only state it owns; records live in the store.
#[derive(Clone)]
pub struct KvSessionProvider {
    store: Arc<dyn BackingStore>,
    options: SessionOptions,
}

impl KvSessionProvider {
    pub fn new(store: Arc<dyn BackingStore>, options: SessionOptions) -> Self {
        Self { store, options }
    }

    /// Connect to redis at `addr` with `password` using default options.
    #[cfg(feature = "redis-backend")]
    pub async fn redis(addr: &str, password: &str) -> Result<Self, crate::error::StoreError> {
        let store = store::RedisStore::connect(addr, password, 0).await?;
        Ok(Self::new(Arc::new(store), SessionOptions::default()))
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn handle(&self, id: &str) -> Box<dyn Session> {
        Box::new(KvSession::new(id.to_string(), self.store.clone(), self.options))
    }

    /// Scan every key and drop records idle past `max_lifetime`.
    async fn evict_idle(&self, max_lifetime: Duration) -> usize {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Session GC: cannot list {} store: {}", self.store.name(), e);
                return 0;
            }
        };

        let now = chrono::Utc::now();
        let mut evicted = 0;
        for key in keys {
            let record = match self.store.get(&key).await {
                Ok(Some(bytes)) => match record::decode(&bytes) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Session GC: skipping undecodable session {}: {}", key, e);
                        continue;
                    }
                },
                // Removed since listing
                Ok(None) => continue,
                Err(e) => {
                    warn!("Session GC: failed to read session {}: {}", key, e);
                    continue;
                }
            };

            if !record.is_idle_for(max_lifetime, now) {
                continue;
            }
            match self.store.del(&key).await {
                Ok(()) => {
                    debug!("Session GC: evicted {}", key);
                    evicted += 1;
                }
                Err(e) => warn!("Session GC: failed to delete session {}: {}", key, e),
            }
        }
        evicted
    }
}

#[async_trait]
impl SessionProvider for KvSessionProvider {
    async fn init(&self, id: &str) -> Result<Box<dyn Session>, SessionError> {
        let bytes = record::encode(&Record::new())?;
        self.store.set(id, bytes, self.options.ttl).await?;
        debug!("Initialized session {} on {} store", id, self.store.name());
        Ok(self.handle(id))
    }

    async fn read(&self, id: &str) -> Result<Box<dyn Session>, SessionError> {
        match self.store.get(id).await {
            Ok(Some(_)) => Ok(self.handle(id)),
            Ok(None) => {
                debug!("Session {} not found, creating", id);
                self.init(id).await
            }
            Err(e) if self.options.read_fallback == ReadFallback::AnyError => {
                warn!("Failed to read session {} ({}), starting a fresh one", id, e);
                self.init(id).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.store.del(id).await?;
        info!("Destroyed session {}", id);
        Ok(())
    }

    async fn garbage_collect(&self, max_lifetime: Duration) -> usize {
        let removed = if self.store.native_ttl() {
            match self.store.sweep_expired().await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Session GC: sweep of {} store failed: {}", self.store.name(), e);
                    0
                }
            }
        } else {
            self.evict_idle(max_lifetime).await
        };
        if removed > 0 {
            info!("Session GC removed {} expired session(s)", removed);
        }
        removed
    }
}

/// Build a provider from configuration, connecting to the chosen backend.
///
/// Session settings are validated before any connection is made.
pub async fn provider_from_config(config: &Config) -> crate::Result<KvSessionProvider> {
    let options = SessionOptions::try_from(&config.session)?;
    let store = store::connect(&config.backend).await?;
    info!("Session store: {}", store.name());
    Ok(KvSessionProvider::new(store, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SessionKvError};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn memory_provider() -> KvSessionProvider {
        KvSessionProvider::new(Arc::new(MemoryStore::new()), SessionOptions::default())
    }

    #[tokio::test]
    async fn test_init_overwrites() {
        let provider = memory_provider();
        let session = provider.init("abc").await.unwrap();
        session.set("color", json!("blue")).await.unwrap();

        let session = provider.init("abc").await.unwrap();
        assert!(session.record().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_existing_keeps_data() {
        let provider = memory_provider();
        provider
            .init("abc")
            .await
            .unwrap()
            .set("color", json!("blue"))
            .await
            .unwrap();

        let session = provider.read("abc").await.unwrap();
        assert_eq!(session.get("color").await.unwrap(), json!("blue"));
    }

    #[tokio::test]
    async fn test_read_does_not_decode() {
        let provider = memory_provider();
        provider
            .store()
            .set("abc", b"garbage".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let session = provider.read("abc").await.unwrap();
        assert!(matches!(session.record().await, Err(SessionError::Decode(_))));
    }

    #[tokio::test]
    async fn test_gc_noop_on_native_ttl() {
        let provider = memory_provider();
        provider.init("abc").await.unwrap();
        assert_eq!(provider.garbage_collect(Duration::ZERO).await, 0);
        assert!(provider.store().get("abc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_provider_from_default_config() {
        let provider = provider_from_config(&Config::default()).await.unwrap();
        assert_eq!(provider.store().name(), "memory");
        assert_eq!(provider.options().ttl, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_provider_from_config_rejects_bad_ttl() {
        let mut config = Config::default();
        config.session.ttl_secs = u64::MAX;
        let err = provider_from_config(&config).await.err().unwrap();
        assert!(matches!(err, SessionKvError::Config(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_init_with_huge_ttl() {
        let options = SessionOptions {
            ttl: Duration::MAX,
            ..Default::default()
        };
        let provider = KvSessionProvider::new(Arc::new(MemoryStore::new()), options);
        let session = provider.init("abc").await.unwrap();
        session.set("color", json!("blue")).await.unwrap();
        assert_eq!(session.get("color").await.unwrap(), json!("blue"));
        assert!(provider.store().ttl("abc").await.unwrap().unwrap() <= store::MAX_TTL);
    }
}
