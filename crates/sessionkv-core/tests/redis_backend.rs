//! Integration tests against a live redis.
//!
//! Set `SESSIONKV_TEST_REDIS=host:port` to run them.

#[cfg(feature = "redis-backend")]
mod redis_tests {
    use std::time::Duration;

    use serde_json::json;
    use sessionkv_core::session::{KvSessionProvider, Session, SessionProvider};
    use sessionkv_core::store::{BackingStore, RedisStore};

    fn redis_addr() -> Option<String> {
        std::env::var("SESSIONKV_TEST_REDIS").ok()
    }

    fn unique_id(tag: &str) -> String {
        format!("sessionkv-test:{}:{}", tag, uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_redis_color_scenario() {
        let Some(addr) = redis_addr() else {
            eprintln!("SESSIONKV_TEST_REDIS not set, skipping");
            return;
        };
        let provider = KvSessionProvider::redis(&addr, "").await.unwrap();
        let id = unique_id("color");

        let session = provider.init(&id).await.unwrap();
        session.set("color", json!("blue")).await.unwrap();
        assert_eq!(session.get("color").await.unwrap(), json!("blue"));

        let ttl = provider.store().ttl(&id).await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(3590) && ttl <= Duration::from_secs(3600));

        session.delete("color").await.unwrap();
        assert!(session.get("color").await.unwrap_err().is_not_found());

        provider.destroy(&id).await.unwrap();
        assert_eq!(provider.store().get(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_redis_compare_and_set() {
        let Some(addr) = redis_addr() else {
            eprintln!("SESSIONKV_TEST_REDIS not set, skipping");
            return;
        };
        let store = RedisStore::connect(&addr, "", 0).await.unwrap();
        let key = unique_id("cas");
        let ttl = Duration::from_secs(60);

        assert!(!store.compare_and_set(&key, b"v1", b"v2".to_vec(), ttl).await.unwrap());
        store.set(&key, b"v1".to_vec(), ttl).await.unwrap();
        assert!(!store.compare_and_set(&key, b"stale", b"v2".to_vec(), ttl).await.unwrap());
        assert!(store.compare_and_set(&key, b"v1", b"v2".to_vec(), ttl).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(b"v2".to_vec()));

        store.del(&key).await.unwrap();
    }
}
