use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{BackingStore, MAX_TTL};
use crate::error::StoreError;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn deadline(now: Instant, ttl: Duration) -> Instant {
        now + ttl.min(MAX_TTL)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-process store with per-key expiry.
///
/// Expiry follows the tokio clock, so paused-time tests can advance past a
/// TTL without sleeping. Expired entries read as absent and are dropped on
/// access or by `sweep_expired`.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Entry::deadline(Instant::now(), ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn supports_cas(&self) -> bool {
        true
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        // The shard write lock is held for the whole check-and-replace.
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) && entry.value.as_slice() == expected => {
                entry.value = value;
                entry.expires_at = Entry::deadline(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.expires_at - now))
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, e| {
            let keep = !e.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
