use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::record::{self, Record};
use super::{Session, SessionOptions, WriteMode};
use crate::error::SessionError;
use crate::store::BackingStore;

/// Session handle bound to one identifier on a [`BackingStore`].
///
/// Holds no record state of its own; every call fetches the stored blob and
/// mutations write the whole record back with the full TTL.
pub struct KvSession {
    id: String,
    store: Arc<dyn BackingStore>,
    options: SessionOptions,
}

impl KvSession {
    pub(crate) fn new(id: String, store: Arc<dyn BackingStore>, options: SessionOptions) -> Self {
        Self { id, store, options }
    }

    async fn fetch(&self) -> Result<(Vec<u8>, Record), SessionError> {
        let raw = self
            .store
            .get(&self.id)
            .await?
            .ok_or_else(|| SessionError::SessionNotFound(self.id.clone()))?;
        let record = record::decode(&raw)?;
        Ok((raw, record))
    }

    /// Read-modify-write of the stored record.
    ///
    /// Under `WriteMode::Optimistic` the write only lands if the stored bytes
    /// are unchanged since the read; otherwise `apply` runs again on a fresh
    /// copy.
    async fn update<F>(&self, apply: F) -> Result<(), SessionError>
    where
        F: Fn(&mut Record) + Send + Sync,
    {
        let ttl = self.options.ttl;
        let max_retries = match self.options.write_mode {
            WriteMode::Optimistic { max_retries } if self.store.supports_cas() => Some(max_retries),
            WriteMode::Optimistic { .. } => {
                debug!(
                    "{} store has no compare-and-set, writing session {} unconditionally",
                    self.store.name(),
                    self.id
                );
                None
            }
            WriteMode::LastWriteWins => None,
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let (raw, mut record) = self.fetch().await?;
            apply(&mut record);
            let encoded = record::encode(&record)?;

            let Some(max_retries) = max_retries else {
                self.store.set(&self.id, encoded, ttl).await?;
                return Ok(());
            };

            if self
                .store
                .compare_and_set(&self.id, &raw, encoded, ttl)
                .await?
            {
                return Ok(());
            }
            if attempts > max_retries {
                return Err(SessionError::Conflict {
                    id: self.id.clone(),
                    attempts,
                });
            }
            debug!("Write conflict on session {} (attempt {}), retrying", self.id, attempts);
        }
    }
}

#[async_trait]
impl Session for KvSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn record(&self) -> Result<Record, SessionError> {
        let (_, record) = self.fetch().await?;
        Ok(record)
    }

    async fn get(&self, key: &str) -> Result<Value, SessionError> {
        let (_, record) = self.fetch().await?;
        record
            .get(key)
            .ok_or_else(|| SessionError::AttributeNotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), SessionError> {
        record::check_key(key)?;
        self.update(|record| {
            record.attributes.insert(key.to_string(), value.clone());
            record.touch();
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        record::check_key(key)?;
        // Rewritten even when `key` is absent so the TTL still slides.
        self.update(|record| {
            record.attributes.remove(key);
        })
        .await
    }
}
