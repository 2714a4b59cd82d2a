use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::BackingStore;
use crate::error::StoreError;

const EXTENSION: &str = ".json";

/// File-based store: one file per key inside a single directory.
///
/// Files carry no expiry, so this store reports `native_ttl() == false` and
/// relies on session garbage collection to evict stale records.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the store directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys are percent-encoded, so separators and `..` never leave `dir`.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", urlencoding::encode(key), EXTENSION))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.tmp",
            urlencoding::encode(key),
            uuid::Uuid::new_v4().simple()
        ))
    }
}

#[async_trait]
impl BackingStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), StoreError> {
        let tmp = self.temp_path_for(key);
        tokio::fs::write(&tmp, value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.path_for(key)).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn native_ttl(&self) -> bool {
        false
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(encoded) = name.to_str().and_then(|n| n.strip_suffix(EXTENSION)) else {
                debug!("Skipping non-session file {:?}", name);
                continue;
            };
            match urlencoding::decode(encoded) {
                Ok(key) => keys.push(key.into_owned()),
                Err(e) => warn!("Skipping undecodable session file {}: {}", encoded, e),
            }
        }
        Ok(keys)
    }
}
