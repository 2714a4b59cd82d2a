use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::session::{ReadFallback, SessionOptions, WriteMode};
use crate::store::MAX_TTL;

/// Default session window: one hour.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Root configuration for sessionkv.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub backend: BackendConfig,
    pub session: SessionSettings,
    pub gc: GcConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    File,
    Redis,
    Dynamodb,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::File => "file",
            BackendKind::Redis => "redis",
            BackendKind::Dynamodb => "dynamodb",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "file" => Ok(BackendKind::File),
            "redis" => Ok(BackendKind::Redis),
            "dynamodb" | "dynamo" => Ok(BackendKind::Dynamodb),
            other => Err(ConfigError::Invalid(format!("unknown backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub redis: RedisConfig,
    pub file: FileConfig,
    pub dynamodb: DynamoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            password: String::new(),
            db: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub dir: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            dir: "~/.sessionkv/sessions".to_string(),
        }
    }
}

impl FileConfig {
    /// Get expanded session directory.
    pub fn dir_path(&self) -> PathBuf {
        let path = &self.dir;
        if path.starts_with("~/") || path.starts_with("~\\") {
            if let Some(home) = dirs::home_dir() {
                return home.join(&path[2..]);
            }
        }
        PathBuf::from(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamoConfig {
    pub table: String,
    pub endpoint_url: Option<String>,
}

impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            table: "sessionkv-sessions".to_string(),
            endpoint_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteModeSetting {
    #[default]
    Optimistic,
    LastWriteWins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    pub ttl_secs: u64,
    pub write_mode: WriteModeSetting,
    pub max_retries: u32,
    pub read_fallback: ReadFallback,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            write_mode: WriteModeSetting::Optimistic,
            max_retries: 5,
            read_fallback: ReadFallback::NotFoundOnly,
        }
    }
}

impl SessionSettings {
    /// Session TTL, rejecting zero and anything past [`MAX_TTL`].
    pub fn ttl(&self) -> Result<Duration, ConfigError> {
        if self.ttl_secs == 0 || self.ttl_secs > MAX_TTL.as_secs() {
            return Err(ConfigError::Invalid(format!(
                "session.ttlSecs must be between 1 and {}, got {}",
                MAX_TTL.as_secs(),
                self.ttl_secs
            )));
        }
        Ok(Duration::from_secs(self.ttl_secs))
    }
}

impl TryFrom<&SessionSettings> for SessionOptions {
    type Error = ConfigError;

    fn try_from(s: &SessionSettings) -> Result<Self, Self::Error> {
        let write_mode = match s.write_mode {
            WriteModeSetting::Optimistic => WriteMode::Optimistic {
                max_retries: s.max_retries,
            },
            WriteModeSetting::LastWriteWins => WriteMode::LastWriteWins,
        };
        Ok(SessionOptions {
            ttl: s.ttl()?,
            write_mode,
            read_fallback: s.read_fallback,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GcConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub max_lifetime_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 600,
            max_lifetime_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// Load config from environment variables.
///
/// Priority:
/// 1. `SESSIONKV_CONFIG` env var (full JSON)
/// 2. Config file, overlaid with individual env vars
pub fn load_config_from_env() -> Config {
    if let Ok(json) = std::env::var("SESSIONKV_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse SESSIONKV_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);
    apply_env_overrides(&mut cfg);
    cfg
}

/// Overlay individual env vars onto `cfg`. Unparsable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SESSIONKV_BACKEND") {
        match v.parse() {
            Ok(kind) => cfg.backend.kind = kind,
            Err(e) => tracing::warn!("Ignoring SESSIONKV_BACKEND: {}", e),
        }
    }

    // Redis
    if let Ok(v) = std::env::var("REDIS_ADDR") {
        cfg.backend.redis.addr = v;
    }
    if let Ok(v) = std::env::var("REDIS_PASSWORD") {
        cfg.backend.redis.password = v;
    }
    if let Ok(v) = std::env::var("REDIS_DB") {
        match v.parse() {
            Ok(db) => cfg.backend.redis.db = db,
            Err(e) => tracing::warn!("Ignoring REDIS_DB={}: {}", v, e),
        }
    }

    // File
    if let Ok(v) = std::env::var("SESSIONKV_DIR") {
        cfg.backend.file.dir = v;
    }

    // DynamoDB
    if let Ok(v) = std::env::var("DYNAMODB_SESSIONS_TABLE") {
        cfg.backend.dynamodb.table = v;
    }
    if let Ok(v) = std::env::var("DYNAMODB_ENDPOINT_URL") {
        cfg.backend.dynamodb.endpoint_url = Some(v);
    }

    if let Ok(v) = std::env::var("SESSIONKV_TTL_SECS") {
        match v.parse() {
            Ok(secs) => cfg.session.ttl_secs = secs,
            Err(e) => tracing::warn!("Ignoring SESSIONKV_TTL_SECS={}: {}", v, e),
        }
    }
}

/// Get the default config file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Get the sessionkv data directory.
pub fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sessionkv")
}

/// Load config from file, falling back to defaults.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save config to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
