/// Core error types for sessionkv.
#[derive(Debug, thiserror::Error)]
pub enum SessionKvError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures reported by a backing store.
///
/// "Key not found" is not an error at this level; stores report it as
/// `Ok(None)` so callers can tell it apart from an outage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation not supported by this store: {0}")]
    Unsupported(&'static str),
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] StoreError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Failed to decode session record: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode session record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid attribute key: {0}")]
    InvalidKey(String),

    #[error("Write conflict on session {id} after {attempts} attempts")]
    Conflict { id: String, attempts: u32 },
}

impl SessionError {
    /// True for both a missing session and a missing attribute.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SessionError::SessionNotFound(_) | SessionError::AttributeNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionKvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(SessionError::SessionNotFound("abc".into()).is_not_found());
        assert!(SessionError::AttributeNotFound("color".into()).is_not_found());
        assert!(!SessionError::InvalidKey("timeAccessed".into()).is_not_found());
        assert!(!SessionError::from(StoreError::Unavailable("down".into())).is_not_found());
    }

    #[test]
    fn test_store_error_wraps_as_backend_unavailable() {
        let err: SessionError = StoreError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, SessionError::BackendUnavailable(_)));
        assert_eq!(
            err.to_string(),
            "Backend unavailable: Store unavailable: connection refused"
        );
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: SessionKvError = SessionError::Conflict {
            id: "abc".into(),
            attempts: 3,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Session error: Write conflict on session abc after 3 attempts"
        );
    }
}
