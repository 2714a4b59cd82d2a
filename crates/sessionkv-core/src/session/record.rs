use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;

/// Reserved attribute holding the last write time.
pub const TIME_ACCESSED: &str = "timeAccessed";

/// The attribute bag stored under one session identifier.
///
/// Serialized as a single flat JSON object: `timeAccessed` next to every
/// application attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "timeAccessed")]
    pub time_accessed: DateTime<Utc>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl Record {
    /// A fresh record with no attributes.
    pub fn new() -> Self {
        Self {
            time_accessed: Utc::now(),
            attributes: BTreeMap::new(),
        }
    }

    /// Look up an attribute. The reserved key yields the access time.
    pub fn get(&self, key: &str) -> Option<Value> {
        if key == TIME_ACCESSED {
            return Some(Value::String(self.time_accessed.to_rfc3339()));
        }
        self.attributes.get(key).cloned()
    }

    pub fn touch(&mut self) {
        self.time_accessed = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the last write is older than `max_lifetime`.
    pub fn is_idle_for(&self, max_lifetime: std::time::Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(max_lifetime) {
            Ok(max) => now - self.time_accessed > max,
            // Out of chrono's range: nothing can be that old.
            Err(_) => false,
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

pub fn encode(record: &Record) -> Result<Vec<u8>, SessionError> {
    serde_json::to_vec(record).map_err(SessionError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<Record, SessionError> {
    serde_json::from_slice(bytes).map_err(SessionError::Decode)
}

/// Reject attribute keys the handle must not write.
pub(crate) fn check_key(key: &str) -> Result<(), SessionError> {
    if key == TIME_ACCESSED {
        return Err(SessionError::InvalidKey(format!("{} is reserved", key)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_wire_format() {
        let mut record = Record::new();
        record.attributes.insert("color".into(), json!("blue"));

        let value: Value = serde_json::from_slice(&encode(&record).unwrap()).unwrap();
        assert_eq!(value["color"], "blue");
        assert!(value["timeAccessed"].is_string());
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_nested_values_survive() {
        let mut record = Record::new();
        record.attributes.insert(
            "cart".into(),
            json!({ "items": [{ "sku": "A-1", "qty": 2 }, { "sku": "B-7", "qty": 1 }], "total": 19.5 }),
        );
        record.attributes.insert("flags".into(), json!([true, null, 3]));

        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not json"), Err(SessionError::Decode(_))));
        assert!(matches!(decode(b"[1,2,3]"), Err(SessionError::Decode(_))));
        // Missing the reserved timestamp
        assert!(matches!(decode(br#"{"color":"blue"}"#), Err(SessionError::Decode(_))));
        assert!(matches!(
            decode(br#"{"timeAccessed":"yesterday"}"#),
            Err(SessionError::Decode(_))
        ));
    }

    #[test]
    fn test_get_reserved_key() {
        let record = Record::new();
        let value = record.get(TIME_ACCESSED).unwrap();
        assert_eq!(value, Value::String(record.time_accessed.to_rfc3339()));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_check_key() {
        assert!(check_key("color").is_ok());
        assert!(matches!(check_key(TIME_ACCESSED), Err(SessionError::InvalidKey(_))));
    }

    #[test]
    fn test_is_idle_for() {
        let mut record = Record::new();
        let now = Utc::now();
        record.time_accessed = now - chrono::Duration::seconds(7200);
        assert!(record.is_idle_for(std::time::Duration::from_secs(3600), now));
        assert!(!record.is_idle_for(std::time::Duration::from_secs(10_800), now));
        assert!(!record.is_idle_for(std::time::Duration::MAX, now));
    }
}
