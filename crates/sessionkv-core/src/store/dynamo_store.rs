use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::info;

use super::{BackingStore, MAX_TTL};
use crate::error::StoreError;

const KEY_ATTR: &str = "session_id";
const DATA_ATTR: &str = "data";
/// Epoch seconds; configure this as the table's TTL attribute.
const EXPIRES_ATTR: &str = "expires_at";

/// DynamoDB-based store.
///
/// DynamoDB deletes expired items lazily, so reads treat any item whose
/// `expires_at` is in the past as absent.
pub struct DynamoStore {
    client: Client,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// Build a client from the default AWS environment.
    ///
    /// `endpoint_url` points the client at DynamoDB Local or another
    /// compatible endpoint.
    pub async fn connect(table_name: &str, endpoint_url: Option<&str>) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&aws_config);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }
        info!("Using DynamoDB table {}", table_name);
        Self::new(Client::from_conf(builder.build()), table_name.to_string())
    }

    async fn fetch_item(
        &self,
        key: &str,
    ) -> Result<Option<HashMap<String, AttributeValue>>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(KEY_ATTR, AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(DisplayErrorContext(&e).to_string()))?;

        let now = chrono::Utc::now().timestamp();
        Ok(output
            .item
            .filter(|item| expires_at(item).map_or(true, |at| at > now)))
    }
}

fn expires_at(item: &HashMap<String, AttributeValue>) -> Option<i64> {
    item.get(EXPIRES_ATTR)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

fn expiry_from_now(ttl: Duration) -> String {
    let secs = i64::try_from(ttl.min(MAX_TTL).as_secs()).unwrap_or(i64::MAX);
    chrono::Utc::now().timestamp().saturating_add(secs).to_string()
}

#[async_trait]
impl BackingStore for DynamoStore {
    fn name(&self) -> &str {
        "dynamodb"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(item) = self.fetch_item(key).await? else {
            return Ok(None);
        };
        match item.get(DATA_ATTR).map(|v| v.as_b()) {
            Some(Ok(blob)) => Ok(Some(blob.as_ref().to_vec())),
            _ => Err(StoreError::Unavailable(format!(
                "item {} has no binary '{}' attribute",
                key, DATA_ATTR
            ))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item(KEY_ATTR, AttributeValue::S(key.to_string()))
            .item(DATA_ATTR, AttributeValue::B(Blob::new(value)))
            .item(EXPIRES_ATTR, AttributeValue::N(expiry_from_now(ttl)))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(KEY_ATTR, AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(DisplayErrorContext(&e).to_string()))?;
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
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(KEY_ATTR, AttributeValue::S(key.to_string()))
            .item(DATA_ATTR, AttributeValue::B(Blob::new(value)))
            .item(EXPIRES_ATTR, AttributeValue::N(expiry_from_now(ttl)))
            .condition_expression("#data = :expected AND #exp > :now")
            .expression_attribute_names("#data", DATA_ATTR)
            .expression_attribute_names("#exp", EXPIRES_ATTR)
            .expression_attribute_values(":expected", AttributeValue::B(Blob::new(expected)))
            .expression_attribute_values(
                ":now",
                AttributeValue::N(chrono::Utc::now().timestamp().to_string()),
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(StoreError::Unavailable(DisplayErrorContext(&e).to_string())),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = chrono::Utc::now().timestamp();
        Ok(self
            .fetch_item(key)
            .await?
            .and_then(|item| expires_at(&item))
            .map(|at| Duration::from_secs((at - now).max(0) as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_at_parse() {
        let mut item = HashMap::new();
        assert_eq!(expires_at(&item), None);
        item.insert(EXPIRES_ATTR.to_string(), AttributeValue::N("1700000000".into()));
        assert_eq!(expires_at(&item), Some(1_700_000_000));
        item.insert(EXPIRES_ATTR.to_string(), AttributeValue::S("soon".into()));
        assert_eq!(expires_at(&item), None);
    }

    #[test]
    fn test_expiry_from_now() {
        let now = chrono::Utc::now().timestamp();
        let at: i64 = expiry_from_now(Duration::from_secs(3600)).parse().unwrap();
        assert!(at >= now + 3600 && at <= now + 3601);

        let at: i64 = expiry_from_now(Duration::MAX).parse().unwrap();
        let max = MAX_TTL.as_secs() as i64;
        assert!(at >= now + max && at <= now + max + 1);
    }
}
