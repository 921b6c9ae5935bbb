//! DynamoDB-backed [`KeySetStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{Client, types::AttributeValue};
use chrono::{DateTime, SecondsFormat, Utc};
use platform_authorizer_storage::{
    StorageResult,
    auth::{KeySetSnapshot, KeySetStore},
};

use crate::{
    config::DynamoStoreConfig,
    error::{DynamoStorageError, Result},
};

/// Partition key attribute.
pub const ATTR_ID: &str = "id";

/// JSON-encoded JWK array.
pub const ATTR_KEYS: &str = "keys";

/// RFC 3339 timestamp of the snapshot.
pub const ATTR_REFRESHED_AT: &str = "refreshed_at";

/// Key-set store backed by a single DynamoDB table.
///
/// Each record is one item keyed by `id`. The key set is stored as a JSON
/// string (a plain JWKS `keys` array) so the item stays readable in the
/// console and well under the 400 KB item limit for any realistic JWKS.
///
/// # Example
///
/// ```no_run
/// // Requires AWS credentials and an existing table.
/// use platform_authorizer_storage_dynamodb::{DynamoKeySetStore, DynamoStoreConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sdk_config = aws_config::load_from_env().await;
/// let config = DynamoStoreConfig::builder().table_name("authorizer-key-cache").build()?;
/// let store = DynamoKeySetStore::new(&sdk_config, config);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DynamoKeySetStore {
    client: Client,
    table_name: String,
    consistent_read: bool,
}

impl std::fmt::Debug for DynamoKeySetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoKeySetStore")
            .field("table_name", &self.table_name)
            .field("consistent_read", &self.consistent_read)
            .finish_non_exhaustive()
    }
}

impl DynamoKeySetStore {
    /// Creates a store whose client inherits `sdk_config` plus the overrides
    /// in `config`.
    #[must_use]
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoStoreConfig) -> Self {
        let client = Client::from_conf(config.client_config(sdk_config));
        Self { client, table_name: config.table_name, consistent_read: config.consistent_read }
    }

    /// Creates a store from a pre-built client.
    #[must_use]
    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self { client, table_name: table_name.into(), consistent_read: false }
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn read(&self, record_id: &str) -> Result<Option<KeySetSnapshot>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ATTR_ID, AttributeValue::S(record_id.to_owned()))
            .projection_expression("#keys, #refreshed")
            .expression_attribute_names("#keys", ATTR_KEYS)
            .expression_attribute_names("#refreshed", ATTR_REFRESHED_AT)
            .consistent_read(self.consistent_read)
            .send()
            .await
            .map_err(DynamoStorageError::GetItem)?;

        output.item().map(item_to_snapshot).transpose()
    }

    async fn write(&self, record_id: &str, snapshot: &KeySetSnapshot) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(snapshot_to_item(record_id, snapshot)?))
            .send()
            .await
            .map_err(DynamoStorageError::PutItem)?;
        Ok(())
    }
}

#[async_trait]
impl KeySetStore for DynamoKeySetStore {
    #[tracing::instrument(skip(self), fields(table = %self.table_name))]
    async fn get_key_set(&self, record_id: &str) -> StorageResult<Option<KeySetSnapshot>> {
        Ok(self.read(record_id).await?)
    }

    #[tracing::instrument(skip(self, snapshot), fields(table = %self.table_name, keys = snapshot.len()))]
    async fn put_key_set(&self, record_id: &str, snapshot: &KeySetSnapshot) -> StorageResult<()> {
        Ok(self.write(record_id, snapshot).await?)
    }
}

fn string_attr<'a>(item: &'a HashMap<String, AttributeValue>, name: &str) -> Result<&'a str> {
    let value = item
        .get(name)
        .ok_or_else(|| DynamoStorageError::MalformedRecord(format!("missing '{name}'")))?;
    value
        .as_s()
        .map(String::as_str)
        .map_err(|_| DynamoStorageError::MalformedRecord(format!("'{name}' is not a string")))
}

/// Decodes a stored item into a snapshot.
///
/// Keys that cannot be decoded or lack a `kid` are dropped and repeated `kid`s
/// collapse to the first, matching [`KeySetSnapshot::from_json_values`].
pub(crate) fn item_to_snapshot(item: &HashMap<String, AttributeValue>) -> Result<KeySetSnapshot> {
    let keys: Vec<serde_json::Value> = serde_json::from_str(string_attr(item, ATTR_KEYS)?)?;
    let refreshed_at = string_attr(item, ATTR_REFRESHED_AT)?;
    let refreshed_at = DateTime::parse_from_rfc3339(refreshed_at)
        .map_err(|e| {
            DynamoStorageError::MalformedRecord(format!(
                "'{ATTR_REFRESHED_AT}' is not RFC 3339: {e}"
            ))
        })?
        .with_timezone(&Utc);

    Ok(KeySetSnapshot::from_json_values(keys, refreshed_at))
}

/// Encodes a snapshot as a full item for `PutItem`.
pub(crate) fn snapshot_to_item(
    record_id: &str,
    snapshot: &KeySetSnapshot,
) -> Result<HashMap<String, AttributeValue>> {
    let keys = serde_json::to_string(snapshot.keys())?;
    Ok(HashMap::from([
        (ATTR_ID.to_owned(), AttributeValue::S(record_id.to_owned())),
        (ATTR_KEYS.to_owned(), AttributeValue::S(keys)),
        (
            ATTR_REFRESHED_AT.to_owned(),
            AttributeValue::S(snapshot.refreshed_at().to_rfc3339_opts(SecondsFormat::Millis, true)),
        ),
    ]))
}
