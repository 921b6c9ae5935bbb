//! Configuration for the DynamoDB key-set store.
//!
//! [`DynamoStoreConfig`] names the table holding key-set records and the
//! client overrides applied on top of the shared AWS SDK configuration.

use std::time::Duration;

use aws_smithy_types::timeout::TimeoutConfig;
use serde::{Deserialize, Serialize};

use crate::error::{DynamoStorageError, Result};

/// Default per-operation timeout (2 seconds).
///
/// The durable tier sits on the request path of every cold invocation, so a
/// slow table must fail fast and let the resolver fall through to the JWKS
/// endpoint.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for [`DynamoKeySetStore`](crate::DynamoKeySetStore).
///
/// # Table Layout
///
/// The table needs a string partition key named `id`. No sort key, no
/// secondary indexes.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use platform_authorizer_storage_dynamodb::DynamoStoreConfig;
///
/// let config = DynamoStoreConfig::builder()
///     .table_name("authorizer-key-cache")
///     .region("eu-west-1")
///     .timeout(Duration::from_millis(500))
///     .build()?;
///
/// assert_eq!(config.table_name(), "authorizer-key-cache");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamoStoreConfig {
    /// Table holding key-set records.
    pub(crate) table_name: String,

    /// Region override; the SDK default chain applies when unset.
    #[serde(default)]
    pub(crate) region: Option<String>,

    /// Endpoint override (DynamoDB Local, LocalStack).
    #[serde(default)]
    pub(crate) endpoint_url: Option<String>,

    /// Per-operation timeout.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub(crate) timeout: Duration,

    /// Use strongly consistent reads.
    #[serde(default)]
    pub(crate) consistent_read: bool,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

#[bon::bon]
impl DynamoStoreConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `region` - Region override.
    /// * `endpoint_url` - Endpoint override, must be an absolute `http(s)` URL.
    /// * `timeout` - Per-operation timeout (default: [`DEFAULT_TIMEOUT`]).
    /// * `consistent_read` - Strongly consistent reads (default: false).
    ///
    /// # Errors
    ///
    /// Returns [`DynamoStorageError::Config`] if:
    /// - The table name is not a valid DynamoDB table name
    /// - The endpoint URL is not an absolute `http(s)` URL
    /// - The timeout is zero
    #[builder]
    pub fn new(
        #[builder(into)] table_name: String,
        #[builder(into)] region: Option<String>,
        #[builder(into)] endpoint_url: Option<String>,
        #[builder(default = DEFAULT_TIMEOUT)] timeout: Duration,
        #[builder(default)] consistent_read: bool,
    ) -> Result<Self> {
        let config = Self { table_name, region, endpoint_url, timeout, consistent_read };
        config.validate()?;
        Ok(config)
    }
}

impl DynamoStoreConfig {
    /// Checks the invariants enforced by the builder.
    ///
    /// Deserialized configurations bypass the builder; call this before use.
    ///
    /// # Errors
    ///
    /// See [`DynamoStoreConfig::builder`].
    pub fn validate(&self) -> Result<()> {
        let name_ok = (3..=255).contains(&self.table_name.len())
            && self
                .table_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !name_ok {
            return Err(DynamoStorageError::Config(format!(
                "invalid table name '{}': expected 3-255 characters of [A-Za-z0-9_.-]",
                self.table_name
            )));
        }

        if let Some(endpoint) = &self.endpoint_url {
            let parsed = url::Url::parse(endpoint).map_err(|e| {
                DynamoStorageError::Config(format!("invalid endpoint URL '{endpoint}': {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(DynamoStorageError::Config(format!(
                    "endpoint URL '{endpoint}' must use http or https"
                )));
            }
        }

        if self.timeout.is_zero() {
            return Err(DynamoStorageError::Config("timeout must be greater than zero".into()));
        }

        Ok(())
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the region override, if any.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Returns the endpoint override, if any.
    #[must_use]
    pub fn endpoint_url(&self) -> Option<&str> {
        self.endpoint_url.as_deref()
    }

    /// Returns the per-operation timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns whether reads are strongly consistent.
    #[must_use]
    pub fn consistent_read(&self) -> bool {
        self.consistent_read
    }

    /// Builds the DynamoDB client configuration, inheriting everything else
    /// (credentials, retry, HTTP client) from `sdk_config`.
    pub(crate) fn client_config(
        &self,
        sdk_config: &aws_config::SdkConfig,
    ) -> aws_sdk_dynamodb::Config {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = &self.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region.clone()));
        }

        if let Some(endpoint) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        builder = builder
            .timeout_config(TimeoutConfig::builder().operation_timeout(self.timeout).build());

        builder.build()
    }
}
