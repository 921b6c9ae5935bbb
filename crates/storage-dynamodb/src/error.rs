//! Error types for the DynamoDB key-set store.
//!
//! Maps AWS SDK failures onto the generic
//! [`StorageError`](platform_authorizer_storage::StorageError) type.

use aws_sdk_dynamodb::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::{get_item::GetItemError, put_item::PutItemError},
};
use platform_authorizer_storage::StorageError;
use thiserror::Error;

/// Result type alias for DynamoDB store operations.
pub type Result<T> = std::result::Result<T, DynamoStorageError>;

/// Errors specific to the DynamoDB key-set store.
#[derive(Debug, Error)]
pub enum DynamoStorageError {
    /// `GetItem` failed.
    #[error("DynamoDB GetItem failed: {}", DisplayErrorContext(.0))]
    GetItem(#[source] SdkError<GetItemError>),

    /// `PutItem` failed.
    #[error("DynamoDB PutItem failed: {}", DisplayErrorContext(.0))]
    PutItem(#[source] SdkError<PutItemError>),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The stored item is missing an attribute or holds the wrong type.
    #[error("Malformed key-set record: {0}")]
    MalformedRecord(String),

    /// The key set could not be encoded or decoded as JSON.
    #[error("Key-set encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<DynamoStorageError> for StorageError {
    fn from(err: DynamoStorageError) -> Self {
        match err {
            DynamoStorageError::GetItem(source) => sdk_error_to_storage_error("GetItem", source),
            DynamoStorageError::PutItem(source) => sdk_error_to_storage_error("PutItem", source),
            DynamoStorageError::Config(message) => {
                StorageError::internal(format!("Config: {message}"))
            },
            DynamoStorageError::MalformedRecord(message) => StorageError::serialization(message),
            DynamoStorageError::Encoding(source) => {
                StorageError::serialization_with_source("key-set JSON", source)
            },
        }
    }
}

/// Error codes DynamoDB returns when the caller is being throttled.
const THROTTLING_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
];

/// Converts an SDK error to a storage error.
///
/// Transport-level failures become [`StorageError::Connection`], the SDK's own
/// timeouts become [`StorageError::Timeout`], throttling is treated as a
/// connection problem and everything else is internal.
fn sdk_error_to_storage_error<E>(operation: &'static str, err: SdkError<E>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let transient = match &err {
        SdkError::TimeoutError(_) => {
            tracing::warn!(operation, "DynamoDB operation timed out");
            return StorageError::timeout();
        },
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(service) => {
            service.err().code().is_some_and(|code| THROTTLING_CODES.contains(&code))
        },
        _ => false,
    };

    let message = format!("DynamoDB {operation} failed: {}", DisplayErrorContext(&err));
    if transient {
        StorageError::connection_with_source(message, err)
    } else {
        StorageError::internal_with_source(message, err)
    }
}
