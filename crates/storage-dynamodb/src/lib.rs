//! DynamoDB implementation of the durable key-set tier.
//!
//! This crate provides [`DynamoKeySetStore`], the production
//! [`KeySetStore`](platform_authorizer_storage::auth::KeySetStore). Every
//! authorizer instance reads the same item, so a key set fetched by one
//! instance spares the others a trip to the JWKS endpoint after a cold start.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SigningKeyCache                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  DynamoKeySetStore                          │
//! │        (implements KeySetStore: GetItem / PutItem)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  aws-sdk-dynamodb                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Error Mapping
//!
//! | SDK failure | [`StorageError`](platform_authorizer_storage::StorageError) |
//! |-------------|--------------|
//! | timeout | `Timeout` |
//! | dispatch / response failure, throttling | `Connection` |
//! | other service errors | `Internal` |
//! | malformed item | `Serialization` |

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
mod store;

pub use config::{DEFAULT_TIMEOUT, DynamoStoreConfig};
pub use error::{DynamoStorageError, Result};
pub use store::{ATTR_ID, ATTR_KEYS, ATTR_REFRESHED_AT, DynamoKeySetStore};
