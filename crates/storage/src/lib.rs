//! Key-set storage for the platform authorizer.
//!
//! This crate provides the data model for published signing keys and the
//! [`KeySetStore`](auth::KeySetStore) trait that forms the durable, shared
//! tier of the signing key resolver.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              platform-authorizer-authn                      │
//! │      SigningKeyCache (memory → store → remote JWKS)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │              platform-authorizer-storage                    │
//! │     KeySetStore trait, KeySetSnapshot, StorageError         │
//! ├──────────────────┬──────────────────────────────────────────┤
//! │ MemoryKeySetStore│    DynamoKeySetStore                     │
//! │ (tests, local)   │  (platform-authorizer-storage-dynamodb)  │
//! └──────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. Backends map their internal
//! errors to [`StorageError`] variants.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with a recording/failing store and the
//!   `assert_storage_error!` macro. Enable this in `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{BoxError, StorageError, StorageResult};
