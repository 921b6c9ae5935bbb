//! Shared test doubles for code that depends on a [`KeySetStore`].
//!
//! Feature-gated behind `testutil` to keep it out of production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! platform-authorizer-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use platform_authorizer_storage::testutil::RecordingKeySetStore;
//! ```

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    auth::{KeySetSnapshot, KeySetStore, MemoryKeySetStore},
    error::{StorageError, StorageResult},
};

/// Builds a fresh error for an injected failure.
///
/// `StorageError` is not `Clone`, so failures are stored as factories.
pub type ErrorFactory = fn() -> StorageError;

/// A [`KeySetStore`] that records every call and can be told to fail or stall.
///
/// Reads and writes are delegated to an inner [`MemoryKeySetStore`] unless a
/// failure is configured for that operation. Call counts include failed calls.
#[derive(Debug, Default)]
pub struct RecordingKeySetStore {
    inner: MemoryKeySetStore,
    gets: AtomicUsize,
    puts: AtomicUsize,
    fail_gets: Mutex<Option<ErrorFactory>>,
    fail_puts: Mutex<Option<ErrorFactory>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingKeySetStore {
    /// Creates an empty store with no failures configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with one record.
    #[must_use]
    pub fn with_record(record_id: impl Into<String>, snapshot: KeySetSnapshot) -> Self {
        Self { inner: MemoryKeySetStore::with_record(record_id, snapshot), ..Self::default() }
    }

    /// Makes subsequent reads fail with the error built by `factory` (or succeed with `None`).
    pub fn fail_gets(&self, factory: Option<ErrorFactory>) {
        *self.fail_gets.lock() = factory;
    }

    /// Makes subsequent writes fail with the error built by `factory` (or succeed with `None`).
    pub fn fail_puts(&self, factory: Option<ErrorFactory>) {
        *self.fail_puts.lock() = factory;
    }

    /// Delays every call by `delay` before it is served.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Number of `get_key_set` calls so far.
    #[must_use]
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `put_key_set` calls so far.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Resets both call counters.
    pub fn reset_counts(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.puts.store(0, Ordering::SeqCst);
    }

    /// The wrapped store, for inspecting or seeding records without counting.
    #[must_use]
    pub fn inner(&self) -> &MemoryKeySetStore {
        &self.inner
    }

    async fn stall(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl KeySetStore for RecordingKeySetStore {
    async fn get_key_set(&self, record_id: &str) -> StorageResult<Option<KeySetSnapshot>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.stall().await;
        let failure = *self.fail_gets.lock();
        if let Some(factory) = failure {
            return Err(factory());
        }
        self.inner.get_key_set(record_id).await
    }

    async fn put_key_set(&self, record_id: &str, snapshot: &KeySetSnapshot) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.stall().await;
        let failure = *self.fail_puts.lock();
        if let Some(factory) = failure {
            return Err(factory());
        }
        self.inner.put_key_set(record_id, snapshot).await
    }
}

/// Assert that a [`StorageResult`] is an `Err` of the given [`StorageError`] variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use platform_authorizer_storage::{StorageError, StorageResult, assert_storage_error};
///
/// let result: StorageResult<()> = Err(StorageError::timeout());
/// assert_storage_error!(result, Timeout);
/// ```
#[macro_export]
macro_rules! assert_storage_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::$variant { .. })),
            "expected StorageError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_successful_and_failed_calls() {
        let store = RecordingKeySetStore::new();
        let snapshot = KeySetSnapshot::builder().keys([]).build();

        store.put_key_set("r", &snapshot).await.expect("put");
        store.fail_gets(Some(|| StorageError::connection("down")));
        let result = store.get_key_set("r").await;

        assert_storage_error!(result, Connection);
        assert_eq!(store.get_count(), 1);
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_put_does_not_write() {
        let store = RecordingKeySetStore::new();
        store.fail_puts(Some(StorageError::timeout));

        let result = store.put_key_set("r", &KeySetSnapshot::builder().keys([]).build()).await;

        assert_storage_error!(result, Timeout);
        assert!(store.inner().is_empty());
    }

    #[tokio::test]
    async fn test_clearing_failure_restores_reads() {
        let store = RecordingKeySetStore::with_record("r", KeySetSnapshot::builder().keys([]).build());
        store.fail_gets(Some(StorageError::timeout));
        assert!(store.get_key_set("r").await.is_err());

        store.fail_gets(None);
        store.reset_counts();
        assert!(store.get_key_set("r").await.expect("get").is_some());
        assert_eq!(store.get_count(), 1);
    }
}
