//! Durable shared tier for key-set snapshots.
//!
//! This module provides the [`KeySetStore`] trait, the storage seam between
//! the signing key resolver and whatever shared store outlives a single
//! process (DynamoDB in production, in-memory for tests and local runs).
//!
//! # Record Layout
//!
//! A deployment keeps exactly one record per authority, addressed by a fixed
//! record id (by convention the authority's JWKS URI). The record holds the
//! whole [`KeySetSnapshot`]; writes replace it.
//!
//! ```text
//! record_id ──► { keys: [jwk, jwk, ...], refreshed_at }
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use platform_authorizer_storage::{
//!     StorageResult,
//!     auth::{KeySetSnapshot, KeySetStore},
//! };
//!
//! async fn remember<S: KeySetStore>(
//!     store: &S,
//!     record_id: &str,
//!     snapshot: &KeySetSnapshot,
//! ) -> StorageResult<()> {
//!     store.put_key_set(record_id, snapshot).await
//! }
//! ```

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{auth::KeySetSnapshot, error::StorageResult};

/// Persistence layer for whole key-set snapshots.
///
/// Implementations must be safe to share across tasks. Both operations are
/// whole-record: there is no per-key update.
///
/// # Error Handling
///
/// Operations return [`StorageResult`]. Callers in the resolver treat every
/// error as a miss, so implementations should not retry internally beyond
/// what their client already does.
#[async_trait]
pub trait KeySetStore: Send + Sync {
    /// Reads the snapshot stored under `record_id`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(snapshot))` if a record exists
    /// - `Ok(None)` if no record has been written yet
    /// - `Err(...)` if the backend failed or the record is unreadable
    async fn get_key_set(&self, record_id: &str) -> StorageResult<Option<KeySetSnapshot>>;

    /// Replaces the record under `record_id` with `snapshot`.
    ///
    /// Writes are idempotent upserts; concurrent writers race and the last
    /// one wins.
    async fn put_key_set(&self, record_id: &str, snapshot: &KeySetSnapshot) -> StorageResult<()>;
}

#[async_trait]
impl<S: KeySetStore + ?Sized> KeySetStore for Arc<S> {
    async fn get_key_set(&self, record_id: &str) -> StorageResult<Option<KeySetSnapshot>> {
        (**self).get_key_set(record_id).await
    }

    async fn put_key_set(&self, record_id: &str, snapshot: &KeySetSnapshot) -> StorageResult<()> {
        (**self).put_key_set(record_id, snapshot).await
    }
}

/// In-memory implementation of [`KeySetStore`].
///
/// Records live in a [`parking_lot::RwLock`]-guarded map and disappear with
/// the process. Used in tests and when no durable table is configured.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use platform_authorizer_storage::auth::{KeySetSnapshot, KeySetStore, MemoryKeySetStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryKeySetStore::new();
///     assert!(store.get_key_set("https://auth.example.com/.well-known/jwks.json").await?.is_none());
///
///     let snapshot = KeySetSnapshot::builder().keys([]).build();
///     store.put_key_set("https://auth.example.com/.well-known/jwks.json", &snapshot).await?;
///     assert!(store.get_key_set("https://auth.example.com/.well-known/jwks.json").await?.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryKeySetStore {
    records: Arc<RwLock<HashMap<String, KeySetSnapshot>>>,
}

impl MemoryKeySetStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with one record.
    #[must_use]
    pub fn with_record(record_id: impl Into<String>, snapshot: KeySetSnapshot) -> Self {
        let store = Self::new();
        store.records.write().insert(record_id.into(), snapshot);
        store
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl KeySetStore for MemoryKeySetStore {
    #[tracing::instrument(skip(self))]
    async fn get_key_set(&self, record_id: &str) -> StorageResult<Option<KeySetSnapshot>> {
        Ok(self.records.read().get(record_id).cloned())
    }

    #[tracing::instrument(skip(self, snapshot), fields(keys = snapshot.len()))]
    async fn put_key_set(&self, record_id: &str, snapshot: &KeySetSnapshot) -> StorageResult<()> {
        self.records.write().insert(record_id.to_owned(), snapshot.clone());
        Ok(())
    }
}
