//! Tiered signing key cache for JWT validation.
//!
//! This module provides [`SigningKeyCache`], which resolves a key identifier
//! (`kid`) to a verification key by consulting three tiers in a fixed order:
//!
//! ```text
//! resolve(kid) → memory tier (per process)
//!              → miss? read the durable record via KeySetStore
//!                      (error / empty / absent = miss, never fatal)
//!              → miss? fetch the full set via KeySource
//!                      (failure = KeySourceUnavailable)
//!                      → write back to the durable store (best effort)
//!                      → replace the memory tier
//!              → still missing? KeyNotFound
//! ```
//!
//! # Refresh Semantics
//!
//! The memory tier is replaced wholesale on every successful refresh. Keys the
//! authority has stopped publishing disappear from memory at the next refresh;
//! there is no merging and no per-key expiry. A snapshot read from the durable
//! store goes to memory only. A snapshot fetched from the source goes to the
//! durable store first (failures are logged and counted) and to memory
//! unconditionally.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use platform_authorizer_authn::{HttpJwksSource, SigningKeyCache};
//! use platform_authorizer_storage::auth::MemoryKeySetStore;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let authority = Url::parse("https://auth.example.com")?;
//! let source = HttpJwksSource::for_authority(&authority, std::time::Duration::from_secs(10))?;
//! let cache = SigningKeyCache::new(Arc::new(MemoryKeySetStore::new()), Arc::new(source));
//!
//! let key = cache.resolve("key-2024-001").await?;
//! println!("resolved {}", key.kid());
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use fail::fail_point;
use jsonwebtoken::{DecodingKey, jwk::Jwk};
use parking_lot::{Mutex, RwLock};
use platform_authorizer_storage::{
    StorageError, StorageResult,
    auth::{KeySetSnapshot, KeySetStore, SigningKeyRecord},
};

use crate::{
    error::AuthError,
    jwks::{KeySource, KeySourceError},
    metrics::{ResolverMetrics, ResolverMetricsSnapshot},
};

/// The tier that last replaced the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTier {
    /// The shared durable store.
    Store,
    /// The remote key source.
    Source,
}

impl RefreshTier {
    /// Returns the tier name used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for RefreshTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When, and from which tier, the memory tier was last replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastRefresh {
    /// Local time of the replacement.
    pub at: DateTime<Utc>,
    /// Tier the new snapshot came from.
    pub tier: RefreshTier,
}

/// A key found by [`SigningKeyCache::resolve`], ready for signature checks.
#[derive(Clone)]
pub struct ResolvedKey {
    record: SigningKeyRecord,
    decoding_key: Arc<DecodingKey>,
}

impl ResolvedKey {
    /// The key identifier.
    #[must_use]
    pub fn kid(&self) -> &str {
        self.record.kid()
    }

    /// The published JWK.
    #[must_use]
    pub fn jwk(&self) -> &Jwk {
        self.record.jwk()
    }

    /// The decoded verification key.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedKey").field("kid", &self.kid()).finish_non_exhaustive()
    }
}

/// Immutable contents of the memory tier.
#[derive(Default)]
struct MemoryTier {
    snapshot: Option<KeySetSnapshot>,
    keys: HashMap<String, ResolvedKey>,
    last_refresh: Option<LastRefresh>,
}

impl MemoryTier {
    /// Decodes every record up front. Records whose JWK cannot produce a
    /// verification key are left out and will resolve as `KeyNotFound`.
    fn build(snapshot: KeySetSnapshot, tier: RefreshTier) -> Self {
        let mut keys = HashMap::with_capacity(snapshot.len());
        for record in snapshot.keys() {
            match DecodingKey::from_jwk(record.jwk()) {
                Ok(key) => {
                    keys.insert(
                        record.kid().to_owned(),
                        ResolvedKey { record: record.clone(), decoding_key: Arc::new(key) },
                    );
                },
                Err(e) => {
                    tracing::debug!(
                        kid = record.kid(),
                        error = %e,
                        "Skipping JWK (cannot create DecodingKey)"
                    );
                },
            }
        }

        Self {
            snapshot: Some(snapshot),
            keys,
            last_refresh: Some(LastRefresh { at: Utc::now(), tier }),
        }
    }
}

/// Outcome of writing a freshly fetched key set to the durable store.
///
/// Persistence is best effort: a failure must not stop the lookup. The value
/// has to be acknowledged so the failure is at least logged.
#[must_use = "write-back outcomes must be acknowledged"]
struct WriteBack<'a> {
    record_id: &'a str,
    outcome: StorageResult<()>,
}

impl WriteBack<'_> {
    fn acknowledge(self) {
        match self.outcome {
            Ok(()) => {
                tracing::debug!(tier = "store", record_id = self.record_id, "key set written back");
            },
            Err(err) => {
                tracing::warn!(
                    tier = "store",
                    record_id = self.record_id,
                    error = %err,
                    transient = err.is_transient(),
                    "key set write-back failed, continuing with memory tier"
                );
            },
        }
    }
}

/// Three-tier cache resolving `kid`s to verification keys.
///
/// One instance serves one issuer: it owns that issuer's memory tier, knows
/// the durable record id, and holds the issuer's [`KeySource`]. Construct it
/// once per process and share it behind an `Arc`.
///
/// # Failure Handling
///
/// - Durable-store failures (read or write) are logged at WARN, counted in
///   [`metrics`](Self::metrics) and otherwise ignored.
/// - A key-source failure ends the lookup with
///   [`AuthError::KeySourceUnavailable`].
/// - A key no tier can produce ends the lookup with [`AuthError::KeyNotFound`].
///
/// # Rate Limiting
///
/// Disabled by default. With
/// [`with_min_refresh_interval`](Self::with_min_refresh_interval), a source
/// fetch attempted sooner than the interval after the previous attempt is
/// skipped and the lookup reports `KeyNotFound`. Failed attempts count, so an
/// unreachable authority is not hammered.
pub struct SigningKeyCache {
    store: Arc<dyn KeySetStore>,
    source: Arc<dyn KeySource>,
    record_id: String,
    memory: RwLock<Arc<MemoryTier>>,
    min_refresh_interval: Option<Duration>,
    last_source_attempt: Mutex<Option<Instant>>,
    metrics: ResolverMetrics,
}

impl SigningKeyCache {
    /// Creates a cache over `store` and `source` with an empty memory tier.
    ///
    /// The durable record id defaults to the source URI.
    #[must_use]
    pub fn new(store: Arc<dyn KeySetStore>, source: Arc<dyn KeySource>) -> Self {
        let record_id = source.uri().to_owned();
        Self {
            store,
            source,
            record_id,
            memory: RwLock::new(Arc::new(MemoryTier::default())),
            min_refresh_interval: None,
            last_source_attempt: Mutex::new(None),
            metrics: ResolverMetrics::default(),
        }
    }

    /// Overrides the durable record id.
    #[must_use]
    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = record_id.into();
        self
    }

    /// Skips source fetches attempted sooner than `interval` after the last one.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = Some(interval);
        self
    }

    /// The durable record id.
    #[must_use]
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// The key source URI.
    #[must_use]
    pub fn source_uri(&self) -> &str {
        self.source.uri()
    }

    /// Resolves `kid` to a verification key.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No tier holds the key ([`AuthError::KeyNotFound`])
    /// - The key source could not be reached ([`AuthError::KeySourceUnavailable`])
    #[tracing::instrument(skip(self), fields(record_id = %self.record_id))]
    pub async fn resolve(&self, kid: &str) -> Result<ResolvedKey, AuthError> {
        if let Some(key) = self.lookup(kid) {
            self.metrics.record_memory_hit();
            tracing::debug!(tier = "memory", "cache hit");
            return Ok(key);
        }
        tracing::debug!(tier = "memory", "cache miss");

        if self.refresh_from_store().await
            && let Some(key) = self.lookup(kid)
        {
            tracing::debug!(tier = "store", "cache hit");
            return Ok(key);
        }

        if self.refresh_from_source().await?
            && let Some(key) = self.lookup(kid)
        {
            tracing::debug!(tier = "source", "cache hit");
            return Ok(key);
        }

        self.metrics.record_key_not_found();
        tracing::debug!("key not found in any tier");
        Err(AuthError::key_not_found(kid))
    }

    /// Drops the memory tier. The next lookup starts at the durable store.
    ///
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self), fields(record_id = %self.record_id))]
    pub fn clear_memory(&self) {
        let evicted = std::mem::take(&mut *self.memory.write());
        tracing::info!(
            audit.action = "clear_cache",
            audit.resource = %self.record_id,
            audit.result = "success",
            audit.evicted = evicted.keys.len(),
            "audit_event"
        );
    }

    /// The snapshot currently held in memory, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<KeySetSnapshot> {
        self.memory.read().snapshot.clone()
    }

    /// Number of usable keys in the memory tier.
    #[must_use]
    pub fn memory_key_count(&self) -> usize {
        self.memory.read().keys.len()
    }

    /// When and from where the memory tier was last replaced.
    #[must_use]
    pub fn last_refresh(&self) -> Option<LastRefresh> {
        self.memory.read().last_refresh
    }

    /// Returns a snapshot of the resolver counters.
    #[must_use]
    pub fn metrics(&self) -> ResolverMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn lookup(&self, kid: &str) -> Option<ResolvedKey> {
        self.memory.read().keys.get(kid).cloned()
    }

    fn replace_memory(&self, snapshot: KeySetSnapshot, tier: RefreshTier) {
        let fresh = Arc::new(MemoryTier::build(snapshot, tier));
        *self.memory.write() = fresh;
    }

    /// Loads the durable record into memory. Returns whether memory changed.
    async fn refresh_from_store(&self) -> bool {
        match self.read_store().await {
            Ok(Some(snapshot)) if !snapshot.is_empty() => {
                self.metrics.record_store_hit();
                tracing::debug!(
                    tier = "store",
                    keys = snapshot.len(),
                    refreshed_at = %snapshot.refreshed_at(),
                    "loaded key set from durable store"
                );
                self.replace_memory(snapshot, RefreshTier::Store);
                true
            },
            Ok(_) => {
                self.metrics.record_store_miss();
                tracing::debug!(tier = "store", "cache miss");
                false
            },
            Err(err) => {
                self.metrics.record_store_error();
                tracing::warn!(
                    tier = "store",
                    error = %err,
                    transient = err.is_transient(),
                    "durable store read failed, falling through to key source"
                );
                false
            },
        }
    }

    async fn read_store(&self) -> StorageResult<Option<KeySetSnapshot>> {
        fail_point!("cache-before-store-read", |_| {
            Err(StorageError::internal("injected failure before store read"))
        });
        self.store.get_key_set(&self.record_id).await
    }

    /// Fetches from the source, writes back, and replaces memory.
    ///
    /// Returns `Ok(false)` when the fetch was skipped by the rate limit.
    async fn refresh_from_source(&self) -> Result<bool, AuthError> {
        if !self.admit_source_fetch() {
            self.metrics.record_rate_limited();
            tracing::debug!(tier = "source", "fetch skipped, minimum refresh interval not elapsed");
            return Ok(false);
        }

        let snapshot = match self.fetch_source().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.metrics.record_source_error();
                tracing::warn!(
                    tier = "source",
                    jwks_uri = err.uri(),
                    error = %err,
                    "key source fetch failed"
                );
                return Err(AuthError::key_source_unavailable(err));
            },
        };
        self.metrics.record_source_fetch();
        tracing::debug!(tier = "source", keys = snapshot.len(), "fetched key set from source");

        self.write_back(&snapshot).await.acknowledge();
        self.replace_memory(snapshot, RefreshTier::Source);
        Ok(true)
    }

    async fn fetch_source(&self) -> Result<KeySetSnapshot, KeySourceError> {
        fail_point!("cache-before-source-fetch", |_| {
            Err(KeySourceError::Fetch {
                uri: self.source.uri().to_owned(),
                message: "injected failure before source fetch".into(),
            })
        });
        self.source.fetch_key_set().await
    }

    async fn write_back(&self, snapshot: &KeySetSnapshot) -> WriteBack<'_> {
        let outcome = self.store.put_key_set(&self.record_id, snapshot).await;
        if outcome.is_err() {
            self.metrics.record_write_back_failure();
        }
        WriteBack { record_id: &self.record_id, outcome }
    }

    /// Stamps the attempt before fetching, so failed fetches are rate limited too.
    fn admit_source_fetch(&self) -> bool {
        let mut last = self.last_source_attempt.lock();
        if let (Some(interval), Some(at)) = (self.min_refresh_interval, *last)
            && at.elapsed() < interval
        {
            return false;
        }
        *last = Some(Instant::now());
        true
    }
}

impl fmt::Debug for SigningKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyCache")
            .field("record_id", &self.record_id)
            .field("source_uri", &self.source.uri())
            .field("memory_keys", &self.memory_key_count())
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use platform_authorizer_storage::testutil::RecordingKeySetStore;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{
        assert_auth_error,
        testutil::{StaticKeySource, TEST_JWKS_URI, TestSigningKey, rsa_jwk, snapshot_of},
    };

    struct Fixture {
        store: Arc<RecordingKeySetStore>,
        source: Arc<StaticKeySource>,
        cache: SigningKeyCache,
    }

    impl Fixture {
        /// Empty store, source publishing `kids`.
        fn with_source(kids: &[&str]) -> Self {
            let jwks = kids.iter().map(|kid| TestSigningKey::generate(kid).jwk());
            Self::build(RecordingKeySetStore::new(), StaticKeySource::publishing(jwks))
        }

        fn build(store: RecordingKeySetStore, source: StaticKeySource) -> Self {
            let store = Arc::new(store);
            let source = Arc::new(source);
            let cache = SigningKeyCache::new(store.clone(), source.clone());
            Self { store, source, cache }
        }

        fn calls(&self) -> (usize, usize, usize) {
            (self.store.get_count(), self.store.put_count(), self.source.fetch_count())
        }
    }

    fn seeded_store(kids: &[&str]) -> RecordingKeySetStore {
        let jwks = kids.iter().map(|kid| TestSigningKey::generate(kid).jwk());
        RecordingKeySetStore::with_record(TEST_JWKS_URI, snapshot_of(jwks))
    }

    #[tokio::test]
    async fn test_cold_start_resolves_from_source() {
        let fx = Fixture::with_source(&["k1", "k2"]);

        let key = fx.cache.resolve("k1").await.unwrap();

        assert_eq!(key.kid(), "k1");
        assert_eq!(fx.calls(), (1, 1, 1));
        assert_eq!(fx.cache.last_refresh().unwrap().tier, RefreshTier::Source);
        assert_eq!(fx.cache.memory_key_count(), 2);

        let persisted = fx.store.inner().get_key_set(TEST_JWKS_URI).await.unwrap().unwrap();
        assert_eq!(persisted.kids().collect::<Vec<_>>(), vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn test_memory_hit_makes_no_external_calls() {
        let fx = Fixture::with_source(&["k1", "k2"]);
        fx.cache.resolve("k1").await.unwrap();

        for _ in 0..5 {
            fx.cache.resolve("k1").await.unwrap();
            fx.cache.resolve("k2").await.unwrap();
        }

        assert_eq!(fx.calls(), (1, 1, 1));
        assert_eq!(fx.cache.metrics().memory_hits, 10);
    }

    #[tokio::test]
    async fn test_absent_key_consults_every_tier_once() {
        let fx = Fixture::with_source(&["k1"]);

        let result = fx.cache.resolve("missing").await;

        assert_auth_error!(result, KeyNotFound);
        assert_eq!(fx.calls(), (1, 1, 1));
        assert_eq!(fx.cache.metrics().keys_not_found, 1);
    }

    #[tokio::test]
    async fn test_warm_store_skips_source() {
        let fx =
            Fixture::build(seeded_store(&["k1"]), StaticKeySource::publishing(Vec::<Jwk>::new()));

        fx.cache.resolve("k1").await.unwrap();

        assert_eq!(fx.calls(), (1, 0, 0));
        assert_eq!(fx.cache.last_refresh().unwrap().tier, RefreshTier::Store);
        assert_eq!(fx.cache.metrics().store_hits, 1);
    }

    #[rstest]
    #[case::connection(|| StorageError::connection("table unreachable"))]
    #[case::timeout(StorageError::timeout)]
    #[case::malformed(|| StorageError::serialization("missing 'keys'"))]
    #[tokio::test]
    async fn test_store_read_failure_is_not_fatal(#[case] error: fn() -> StorageError) {
        let fx = Fixture::with_source(&["k1"]);
        fx.store.fail_gets(Some(error));

        let key = fx.cache.resolve("k1").await.unwrap();

        assert_eq!(key.kid(), "k1");
        assert_eq!(fx.source.fetch_count(), 1);
        assert_eq!(fx.cache.metrics().store_errors, 1);
    }

    #[tokio::test]
    async fn test_write_back_failure_is_not_fatal() {
        let fx = Fixture::with_source(&["k1"]);
        fx.store.fail_puts(Some(|| StorageError::connection("throttled")));

        fx.cache.resolve("k1").await.unwrap();
        fx.cache.resolve("k1").await.unwrap();

        assert_eq!(fx.calls(), (1, 1, 1));
        assert_eq!(fx.cache.metrics().write_back_failures, 1);
        assert!(fx.store.inner().is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_record_is_a_miss() {
        let store =
            RecordingKeySetStore::with_record(TEST_JWKS_URI, snapshot_of(Vec::<Jwk>::new()));
        let source = StaticKeySource::publishing([TestSigningKey::generate("k1").jwk()]);
        let fx = Fixture::build(store, source);

        fx.cache.resolve("k1").await.unwrap();

        assert_eq!(fx.source.fetch_count(), 1);
        assert_eq!(fx.cache.metrics().store_misses, 1);
    }

    #[tokio::test]
    async fn test_stale_store_falls_through_to_source() {
        let source = StaticKeySource::publishing([TestSigningKey::generate("new").jwk()]);
        let fx = Fixture::build(seeded_store(&["old"]), source);

        let key = fx.cache.resolve("new").await.unwrap();

        assert_eq!(key.kid(), "new");
        assert_eq!(fx.calls(), (1, 1, 1));
        // the source snapshot replaced, not extended, the stale one
        assert!(fx.cache.snapshot().unwrap().find("old").is_none());
        assert_auth_error!(fx.cache.resolve("old").await, KeyNotFound);
    }

    #[tokio::test]
    async fn test_source_failure_is_key_source_unavailable() {
        let fx = Fixture::with_source(&["k1"]);
        fx.source.fail_with_status(503);

        let result = fx.cache.resolve("k1").await;

        match result {
            Err(AuthError::KeySourceUnavailable(err)) => assert_eq!(err.uri(), TEST_JWKS_URI),
            other => panic!("expected KeySourceUnavailable, got {other:?}"),
        }
        assert_eq!(fx.calls(), (1, 0, 1));
        assert_eq!(fx.cache.metrics().source_errors, 1);
        assert!(fx.cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_source_failure_after_store_miss_keeps_store_keys() {
        let fx =
            Fixture::build(seeded_store(&["k1"]), StaticKeySource::publishing(Vec::<Jwk>::new()));
        fx.source.fail_with_status(500);

        assert_auth_error!(fx.cache.resolve("k2").await, KeySourceUnavailable);
        // store snapshot was loaded before the source was tried
        assert!(fx.cache.resolve("k1").await.is_ok());
    }

    #[tokio::test]
    async fn test_rotation_picks_up_new_key() {
        let fx = Fixture::with_source(&["k1"]);
        fx.cache.resolve("k1").await.unwrap();

        let rotated = TestSigningKey::generate("k2");
        fx.source.set_snapshot(snapshot_of([rotated.jwk()]));
        fx.store.fail_gets(Some(StorageError::timeout));

        assert_eq!(fx.cache.resolve("k2").await.unwrap().kid(), "k2");
        assert_eq!(fx.source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_jwk_is_skipped() {
        let broken: Jwk = serde_json::from_value(json!({
            "kty": "RSA", "n": "!!not-base64!!", "e": "AQAB", "kid": "broken"
        }))
        .unwrap();
        let good = TestSigningKey::generate("good");
        let fx = Fixture::build(
            RecordingKeySetStore::new(),
            StaticKeySource::publishing([broken, good.jwk()]),
        );

        assert_auth_error!(fx.cache.resolve("broken").await, KeyNotFound);
        assert_eq!(fx.cache.snapshot().unwrap().len(), 2);
        assert_eq!(fx.cache.memory_key_count(), 1);
        assert!(fx.cache.resolve("good").await.is_ok());
    }

    #[tokio::test]
    async fn test_rsa_key_resolves() {
        let fx = Fixture::build(
            RecordingKeySetStore::new(),
            StaticKeySource::publishing([rsa_jwk("rsa")]),
        );
        assert_eq!(fx.cache.resolve("rsa").await.unwrap().kid(), "rsa");
    }

    #[tokio::test]
    async fn test_clear_memory_restarts_at_store() {
        let fx = Fixture::with_source(&["k1"]);
        fx.cache.resolve("k1").await.unwrap();

        fx.cache.clear_memory();
        assert_eq!(fx.cache.memory_key_count(), 0);
        assert!(fx.cache.last_refresh().is_none());

        fx.cache.resolve("k1").await.unwrap();
        // second lookup is served by the record written back the first time
        assert_eq!(fx.calls(), (2, 1, 1));
        assert_eq!(fx.cache.last_refresh().unwrap().tier, RefreshTier::Store);
    }

    #[tokio::test]
    async fn test_record_id_override() {
        let fx = Fixture::with_source(&["k1"]);
        let cache = SigningKeyCache::new(fx.store.clone(), fx.source.clone())
            .with_record_id("authorizer-prod");
        assert_eq!(fx.cache.record_id(), TEST_JWKS_URI);

        cache.resolve("k1").await.unwrap();

        assert!(fx.store.inner().get_key_set("authorizer-prod").await.unwrap().is_some());
        assert!(fx.store.inner().get_key_set(TEST_JWKS_URI).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_absent_keys_refetch_without_rate_limit() {
        let fx = Fixture::with_source(&["k1"]);

        for _ in 0..3 {
            assert_auth_error!(fx.cache.resolve("missing").await, KeyNotFound);
        }

        assert_eq!(fx.source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_min_refresh_interval_limits_fetches() {
        let store = Arc::new(RecordingKeySetStore::new());
        let source = Arc::new(StaticKeySource::publishing([TestSigningKey::generate("k1").jwk()]));
        let cache = SigningKeyCache::new(store, source.clone())
            .with_min_refresh_interval(Duration::from_secs(60));

        assert_auth_error!(cache.resolve("missing").await, KeyNotFound);
        assert_auth_error!(cache.resolve("also-missing").await, KeyNotFound);

        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.metrics().rate_limited, 1);
        // keys fetched by the first attempt are still served
        assert!(cache.resolve("k1").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_fetch_counts_toward_rate_limit() {
        let store = Arc::new(RecordingKeySetStore::new());
        let source = Arc::new(StaticKeySource::publishing(Vec::<Jwk>::new()));
        source.fail_with_status(503);
        let cache = SigningKeyCache::new(store, source.clone())
            .with_min_refresh_interval(Duration::from_secs(60));

        assert_auth_error!(cache.resolve("k1").await, KeySourceUnavailable);
        assert_auth_error!(cache.resolve("k1").await, KeyNotFound);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_memory() {
        let fx = Fixture::with_source(&["k1"]);
        fx.cache.resolve("k1").await.unwrap();
        let cache = Arc::new(fx.cache);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.resolve("k1").await.map(|k| k.kid().to_owned()) })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "k1");
        }

        assert_eq!(fx.source.fetch_count(), 1);
        assert_eq!(cache.metrics().memory_hits, 8);
    }

    #[test]
    fn test_debug_output() {
        let fx = Fixture::with_source(&["k1"]);
        let debug = format!("{:?}", fx.cache);
        assert!(debug.contains("SigningKeyCache"));
        assert!(debug.contains(TEST_JWKS_URI));
    }
}
