#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the authn crate.
//!
//! These tests require both `failpoints` and `testutil` features:
//! ```bash
//! cargo test -p platform-authorizer-authn --features failpoints,testutil --test failpoint_tests
//! ```

use std::sync::Arc;

use platform_authorizer_authn::{
    AuthError, SigningKeyCache,
    testutil::{StaticKeySource, TEST_JWKS_URI, TestSigningKey},
};
use platform_authorizer_storage::{auth::KeySetStore, testutil::RecordingKeySetStore};

fn setup_cache() -> (SigningKeyCache, Arc<RecordingKeySetStore>, Arc<StaticKeySource>) {
    let store = Arc::new(RecordingKeySetStore::new());
    let jwk = TestSigningKey::generate("fp-key").jwk();
    let source = Arc::new(StaticKeySource::publishing([jwk]));
    let cache = SigningKeyCache::new(store.clone(), source.clone());
    (cache, store, source)
}

#[tokio::test]
async fn store_read_failpoint_falls_through_to_source() {
    let scenario = fail::FailScenario::setup();
    let (cache, store, source) = setup_cache();

    fail::cfg("cache-before-store-read", "return").expect("failed to configure fail point");

    let key = cache.resolve("fp-key").await.expect("source must still serve the key");
    assert_eq!(key.kid(), "fp-key");
    assert_eq!(store.get_count(), 0, "fail point fires before the store is called");
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(cache.metrics().store_errors, 1);
    // write-back is unaffected by the read fail point
    assert!(store.inner().get_key_set(TEST_JWKS_URI).await.expect("read").is_some());

    scenario.teardown();
}

#[tokio::test]
async fn source_fetch_failpoint_returns_key_source_unavailable() {
    let scenario = fail::FailScenario::setup();
    let (cache, store, source) = setup_cache();

    fail::cfg("cache-before-source-fetch", "return").expect("failed to configure fail point");

    let result = cache.resolve("fp-key").await;
    match result {
        Err(AuthError::KeySourceUnavailable(err)) => assert_eq!(err.uri(), TEST_JWKS_URI),
        other => panic!("expected KeySourceUnavailable, got {other:?}"),
    }
    assert_eq!(store.get_count(), 1);
    assert_eq!(store.put_count(), 0);
    assert_eq!(source.fetch_count(), 0);

    scenario.teardown();
}

#[tokio::test]
async fn resolve_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();
    let (cache, _store, source) = setup_cache();

    let result = cache.resolve("fp-key").await;
    assert!(result.is_ok(), "resolve should succeed without fail point");
    assert_eq!(source.fetch_count(), 1);

    scenario.teardown();
}
