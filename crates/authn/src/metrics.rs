//! Counters for the signing key resolver.
//!
//! Every tier transition the resolver makes is counted here, including the
//! failures it swallows (durable-store errors, failed write-backs). Callers
//! never see those, so the counters and WARN logs are the only trace of a
//! degraded store.
//!
//! # Examples
//!
//! ```
//! use platform_authorizer_authn::metrics::ResolverMetricsSnapshot;
//!
//! let snapshot = ResolverMetricsSnapshot::builder().memory_hits(9).store_misses(1).build();
//! assert_eq!(snapshot.lookups(), 10);
//! assert!((snapshot.memory_hit_rate() - 0.9).abs() < f64::EPSILON);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of resolver counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, bon::Builder)]
pub struct ResolverMetricsSnapshot {
    /// Lookups answered by the memory tier.
    #[builder(default)]
    pub memory_hits: u64,
    /// Durable-store reads that returned a usable key set.
    #[builder(default)]
    pub store_hits: u64,
    /// Durable-store reads that found no record or an empty one.
    #[builder(default)]
    pub store_misses: u64,
    /// Durable-store reads that failed.
    #[builder(default)]
    pub store_errors: u64,
    /// Successful fetches from the remote source.
    #[builder(default)]
    pub source_fetches: u64,
    /// Failed fetches from the remote source.
    #[builder(default)]
    pub source_errors: u64,
    /// Fresh key sets that could not be written back to the durable store.
    #[builder(default)]
    pub write_back_failures: u64,
    /// Lookups that ended in `KeyNotFound`.
    #[builder(default)]
    pub keys_not_found: u64,
    /// Remote fetches skipped because of the minimum refresh interval.
    #[builder(default)]
    pub rate_limited: u64,
}

impl ResolverMetricsSnapshot {
    /// Total lookups: each one either hits memory or reads the durable store.
    #[must_use]
    pub fn lookups(&self) -> u64 {
        self.memory_hits + self.store_hits + self.store_misses + self.store_errors
    }

    /// Fraction of lookups answered from memory (0.0 when nothing was looked up).
    #[must_use]
    pub fn memory_hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            return 0.0;
        }
        self.memory_hits as f64 / lookups as f64
    }

    /// Total failures observed but not propagated.
    #[must_use]
    pub fn degraded_events(&self) -> u64 {
        self.store_errors + self.write_back_failures
    }
}

/// Live counters owned by a [`SigningKeyCache`](crate::SigningKeyCache).
#[derive(Debug, Default)]
pub(crate) struct ResolverMetrics {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    store_misses: AtomicU64,
    store_errors: AtomicU64,
    source_fetches: AtomicU64,
    source_errors: AtomicU64,
    write_back_failures: AtomicU64,
    keys_not_found: AtomicU64,
    rate_limited: AtomicU64,
}

impl ResolverMetrics {
    pub(crate) fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_hit(&self) {
        self.store_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_miss(&self) {
        self.store_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_source_fetch(&self) {
        self.source_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_back_failure(&self) {
        self.write_back_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_key_not_found(&self) {
        self.keys_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ResolverMetricsSnapshot {
        ResolverMetricsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            store_misses: self.store_misses.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            source_fetches: self.source_fetches.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            write_back_failures: self.write_back_failures.load(Ordering::Relaxed),
            keys_not_found: self.keys_not_found.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}
