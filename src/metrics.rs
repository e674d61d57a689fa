//! Telemetry counters consumed by the drivers.
//!
//! The engine does not own a monitoring backend; it records against a
//! [`Telemetry`] trait the embedding service implements. Every increment
//! carries `{driver, policy, hash}` labels so a backend can attribute
//! traffic per driver, per policy, and per key.
//!
//! ## Counters
//!
//! | Counter | Incremented when |
//! |---|---|
//! | `caches_created_total` | a `set` stores a new entry |
//! | `caches_deleted_total` | a `delete` removes an entry |
//! | `cache_lookups_total` | a `get` runs, hit or miss |
//! | `cache_hits_total` | a `get` finds a live entry |
//! | `cache_misses_total` | a `get` finds nothing |
//! | `cache_evictions_total` | any eviction path removes an entry |
//! | `cache_evictions_ttl_total` | a TTL timer expired the entry |
//! | `cache_evictions_invalidation_total` | a bulk invalidation removed it |
//! | `cache_evictions_size_limit_total` | admission evicted it for space |
//!
//! [`CounterRecorder`] is the in-process implementation: one relaxed
//! atomic per counter plus a point-in-time [`CounterSnapshot`], which is
//! what the test suites assert against. Production shells typically
//! install their own `Telemetry` bridging to their metrics pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::policy::PolicyKind;

/// The counters the drivers emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Created,
    Deleted,
    Lookups,
    Hits,
    Misses,
    Evictions,
    EvictionsTtl,
    EvictionsInvalidation,
    EvictionsSizeLimit,
}

impl Counter {
    pub const ALL: [Counter; 9] = [
        Counter::Created,
        Counter::Deleted,
        Counter::Lookups,
        Counter::Hits,
        Counter::Misses,
        Counter::Evictions,
        Counter::EvictionsTtl,
        Counter::EvictionsInvalidation,
        Counter::EvictionsSizeLimit,
    ];

    /// The exported metric name.
    pub fn name(self) -> &'static str {
        match self {
            Counter::Created => "caches_created_total",
            Counter::Deleted => "caches_deleted_total",
            Counter::Lookups => "cache_lookups_total",
            Counter::Hits => "cache_hits_total",
            Counter::Misses => "cache_misses_total",
            Counter::Evictions => "cache_evictions_total",
            Counter::EvictionsTtl => "cache_evictions_ttl_total",
            Counter::EvictionsInvalidation => "cache_evictions_invalidation_total",
            Counter::EvictionsSizeLimit => "cache_evictions_size_limit_total",
        }
    }

    fn index(self) -> usize {
        match self {
            Counter::Created => 0,
            Counter::Deleted => 1,
            Counter::Lookups => 2,
            Counter::Hits => 3,
            Counter::Misses => 4,
            Counter::Evictions => 5,
            Counter::EvictionsTtl => 6,
            Counter::EvictionsInvalidation => 7,
            Counter::EvictionsSizeLimit => 8,
        }
    }
}

/// Attributes attached to every counter increment.
#[derive(Debug, Clone, Copy)]
pub struct Labels<'a> {
    /// Driver name, `"memory"` or `"fileSystem"`.
    pub driver: &'a str,
    /// The policy the operation ran against.
    pub policy: PolicyKind,
    /// The cache key involved, empty when no single key applies.
    pub hash: &'a str,
}

/// Counter sink implemented by the embedding service.
pub trait Telemetry: Send + Sync {
    fn incr(&self, counter: Counter, labels: Labels<'_>);
}

/// Process-local recorder: relaxed atomics, label-agnostic aggregation.
#[derive(Debug, Default)]
pub struct CounterRecorder {
    counters: [AtomicU64; 9],
}

impl CounterRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one counter.
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            created: self.get(Counter::Created),
            deleted: self.get(Counter::Deleted),
            lookups: self.get(Counter::Lookups),
            hits: self.get(Counter::Hits),
            misses: self.get(Counter::Misses),
            evictions: self.get(Counter::Evictions),
            evictions_ttl: self.get(Counter::EvictionsTtl),
            evictions_invalidation: self.get(Counter::EvictionsInvalidation),
            evictions_size_limit: self.get(Counter::EvictionsSizeLimit),
        }
    }
}

impl Telemetry for CounterRecorder {
    fn incr(&self, counter: Counter, _labels: Labels<'_>) {
        self.counters[counter.index()].fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of a [`CounterRecorder`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub created: u64,
    pub deleted: u64,
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub evictions_ttl: u64,
    pub evictions_invalidation: u64,
    pub evictions_size_limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Labels<'static> {
        Labels {
            driver: "memory",
            policy: PolicyKind::Lru,
            hash: "c.test",
        }
    }

    #[test]
    fn increments_are_independent() {
        let recorder = CounterRecorder::new();
        recorder.incr(Counter::Hits, labels());
        recorder.incr(Counter::Hits, labels());
        recorder.incr(Counter::Misses, labels());

        assert_eq!(recorder.get(Counter::Hits), 2);
        assert_eq!(recorder.get(Counter::Misses), 1);
        assert_eq!(recorder.get(Counter::Created), 0);
    }

    #[test]
    fn snapshot_reflects_all_counters() {
        let recorder = CounterRecorder::new();
        for counter in Counter::ALL {
            recorder.incr(counter, labels());
        }

        let snap = recorder.snapshot();
        assert_eq!(snap.created, 1);
        assert_eq!(snap.deleted, 1);
        assert_eq!(snap.lookups, 1);
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.evictions, 1);
        assert_eq!(snap.evictions_ttl, 1);
        assert_eq!(snap.evictions_invalidation, 1);
        assert_eq!(snap.evictions_size_limit, 1);
    }

    #[test]
    fn names_follow_the_exported_scheme() {
        for counter in Counter::ALL {
            assert!(counter.name().ends_with("_total"));
        }
        assert_eq!(Counter::Hits.name(), "cache_hits_total");
    }
}
