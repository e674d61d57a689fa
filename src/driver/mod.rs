//! Storage drivers: six policies bound over one entry table.
//!
//! A driver owns the entry tables, the invalidation index, and one mutex
//! per policy; the policies own only their ordering structures and TTL
//! timers. Two drivers exist:
//!
//! - [`MemoryDriver`] — entries live in process memory, optionally
//!   persisted through the periodic snapshot blob.
//! - [`DiskDriver`] — entries live as one file each under a mount path;
//!   the files are the durable state.
//!
//! ## Locking discipline
//!
//! ```text
//!   get / delete / invalidate / TTL expiry      one shard mutex
//!   set (admission may evict, possibly from     admission mutex, then
//!   other policies when evictFromOthers)        shard mutexes in declared
//!                                               policy order
//! ```
//!
//! Admissions serialize on a driver-level mutex so that two concurrent
//! `set` calls can never hold two shard mutexes in opposite orders; every
//! other operation touches exactly one shard and stays concurrent.
//!
//! This module carries the pieces both drivers share: the invalidation
//! index maintenance, the eviction cause taxonomy, and the resource-usage
//! report types.

pub mod disk;
pub mod memory;

pub use disk::DiskDriver;
pub use memory::MemoryDriver;

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::entry::Entry;
use crate::ident::{CacheKey, InvalidationKey};
use crate::metrics::Counter;
use crate::policy::PolicyKind;

/// Invalidation key → the cache keys that declared it.
pub(crate) type InvalidationIndex = FxHashMap<InvalidationKey, FxHashSet<CacheKey>>;

/// Adds `key` to the set of every invalidation key the entry declares.
pub(crate) fn link_invalidation(index: &mut InvalidationIndex, entry: &Entry, key: &CacheKey) {
    for identifier in &entry.options.invalidated_by {
        index
            .entry(identifier.invalidation_key())
            .or_default()
            .insert(key.clone());
    }
}

/// Removes `key` from every set it appears in; empty sets are dropped.
pub(crate) fn unlink_invalidation(index: &mut InvalidationIndex, entry: &Entry, key: &CacheKey) {
    for identifier in &entry.options.invalidated_by {
        let invalidation_key = identifier.invalidation_key();
        if let Some(keys) = index.get_mut(&invalidation_key) {
            keys.remove(key);
            if keys.is_empty() {
                index.remove(&invalidation_key);
            }
        }
    }
}

/// Why an entry left the table, for the eviction counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionCause {
    SizeLimit,
    Ttl,
    Invalidation,
}

impl EvictionCause {
    pub(crate) fn counter(self) -> Counter {
        match self {
            EvictionCause::SizeLimit => Counter::EvictionsSizeLimit,
            EvictionCause::Ttl => Counter::EvictionsTtl,
            EvictionCause::Invalidation => Counter::EvictionsInvalidation,
        }
    }
}

/// Usage of one policy within a driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolicyUsage {
    /// Serialized bytes stored under this policy.
    pub bytes: u64,
    /// Number of entries stored under this policy.
    pub entries: u64,
    /// Share of the driver's byte budget this policy occupies.
    pub fraction: f64,
}

/// Driver-wide usage report.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceUsage {
    pub per_policy: BTreeMap<PolicyKind, PolicyUsage>,
    pub total_bytes: u64,
    pub total_entries: u64,
}
