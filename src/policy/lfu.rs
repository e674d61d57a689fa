//! LFU (Least Frequently Used) ordering.
//!
//! Three structures cooperate, kept strictly in sync:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  counts:  CacheKey → hit count                                   │
//! │                                                                  │
//! │  buckets: hit count → ordered keys (insertion order within)      │
//! │             0 → [a, d]        ◄── lowest (cached)                │
//! │             1 → [c]                                              │
//! │             2 → [b]                                              │
//! │                                                                  │
//! │  evict() → first key in the bucket at the cached lowest count    │
//! └──────────────────────────────────────────────────────────────────┘
//!
//!   track(k) → count 0, appended to bucket 0, lowest = 0
//!   hit(k)   → move k from bucket c to bucket c+1
//!   evict()  → remove front of bucket at lowest
//! ```
//!
//! The cached `lowest` is recomputed only when the bucket holding it
//! empties: after any removal, if the emptied count equals the cached
//! extreme, the remaining counts are scanned for the new extreme (zero
//! when nothing is left). Ties within a count break in insertion order.

use rustc_hash::FxHashMap;

use crate::ident::CacheKey;

/// LFU ordering over cache keys.
///
/// # Example
///
/// ```
/// use stashkit::ident::CacheKey;
/// use stashkit::policy::LfuOrder;
///
/// let (a, b) = (CacheKey::from_digest("a"), CacheKey::from_digest("b"));
///
/// let mut order = LfuOrder::new();
/// order.track(&a);
/// order.track(&b);
/// order.hit(&b);
///
/// // `a` still has zero hits, so it is the victim.
/// assert_eq!(order.evict(), Some(a));
/// ```
#[derive(Debug, Default)]
pub struct LfuOrder {
    counts: FxHashMap<CacheKey, u64>,
    buckets: FxHashMap<u64, Vec<CacheKey>>,
    /// Cached lowest hit count; meaningful while any key is tracked.
    lowest: u64,
}

impl LfuOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.counts.contains_key(key)
    }

    /// Current hit count for a tracked key.
    pub fn frequency(&self, key: &CacheKey) -> Option<u64> {
        self.counts.get(key).copied()
    }

    /// Starts tracking a key with a zero hit count. Returns `false` if the
    /// key is already tracked.
    pub fn track(&mut self, key: &CacheKey) -> bool {
        if self.counts.contains_key(key) {
            return false;
        }
        self.counts.insert(key.clone(), 0);
        self.buckets.entry(0).or_default().push(key.clone());
        // A fresh key at count zero is always the new minimum.
        self.lowest = 0;
        true
    }

    /// Removes a key. Returns `false` if it is not tracked.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        let Some(count) = self.counts.remove(key) else {
            return false;
        };
        let emptied = self.pull_from_bucket(count, key);
        if emptied && count == self.lowest {
            self.recompute_lowest();
        }
        true
    }

    /// Increments the key's hit count, moving it one bucket up.
    pub fn hit(&mut self, key: &CacheKey) -> bool {
        let Some(count) = self.counts.get(key).copied() else {
            return false;
        };
        let emptied = self.pull_from_bucket(count, key);
        let next = count + 1;
        self.counts.insert(key.clone(), next);
        self.buckets.entry(next).or_default().push(key.clone());
        if emptied && count == self.lowest {
            self.recompute_lowest();
        }
        true
    }

    /// Removes and returns the first key at the lowest hit count.
    pub fn evict(&mut self) -> Option<CacheKey> {
        if self.counts.is_empty() {
            return None;
        }
        let bucket = self
            .buckets
            .get_mut(&self.lowest)
            .expect("lowest always names a populated bucket");
        let victim = bucket.remove(0);
        self.counts.remove(&victim);
        if bucket.is_empty() {
            self.buckets.remove(&self.lowest);
            self.recompute_lowest();
        }
        Some(victim)
    }

    /// Keys with their counts, ascending count, insertion order within.
    pub fn key_order(&self) -> Vec<(CacheKey, u64)> {
        let mut counts: Vec<u64> = self.buckets.keys().copied().collect();
        counts.sort_unstable();
        let mut out = Vec::with_capacity(self.counts.len());
        for count in counts {
            for key in &self.buckets[&count] {
                out.push((key.clone(), count));
            }
        }
        out
    }

    /// Rebuilds the order from a `key_order` dump.
    pub fn restore<I: IntoIterator<Item = (CacheKey, u64)>>(&mut self, entries: I) {
        self.counts.clear();
        self.buckets.clear();
        for (key, count) in entries {
            self.counts.insert(key.clone(), count);
            self.buckets.entry(count).or_default().push(key);
        }
        self.recompute_lowest();
    }

    /// Removes the key from its bucket; returns `true` if that emptied the
    /// bucket (and removed it).
    fn pull_from_bucket(&mut self, count: u64, key: &CacheKey) -> bool {
        let Some(bucket) = self.buckets.get_mut(&count) else {
            return false;
        };
        if let Some(position) = bucket.iter().position(|k| k == key) {
            bucket.remove(position);
        }
        if bucket.is_empty() {
            self.buckets.remove(&count);
            return true;
        }
        false
    }

    fn recompute_lowest(&mut self) {
        self.lowest = self.buckets.keys().copied().min().unwrap_or(0);
    }
}
