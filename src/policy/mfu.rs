//! MFU (Most Frequently Used) ordering.
//!
//! Symmetric to LFU: the same count map and per-count buckets, but the
//! cached extreme is the *highest* hit count and eviction takes the *last*
//! key in that bucket — the most recently arrived among the hottest.
//!
//! ```text
//!   buckets: hit count → ordered keys
//!              0 → [a, d]
//!              2 → [b, c]     ◄── highest (cached)
//!                      ▲
//!                      └── evict() removes the last key here
//! ```
//!
//! The cached `highest` follows the same recomputation rule as LFU's
//! `lowest`: when the bucket holding the extreme empties, the remaining
//! counts are scanned for the new extreme (zero when nothing is left).

use rustc_hash::FxHashMap;

use crate::ident::CacheKey;

/// MFU ordering over cache keys.
///
/// # Example
///
/// ```
/// use stashkit::ident::CacheKey;
/// use stashkit::policy::MfuOrder;
///
/// let (a, b) = (CacheKey::from_digest("a"), CacheKey::from_digest("b"));
///
/// let mut order = MfuOrder::new();
/// order.track(&a);
/// order.track(&b);
/// order.hit(&b);
///
/// // `b` is the hottest key, so it is the victim.
/// assert_eq!(order.evict(), Some(b));
/// ```
#[derive(Debug, Default)]
pub struct MfuOrder {
    counts: FxHashMap<CacheKey, u64>,
    buckets: FxHashMap<u64, Vec<CacheKey>>,
    /// Cached highest hit count; meaningful while any key is tracked.
    highest: u64,
}

impl MfuOrder {
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
        if self.counts.is_empty() {
            self.highest = 0;
        }
        self.counts.insert(key.clone(), 0);
        self.buckets.entry(0).or_default().push(key.clone());
        true
    }

    /// Removes a key. Returns `false` if it is not tracked.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        let Some(count) = self.counts.remove(key) else {
            return false;
        };
        let emptied = self.pull_from_bucket(count, key);
        if emptied && count == self.highest {
            self.recompute_highest();
        }
        true
    }

    /// Increments the key's hit count, moving it one bucket up.
    pub fn hit(&mut self, key: &CacheKey) -> bool {
        let Some(count) = self.counts.get(key).copied() else {
            return false;
        };
        self.pull_from_bucket(count, key);
        let next = count + 1;
        self.counts.insert(key.clone(), next);
        self.buckets.entry(next).or_default().push(key.clone());
        if next > self.highest {
            self.highest = next;
        }
        true
    }

    /// Removes and returns the last key at the highest hit count.
    pub fn evict(&mut self) -> Option<CacheKey> {
        if self.counts.is_empty() {
            return None;
        }
        let bucket = self
            .buckets
            .get_mut(&self.highest)
            .expect("highest always names a populated bucket");
        let victim = bucket.pop().expect("bucket is never left empty");
        self.counts.remove(&victim);
        if bucket.is_empty() {
            self.buckets.remove(&self.highest);
            self.recompute_highest();
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
        self.recompute_highest();
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

    fn recompute_highest(&mut self) {
        self.highest = self.buckets.keys().copied().max().unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey::from_digest(name)
    }

    #[test]
    fn hottest_key_is_the_victim() {
        let mut order = MfuOrder::new();
        for name in ["a", "b", "c"] {
            order.track(&key(name));
        }
        order.hit(&key("b"));
        order.hit(&key("b"));
        order.hit(&key("c"));

        // b: 2, c: 1, a: 0.
        assert_eq!(order.evict(), Some(key("b")));
        assert_eq!(order.evict(), Some(key("c")));
        assert_eq!(order.evict(), Some(key("a")));
        assert_eq!(order.evict(), None);
    }

    #[test]
    fn ties_take_the_last_arrival_in_the_bucket() {
        let mut order = MfuOrder::new();
        for name in ["a", "b", "c"] {
            order.track(&key(name));
        }
        // All at count 0: the last key in the bucket is "c".
        assert_eq!(order.evict(), Some(key("c")));
        assert_eq!(order.evict(), Some(key("b")));
        assert_eq!(order.evict(), Some(key("a")));
    }

    #[test]
    fn highest_recovers_after_its_bucket_empties() {
        let mut order = MfuOrder::new();
        order.track(&key("hot"));
        order.track(&key("cold"));
        order.hit(&key("hot"));
        order.hit(&key("hot"));

        assert_eq!(order.evict(), Some(key("hot")));
        // Bucket 2 is gone; highest must fall back to 0.
        assert_eq!(order.evict(), Some(key("cold")));
    }

    #[test]
    fn removing_the_only_hot_key_rescans() {
        let mut order = MfuOrder::new();
        order.track(&key("hot"));
        order.track(&key("mild"));
        order.hit(&key("hot"));
        order.hit(&key("hot"));
        order.hit(&key("mild"));

        assert!(order.remove(&key("hot")));
        assert_eq!(order.frequency(&key("mild")), Some(1));
        assert_eq!(order.evict(), Some(key("mild")));
    }

    #[test]
    fn restore_preserves_counts_and_eviction_order() {
        let mut order = MfuOrder::new();
        for name in ["a", "b", "c"] {
            order.track(&key(name));
        }
        order.hit(&key("a"));
        order.hit(&key("a"));
        order.hit(&key("c"));

        let mut restored = MfuOrder::new();
        restored.restore(order.key_order());

        assert_eq!(restored.frequency(&key("a")), Some(2));
        assert_eq!(restored.evict(), Some(key("a")));
        assert_eq!(restored.evict(), Some(key("c")));
        assert_eq!(restored.evict(), Some(key("b")));
    }
}
