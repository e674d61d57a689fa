//! MRU (Most Recently Used) ordering.
//!
//! The inverse of LRU: the same doubly-linked key list, but eviction pops
//! the tail — the most recently inserted or accessed key. Useful for
//! cyclic access patterns where the key touched a moment ago is the least
//! likely to be needed again soon.
//!
//! ```text
//!   head (oldest - keep)                  tail (MRU - EVICT FROM HERE)
//!     [oldest] ◄──► [ ... ] ◄──► [newest access]
//!
//!   track(k)  → append k at tail
//!   hit(k)    → unlink k, append at tail (becomes the next victim)
//!   evict()   → pop tail; the new tail's next becomes None, head unchanged
//! ```

use crate::ds::KeyList;
use crate::ident::CacheKey;

/// MRU ordering over cache keys.
///
/// # Example
///
/// ```
/// use stashkit::ident::CacheKey;
/// use stashkit::policy::MruOrder;
///
/// let (a, b, c) = (
///     CacheKey::from_digest("a"),
///     CacheKey::from_digest("b"),
///     CacheKey::from_digest("c"),
/// );
///
/// let mut order = MruOrder::new();
/// order.track(&a);
/// order.track(&b);
/// order.track(&c);
///
/// // Touching `a` makes it the most recent, so it evicts first.
/// order.hit(&a);
/// assert_eq!(order.evict(), Some(a));
/// ```
#[derive(Debug, Default)]
pub struct MruOrder {
    list: KeyList,
}

impl MruOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.list.contains(key)
    }

    /// Appends a new key at the most-recent end. Returns `false` if the
    /// key is already tracked.
    pub fn track(&mut self, key: &CacheKey) -> bool {
        self.list.push_tail(key.clone())
    }

    /// Removes a key from anywhere in the order.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        self.list.remove(key)
    }

    /// Moves the key to the most-recent end, lining it up for eviction.
    pub fn hit(&mut self, key: &CacheKey) -> bool {
        self.list.move_to_tail(key)
    }

    /// Removes and returns the most recently used key.
    pub fn evict(&mut self) -> Option<CacheKey> {
        self.list.pop_tail()
    }

    /// Keys least-recent first, same layout as the LRU dump.
    pub fn key_order(&self) -> Vec<CacheKey> {
        self.list.keys()
    }

    /// Rebuilds the order from a least-recent-first key sequence.
    pub fn restore<I: IntoIterator<Item = CacheKey>>(&mut self, keys: I) {
        self.list.clear();
        for key in keys {
            self.list.push_tail(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey::from_digest(name)
    }

    #[test]
    fn evicts_most_recent_first() {
        let mut order = MruOrder::new();
        for name in ["a", "b", "c"] {
            order.track(&key(name));
        }

        order.hit(&key("a"));

        assert_eq!(order.evict(), Some(key("a")));
        assert_eq!(order.key_order(), vec![key("b"), key("c")]);
    }

    #[test]
    fn without_hits_the_newest_insert_is_the_victim() {
        let mut order = MruOrder::new();
        for name in ["a", "b", "c"] {
            order.track(&key(name));
        }
        assert_eq!(order.evict(), Some(key("c")));
        assert_eq!(order.evict(), Some(key("b")));
        assert_eq!(order.evict(), Some(key("a")));
        assert_eq!(order.evict(), None);
    }

    #[test]
    fn evict_leaves_head_untouched() {
        let mut order = MruOrder::new();
        for name in ["a", "b", "c"] {
            order.track(&key(name));
        }
        order.evict();
        // Head is still the oldest key, and the remaining order survives.
        assert_eq!(order.key_order(), vec![key("a"), key("b")]);
        assert_eq!(order.evict(), Some(key("b")));
        assert_eq!(order.evict(), Some(key("a")));
    }

    #[test]
    fn restore_reproduces_the_eviction_sequence() {
        let mut order = MruOrder::new();
        for name in ["a", "b", "c"] {
            order.track(&key(name));
        }
        order.hit(&key("b"));

        let mut restored = MruOrder::new();
        restored.restore(order.key_order());

        assert_eq!(restored.evict(), Some(key("b")));
        assert_eq!(restored.evict(), Some(key("c")));
        assert_eq!(restored.evict(), Some(key("a")));
    }
}
