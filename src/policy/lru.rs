//! LRU (Least Recently Used) ordering.
//!
//! Keys live on a doubly-linked list ([`KeyList`]): head is the least
//! recently used key, tail the most recently used. Tracking appends at the
//! tail, a hit moves the key to the tail, eviction pops the head. Among
//! keys with equal access recency the oldest insertion evicts first,
//! because insertions and refreshes both append.
//!
//! ```text
//!   head (LRU - evict)                    tail (MRU - keep)
//!     [oldest] ◄──► [ ... ] ◄──► [newest access]
//!
//!   track(k)  → append k at tail
//!   hit(k)    → unlink k, append at tail (no-op when already tail)
//!   evict()   → pop head
//! ```
//!
//! | Operation | Time |
//! |-----------|------|
//! | `track`   | O(1) |
//! | `hit`     | O(1) |
//! | `evict`   | O(1) |
//! | `remove`  | O(1) |

use crate::ds::KeyList;
use crate::ident::CacheKey;

/// LRU ordering over cache keys.
///
/// # Example
///
/// ```
/// use stashkit::ident::CacheKey;
/// use stashkit::policy::LruOrder;
///
/// let (a, b, c) = (
///     CacheKey::from_digest("a"),
///     CacheKey::from_digest("b"),
///     CacheKey::from_digest("c"),
/// );
///
/// let mut order = LruOrder::new();
/// order.track(&a);
/// order.track(&b);
/// order.track(&c);
///
/// // Touching `a` protects it; `b` is now the least recent.
/// order.hit(&a);
/// assert_eq!(order.evict(), Some(b));
/// ```
#[derive(Debug, Default)]
pub struct LruOrder {
    list: KeyList,
}

impl LruOrder {
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

    /// Moves the key to the most-recent end.
    pub fn hit(&mut self, key: &CacheKey) -> bool {
        self.list.move_to_tail(key)
    }

    /// Removes and returns the least recently used key.
    pub fn evict(&mut self) -> Option<CacheKey> {
        self.list.pop_head()
    }

    /// Keys least-recent first.
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
