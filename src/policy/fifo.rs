//! FIFO (First In, First Out) ordering.
//!
//! A queue of keys in insertion order plus a membership set. Hits are
//! deliberately a no-op — access never changes a FIFO key's fate — so the
//! victim is always the oldest surviving insertion.
//!
//! ```text
//!   queue: [oldest] [ ... ] [newest]      members: {…}
//!            ▲                  ▲
//!        evict()             track(k)
//! ```
//!
//! Unlike a pure ring buffer, keys can leave the middle of the queue
//! (`stop_tracking`, invalidation), so removal compacts the queue rather
//! than leaving holes.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::ident::CacheKey;

/// FIFO ordering over cache keys.
///
/// # Example
///
/// ```
/// use stashkit::ident::CacheKey;
/// use stashkit::policy::FifoOrder;
///
/// let (a, b) = (CacheKey::from_digest("a"), CacheKey::from_digest("b"));
///
/// let mut order = FifoOrder::new();
/// order.track(&a);
/// order.track(&b);
///
/// // Access does not protect a FIFO key.
/// order.hit(&a);
/// assert_eq!(order.evict(), Some(a));
/// ```
#[derive(Debug, Default)]
pub struct FifoOrder {
    queue: VecDeque<CacheKey>,
    members: FxHashSet<CacheKey>,
}

impl FifoOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.members.contains(key)
    }

    /// Appends a new key. Returns `false` if the key is already tracked.
    pub fn track(&mut self, key: &CacheKey) -> bool {
        if !self.members.insert(key.clone()) {
            return false;
        }
        self.queue.push_back(key.clone());
        true
    }

    /// Removes a key from anywhere in the queue.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        if !self.members.remove(key) {
            return false;
        }
        if let Some(position) = self.queue.iter().position(|k| k == key) {
            self.queue.remove(position);
        }
        true
    }

    /// Accesses never reorder a FIFO queue; this only reports membership.
    pub fn hit(&mut self, key: &CacheKey) -> bool {
        self.members.contains(key)
    }

    /// Removes and returns the oldest inserted key.
    pub fn evict(&mut self) -> Option<CacheKey> {
        let victim = self.queue.pop_front()?;
        self.members.remove(&victim);
        Some(victim)
    }

    /// Keys oldest-insert first.
    pub fn key_order(&self) -> Vec<CacheKey> {
        self.queue.iter().cloned().collect()
    }

    /// Rebuilds the queue from an oldest-first key sequence.
    pub fn restore<I: IntoIterator<Item = CacheKey>>(&mut self, keys: I) {
        self.queue.clear();
        self.members.clear();
        for key in keys {
            if self.members.insert(key.clone()) {
                self.queue.push_back(key);
            }
        }
    }
}
