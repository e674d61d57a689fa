//! RR (Random Replacement) ordering.
//!
//! Victims are chosen uniformly at random. A dense key vector plus an
//! index map give O(1) selection and removal via swap-remove:
//!
//! ```text
//!   keys:  [A] [B] [C] [D]       index: A→0  B→1  C→2  D→3
//!
//!   evict():
//!     1. i = rng() % len
//!     2. swap keys[i] with the last slot, pop it
//!     3. re-index the key that moved into slot i
//! ```
//!
//! Randomness comes from an embedded XorShift64 PRNG seeded from driver
//! configuration, so test runs can be reproduced exactly. RR keeps no
//! ordering, only the tracked set; hits are a no-op.

use rustc_hash::FxHashMap;

use crate::ident::CacheKey;
use crate::policy::DEFAULT_RNG_SEED;

/// Random-replacement ordering over cache keys.
///
/// # Example
///
/// ```
/// use stashkit::ident::CacheKey;
/// use stashkit::policy::RrOrder;
///
/// let mut order = RrOrder::new(7);
/// for name in ["a", "b", "c"] {
///     order.track(&CacheKey::from_digest(name));
/// }
///
/// let victim = order.evict().unwrap();
/// assert_eq!(order.len(), 2);
/// assert!(!order.contains(&victim));
/// ```
#[derive(Debug)]
pub struct RrOrder {
    /// Dense array of keys for O(1) random access.
    keys: Vec<CacheKey>,
    /// Key → slot in `keys`.
    index: FxHashMap<CacheKey, usize>,
    /// XorShift64 state; never zero.
    rng_state: u64,
}

impl RrOrder {
    /// Creates an empty order seeded with `seed` (zero falls back to the
    /// default seed, XorShift cannot run from an all-zero state).
    pub fn new(seed: u64) -> Self {
        Self {
            keys: Vec::new(),
            index: FxHashMap::default(),
            rng_state: if seed == 0 { DEFAULT_RNG_SEED } else { seed },
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.contains_key(key)
    }

    /// Adds a key to the set. Returns `false` if it is already tracked.
    pub fn track(&mut self, key: &CacheKey) -> bool {
        if self.index.contains_key(key) {
            return false;
        }
        self.index.insert(key.clone(), self.keys.len());
        self.keys.push(key.clone());
        true
    }

    /// Removes a key by swap-remove. Returns `false` if it is not tracked.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        let Some(slot) = self.index.remove(key) else {
            return false;
        };
        self.keys.swap_remove(slot);
        if slot < self.keys.len() {
            self.index.insert(self.keys[slot].clone(), slot);
        }
        true
    }

    /// Random replacement ignores access patterns; this only reports
    /// membership.
    pub fn hit(&mut self, key: &CacheKey) -> bool {
        self.index.contains_key(key)
    }

    /// Removes and returns a uniformly random key.
    pub fn evict(&mut self) -> Option<CacheKey> {
        if self.keys.is_empty() {
            return None;
        }
        let slot = (self.next_u64() % self.keys.len() as u64) as usize;
        let victim = self.keys.swap_remove(slot);
        self.index.remove(&victim);
        if slot < self.keys.len() {
            self.index.insert(self.keys[slot].clone(), slot);
        }
        Some(victim)
    }

    /// The tracked keys, in internal slot order.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.keys.clone()
    }

    /// Rebuilds the set. The PRNG state is left as-is; randomness does not
    /// survive a snapshot, only membership does.
    pub fn restore<I: IntoIterator<Item = CacheKey>>(&mut self, keys: I) {
        self.keys.clear();
        self.index.clear();
        for key in keys {
            if !self.index.contains_key(&key) {
                self.index.insert(key.clone(), self.keys.len());
                self.keys.push(key);
            }
        }
    }

    /// XorShift64 step.
    fn next_u64(&mut self) -> u64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        x
    }
}
