//! Replacement policies: six variants behind one interface.
//!
//! A [`Policy`] tracks the set of cache keys stored under it for one driver
//! and decides, on demand, which key to evict next. The six variants are a
//! closed set, so dispatch is a tagged enum rather than a trait object:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Policy                                     │
//! │  kind: PolicyKind     ordering: <variant>     ttl: TtlTable       │
//! │                                                                   │
//! │  track(key)          start tracking, newest position              │
//! │  stop_tracking(key)  remove from ordering, cancel TTL             │
//! │  hit(key)            record an access (variant-specific effect)   │
//! │  evict() → key?      remove and return the next victim            │
//! │  snapshot()          serialized ordering for recovery             │
//! │  apply_snapshot(…)   rebuild ordering from a snapshot             │
//! └───────────────────────────────────────────────────────────────────┘
//!
//!   variant   ordering structure         hit effect        evict victim
//!   ───────   ────────────────────────   ───────────────   ─────────────────
//!   LRU       linked key list + map      move to tail      head (least recent)
//!   MRU       linked key list + map      move to tail      tail (most recent)
//!   LFU       count map + count buckets  count += 1        first at lowest count
//!   MFU       count map + count buckets  count += 1        last at highest count
//!   FIFO      queue + membership set     none              front (oldest insert)
//!   RR        dense vec + seeded PRNG    none              uniformly random
//! ```
//!
//! Every operation is total: redundant `track`, unknown `stop_tracking`,
//! and `evict` on an empty policy log and return instead of panicking.
//! The policies are not thread-safe on their own; the owning driver holds
//! one mutex per policy and performs every call under it.
//!
//! TTL timers belong to the policy (see [`ttl`]); expiry posts a message
//! the driver converts into `stop_tracking` plus entry removal.

pub mod fifo;
pub mod lfu;
pub mod lru;
pub mod mfu;
pub mod mru;
pub mod rr;
pub mod ttl;

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::ident::CacheKey;

pub use fifo::FifoOrder;
pub use lfu::LfuOrder;
pub use lru::LruOrder;
pub use mfu::MfuOrder;
pub use mru::MruOrder;
pub use rr::RrOrder;
pub use ttl::{TtlEvent, TtlTable};

/// Default PRNG seed for the RR policy when configuration supplies none.
pub const DEFAULT_RNG_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// The six replacement policies.
///
/// `ALL` is the declared order; overflow eviction spills across policies
/// in this order when `evict_from_others` is enabled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum PolicyKind {
    Lru,
    Mru,
    Lfu,
    Mfu,
    Fifo,
    Rr,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 6] = [
        PolicyKind::Lru,
        PolicyKind::Mru,
        PolicyKind::Lfu,
        PolicyKind::Mfu,
        PolicyKind::Fifo,
        PolicyKind::Rr,
    ];

    /// Lowercase name, also the disk driver's subdirectory name.
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Lru => "lru",
            PolicyKind::Mru => "mru",
            PolicyKind::Lfu => "lfu",
            PolicyKind::Mfu => "mfu",
            PolicyKind::Fifo => "fifo",
            PolicyKind::Rr => "rr",
        }
    }

    /// Position in the declared order.
    pub fn index(self) -> usize {
        match self {
            PolicyKind::Lru => 0,
            PolicyKind::Mru => 1,
            PolicyKind::Lfu => 2,
            PolicyKind::Mfu => 3,
            PolicyKind::Fifo => 4,
            PolicyKind::Rr => 5,
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized ordering state of one policy.
///
/// LRU/MRU/LFU/MFU/FIFO expose their full key order so a restored policy
/// reproduces the same eviction sequence; RR has no order, only the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolicySnapshot {
    /// Keys oldest-access first.
    Lru { key_order: Vec<CacheKey> },
    /// Keys oldest-access first.
    Mru { key_order: Vec<CacheKey> },
    /// Keys with hit counts, ascending count, insertion order within.
    Lfu { key_order: Vec<(CacheKey, u64)> },
    /// Keys with hit counts, ascending count, insertion order within.
    Mfu { key_order: Vec<(CacheKey, u64)> },
    /// Keys oldest-insert first.
    Fifo { key_order: Vec<CacheKey> },
    /// The tracked set.
    Rr { keys: BTreeSet<CacheKey> },
}

impl PolicySnapshot {
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicySnapshot::Lru { .. } => PolicyKind::Lru,
            PolicySnapshot::Mru { .. } => PolicyKind::Mru,
            PolicySnapshot::Lfu { .. } => PolicyKind::Lfu,
            PolicySnapshot::Mfu { .. } => PolicyKind::Mfu,
            PolicySnapshot::Fifo { .. } => PolicyKind::Fifo,
            PolicySnapshot::Rr { .. } => PolicyKind::Rr,
        }
    }
}

/// Variant-specific ordering structure.
enum Ordering {
    Lru(LruOrder),
    Mru(MruOrder),
    Lfu(LfuOrder),
    Mfu(MfuOrder),
    Fifo(FifoOrder),
    Rr(RrOrder),
}

/// One replacement policy instance: ordering structure plus TTL table.
pub struct Policy {
    kind: PolicyKind,
    ordering: Ordering,
    ttl: TtlTable,
}

impl Policy {
    /// Creates an empty policy of the given kind.
    ///
    /// `events` receives the TTL expiry/cancellation messages; `rng_seed`
    /// seeds the RR variant's PRNG and is ignored by the others.
    pub fn new(kind: PolicyKind, events: UnboundedSender<TtlEvent>, rng_seed: u64) -> Self {
        let ordering = match kind {
            PolicyKind::Lru => Ordering::Lru(LruOrder::new()),
            PolicyKind::Mru => Ordering::Mru(MruOrder::new()),
            PolicyKind::Lfu => Ordering::Lfu(LfuOrder::new()),
            PolicyKind::Mfu => Ordering::Mfu(MfuOrder::new()),
            PolicyKind::Fifo => Ordering::Fifo(FifoOrder::new()),
            PolicyKind::Rr => Ordering::Rr(RrOrder::new(rng_seed)),
        };
        Self {
            kind,
            ordering,
            ttl: TtlTable::new(kind, events),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        match &self.ordering {
            Ordering::Lru(o) => o.len(),
            Ordering::Mru(o) => o.len(),
            Ordering::Lfu(o) => o.len(),
            Ordering::Mfu(o) => o.len(),
            Ordering::Fifo(o) => o.len(),
            Ordering::Rr(o) => o.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        match &self.ordering {
            Ordering::Lru(o) => o.contains(key),
            Ordering::Mru(o) => o.contains(key),
            Ordering::Lfu(o) => o.contains(key),
            Ordering::Mfu(o) => o.contains(key),
            Ordering::Fifo(o) => o.contains(key),
            Ordering::Rr(o) => o.contains(key),
        }
    }

    /// Every tracked key, in no particular order.
    pub fn tracked_keys(&self) -> Vec<CacheKey> {
        match &self.ordering {
            Ordering::Lru(o) => o.key_order(),
            Ordering::Mru(o) => o.key_order(),
            Ordering::Lfu(o) => o.key_order().into_iter().map(|(k, _)| k).collect(),
            Ordering::Mfu(o) => o.key_order().into_iter().map(|(k, _)| k).collect(),
            Ordering::Fifo(o) => o.key_order(),
            Ordering::Rr(o) => o.keys(),
        }
    }

    /// Starts tracking a new key at the newest position. Tracking an
    /// already-tracked key is a logged no-op.
    pub fn track(&mut self, key: &CacheKey) {
        let tracked = match &mut self.ordering {
            Ordering::Lru(o) => o.track(key),
            Ordering::Mru(o) => o.track(key),
            Ordering::Lfu(o) => o.track(key),
            Ordering::Mfu(o) => o.track(key),
            Ordering::Fifo(o) => o.track(key),
            Ordering::Rr(o) => o.track(key),
        };
        if !tracked {
            warn!(policy = %self.kind, hash = %key, "key is already tracked");
        }
    }

    /// Removes a key from the ordering and cancels any TTL. Unknown keys
    /// are a logged no-op.
    pub fn stop_tracking(&mut self, key: &CacheKey) {
        let removed = match &mut self.ordering {
            Ordering::Lru(o) => o.remove(key),
            Ordering::Mru(o) => o.remove(key),
            Ordering::Lfu(o) => o.remove(key),
            Ordering::Mfu(o) => o.remove(key),
            Ordering::Fifo(o) => o.remove(key),
            Ordering::Rr(o) => o.remove(key),
        };
        self.ttl.clear(key);
        if !removed {
            debug!(policy = %self.kind, hash = %key, "stop_tracking for an untracked key");
        }
    }

    /// Records an access. Unknown keys are a logged no-op.
    pub fn hit(&mut self, key: &CacheKey) {
        let found = match &mut self.ordering {
            Ordering::Lru(o) => o.hit(key),
            Ordering::Mru(o) => o.hit(key),
            Ordering::Lfu(o) => o.hit(key),
            Ordering::Mfu(o) => o.hit(key),
            Ordering::Fifo(o) => o.hit(key),
            Ordering::Rr(o) => o.hit(key),
        };
        if !found {
            debug!(policy = %self.kind, hash = %key, "hit for an untracked key");
        }
    }

    /// Chooses and removes the next victim, cancelling its TTL.
    ///
    /// Returns `None` when the policy tracks nothing.
    pub fn evict(&mut self) -> Option<CacheKey> {
        let victim = match &mut self.ordering {
            Ordering::Lru(o) => o.evict(),
            Ordering::Mru(o) => o.evict(),
            Ordering::Lfu(o) => o.evict(),
            Ordering::Mfu(o) => o.evict(),
            Ordering::Fifo(o) => o.evict(),
            Ordering::Rr(o) => o.evict(),
        };
        match victim {
            Some(key) => {
                self.ttl.clear(&key);
                Some(key)
            }
            None => {
                debug!(policy = %self.kind, "evict on an empty policy");
                None
            }
        }
    }

    /// Arms (or re-arms) a TTL timer for a tracked key.
    pub fn register_ttl(&mut self, key: &CacheKey, ttl_ms: u64) {
        self.ttl.register(key, ttl_ms);
    }

    /// Cancels a TTL timer. Idempotent.
    pub fn clear_ttl(&mut self, key: &CacheKey) {
        self.ttl.clear(key);
    }

    /// Validates an expiry firing; see [`TtlTable::fired`].
    pub fn ttl_fired(&mut self, key: &CacheKey, generation: u64) -> bool {
        self.ttl.fired(key, generation)
    }

    /// Absolute TTL deadlines per key, unix milliseconds.
    pub fn ttl_deadlines(&self) -> Vec<(CacheKey, u64)> {
        self.ttl.deadlines()
    }

    /// Dumps the ordering state for persistence.
    pub fn snapshot(&self) -> PolicySnapshot {
        match &self.ordering {
            Ordering::Lru(o) => PolicySnapshot::Lru {
                key_order: o.key_order(),
            },
            Ordering::Mru(o) => PolicySnapshot::Mru {
                key_order: o.key_order(),
            },
            Ordering::Lfu(o) => PolicySnapshot::Lfu {
                key_order: o.key_order(),
            },
            Ordering::Mfu(o) => PolicySnapshot::Mfu {
                key_order: o.key_order(),
            },
            Ordering::Fifo(o) => PolicySnapshot::Fifo {
                key_order: o.key_order(),
            },
            Ordering::Rr(o) => PolicySnapshot::Rr {
                keys: o.keys().into_iter().collect(),
            },
        }
    }

    /// Rebuilds the ordering from a snapshot, discarding any key that is
    /// not in `valid`. A snapshot of the wrong variant is a logged no-op.
    pub fn apply_snapshot(&mut self, valid: &FxHashSet<CacheKey>, snapshot: PolicySnapshot) {
        if snapshot.kind() != self.kind {
            warn!(
                policy = %self.kind,
                snapshot = %snapshot.kind(),
                "ignoring snapshot for a different policy"
            );
            return;
        }
        match (&mut self.ordering, snapshot) {
            (Ordering::Lru(o), PolicySnapshot::Lru { key_order }) => {
                o.restore(key_order.into_iter().filter(|k| valid.contains(k)));
            }
            (Ordering::Mru(o), PolicySnapshot::Mru { key_order }) => {
                o.restore(key_order.into_iter().filter(|k| valid.contains(k)));
            }
            (Ordering::Lfu(o), PolicySnapshot::Lfu { key_order }) => {
                o.restore(key_order.into_iter().filter(|(k, _)| valid.contains(k)));
            }
            (Ordering::Mfu(o), PolicySnapshot::Mfu { key_order }) => {
                o.restore(key_order.into_iter().filter(|(k, _)| valid.contains(k)));
            }
            (Ordering::Fifo(o), PolicySnapshot::Fifo { key_order }) => {
                o.restore(key_order.into_iter().filter(|k| valid.contains(k)));
            }
            (Ordering::Rr(o), PolicySnapshot::Rr { keys }) => {
                o.restore(keys.into_iter().filter(|k| valid.contains(k)));
            }
            _ => unreachable!("snapshot kind was checked above"),
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("kind", &self.kind)
            .field("tracked", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
