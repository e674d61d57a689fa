//! Per-policy TTL timers.
//!
//! Each policy owns one [`TtlTable`]: a map from cache key to an armed
//! one-shot timer. Arming spawns a tokio sleep task that, on elapse, posts
//! a [`TtlEvent::Expired`] message over the driver's event channel; the
//! driver turns that into `stop_tracking` plus entry removal. There is no
//! process-wide timer registry or event bus — the channel is the only
//! coupling between a policy's timers and its driver.
//!
//! ```text
//!   register(key, ttl) ──► spawn sleep(ttl) ──► Expired { key, generation }
//!            │                                        │
//!            └── cancels any prior timer              ▼
//!                (abort + Cleared event)      driver validates the
//!                                             generation, then removes
//! ```
//!
//! ## Generations
//!
//! Aborting a sleep task cannot un-send a message that is already in
//! flight, so every registration is stamped with a generation. The driver
//! calls [`TtlTable::fired`] before acting; a message whose generation no
//! longer matches the live registration (the key was re-registered,
//! cleared, or evicted meanwhile) is rejected and the firing becomes a
//! no-op.
//!
//! At most one timer is outstanding per key: re-registration cancels the
//! prior timer first. Cancellation is idempotent.

use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::entry::now_ms;
use crate::ident::CacheKey;
use crate::policy::PolicyKind;

/// Message posted by a policy's TTL timers.
#[derive(Debug)]
pub enum TtlEvent {
    /// A registered TTL elapsed. Valid only while `generation` still
    /// matches the live registration for `key`.
    Expired {
        policy: PolicyKind,
        key: CacheKey,
        generation: u64,
    },
    /// A timer was cancelled before it fired.
    Cleared { policy: PolicyKind, key: CacheKey },
}

/// One armed timer.
struct TtlTimer {
    generation: u64,
    /// Absolute expiration, unix milliseconds.
    deadline_ms: u64,
    handle: JoinHandle<()>,
}

/// Map of cache key → armed one-shot timer for a single policy.
pub struct TtlTable {
    policy: PolicyKind,
    events: UnboundedSender<TtlEvent>,
    timers: FxHashMap<CacheKey, TtlTimer>,
    next_generation: u64,
}

impl TtlTable {
    pub fn new(policy: PolicyKind, events: UnboundedSender<TtlEvent>) -> Self {
        Self {
            policy,
            events,
            timers: FxHashMap::default(),
            next_generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.timers.contains_key(key)
    }

    /// Arms a timer for `key`, cancelling any prior registration.
    ///
    /// Must run inside a tokio runtime (the sleep task is spawned here).
    pub fn register(&mut self, key: &CacheKey, ttl_ms: u64) {
        self.cancel(key);

        self.next_generation += 1;
        let generation = self.next_generation;

        let events = self.events.clone();
        let policy = self.policy;
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ttl_ms)).await;
            let _ = events.send(TtlEvent::Expired {
                policy,
                key: timer_key,
                generation,
            });
        });

        self.timers.insert(
            key.clone(),
            TtlTimer {
                generation,
                deadline_ms: now_ms().saturating_add(ttl_ms),
                handle,
            },
        );
    }

    /// Cancels the timer for `key`, if any. Idempotent.
    pub fn clear(&mut self, key: &CacheKey) -> bool {
        self.cancel(key)
    }

    /// Validates a firing against the live registration and, when valid,
    /// retires it without emitting a cleared event.
    ///
    /// Returns `false` for stale generations and unknown keys; the caller
    /// must then treat the firing as a no-op.
    pub fn fired(&mut self, key: &CacheKey, generation: u64) -> bool {
        match self.timers.get(key) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Absolute expiration per key, unix milliseconds.
    pub fn deadlines(&self) -> Vec<(CacheKey, u64)> {
        self.timers
            .iter()
            .map(|(key, timer)| (key.clone(), timer.deadline_ms))
            .collect()
    }

    fn cancel(&mut self, key: &CacheKey) -> bool {
        let Some(timer) = self.timers.remove(key) else {
            return false;
        };
        if !timer.handle.is_finished() {
            timer.handle.abort();
            let _ = self.events.send(TtlEvent::Cleared {
                policy: self.policy,
                key: key.clone(),
            });
        }
        true
    }
}

impl Drop for TtlTable {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}

impl std::fmt::Debug for TtlTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlTable")
            .field("policy", &self.policy)
            .field("armed", &self.timers.len())
            .finish()
    }
}
