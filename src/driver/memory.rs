//! In-process memory driver.
//!
//! Entries live in per-policy hash tables; every mutation runs under that
//! policy's async mutex. Size admission charges each entry its serialized
//! length and keeps the sum of all six policies under `max_size`,
//! evicting from the target policy first and, when `evict_from_others` is
//! set, spilling across the remaining policies in declared order.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ MemoryDriver                                                        │
//! │                                                                     │
//! │   admission: Mutex<()>          bytes: [AtomicU64; 6]               │
//! │                                                                     │
//! │   shards[lru]  : Mutex ─► { policy, entries, weights, invalidation }│
//! │   shards[mru]  : Mutex ─► { … }                                     │
//! │   …                                                                 │
//! │                                                                     │
//! │   background: TTL event loop, snapshot writer (when recovery is on) │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The per-shard byte totals are mirrored into atomics so the admission
//! loop can re-read the global occupancy on every iteration — the
//! admission condition is "have we freed enough yet", not "have we freed
//! one entry" — without locking the other five shards.
//!
//! With recovery enabled, a background task encodes the entry tables and
//! policy orderings into the snapshot blob every `snapshot_interval` and
//! replaces the snapshot file atomically; `init` replays the blob,
//! dropping entries whose TTL has already elapsed and re-arming the rest.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex as SyncMutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::{MemoryDriverConfig, RecoverySettings};
use crate::driver::{
    EvictionCause, InvalidationIndex, PolicyUsage, ResourceUsage, link_invalidation,
    unlink_invalidation,
};
use crate::entry::{Entry, EntryPayload, now_ms};
use crate::error::{CacheError, Result};
use crate::ident::{CacheKey, Identifier};
use crate::metrics::{Counter, Labels, Telemetry};
use crate::policy::{DEFAULT_RNG_SEED, Policy, PolicyKind, TtlEvent};
use crate::snapshot::{self, SnapshotBlob};

const DRIVER: &str = "memory";
const POLICY_COUNT: usize = PolicyKind::ALL.len();

/// One policy's slice of the driver: ordering state plus entry table.
struct MemoryShard {
    policy: Policy,
    entries: FxHashMap<CacheKey, Entry>,
    /// Serialized length per entry, charged against the byte budget.
    weights: FxHashMap<CacheKey, u64>,
    invalidation: InvalidationIndex,
}

struct MemoryInner {
    config: MemoryDriverConfig,
    shards: [AsyncMutex<MemoryShard>; POLICY_COUNT],
    bytes: [AtomicU64; POLICY_COUNT],
    admission: AsyncMutex<()>,
    telemetry: Arc<dyn Telemetry>,
    events: SyncMutex<Option<UnboundedReceiver<TtlEvent>>>,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl MemoryInner {
    fn total_bytes(&self) -> u64 {
        self.bytes.iter().map(|b| b.load(Ordering::Relaxed)).sum()
    }

    /// Removes an already-untracked entry from the table, maintaining the
    /// byte accounting and the invalidation index. The caller has either
    /// evicted the key from the policy or is about to stop tracking it.
    fn remove_entry(
        &self,
        shard: &mut MemoryShard,
        kind: PolicyKind,
        key: &CacheKey,
        cause: EvictionCause,
    ) -> bool {
        let Some(entry) = shard.entries.remove(key) else {
            return false;
        };
        let weight = shard.weights.remove(key).unwrap_or(0);
        self.bytes[kind.index()].fetch_sub(weight, Ordering::Relaxed);
        unlink_invalidation(&mut shard.invalidation, &entry, key);

        let labels = Labels {
            driver: DRIVER,
            policy: kind,
            hash: key.as_str(),
        };
        self.telemetry.incr(Counter::Evictions, labels);
        self.telemetry.incr(cause.counter(), labels);
        debug!(
            driver = DRIVER,
            policy = %kind,
            hash = %key,
            cause = ?cause,
            bytes = weight,
            "entry evicted"
        );
        true
    }
}

/// In-process cache driver over the six replacement policies.
///
/// All operations are async; per-key ordering is provided by the policy
/// mutexes. The driver is cheap to share — background tasks keep their
/// own handle to the shared state.
///
/// # Example
///
/// ```ignore
/// let config = MemoryDriverConfig {
///     max_size: 64 * 1024 * 1024,
///     evict_from_others: true,
///     recovery: None,
///     rng_seed: None,
/// };
/// let driver = MemoryDriver::new(config, Arc::new(CounterRecorder::new()));
/// driver.init().await?;
///
/// driver.set(&id, PolicyKind::Lru, EntryPayload::new(body), false).await?;
/// let entry = driver.get(&id, PolicyKind::Lru).await?;
/// ```
pub struct MemoryDriver {
    inner: Arc<MemoryInner>,
}

impl MemoryDriver {
    pub fn new(config: MemoryDriverConfig, telemetry: Arc<dyn Telemetry>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let seed = config.rng_seed.unwrap_or(DEFAULT_RNG_SEED);

        let shards = std::array::from_fn(|slot| {
            let kind = PolicyKind::ALL[slot];
            AsyncMutex::new(MemoryShard {
                policy: Policy::new(kind, events_tx.clone(), seed.wrapping_add(slot as u64)),
                entries: FxHashMap::default(),
                weights: FxHashMap::default(),
                invalidation: InvalidationIndex::default(),
            })
        });

        Self {
            inner: Arc::new(MemoryInner {
                config,
                shards,
                bytes: std::array::from_fn(|_| AtomicU64::new(0)),
                admission: AsyncMutex::new(()),
                telemetry,
                events: SyncMutex::new(Some(events_rx)),
                tasks: SyncMutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        DRIVER
    }

    pub fn max_size(&self) -> u64 {
        self.inner.config.max_size
    }

    /// Replays the snapshot (when recovery is enabled) and starts the
    /// background tasks: the TTL event loop and the snapshot writer.
    pub async fn init(&self) -> Result<()> {
        if let Some(recovery) = self.inner.config.recovery.clone() {
            self.restore(&recovery).await;
        }

        let receiver = self.inner.events.lock().take();
        if let Some(receiver) = receiver {
            let handle = spawn_event_loop(Arc::clone(&self.inner), receiver);
            self.inner.tasks.lock().push(handle);
        }

        if let Some(recovery) = self.inner.config.recovery.clone() {
            let handle = spawn_snapshot_loop(Arc::clone(&self.inner), recovery);
            self.inner.tasks.lock().push(handle);
        }

        info!(driver = DRIVER, max_size = self.inner.config.max_size, "driver initialized");
        Ok(())
    }

    /// Aborts the background tasks. Entry state is left untouched.
    pub fn close(&self) {
        for handle in self.inner.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    /// Looks an entry up. A hit updates the policy ordering, bumps the
    /// entry's hit counter, and refreshes its access time; a miss records
    /// a miss and returns `None`.
    #[tracing::instrument(level = "debug", name = "cache_get", skip(self, identifier), fields(driver = DRIVER, policy = %policy))]
    pub async fn get(&self, identifier: &Identifier, policy: PolicyKind) -> Result<Option<Entry>> {
        let key = identifier.cache_key();
        let labels = Labels {
            driver: DRIVER,
            policy,
            hash: key.as_str(),
        };
        let mut shard = self.inner.shards[policy.index()].lock().await;
        self.inner.telemetry.incr(Counter::Lookups, labels);

        let Some(entry) = shard.entries.get_mut(&key) else {
            self.inner.telemetry.incr(Counter::Misses, labels);
            debug!(driver = DRIVER, policy = %policy, hash = %key, "cache miss");
            return Ok(None);
        };
        entry.touch(now_ms());
        let copied = entry.clone();
        shard.policy.hit(&key);

        self.inner.telemetry.incr(Counter::Hits, labels);
        trace!(driver = DRIVER, policy = %policy, hash = %key, hits = copied.hits, "cache hit");
        Ok(Some(copied))
    }

    /// Stores an entry under `policy`.
    ///
    /// Returns `Ok(false)` when the key already exists and `force` is not
    /// set. With `force`, the existing entry is dropped (resetting the
    /// policy's ordering state for the key) before the new one is built.
    /// Admission may evict other entries to make room; see the module
    /// docs for the spill order.
    #[tracing::instrument(level = "debug", name = "cache_set", skip(self, identifier, payload), fields(driver = DRIVER, policy = %policy, force))]
    pub async fn set(
        &self,
        identifier: &Identifier,
        policy: PolicyKind,
        payload: EntryPayload,
        force: bool,
    ) -> Result<bool> {
        let key = identifier.cache_key();
        let max_size = self.inner.config.max_size;

        let _admission = self.inner.admission.lock().await;
        let mut target = self.inner.shards[policy.index()].lock().await;

        if target.entries.contains_key(&key) {
            if !force {
                debug!(
                    driver = DRIVER,
                    policy = %policy,
                    hash = %key,
                    "key already cached; not overwriting without force"
                );
                return Ok(false);
            }
            target.policy.stop_tracking(&key);
            if let Some(previous) = target.entries.remove(&key) {
                let weight = target.weights.remove(&key).unwrap_or(0);
                self.inner.bytes[policy.index()].fetch_sub(weight, Ordering::Relaxed);
                unlink_invalidation(&mut target.invalidation, &previous, &key);
            }
        }

        let entry = Entry::new(identifier.clone(), payload);
        let weight = entry.encoded_len()?;
        if weight > max_size {
            return Err(CacheError::CacheTooBig {
                size: weight,
                max_size,
            });
        }

        // Admission: free space from the target policy first, re-reading
        // the global occupancy on every iteration.
        while self.inner.total_bytes() + weight > max_size {
            let Some(victim) = target.policy.evict() else {
                break;
            };
            self.inner
                .remove_entry(&mut target, policy, &victim, EvictionCause::SizeLimit);
        }

        if self.inner.total_bytes() + weight > max_size {
            if !self.inner.config.evict_from_others {
                return Err(CacheError::NoCachesToEvict { needed: weight });
            }
            for other_kind in PolicyKind::ALL {
                if other_kind == policy {
                    continue;
                }
                let mut other = self.inner.shards[other_kind.index()].lock().await;
                loop {
                    if self.inner.total_bytes() + weight <= max_size {
                        break;
                    }
                    let Some(victim) = other.policy.evict() else {
                        break;
                    };
                    self.inner
                        .remove_entry(&mut other, other_kind, &victim, EvictionCause::SizeLimit);
                }
                drop(other);
                if self.inner.total_bytes() + weight <= max_size {
                    break;
                }
            }
            if self.inner.total_bytes() + weight > max_size {
                return Err(CacheError::NoCachesToEvict { needed: weight });
            }
        }

        target.policy.track(&key);
        if entry.options.ttl > 0 {
            target.policy.register_ttl(&key, entry.options.ttl);
        }
        link_invalidation(&mut target.invalidation, &entry, &key);
        target.weights.insert(key.clone(), weight);
        self.inner.bytes[policy.index()].fetch_add(weight, Ordering::Relaxed);
        target.entries.insert(key.clone(), entry);

        self.inner.telemetry.incr(
            Counter::Created,
            Labels {
                driver: DRIVER,
                policy,
                hash: key.as_str(),
            },
        );
        debug!(driver = DRIVER, policy = %policy, hash = %key, bytes = weight, "entry stored");
        Ok(true)
    }

    /// Removes an entry. Absent keys are a [`CacheError::NotFound`].
    #[tracing::instrument(level = "debug", name = "cache_delete", skip(self, identifier), fields(driver = DRIVER, policy = %policy))]
    pub async fn delete(&self, identifier: &Identifier, policy: PolicyKind) -> Result<()> {
        let key = identifier.cache_key();
        let mut shard = self.inner.shards[policy.index()].lock().await;

        let Some(entry) = shard.entries.remove(&key) else {
            return Err(CacheError::NotFound { key });
        };
        shard.policy.stop_tracking(&key);
        let weight = shard.weights.remove(&key).unwrap_or(0);
        self.inner.bytes[policy.index()].fetch_sub(weight, Ordering::Relaxed);
        unlink_invalidation(&mut shard.invalidation, &entry, &key);

        self.inner.telemetry.incr(
            Counter::Deleted,
            Labels {
                driver: DRIVER,
                policy,
                hash: key.as_str(),
            },
        );
        debug!(driver = DRIVER, policy = %policy, hash = %key, "entry deleted");
        Ok(())
    }

    /// Bulk-expires every entry that declared one of `identifiers` in its
    /// `invalidated_by` list. Returns the number of entries removed.
    #[tracing::instrument(level = "debug", name = "cache_invalidate", skip(self, identifiers), fields(driver = DRIVER, policy = %policy, count = identifiers.len()))]
    pub async fn invalidate(
        &self,
        identifiers: &[Identifier],
        policy: PolicyKind,
    ) -> Result<u64> {
        let mut shard = self.inner.shards[policy.index()].lock().await;
        let mut removed = 0u64;

        for identifier in identifiers {
            let invalidation_key = identifier.invalidation_key();
            let Some(keys) = shard.invalidation.remove(&invalidation_key) else {
                debug!(
                    driver = DRIVER,
                    policy = %policy,
                    hash = %invalidation_key,
                    "invalidation key refers to nothing"
                );
                continue;
            };
            for key in keys {
                shard.policy.stop_tracking(&key);
                if self
                    .inner
                    .remove_entry(&mut shard, policy, &key, EvictionCause::Invalidation)
                {
                    removed += 1;
                }
            }
        }

        info!(driver = DRIVER, policy = %policy, removed, "invalidation completed");
        Ok(removed)
    }

    /// Per-policy byte and entry counts plus totals.
    pub async fn resource_usage(&self) -> ResourceUsage {
        let max_size = self.inner.config.max_size;
        let mut per_policy = std::collections::BTreeMap::new();
        let mut total_bytes = 0;
        let mut total_entries = 0;

        for kind in PolicyKind::ALL {
            let shard = self.inner.shards[kind.index()].lock().await;
            let bytes = self.inner.bytes[kind.index()].load(Ordering::Relaxed);
            let entries = shard.entries.len() as u64;
            total_bytes += bytes;
            total_entries += entries;
            per_policy.insert(
                kind,
                PolicyUsage {
                    bytes,
                    entries,
                    fraction: bytes as f64 / max_size as f64,
                },
            );
        }

        ResourceUsage {
            per_policy,
            total_bytes,
            total_entries,
        }
    }

    /// Writes a snapshot immediately. A no-op without recovery settings.
    pub async fn snapshot_now(&self) -> Result<()> {
        let Some(recovery) = &self.inner.config.recovery else {
            return Ok(());
        };
        let blob = collect_snapshot(&self.inner).await;
        snapshot::write_file(&recovery.snapshot_file_path, &blob)
    }

    /// Verifies that the entry table and the policy track exactly the
    /// same keys. Diagnostics only.
    pub async fn in_sync(&self, policy: PolicyKind) -> bool {
        let shard = self.inner.shards[policy.index()].lock().await;
        let tracked: FxHashSet<CacheKey> = shard.policy.tracked_keys().into_iter().collect();
        let stored: FxHashSet<CacheKey> = shard.entries.keys().cloned().collect();
        tracked == stored
    }

    async fn restore(&self, recovery: &RecoverySettings) {
        let mut blob = match snapshot::read_file(&recovery.snapshot_file_path) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!(driver = DRIVER, "no snapshot to replay");
                return;
            }
            Err(err) => {
                warn!(driver = DRIVER, error = %err, "snapshot unreadable; starting empty");
                return;
            }
        };

        let now = now_ms();
        for kind in PolicyKind::ALL {
            let Some(entries) = blob.caches.remove(&kind) else {
                continue;
            };
            let mut shard = self.inner.shards[kind.index()].lock().await;
            let mut pending_ttls: Vec<(CacheKey, u64)> = Vec::new();

            for (key, entry) in entries {
                if entry.expired_at(now) {
                    debug!(
                        driver = DRIVER,
                        policy = %kind,
                        hash = %key,
                        "dropping entry that expired while down"
                    );
                    continue;
                }
                let weight = match entry.encoded_len() {
                    Ok(weight) => weight,
                    Err(err) => {
                        warn!(driver = DRIVER, hash = %key, error = %err, "unsizeable entry skipped");
                        continue;
                    }
                };
                if let Some(remaining) = entry.remaining_ttl(now) {
                    pending_ttls.push((key.clone(), remaining));
                }
                link_invalidation(&mut shard.invalidation, &entry, &key);
                shard.weights.insert(key.clone(), weight);
                self.inner.bytes[kind.index()].fetch_add(weight, Ordering::Relaxed);
                shard.entries.insert(key, entry);
            }

            let valid: FxHashSet<CacheKey> = shard.entries.keys().cloned().collect();
            if let Some(policy_snapshot) = blob.policies.remove(&kind) {
                shard.policy.apply_snapshot(&valid, policy_snapshot);
            }

            // Anything the policy dump missed still has to be tracked.
            let untracked: Vec<CacheKey> = shard
                .entries
                .keys()
                .filter(|key| !shard.policy.contains(key))
                .cloned()
                .collect();
            for key in untracked {
                warn!(driver = DRIVER, policy = %kind, hash = %key, "re-tracking key missing from policy snapshot");
                shard.policy.track(&key);
            }

            for (key, remaining) in pending_ttls {
                shard.policy.register_ttl(&key, remaining);
            }

            info!(driver = DRIVER, policy = %kind, restored = shard.entries.len(), "snapshot replayed");
        }
    }
}

impl Drop for MemoryDriver {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("max_size", &self.inner.config.max_size)
            .field("bytes", &self.inner.total_bytes())
            .finish_non_exhaustive()
    }
}

async fn collect_snapshot(inner: &MemoryInner) -> SnapshotBlob {
    let mut blob = SnapshotBlob::default();
    for kind in PolicyKind::ALL {
        let shard = inner.shards[kind.index()].lock().await;
        let entries = shard
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        blob.caches.insert(kind, entries);
        blob.policies.insert(kind, shard.policy.snapshot());
    }
    blob
}

/// Converts TTL expiries into `stop_tracking` plus entry removal. Firings
/// whose generation no longer matches the live registration are ignored.
fn spawn_event_loop(
    inner: Arc<MemoryInner>,
    mut events: UnboundedReceiver<TtlEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TtlEvent::Expired {
                    policy,
                    key,
                    generation,
                } => {
                    let mut shard = inner.shards[policy.index()].lock().await;
                    if !shard.policy.ttl_fired(&key, generation) {
                        trace!(driver = DRIVER, policy = %policy, hash = %key, "stale ttl firing ignored");
                        continue;
                    }
                    shard.policy.stop_tracking(&key);
                    inner.remove_entry(&mut shard, policy, &key, EvictionCause::Ttl);
                }
                TtlEvent::Cleared { policy, key } => {
                    trace!(driver = DRIVER, policy = %policy, hash = %key, "ttl cleared");
                }
            }
        }
    })
}

fn spawn_snapshot_loop(inner: Arc<MemoryInner>, recovery: RecoverySettings) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(recovery.snapshot_interval).await;
            let blob = collect_snapshot(&inner).await;
            match snapshot::write_file(&recovery.snapshot_file_path, &blob) {
                Ok(()) => {
                    trace!(driver = DRIVER, "snapshot written");
                }
                Err(err) => {
                    warn!(driver = DRIVER, error = %err, "snapshot write failed; retrying next interval");
                }
            }
        }
    })
}
