//! On-disk driver.
//!
//! Entries are persisted one file each under the mount path, grouped into
//! one subdirectory per policy:
//!
//! ```text
//!   <mountPath>/
//!     lru/
//!       c.<digest>.dat                  one serialized entry per file
//!       invalidation-identifiers.dat    Map<invalidation key, Set<cache key>>
//!       ttl.dat                         Map<cache key, absolute expiration ms>
//!     mru/ … lfu/ … mfu/ … fifo/ … rr/
//! ```
//!
//! The files *are* the entry table: a restart rebuilds the tracked-key
//! sets by scanning the directories, replays `ttl.dat` (deleting entries
//! whose absolute expiration has already passed, re-arming the rest as
//! relative timers), and prunes the invalidation index against what
//! actually survived on disk.
//!
//! Every read or write of a cache file takes a filesystem-level exclusive
//! lock on that file, and the two index files are locked the same way; an
//! RAII guard releases the lock on all exit paths. Size admission works
//! exactly like the memory driver's — serialized entry length charged
//! against `max_size`, spilling across policies in declared order when
//! `evict_from_others` is set — with the per-shard byte totals mirrored in
//! atomics for the per-iteration occupancy re-read.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex as SyncMutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::DiskDriverConfig;
use crate::driver::{
    EvictionCause, InvalidationIndex, PolicyUsage, ResourceUsage, link_invalidation,
    unlink_invalidation,
};
use crate::entry::{Entry, EntryPayload, now_ms};
use crate::error::{CacheError, Result};
use crate::ident::{CacheKey, Identifier, InvalidationKey};
use crate::metrics::{Counter, Labels, Telemetry};
use crate::policy::{DEFAULT_RNG_SEED, Policy, PolicyKind, TtlEvent};

const DRIVER: &str = "fileSystem";
const POLICY_COUNT: usize = PolicyKind::ALL.len();
const INVALIDATION_FILE: &str = "invalidation-identifiers.dat";
const TTL_FILE: &str = "ttl.dat";

// ---------------------------------------------------------------------------
// Locked file access
// ---------------------------------------------------------------------------

/// A file held under an exclusive lock; the lock is released when the
/// guard drops, on every exit path.
struct LockedFile {
    file: File,
}

impl LockedFile {
    /// Opens an existing file for reading under an exclusive lock.
    /// Returns `None` when the file does not exist.
    fn open_read(path: &Path) -> io::Result<Option<LockedFile>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        file.lock()?;
        Ok(Some(LockedFile { file }))
    }

    /// Opens (creating if needed) a file for writing under an exclusive
    /// lock.
    fn open_write(path: &Path) -> io::Result<LockedFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock()?;
        Ok(LockedFile { file })
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Replaces the file contents.
    fn replace(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(bytes)?;
        self.file.flush()
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn read_locked(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match LockedFile::open_read(path)? {
        Some(mut locked) => Ok(Some(locked.read_all()?)),
        None => Ok(None),
    }
}

fn write_locked(path: &Path, bytes: &[u8]) -> io::Result<()> {
    LockedFile::open_write(path)?.replace(bytes)
}

fn codec_error(err: bincode::Error) -> CacheError {
    CacheError::Io(io::Error::other(err))
}

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

/// One policy's slice of the driver: ordering state, per-entry weights,
/// and the invalidation index mirrored to `invalidation-identifiers.dat`.
struct DiskShard {
    policy: Policy,
    dir: PathBuf,
    /// Serialized length per entry, charged against the byte budget.
    weights: FxHashMap<CacheKey, u64>,
    invalidation: InvalidationIndex,
}

impl DiskShard {
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.dat"))
    }

    fn invalidation_path(&self) -> PathBuf {
        self.dir.join(INVALIDATION_FILE)
    }

    fn ttl_path(&self) -> PathBuf {
        self.dir.join(TTL_FILE)
    }

    fn read_entry(&self, key: &CacheKey) -> Result<Option<Entry>> {
        let Some(bytes) = read_locked(&self.entry_path(key))? else {
            return Ok(None);
        };
        bincode::deserialize(&bytes).map(Some).map_err(codec_error)
    }

    /// Serializes and writes the entry, returning its encoded length.
    fn write_entry(&self, key: &CacheKey, entry: &Entry) -> Result<u64> {
        let bytes = bincode::serialize(entry).map_err(codec_error)?;
        write_locked(&self.entry_path(key), &bytes)?;
        Ok(bytes.len() as u64)
    }

    fn delete_entry_file(&self, key: &CacheKey) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Rewrites `invalidation-identifiers.dat` from the in-memory index.
    fn persist_invalidation(&self) -> Result<()> {
        let map: BTreeMap<&str, BTreeSet<&str>> = self
            .invalidation
            .iter()
            .map(|(invalidation_key, keys)| {
                (
                    invalidation_key.as_str(),
                    keys.iter().map(CacheKey::as_str).collect(),
                )
            })
            .collect();
        let bytes = bincode::serialize(&map).map_err(codec_error)?;
        write_locked(&self.invalidation_path(), &bytes)?;
        Ok(())
    }

    /// Rewrites `ttl.dat` from the policy's armed timers.
    fn persist_ttl(&self) -> Result<()> {
        let map: BTreeMap<String, u64> = self
            .policy
            .ttl_deadlines()
            .into_iter()
            .map(|(key, deadline)| (key.as_str().to_owned(), deadline))
            .collect();
        let bytes = bincode::serialize(&map).map_err(codec_error)?;
        write_locked(&self.ttl_path(), &bytes)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct DiskInner {
    config: DiskDriverConfig,
    shards: [AsyncMutex<DiskShard>; POLICY_COUNT],
    bytes: [AtomicU64; POLICY_COUNT],
    admission: AsyncMutex<()>,
    telemetry: Arc<dyn Telemetry>,
    events: SyncMutex<Option<UnboundedReceiver<TtlEvent>>>,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl DiskInner {
    fn total_bytes(&self) -> u64 {
        self.bytes.iter().map(|b| b.load(Ordering::Relaxed)).sum()
    }

    /// Removes an already-untracked entry: deletes its file, settles the
    /// byte accounting, and unlinks it from the invalidation index.
    fn remove_stored(
        &self,
        shard: &mut DiskShard,
        kind: PolicyKind,
        key: &CacheKey,
        cause: EvictionCause,
    ) -> Result<bool> {
        let entry = shard.read_entry(key)?;
        let Some(weight) = shard.weights.remove(key) else {
            return Ok(false);
        };
        shard.delete_entry_file(key)?;
        self.bytes[kind.index()].fetch_sub(weight, Ordering::Relaxed);
        if let Some(entry) = entry {
            unlink_invalidation(&mut shard.invalidation, &entry, key);
        }

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
        Ok(true)
    }
}

/// On-disk cache driver over the six replacement policies.
///
/// Construction only records the configuration; [`DiskDriver::init`]
/// creates the directory layout, replays the on-disk state, and starts
/// the TTL event loop.
pub struct DiskDriver {
    inner: Arc<DiskInner>,
}

impl DiskDriver {
    pub fn new(config: DiskDriverConfig, telemetry: Arc<dyn Telemetry>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let seed = config.rng_seed.unwrap_or(DEFAULT_RNG_SEED);
        let mount = config.mount_path.clone();

        let shards = std::array::from_fn(|slot| {
            let kind = PolicyKind::ALL[slot];
            AsyncMutex::new(DiskShard {
                policy: Policy::new(kind, events_tx.clone(), seed.wrapping_add(slot as u64)),
                dir: mount.join(kind.as_str()),
                weights: FxHashMap::default(),
                invalidation: InvalidationIndex::default(),
            })
        });

        Self {
            inner: Arc::new(DiskInner {
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

    pub fn mount_path(&self) -> &Path {
        &self.inner.config.mount_path
    }

    /// Creates the directory layout, replays `ttl.dat` (deleting entries
    /// that expired while the process was down, re-arming the rest as
    /// relative timers), rebuilds the tracked-key sets by scanning the
    /// policy directories, prunes the invalidation index, and starts the
    /// TTL event loop.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.inner.config.mount_path)?;
        let now = now_ms();

        for kind in PolicyKind::ALL {
            let mut shard = self.inner.shards[kind.index()].lock().await;
            fs::create_dir_all(&shard.dir)?;
            for index_path in [shard.invalidation_path(), shard.ttl_path()] {
                if !index_path.exists() {
                    write_locked(&index_path, &[])?;
                }
            }

            // Absolute expirations; entries already past theirs are gone.
            let ttl_bytes = read_locked(&shard.ttl_path())?.unwrap_or_default();
            let mut ttl_map: BTreeMap<String, u64> = if ttl_bytes.is_empty() {
                BTreeMap::new()
            } else {
                bincode::deserialize(&ttl_bytes).map_err(codec_error)?
            };
            let shard_dir = shard.dir.clone();
            let mut expired = 0u64;
            ttl_map.retain(|raw_key, deadline| {
                if *deadline <= now {
                    let _ = fs::remove_file(shard_dir.join(format!("{raw_key}.dat")));
                    expired += 1;
                    false
                } else {
                    true
                }
            });
            if expired > 0 {
                info!(driver = DRIVER, policy = %kind, expired, "dropped entries that expired while down");
            }

            // The surviving files are the entry table.
            for dir_entry in fs::read_dir(&shard.dir)? {
                let dir_entry = dir_entry?;
                if !dir_entry.file_type()?.is_file() {
                    continue;
                }
                let name = dir_entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Some(stem) = name.strip_suffix(".dat") else {
                    continue;
                };
                if !stem.starts_with("c.") {
                    continue;
                }
                let key = CacheKey::from_raw(stem);
                let weight = dir_entry.metadata()?.len();
                shard.policy.track(&key);
                shard.weights.insert(key, weight);
                self.inner.bytes[kind.index()].fetch_add(weight, Ordering::Relaxed);
            }

            // Remaining TTLs re-arm relative to now.
            for (raw_key, deadline) in &ttl_map {
                let key = CacheKey::from_raw(raw_key.clone());
                if shard.policy.contains(&key) {
                    shard.policy.register_ttl(&key, *deadline - now);
                }
            }

            // Invalidation index, pruned to the keys that survived.
            let invalidation_bytes =
                read_locked(&shard.invalidation_path())?.unwrap_or_default();
            if !invalidation_bytes.is_empty() {
                let raw: BTreeMap<String, BTreeSet<String>> =
                    bincode::deserialize(&invalidation_bytes).map_err(codec_error)?;
                for (raw_invalidation, raw_keys) in raw {
                    let keys: FxHashSet<CacheKey> = raw_keys
                        .into_iter()
                        .map(CacheKey::from_raw)
                        .filter(|key| {
                            let tracked = shard.policy.contains(key);
                            if !tracked {
                                warn!(
                                    driver = DRIVER,
                                    policy = %kind,
                                    hash = %key,
                                    "invalidation index referenced a missing entry"
                                );
                            }
                            tracked
                        })
                        .collect();
                    if !keys.is_empty() {
                        shard
                            .invalidation
                            .insert(InvalidationKey::from_raw(raw_invalidation), keys);
                    }
                }
            }

            shard.persist_ttl()?;
            shard.persist_invalidation()?;
            info!(
                driver = DRIVER,
                policy = %kind,
                entries = shard.weights.len(),
                "policy directory replayed"
            );
        }

        let receiver = self.inner.events.lock().take();
        if let Some(receiver) = receiver {
            let handle = spawn_event_loop(Arc::clone(&self.inner), receiver);
            self.inner.tasks.lock().push(handle);
        }

        info!(driver = DRIVER, max_size = self.inner.config.max_size, "driver initialized");
        Ok(())
    }

    /// Aborts the background tasks. On-disk state is left untouched.
    pub fn close(&self) {
        for handle in self.inner.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    /// Looks an entry up. A hit rewrites the entry file with the bumped
    /// hit counter and access time.
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

        if !shard.policy.contains(&key) {
            self.inner.telemetry.incr(Counter::Misses, labels);
            debug!(driver = DRIVER, policy = %policy, hash = %key, "cache miss");
            return Ok(None);
        }

        let Some(mut entry) = shard.read_entry(&key)? else {
            // The file disappeared underneath us; repair the tracking.
            warn!(driver = DRIVER, policy = %policy, hash = %key, "cache file missing for tracked key");
            shard.policy.stop_tracking(&key);
            if let Some(weight) = shard.weights.remove(&key) {
                self.inner.bytes[policy.index()].fetch_sub(weight, Ordering::Relaxed);
            }
            self.inner.telemetry.incr(Counter::Misses, labels);
            return Ok(None);
        };

        shard.policy.hit(&key);
        entry.touch(now_ms());
        let weight = shard.write_entry(&key, &entry)?;
        if let Some(previous) = shard.weights.insert(key.clone(), weight) {
            if previous != weight {
                let counter = &self.inner.bytes[policy.index()];
                counter.fetch_sub(previous, Ordering::Relaxed);
                counter.fetch_add(weight, Ordering::Relaxed);
            }
        }

        self.inner.telemetry.incr(Counter::Hits, labels);
        trace!(driver = DRIVER, policy = %policy, hash = %key, hits = entry.hits, "cache hit");
        Ok(Some(entry))
    }

    /// Stores an entry under `policy`; see the memory driver for the
    /// shared semantics. Disk-specific: the entry file is written under
    /// an exclusive lock, and the shard's `ttl.dat` and
    /// `invalidation-identifiers.dat` are rewritten afterwards.
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

        if target.policy.contains(&key) {
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
            if let Some(previous) = target.read_entry(&key)? {
                unlink_invalidation(&mut target.invalidation, &previous, &key);
            }
            target.delete_entry_file(&key)?;
            if let Some(weight) = target.weights.remove(&key) {
                self.inner.bytes[policy.index()].fetch_sub(weight, Ordering::Relaxed);
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

        while self.inner.total_bytes() + weight > max_size {
            let Some(victim) = target.policy.evict() else {
                break;
            };
            self.inner
                .remove_stored(&mut target, policy, &victim, EvictionCause::SizeLimit)?;
        }

        if self.inner.total_bytes() + weight > max_size {
            if !self.inner.config.evict_from_others {
                target.persist_invalidation()?;
                target.persist_ttl()?;
                return Err(CacheError::NoCachesToEvict { needed: weight });
            }
            for other_kind in PolicyKind::ALL {
                if other_kind == policy {
                    continue;
                }
                let mut other = self.inner.shards[other_kind.index()].lock().await;
                let mut spilled = false;
                loop {
                    if self.inner.total_bytes() + weight <= max_size {
                        break;
                    }
                    let Some(victim) = other.policy.evict() else {
                        break;
                    };
                    self.inner.remove_stored(
                        &mut other,
                        other_kind,
                        &victim,
                        EvictionCause::SizeLimit,
                    )?;
                    spilled = true;
                }
                if spilled {
                    other.persist_invalidation()?;
                    other.persist_ttl()?;
                }
                drop(other);
                if self.inner.total_bytes() + weight <= max_size {
                    break;
                }
            }
            if self.inner.total_bytes() + weight > max_size {
                target.persist_invalidation()?;
                target.persist_ttl()?;
                return Err(CacheError::NoCachesToEvict { needed: weight });
            }
        }

        target.policy.track(&key);
        if entry.options.ttl > 0 {
            target.policy.register_ttl(&key, entry.options.ttl);
        }
        let written = target.write_entry(&key, &entry)?;
        target.weights.insert(key.clone(), written);
        self.inner.bytes[policy.index()].fetch_add(written, Ordering::Relaxed);
        link_invalidation(&mut target.invalidation, &entry, &key);
        target.persist_invalidation()?;
        target.persist_ttl()?;

        self.inner.telemetry.incr(
            Counter::Created,
            Labels {
                driver: DRIVER,
                policy,
                hash: key.as_str(),
            },
        );
        debug!(driver = DRIVER, policy = %policy, hash = %key, bytes = written, "entry stored");
        Ok(true)
    }

    /// Removes an entry and its file. Absent keys are a
    /// [`CacheError::NotFound`].
    #[tracing::instrument(level = "debug", name = "cache_delete", skip(self, identifier), fields(driver = DRIVER, policy = %policy))]
    pub async fn delete(&self, identifier: &Identifier, policy: PolicyKind) -> Result<()> {
        let key = identifier.cache_key();
        let mut shard = self.inner.shards[policy.index()].lock().await;

        if !shard.policy.contains(&key) {
            return Err(CacheError::NotFound { key });
        }
        if let Some(entry) = shard.read_entry(&key)? {
            unlink_invalidation(&mut shard.invalidation, &entry, &key);
        }
        shard.policy.stop_tracking(&key);
        shard.delete_entry_file(&key)?;
        if let Some(weight) = shard.weights.remove(&key) {
            self.inner.bytes[policy.index()].fetch_sub(weight, Ordering::Relaxed);
        }
        shard.persist_invalidation()?;
        shard.persist_ttl()?;

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
                if self.inner.remove_stored(
                    &mut shard,
                    policy,
                    &key,
                    EvictionCause::Invalidation,
                )? {
                    removed += 1;
                }
            }
        }
        shard.persist_invalidation()?;
        shard.persist_ttl()?;

        info!(driver = DRIVER, policy = %policy, removed, "invalidation completed");
        Ok(removed)
    }

    /// Per-policy byte and entry counts plus totals, measured from the
    /// regular cache files on disk.
    pub async fn resource_usage(&self) -> Result<ResourceUsage> {
        let max_size = self.inner.config.max_size;
        let mut per_policy = BTreeMap::new();
        let mut total_bytes = 0;
        let mut total_entries = 0;

        for kind in PolicyKind::ALL {
            let shard = self.inner.shards[kind.index()].lock().await;
            let mut bytes = 0u64;
            let mut entries = 0u64;
            for dir_entry in fs::read_dir(&shard.dir)? {
                let dir_entry = dir_entry?;
                if !dir_entry.file_type()?.is_file() {
                    continue;
                }
                let name = dir_entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if !name.starts_with("c.") || !name.ends_with(".dat") {
                    continue;
                }
                bytes += dir_entry.metadata()?.len();
                entries += 1;
            }
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

        Ok(ResourceUsage {
            per_policy,
            total_bytes,
            total_entries,
        })
    }

    /// Verifies that the on-disk table and the policy track exactly the
    /// same keys. Diagnostics only.
    pub async fn in_sync(&self, policy: PolicyKind) -> bool {
        let shard = self.inner.shards[policy.index()].lock().await;
        let tracked: FxHashSet<CacheKey> = shard.policy.tracked_keys().into_iter().collect();
        let stored: FxHashSet<CacheKey> = shard.weights.keys().cloned().collect();
        tracked == stored
    }
}

impl Drop for DiskDriver {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DiskDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskDriver")
            .field("mount_path", &self.inner.config.mount_path)
            .field("max_size", &self.inner.config.max_size)
            .finish_non_exhaustive()
    }
}

/// Converts TTL expiries into `stop_tracking` plus file removal. Firings
/// whose generation no longer matches the live registration are ignored.
fn spawn_event_loop(
    inner: Arc<DiskInner>,
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
                    if let Err(err) =
                        inner.remove_stored(&mut shard, policy, &key, EvictionCause::Ttl)
                    {
                        warn!(driver = DRIVER, policy = %policy, hash = %key, error = %err, "ttl removal failed");
                        continue;
                    }
                    if let Err(err) = shard
                        .persist_invalidation()
                        .and_then(|()| shard.persist_ttl())
                    {
                        warn!(driver = DRIVER, policy = %policy, error = %err, "index rewrite failed after ttl expiry");
                    }
                }
                TtlEvent::Cleared { policy, key } => {
                    trace!(driver = DRIVER, policy = %policy, hash = %key, "ttl cleared");
                }
            }
        }
    })
}
