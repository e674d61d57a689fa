//! Cache entry records and their construction.
//!
//! An [`Entry`] is what a driver stores under a cache key: the original
//! identifier, the opaque payload, optional metadata, access bookkeeping
//! (`hits`, `ctime`, `atime`), and the caller-supplied [`EntryOptions`].
//!
//! Entries are serde types so the same record round-trips through the
//! snapshot blob and the disk driver's per-entry files. Size accounting
//! uses the bincode-encoded length of the record, so the admission budget
//! measures the same bytes that persistence writes.
//!
//! ## Lifecycle
//!
//! ```text
//!   set ──► Entry::new (hits = 0, ctime == atime)
//!   get ──► hits += 1, atime = now
//!   delete / invalidate / TTL expiry / overflow eviction ──► removed
//! ```

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::ident::Identifier;

/// Per-entry options, merged over defaults at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Time to live in milliseconds. Zero means the entry never expires.
    pub ttl: u64,
    /// Identifiers whose invalidation keys bulk-expire this entry.
    pub invalidated_by: Vec<Identifier>,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            ttl: 0,
            invalidated_by: Vec::new(),
        }
    }
}

/// Caller-supplied portion of a `set`: payload, metadata, and options.
///
/// Fields not provided keep their defaults, mirroring a partial object
/// merged over `{ ttl: 0, invalidatedBy: [] }`.
///
/// # Example
///
/// ```
/// use stashkit::entry::{EntryOptions, EntryPayload};
///
/// let plain = EntryPayload::new(b"body".to_vec());
/// assert_eq!(plain.options.ttl, 0);
///
/// let expiring = EntryPayload {
///     options: EntryOptions { ttl: 5_000, ..Default::default() },
///     ..EntryPayload::new(b"body".to_vec())
/// };
/// assert_eq!(expiring.options.ttl, 5_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntryPayload {
    /// Opaque payload, stored verbatim.
    pub data: Vec<u8>,
    /// Optional small metadata object.
    pub metadata: Option<BTreeMap<String, String>>,
    /// TTL and invalidation options.
    pub options: EntryOptions,
}

impl EntryPayload {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }
}

/// A stored cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The identifier the entry was stored under.
    pub identifier: Identifier,
    /// Opaque payload, stored verbatim.
    pub data: Vec<u8>,
    /// Optional small metadata object.
    pub metadata: Option<BTreeMap<String, String>>,
    /// Number of `get` hits recorded against this entry.
    pub hits: u64,
    /// Creation time, unix milliseconds.
    pub ctime: u64,
    /// Last access time, unix milliseconds. Never earlier than `ctime`.
    pub atime: u64,
    /// TTL and invalidation options.
    pub options: EntryOptions,
}

impl Entry {
    /// Builds a fresh entry: zero hits, `ctime == atime == now`.
    pub fn new(identifier: Identifier, payload: EntryPayload) -> Self {
        let now = now_ms();
        Self {
            identifier,
            data: payload.data,
            metadata: payload.metadata,
            hits: 0,
            ctime: now,
            atime: now,
            options: payload.options,
        }
    }

    /// Records a hit: bumps the counter and refreshes the access time.
    pub fn touch(&mut self, now: u64) {
        self.hits += 1;
        self.atime = self.atime.max(now);
    }

    /// Returns `true` once the TTL has fully elapsed at `now`.
    ///
    /// Entries with `ttl == 0` never expire.
    pub fn expired_at(&self, now: u64) -> bool {
        self.options.ttl > 0 && self.ctime.saturating_add(self.options.ttl) <= now
    }

    /// Remaining TTL at `now`, or `None` for non-expiring entries.
    ///
    /// Already-expired entries report `Some(0)`.
    pub fn remaining_ttl(&self, now: u64) -> Option<u64> {
        if self.options.ttl == 0 {
            return None;
        }
        Some(self.ctime.saturating_add(self.options.ttl).saturating_sub(now))
    }

    /// Absolute expiration time in unix milliseconds, if any.
    pub fn expires_at(&self) -> Option<u64> {
        (self.options.ttl > 0).then(|| self.ctime.saturating_add(self.options.ttl))
    }

    /// The serialized length of this entry, which is the weight charged
    /// against the driver's byte budget.
    pub fn encoded_len(&self) -> Result<u64> {
        bincode::serialized_size(self).map_err(|err| CacheError::Io(std::io::Error::other(err)))
    }
}

/// Current wall-clock time as unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
