//! Error types for the stashkit engine.
//!
//! ## Key Components
//!
//! - [`CacheError`]: the single error enum surfaced by drivers and the
//!   configuration loader.
//! - [`Result`]: crate-wide result alias.
//!
//! Lookup misses are not errors: `get` returns `Ok(None)` and records a
//! miss. `NotFound` is reserved for `delete` of an absent key, which the
//! calling shell typically maps to a 404. Snapshot failures never leave the
//! background paths that produce them; they are logged and retried.

use thiserror::Error;

use crate::ident::CacheKey;

/// Unified error type for driver operations and configuration loading.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The entry alone exceeds the driver's byte budget. Not retried.
    #[error("cache entry of {size} bytes exceeds the driver budget of {max_size} bytes")]
    CacheTooBig { size: u64, max_size: u64 },

    /// Admission could not free enough space, even after spilling into the
    /// other policies when `evict_from_others` permits it.
    #[error("no caches left to evict while freeing space for {needed} bytes")]
    NoCachesToEvict { needed: u64 },

    /// `delete` was called for a key that is not present.
    #[error("no entry for key {key}")]
    NotFound { key: CacheKey },

    /// A snapshot blob could not be decoded. Logged by the recovery path;
    /// the driver continues with an empty table.
    #[error("snapshot read failed: {0}")]
    SnapshotRead(String),

    /// A snapshot blob could not be written. Logged by the snapshot writer
    /// and retried at the next interval.
    #[error("snapshot write failed: {0}")]
    SnapshotWrite(String),

    /// Invalid configuration detected at load time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem failure in the disk driver, propagated to the caller.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
