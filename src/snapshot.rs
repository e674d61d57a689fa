//! Snapshot codec: one binary blob per driver.
//!
//! A [`SnapshotBlob`] carries, per policy, the full entry table and the
//! policy's serialized ordering state:
//!
//! ```text
//!   SnapshotBlob
//!   ├── caches:   policy → (cache key → entry)
//!   └── policies: policy → ordering dump (key order / key set)
//! ```
//!
//! Encoding is bincode over `BTreeMap`-keyed structures. Maps and sets are
//! real typed collections on both sides of the round trip, and the ordered
//! keys make the encoding deterministic: re-encoding an unchanged blob
//! yields byte-identical output. An empty file is a valid snapshot meaning
//! "no state".
//!
//! Writes land in a sibling temp file first and are renamed into place, so
//! a crash mid-write leaves the previous snapshot intact. Failures here
//! are background noise by design: the writer logs and retries at the next
//! interval, recovery logs and starts empty.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::{CacheError, Result};
use crate::ident::CacheKey;
use crate::policy::{PolicyKind, PolicySnapshot};

/// Serialized driver state: entry tables plus policy ordering dumps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBlob {
    pub caches: BTreeMap<PolicyKind, BTreeMap<CacheKey, Entry>>,
    pub policies: BTreeMap<PolicyKind, PolicySnapshot>,
}

impl SnapshotBlob {
    pub fn is_empty(&self) -> bool {
        self.caches.values().all(BTreeMap::is_empty)
    }
}

/// Encodes a blob to bytes.
pub fn encode(blob: &SnapshotBlob) -> Result<Vec<u8>> {
    bincode::serialize(blob).map_err(|err| CacheError::SnapshotWrite(err.to_string()))
}

/// Decodes a blob. Empty input is the valid "no state" snapshot.
pub fn decode(bytes: &[u8]) -> Result<Option<SnapshotBlob>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    bincode::deserialize(bytes)
        .map(Some)
        .map_err(|err| CacheError::SnapshotRead(err.to_string()))
}

/// Reads and decodes a snapshot file. A missing file reads as "no state".
pub fn read_file(path: &Path) -> Result<Option<SnapshotBlob>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(CacheError::SnapshotRead(err.to_string())),
    };
    decode(&bytes)
}

/// Encodes and atomically replaces the snapshot file.
pub fn write_file(path: &Path, blob: &SnapshotBlob) -> Result<()> {
    let bytes = encode(blob)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    fs::write(&tmp, &bytes).map_err(|err| CacheError::SnapshotWrite(err.to_string()))?;
    fs::rename(&tmp, path).map_err(|err| CacheError::SnapshotWrite(err.to_string()))
}
