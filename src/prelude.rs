//! Convenience re-exports for embedding the engine.
//!
//! ```
//! use stashkit::prelude::*;
//!
//! let id = Identifier::from("user:17");
//! assert!(id.cache_key().as_str().starts_with("c."));
//! ```

pub use crate::config::{
    CacheConfig, DiskDriverConfig, MemoryDriverConfig, RecoverySettings, SizeLimit,
};
pub use crate::driver::{DiskDriver, MemoryDriver, PolicyUsage, ResourceUsage};
pub use crate::entry::{Entry, EntryOptions, EntryPayload};
pub use crate::error::{CacheError, Result};
pub use crate::ident::{CacheKey, Identifier, InvalidationKey};
pub use crate::metrics::{Counter, CounterRecorder, CounterSnapshot, Labels, Telemetry};
pub use crate::policy::{Policy, PolicyKind, PolicySnapshot};
