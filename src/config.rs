//! Driver configuration: the serde tree and its resolution.
//!
//! Configuration arrives as a camelCase JSON tree:
//!
//! ```json
//! {
//!   "drivers": {
//!     "memory": {
//!       "maxSize": "25%",
//!       "evictFromOthers": true,
//!       "recovery": {
//!         "enabled": true,
//!         "snapshotFilePath": "/var/lib/cache/memory.dat",
//!         "snapshotInterval": 30
//!       }
//!     },
//!     "fileSystem": {
//!       "maxSize": 1073741824,
//!       "mountPath": "/var/lib/cache/fs"
//!     }
//!   }
//! }
//! ```
//!
//! Size budgets accept an absolute byte count (number) or a percentage
//! string (`"25%"`). Percentages are resolved against a total the caller
//! supplies — total RAM for the memory driver, capacity of the filesystem
//! at `mountPath` for the disk driver — at load time, so the drivers only
//! ever see resolved integer budgets.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CacheError, Result};

/// Root of the configuration tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default)]
    pub drivers: DriversConfig,
}

impl CacheConfig {
    /// Parses the JSON configuration tree.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| CacheError::Config(err.to_string()))
    }
}

/// Per-driver configuration sections. Absent sections disable the driver.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DriversConfig {
    pub memory: Option<MemorySection>,
    pub file_system: Option<FileSystemSection>,
}

/// Raw memory-driver section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemorySection {
    pub max_size: SizeLimit,
    #[serde(default)]
    pub evict_from_others: bool,
    #[serde(default)]
    pub recovery: Option<RecoverySection>,
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl MemorySection {
    /// Resolves against total memory, validating every field.
    pub fn resolve(&self, total_memory: u64) -> Result<MemoryDriverConfig> {
        Ok(MemoryDriverConfig {
            max_size: self.max_size.resolve(total_memory)?,
            evict_from_others: self.evict_from_others,
            recovery: self
                .recovery
                .as_ref()
                .map(RecoverySection::resolve)
                .transpose()?
                .flatten(),
            rng_seed: self.rng_seed,
        })
    }
}

/// Raw snapshot-recovery subsection of the memory driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecoverySection {
    #[serde(default)]
    pub enabled: bool,
    pub snapshot_file_path: PathBuf,
    pub snapshot_interval: u64,
}

impl RecoverySection {
    fn resolve(&self) -> Result<Option<RecoverySettings>> {
        if !self.enabled {
            return Ok(None);
        }
        if self.snapshot_file_path.extension().and_then(|e| e.to_str()) != Some("dat") {
            return Err(CacheError::Config(format!(
                "snapshotFilePath must end in .dat, got {}",
                self.snapshot_file_path.display()
            )));
        }
        if self.snapshot_interval == 0 {
            return Err(CacheError::Config(
                "snapshotInterval must be at least one second".into(),
            ));
        }
        Ok(Some(RecoverySettings {
            snapshot_file_path: self.snapshot_file_path.clone(),
            snapshot_interval: Duration::from_secs(self.snapshot_interval),
        }))
    }
}

/// Raw disk-driver section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileSystemSection {
    pub max_size: SizeLimit,
    pub mount_path: PathBuf,
    #[serde(default)]
    pub evict_from_others: bool,
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl FileSystemSection {
    /// Resolves against the capacity of the filesystem at `mountPath`.
    pub fn resolve(&self, mount_total: u64) -> Result<DiskDriverConfig> {
        Ok(DiskDriverConfig {
            max_size: self.max_size.resolve(mount_total)?,
            mount_path: self.mount_path.clone(),
            evict_from_others: self.evict_from_others,
            rng_seed: self.rng_seed,
        })
    }
}

/// A byte budget: absolute bytes or a percentage of a caller-supplied total.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SizeLimit {
    Bytes(u64),
    Text(String),
}

impl SizeLimit {
    /// Resolves to an integer byte count.
    ///
    /// # Example
    ///
    /// ```
    /// use stashkit::config::SizeLimit;
    ///
    /// assert_eq!(SizeLimit::Bytes(4096).resolve(0).unwrap(), 4096);
    /// assert_eq!(
    ///     SizeLimit::Text("25%".into()).resolve(1_000_000).unwrap(),
    ///     250_000
    /// );
    /// assert!(SizeLimit::Text("100%".into()).resolve(1_000_000).is_err());
    /// ```
    pub fn resolve(&self, total: u64) -> Result<u64> {
        let bytes = match self {
            SizeLimit::Bytes(b) => *b,
            SizeLimit::Text(text) => {
                let text = text.trim();
                if let Some(percent_text) = text.strip_suffix('%') {
                    let percent: u64 = percent_text.trim().parse().map_err(|_| {
                        CacheError::Config(format!("invalid percentage: {text:?}"))
                    })?;
                    if percent == 0 || percent >= 100 {
                        return Err(CacheError::Config(format!(
                            "percentage must be between 0 and 100 exclusive, got {percent}"
                        )));
                    }
                    total / 100 * percent + total % 100 * percent / 100
                } else {
                    text.parse().map_err(|_| {
                        CacheError::Config(format!("invalid byte count: {text:?}"))
                    })?
                }
            }
        };
        if bytes == 0 {
            return Err(CacheError::Config("maxSize must be greater than zero".into()));
        }
        Ok(bytes)
    }
}

/// Memory-driver configuration after resolution. `max_size` is always a
/// positive byte count.
#[derive(Debug, Clone)]
pub struct MemoryDriverConfig {
    pub max_size: u64,
    pub evict_from_others: bool,
    pub recovery: Option<RecoverySettings>,
    pub rng_seed: Option<u64>,
}

/// Snapshot-recovery settings after resolution.
#[derive(Debug, Clone)]
pub struct RecoverySettings {
    pub snapshot_file_path: PathBuf,
    pub snapshot_interval: Duration,
}

/// Disk-driver configuration after resolution.
#[derive(Debug, Clone)]
pub struct DiskDriverConfig {
    pub max_size: u64,
    pub mount_path: PathBuf,
    pub evict_from_others: bool,
    pub rng_seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==============================================
    // Size limits
    // ==============================================

    mod size_limits {
        use super::*;

        #[test]
        fn absolute_bytes_pass_through() {
            assert_eq!(SizeLimit::Bytes(1).resolve(0).unwrap(), 1);
            assert_eq!(SizeLimit::Bytes(1 << 30).resolve(0).unwrap(), 1 << 30);
        }

        #[test]
        fn numeric_strings_are_bytes() {
            assert_eq!(SizeLimit::Text("4096".into()).resolve(0).unwrap(), 4096);
        }

        #[test]
        fn percentages_resolve_against_the_total() {
            let limit = SizeLimit::Text("50%".into());
            assert_eq!(limit.resolve(10_000).unwrap(), 5_000);
            let limit = SizeLimit::Text(" 7% ".into());
            assert_eq!(limit.resolve(100).unwrap(), 7);
        }

        #[test]
        fn percentage_bounds_are_exclusive() {
            assert!(SizeLimit::Text("0%".into()).resolve(100).is_err());
            assert!(SizeLimit::Text("100%".into()).resolve(100).is_err());
            assert!(SizeLimit::Text("140%".into()).resolve(100).is_err());
            assert!(SizeLimit::Text("99%".into()).resolve(100).is_ok());
        }

        #[test]
        fn zero_budgets_are_rejected() {
            assert!(SizeLimit::Bytes(0).resolve(0).is_err());
            assert!(SizeLimit::Text("1%".into()).resolve(10).is_err());
        }

        #[test]
        fn garbage_is_rejected() {
            assert!(SizeLimit::Text("lots".into()).resolve(100).is_err());
            assert!(SizeLimit::Text("%".into()).resolve(100).is_err());
        }
    }

    // ==============================================
    // Tree parsing and resolution
    // ==============================================

    mod tree {
        use super::*;

        const FULL: &str = r#"{
            "drivers": {
                "memory": {
                    "maxSize": "10%",
                    "evictFromOthers": true,
                    "recovery": {
                        "enabled": true,
                        "snapshotFilePath": "/tmp/mem.dat",
                        "snapshotInterval": 30
                    }
                },
                "fileSystem": {
                    "maxSize": 4096,
                    "mountPath": "/tmp/cache"
                }
            }
        }"#;

        #[test]
        fn full_tree_parses_and_resolves() {
            let config = CacheConfig::from_json_str(FULL).unwrap();

            let memory = config.drivers.memory.as_ref().unwrap();
            let resolved = memory.resolve(1_000_000).unwrap();
            assert_eq!(resolved.max_size, 100_000);
            assert!(resolved.evict_from_others);
            let recovery = resolved.recovery.unwrap();
            assert_eq!(recovery.snapshot_interval, Duration::from_secs(30));
            assert_eq!(
                recovery.snapshot_file_path,
                PathBuf::from("/tmp/mem.dat")
            );

            let disk = config.drivers.file_system.as_ref().unwrap();
            let resolved = disk.resolve(0).unwrap();
            assert_eq!(resolved.max_size, 4096);
            assert_eq!(resolved.mount_path, PathBuf::from("/tmp/cache"));
            assert!(!resolved.evict_from_others);
        }

        #[test]
        fn empty_tree_disables_both_drivers() {
            let config = CacheConfig::from_json_str("{}").unwrap();
            assert!(config.drivers.memory.is_none());
            assert!(config.drivers.file_system.is_none());
        }

        #[test]
        fn disabled_recovery_resolves_to_none() {
            let text = r#"{
                "drivers": {
                    "memory": {
                        "maxSize": 1024,
                        "recovery": {
                            "enabled": false,
                            "snapshotFilePath": "/tmp/mem.dat",
                            "snapshotInterval": 30
                        }
                    }
                }
            }"#;
            let config = CacheConfig::from_json_str(text).unwrap();
            let resolved = config.drivers.memory.unwrap().resolve(0).unwrap();
            assert!(resolved.recovery.is_none());
        }

        #[test]
        fn snapshot_path_must_be_dat() {
            let text = r#"{
                "drivers": {
                    "memory": {
                        "maxSize": 1024,
                        "recovery": {
                            "enabled": true,
                            "snapshotFilePath": "/tmp/mem.bin",
                            "snapshotInterval": 30
                        }
                    }
                }
            }"#;
            let config = CacheConfig::from_json_str(text).unwrap();
            assert!(config.drivers.memory.unwrap().resolve(0).is_err());
        }

        #[test]
        fn unknown_keys_are_rejected() {
            let text = r#"{"drivers": {"memory": {"maxSize": 1, "maxSizes": 2}}}"#;
            assert!(CacheConfig::from_json_str(text).is_err());
        }
    }
}
