//! Structured identifiers and their stable digests.
//!
//! Clients address cache entries with a recursive identifier tree rather
//! than a flat string key. The engine collapses each tree into a stable
//! SHA-256 digest, prefixed with a one-character tag that separates the two
//! key spaces:
//!
//! ```text
//!   Identifier ──digest──► "c.3f5a…9c"   cache key        (entry handle)
//!   Identifier ──digest──► "i.3f5a…9c"   invalidation key (bulk-expiry handle)
//! ```
//!
//! ## Canonical encoding
//!
//! The digest hashes a canonical byte encoding of the tree: every node
//! contributes a type tag, scalars contribute fixed-width little-endian
//! payloads, strings and containers are length-prefixed, and map entries
//! are visited in sorted key order. Consequences:
//!
//! - equal identifiers produce equal digests across processes and restarts
//! - map key order does not affect the digest
//! - sequence order does affect the digest
//! - a change in nesting, type, or value changes the digest
//!
//! Collisions are not handled; SHA-256 makes accidental ones negligible.
//!
//! ## Key Components
//!
//! | Component | Role |
//! |---|---|
//! | [`Identifier`] | recursive tree of scalars, sequences, and maps |
//! | [`CacheKey`] | `c.`-prefixed digest, primary handle for an entry |
//! | [`InvalidationKey`] | `i.`-prefixed digest, handle for bulk expiry |
//!
//! ## Example Usage
//!
//! ```
//! use stashkit::ident::Identifier;
//!
//! let id = Identifier::map([
//!     ("tenant", Identifier::from("acme")),
//!     ("page", Identifier::from(3i64)),
//! ]);
//!
//! let key = id.cache_key();
//! assert!(key.as_str().starts_with("c."));
//!
//! // Same tree, same digest.
//! assert_eq!(key, id.clone().cache_key());
//!
//! // The invalidation key space is disjoint by construction.
//! assert_ne!(key.as_str(), id.invalidation_key().as_str());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A structured identifier: scalars, ordered sequences, and unordered maps.
///
/// Numbers are split into integers and floats so that `5` and `5.0` are
/// distinct identifiers, mirroring their distinct JSON representations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Identifier {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Identifier>),
    Map(BTreeMap<String, Identifier>),
}

impl Identifier {
    /// Builds a map identifier from string-keyed pairs.
    ///
    /// # Example
    ///
    /// ```
    /// use stashkit::ident::Identifier;
    ///
    /// let a = Identifier::map([("x", Identifier::from(1i64)), ("y", Identifier::from(2i64))]);
    /// let b = Identifier::map([("y", Identifier::from(2i64)), ("x", Identifier::from(1i64))]);
    ///
    /// // Maps are unordered: insertion order is irrelevant.
    /// assert_eq!(a.cache_key(), b.cache_key());
    /// ```
    pub fn map<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Identifier)>,
    {
        Identifier::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a sequence identifier.
    pub fn seq<I: IntoIterator<Item = Identifier>>(items: I) -> Self {
        Identifier::Seq(items.into_iter().collect())
    }

    /// Converts a JSON value into an identifier.
    ///
    /// This is the client-facing identifier grammar: the union of string,
    /// number, boolean, array, and string-keyed object. `null` has no
    /// identifier form and yields `None`.
    ///
    /// # Example
    ///
    /// ```
    /// use stashkit::ident::Identifier;
    ///
    /// let value = serde_json::json!({"user": "u-17", "tags": ["a", "b"]});
    /// let id = Identifier::from_json(&value).unwrap();
    /// assert!(id.cache_key().as_str().starts_with("c."));
    ///
    /// assert!(Identifier::from_json(&serde_json::Value::Null).is_none());
    /// ```
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Identifier::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Identifier::Int(i))
                } else {
                    n.as_f64().map(Identifier::Float)
                }
            }
            Value::String(s) => Some(Identifier::Str(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Identifier::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Identifier::Seq),
            Value::Object(fields) => fields
                .iter()
                .map(|(k, v)| Identifier::from_json(v).map(|id| (k.clone(), id)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Identifier::Map),
        }
    }

    /// Returns the hex SHA-256 digest of the canonical encoding.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        self.write_canonical(&mut hasher);
        format!("{:x}", hasher.finalize())
    }

    /// Returns the `c.`-prefixed cache key for this identifier.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_digest(&self.digest())
    }

    /// Returns the `i.`-prefixed invalidation key for this identifier.
    pub fn invalidation_key(&self) -> InvalidationKey {
        InvalidationKey::from_digest(&self.digest())
    }

    /// Feeds the canonical encoding of this node into the hasher.
    ///
    /// Each node writes a one-byte type tag so that, for example, the
    /// string `"1"` and the integer `1` cannot collide. Containers are
    /// length-prefixed so adjacent siblings cannot be re-bracketed into an
    /// equal byte stream.
    fn write_canonical(&self, hasher: &mut Sha256) {
        match self {
            Identifier::Bool(b) => {
                hasher.update([b'b', u8::from(*b)]);
            }
            Identifier::Int(i) => {
                hasher.update([b'i']);
                hasher.update(i.to_le_bytes());
            }
            Identifier::Float(f) => {
                hasher.update([b'f']);
                hasher.update(f.to_bits().to_le_bytes());
            }
            Identifier::Str(s) => {
                hasher.update([b's']);
                hasher.update((s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            Identifier::Seq(items) => {
                hasher.update([b'a']);
                hasher.update((items.len() as u64).to_le_bytes());
                for item in items {
                    item.write_canonical(hasher);
                }
            }
            Identifier::Map(fields) => {
                // BTreeMap iterates in sorted key order, which is what makes
                // map digests insertion-order-insensitive.
                hasher.update([b'm']);
                hasher.update((fields.len() as u64).to_le_bytes());
                for (key, value) in fields {
                    hasher.update((key.len() as u64).to_le_bytes());
                    hasher.update(key.as_bytes());
                    value.write_canonical(hasher);
                }
            }
        }
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::Str(s.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier::Str(s)
    }
}

impl From<i64> for Identifier {
    fn from(i: i64) -> Self {
        Identifier::Int(i)
    }
}

impl From<f64> for Identifier {
    fn from(f: f64) -> Self {
        Identifier::Float(f)
    }
}

impl From<bool> for Identifier {
    fn from(b: bool) -> Self {
        Identifier::Bool(b)
    }
}

/// Primary handle for a cache entry: `c.` plus the identifier digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Prefixes a digest with the cache-key tag.
    pub fn from_digest(digest: &str) -> Self {
        CacheKey(format!("c.{digest}"))
    }

    /// Wraps an already-tagged key, e.g. one recovered from a filename.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        CacheKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle for the set of cache keys a client may bulk-expire: `i.` plus the
/// digest of the invalidation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvalidationKey(String);

impl InvalidationKey {
    /// Prefixes a digest with the invalidation-key tag.
    pub fn from_digest(digest: &str) -> Self {
        InvalidationKey(format!("i.{digest}"))
    }

    /// Wraps an already-tagged key, e.g. one read back from disk.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        InvalidationKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvalidationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
