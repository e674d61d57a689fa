//! Intrusive doubly-linked list of cache keys.
//!
//! Backs the recency ordering of the LRU and MRU policies: a raw-pointer
//! linked list plus a hash-map index, giving O(1) append, removal,
//! move-to-tail, and pops from either end.
//!
//! ```text
//!   map: FxHashMap<CacheKey, NonNull<Node>>
//!
//!   head ──► [A] ◄──► [B] ◄──► [C] ◄── tail
//!   oldest access                most recent access
//!
//!   • track        → push_tail (newest at the tail)
//!   • hit          → move_to_tail
//!   • LRU eviction → pop_head
//!   • MRU eviction → pop_tail
//! ```
//!
//! Nodes are heap-allocated `Box`es handled through `NonNull`; the map is
//! the single source of membership truth, and every pointer in the map is
//! reachable from `head`. Not thread-safe; callers serialize access.

use std::ptr::NonNull;

use rustc_hash::FxHashMap;

use crate::ident::CacheKey;

/// Node in the linked list. Pointers first for cache-line locality.
#[repr(C)]
struct Node {
    prev: Option<NonNull<Node>>,
    next: Option<NonNull<Node>>,
    key: CacheKey,
}

/// Doubly-linked key list with a hash index.
///
/// # Example
///
/// ```
/// use stashkit::ds::KeyList;
/// use stashkit::ident::CacheKey;
///
/// let (a, b) = (CacheKey::from_digest("a"), CacheKey::from_digest("b"));
///
/// let mut list = KeyList::new();
/// list.push_tail(a.clone());
/// list.push_tail(b.clone());
///
/// // Refreshing `a` makes it the most recent.
/// list.move_to_tail(&a);
/// assert_eq!(list.pop_head(), Some(b));
/// assert_eq!(list.pop_head(), Some(a));
/// assert!(list.is_empty());
/// ```
pub struct KeyList {
    map: FxHashMap<CacheKey, NonNull<Node>>,
    /// Oldest end of the list.
    head: Option<NonNull<Node>>,
    /// Most recent end of the list.
    tail: Option<NonNull<Node>>,
}

// SAFETY: the raw node pointers are owned exclusively by this list and the
// keys they carry are plain owned data.
unsafe impl Send for KeyList {}
unsafe impl Sync for KeyList {}

impl KeyList {
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            head: None,
            tail: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.map.contains_key(key)
    }

    /// Unlink a node from its current position.
    #[inline(always)]
    fn detach(&mut self, node_ptr: NonNull<Node>) {
        unsafe {
            let node = node_ptr.as_ref();
            let prev = node.prev;
            let next = node.next;

            match prev {
                Some(mut p) => p.as_mut().next = next,
                None => self.head = next,
            }

            match next {
                Some(mut n) => n.as_mut().prev = prev,
                None => self.tail = prev,
            }
        }
    }

    /// Link a node at the tail (most recent position).
    #[inline(always)]
    fn attach_tail(&mut self, mut node_ptr: NonNull<Node>) {
        unsafe {
            let node = node_ptr.as_mut();
            node.next = None;
            node.prev = self.tail;

            match self.tail {
                Some(mut t) => t.as_mut().next = Some(node_ptr),
                None => self.head = Some(node_ptr),
            }

            self.tail = Some(node_ptr);
        }
    }

    /// Appends a key at the tail. Returns `false` if it is already present.
    pub fn push_tail(&mut self, key: CacheKey) -> bool {
        if self.map.contains_key(&key) {
            return false;
        }

        let node = Box::new(Node {
            prev: None,
            next: None,
            key: key.clone(),
        });
        let node_ptr = NonNull::from(Box::leak(node));
        self.map.insert(key, node_ptr);
        self.attach_tail(node_ptr);

        #[cfg(debug_assertions)]
        self.validate_invariants();

        true
    }

    /// Moves a key to the tail. Returns `false` if it is not present.
    pub fn move_to_tail(&mut self, key: &CacheKey) -> bool {
        let Some(&node_ptr) = self.map.get(key) else {
            return false;
        };
        if self.tail == Some(node_ptr) {
            return true;
        }
        self.detach(node_ptr);
        self.attach_tail(node_ptr);
        true
    }

    /// Removes and returns the head (oldest) key.
    pub fn pop_head(&mut self) -> Option<CacheKey> {
        let head_ptr = self.head?;
        self.detach(head_ptr);
        let node = unsafe { Box::from_raw(head_ptr.as_ptr()) };
        self.map.remove(&node.key);
        Some(node.key)
    }

    /// Removes and returns the tail (most recent) key.
    ///
    /// After removal the new tail's `next` is `None` and the head is
    /// untouched.
    pub fn pop_tail(&mut self) -> Option<CacheKey> {
        let tail_ptr = self.tail?;
        self.detach(tail_ptr);
        let node = unsafe { Box::from_raw(tail_ptr.as_ptr()) };
        self.map.remove(&node.key);
        Some(node.key)
    }

    /// Removes a key from anywhere in the list. Returns `false` if absent.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        let Some(node_ptr) = self.map.remove(key) else {
            return false;
        };
        self.detach(node_ptr);
        drop(unsafe { Box::from_raw(node_ptr.as_ptr()) });

        #[cfg(debug_assertions)]
        self.validate_invariants();

        true
    }

    /// Returns a reference to the head (oldest) key.
    pub fn peek_head(&self) -> Option<&CacheKey> {
        self.head.map(|ptr| unsafe { &(*ptr.as_ptr()).key })
    }

    /// Returns a reference to the tail (most recent) key.
    pub fn peek_tail(&self) -> Option<&CacheKey> {
        self.tail.map(|ptr| unsafe { &(*ptr.as_ptr()).key })
    }

    /// Collects the keys head→tail, i.e. oldest access first.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut out = Vec::with_capacity(self.map.len());
        let mut current = self.head;
        while let Some(ptr) = current {
            let node = unsafe { ptr.as_ref() };
            out.push(node.key.clone());
            current = node.next;
        }
        out
    }

    /// Removes every node and clears the index.
    pub fn clear(&mut self) {
        while self.pop_head().is_some() {}
        self.map.clear();
    }

    /// Checks list/map consistency. Debug builds only.
    #[cfg(debug_assertions)]
    fn validate_invariants(&self) {
        if self.map.is_empty() {
            debug_assert!(self.head.is_none(), "empty list should have no head");
            debug_assert!(self.tail.is_none(), "empty list should have no tail");
            return;
        }

        let mut count = 0;
        let mut current = self.head;
        let mut prev: Option<NonNull<Node>> = None;

        while let Some(ptr) = current {
            count += 1;
            assert!(count <= self.map.len(), "cycle detected in list");

            unsafe {
                let node = ptr.as_ref();
                debug_assert_eq!(node.prev, prev, "prev pointer inconsistent");
                debug_assert!(
                    self.map.contains_key(&node.key),
                    "node key not found in map"
                );
                prev = current;
                current = node.next;
            }
        }

        debug_assert_eq!(count, self.map.len(), "list count does not match map");
        debug_assert_eq!(self.tail, prev, "tail does not match last node");
    }
}

impl Default for KeyList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeyList {
    fn drop(&mut self) {
        while self.pop_head().is_some() {}
    }
}

impl std::fmt::Debug for KeyList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyList")
            .field("len", &self.map.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey::from_digest(name)
    }

    // ==============================================
    // Basic operations
    // ==============================================

    mod basic_operations {
        use super::*;

        #[test]
        fn new_list_is_empty() {
            let list = KeyList::new();
            assert!(list.is_empty());
            assert_eq!(list.len(), 0);
            assert_eq!(list.peek_head(), None);
            assert_eq!(list.peek_tail(), None);
        }

        #[test]
        fn push_tracks_membership_and_order() {
            let mut list = KeyList::new();
            assert!(list.push_tail(key("a")));
            assert!(list.push_tail(key("b")));

            assert_eq!(list.len(), 2);
            assert!(list.contains(&key("a")));
            assert_eq!(list.peek_head(), Some(&key("a")));
            assert_eq!(list.peek_tail(), Some(&key("b")));
        }

        #[test]
        fn duplicate_push_is_rejected() {
            let mut list = KeyList::new();
            assert!(list.push_tail(key("a")));
            assert!(!list.push_tail(key("a")));
            assert_eq!(list.len(), 1);
        }

        #[test]
        fn remove_middle_relinks_neighbors() {
            let mut list = KeyList::new();
            list.push_tail(key("a"));
            list.push_tail(key("b"));
            list.push_tail(key("c"));

            assert!(list.remove(&key("b")));
            assert_eq!(list.keys(), vec![key("a"), key("c")]);
            assert!(!list.remove(&key("b")));
        }

        #[test]
        fn clear_empties_everything() {
            let mut list = KeyList::new();
            list.push_tail(key("a"));
            list.push_tail(key("b"));
            list.clear();
            assert!(list.is_empty());
            assert_eq!(list.keys(), Vec::<CacheKey>::new());
        }
    }

    // ==============================================
    // Ordering behavior
    // ==============================================

    mod ordering {
        use super::*;

        #[test]
        fn pop_head_is_fifo_without_touches() {
            let mut list = KeyList::new();
            for name in ["a", "b", "c"] {
                list.push_tail(key(name));
            }
            assert_eq!(list.pop_head(), Some(key("a")));
            assert_eq!(list.pop_head(), Some(key("b")));
            assert_eq!(list.pop_head(), Some(key("c")));
            assert_eq!(list.pop_head(), None);
        }

        #[test]
        fn move_to_tail_reorders() {
            let mut list = KeyList::new();
            for name in ["a", "b", "c"] {
                list.push_tail(key(name));
            }
            assert!(list.move_to_tail(&key("a")));
            assert_eq!(list.keys(), vec![key("b"), key("c"), key("a")]);
        }

        #[test]
        fn move_to_tail_of_tail_is_a_no_op() {
            let mut list = KeyList::new();
            list.push_tail(key("a"));
            list.push_tail(key("b"));
            assert!(list.move_to_tail(&key("b")));
            assert_eq!(list.keys(), vec![key("a"), key("b")]);
        }

        #[test]
        fn move_to_tail_of_absent_key_fails() {
            let mut list = KeyList::new();
            list.push_tail(key("a"));
            assert!(!list.move_to_tail(&key("zz")));
        }

        #[test]
        fn pop_tail_leaves_head_untouched() {
            let mut list = KeyList::new();
            for name in ["a", "b", "c"] {
                list.push_tail(key(name));
            }
            assert_eq!(list.pop_tail(), Some(key("c")));
            assert_eq!(list.peek_head(), Some(&key("a")));
            assert_eq!(list.peek_tail(), Some(&key("b")));
            assert_eq!(list.pop_tail(), Some(key("b")));
            assert_eq!(list.pop_tail(), Some(key("a")));
            assert_eq!(list.pop_tail(), None);
        }

        #[test]
        fn single_element_pops_from_either_end() {
            let mut list = KeyList::new();
            list.push_tail(key("only"));
            assert_eq!(list.pop_tail(), Some(key("only")));
            assert!(list.is_empty());

            list.push_tail(key("only"));
            assert_eq!(list.pop_head(), Some(key("only")));
            assert!(list.is_empty());
        }
    }
}
