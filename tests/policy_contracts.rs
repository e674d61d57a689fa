//! Eviction-order contracts for the six policies, exercised through the
//! public `Policy` interface, plus property tests for the identifier
//! digests and the drain behavior.

use proptest::prelude::*;
use rustc_hash::FxHashSet;
use stashkit::ident::{CacheKey, Identifier};
use stashkit::policy::{DEFAULT_RNG_SEED, Policy, PolicyKind};
use tokio::sync::mpsc;

fn policy(kind: PolicyKind) -> Policy {
    let (events, _rx) = mpsc::unbounded_channel();
    Policy::new(kind, events, DEFAULT_RNG_SEED)
}

fn key(name: &str) -> CacheKey {
    CacheKey::from_digest(name)
}

fn track_all(p: &mut Policy, names: &[&str]) {
    for name in names {
        p.track(&key(name));
    }
}

#[test]
fn lru_order() {
    // Track A, B, C; hit A; the least recent is then B.
    let mut p = policy(PolicyKind::Lru);
    track_all(&mut p, &["A", "B", "C"]);
    p.hit(&key("A"));

    assert_eq!(p.evict(), Some(key("B")));

    // Left: {C, A} with A most recent.
    assert_eq!(p.evict(), Some(key("C")));
    assert_eq!(p.evict(), Some(key("A")));
}

#[test]
fn mru_order() {
    // Track A, B, C; hit A makes it the most recent, so A evicts first.
    let mut p = policy(PolicyKind::Mru);
    track_all(&mut p, &["A", "B", "C"]);
    p.hit(&key("A"));

    assert_eq!(p.evict(), Some(key("A")));

    // Left: {B, C} with C most recent.
    assert_eq!(p.evict(), Some(key("C")));
    assert_eq!(p.evict(), Some(key("B")));
}

#[test]
fn lfu_with_ties() {
    // B gets two hits, C one; A at zero is the unique minimum, then C.
    let mut p = policy(PolicyKind::Lfu);
    track_all(&mut p, &["A", "B", "C"]);
    p.hit(&key("B"));
    p.hit(&key("B"));
    p.hit(&key("C"));

    assert_eq!(p.evict(), Some(key("A")));
    assert_eq!(p.evict(), Some(key("C")));
    assert_eq!(p.evict(), Some(key("B")));
}

#[test]
fn fifo_ignores_hits() {
    let mut p = policy(PolicyKind::Fifo);
    track_all(&mut p, &["A", "B", "C"]);
    p.hit(&key("A"));

    assert_eq!(p.evict(), Some(key("A")));
    assert_eq!(p.evict(), Some(key("B")));
    assert_eq!(p.evict(), Some(key("C")));
}

#[test]
fn mfu_prefers_the_hottest() {
    let mut p = policy(PolicyKind::Mfu);
    track_all(&mut p, &["A", "B", "C"]);
    p.hit(&key("C"));
    p.hit(&key("C"));
    p.hit(&key("B"));

    assert_eq!(p.evict(), Some(key("C")));
    assert_eq!(p.evict(), Some(key("B")));
    assert_eq!(p.evict(), Some(key("A")));
}

#[test]
fn rr_evicts_members_until_empty() {
    let mut p = policy(PolicyKind::Rr);
    let names = ["A", "B", "C", "D", "E"];
    track_all(&mut p, &names);

    let expected: FxHashSet<CacheKey> = names.iter().map(|n| key(n)).collect();
    let mut seen = FxHashSet::default();
    for remaining in (0..names.len()).rev() {
        let victim = p.evict().expect("policy still has members");
        assert!(expected.contains(&victim));
        assert!(seen.insert(victim), "victim returned twice");
        assert_eq!(p.len(), remaining);
    }
    assert_eq!(p.evict(), None);
}

#[test]
fn snapshot_identity_holds_mid_workload() {
    for kind in PolicyKind::ALL {
        let mut p = policy(kind);
        for name in ["k1", "k2", "k3", "k4", "k5"] {
            p.track(&key(name));
        }
        p.hit(&key("k2"));
        p.hit(&key("k4"));
        p.hit(&key("k4"));
        p.stop_tracking(&key("k3"));

        let snapshot = p.snapshot();
        let valid: FxHashSet<CacheKey> = p.tracked_keys().into_iter().collect();

        let mut restored = policy(kind);
        restored.apply_snapshot(&valid, snapshot.clone());
        assert_eq!(restored.snapshot(), snapshot, "{kind}");
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn digest_ignores_map_insertion_order(
        pairs in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..8)
    ) {
        let forward = Identifier::map(
            pairs.iter().map(|(k, v)| (k.clone(), Identifier::from(*v))),
        );
        let backward = Identifier::map(
            pairs.iter().rev().map(|(k, v)| (k.clone(), Identifier::from(*v))),
        );
        prop_assert_eq!(forward.digest(), backward.digest());
    }

    #[test]
    fn digest_is_sensitive_to_sequence_order(
        items in proptest::collection::vec(any::<i64>(), 2..8)
    ) {
        let forward = Identifier::seq(items.iter().map(|v| Identifier::from(*v)));
        let mut reversed_items = items.clone();
        reversed_items.reverse();
        let reversed = Identifier::seq(reversed_items.iter().map(|v| Identifier::from(*v)));

        if items != reversed_items {
            prop_assert_ne!(forward.digest(), reversed.digest());
        } else {
            prop_assert_eq!(forward.digest(), reversed.digest());
        }
    }

    #[test]
    fn digest_changes_with_any_value_change(base in "[a-z]{1,12}", extra in "[a-z]{1,12}") {
        let one = Identifier::from(base.clone());
        let two = Identifier::from(format!("{base}{extra}"));
        prop_assert_ne!(one.digest(), two.digest());
    }

    #[test]
    fn every_policy_drains_each_tracked_key_exactly_once(
        names in proptest::collection::btree_set("[a-z0-9]{1,10}", 1..24)
    ) {
        for kind in PolicyKind::ALL {
            let mut p = policy(kind);
            for name in &names {
                p.track(&key(name));
            }

            let mut drained = Vec::new();
            while let Some(victim) = p.evict() {
                drained.push(victim);
            }

            drained.sort();
            let mut expected: Vec<CacheKey> = names.iter().map(|n| key(n)).collect();
            expected.sort();
            prop_assert_eq!(&drained, &expected, "{}", kind);
        }
    }
}
