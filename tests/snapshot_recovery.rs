//! Snapshot write/replay on the memory driver: entry and ordering
//! round trips, TTL handling across a restart, and tolerance of empty or
//! corrupt snapshot files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stashkit::config::{MemoryDriverConfig, RecoverySettings};
use stashkit::driver::MemoryDriver;
use stashkit::entry::{EntryOptions, EntryPayload};
use stashkit::ident::Identifier;
use stashkit::metrics::CounterRecorder;
use stashkit::policy::{PolicyKind, PolicySnapshot};
use stashkit::snapshot;
use tempfile::TempDir;

fn recovering_driver(snapshot_path: PathBuf) -> MemoryDriver {
    let config = MemoryDriverConfig {
        max_size: 1 << 20,
        evict_from_others: false,
        recovery: Some(RecoverySettings {
            snapshot_file_path: snapshot_path,
            // Long interval: the tests snapshot explicitly.
            snapshot_interval: Duration::from_secs(3_600),
        }),
        rng_seed: Some(7),
    };
    MemoryDriver::new(config, Arc::new(CounterRecorder::new()))
}

fn payload(len: usize) -> EntryPayload {
    EntryPayload::new(vec![0x5A; len])
}

fn payload_with_ttl(len: usize, ttl: u64) -> EntryPayload {
    EntryPayload {
        options: EntryOptions {
            ttl,
            ..Default::default()
        },
        ..payload(len)
    }
}

#[tokio::test]
async fn snapshot_restores_entries_and_eviction_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.dat");

    let (a, b, c) = (
        Identifier::from("a"),
        Identifier::from("b"),
        Identifier::from("c"),
    );

    {
        let driver = recovering_driver(path.clone());
        driver.init().await.unwrap();
        for id in [&a, &b, &c] {
            driver.set(id, PolicyKind::Lru, payload(24), false).await.unwrap();
        }
        // `a` becomes the most recent; LRU order is now b, c, a.
        driver.get(&a, PolicyKind::Lru).await.unwrap();
        driver.snapshot_now().await.unwrap();
        driver.close();
    }

    let restored = recovering_driver(path.clone());
    restored.init().await.unwrap();

    // The restored policy reproduces the pre-restart order: b, c, a.
    restored.snapshot_now().await.unwrap();
    let blob = snapshot::read_file(&path).unwrap().unwrap();
    match &blob.policies[&PolicyKind::Lru] {
        PolicySnapshot::Lru { key_order } => {
            assert_eq!(
                key_order,
                &vec![b.cache_key(), c.cache_key(), a.cache_key()]
            );
        }
        other => panic!("unexpected snapshot variant {other:?}"),
    }

    // Entries survive with their bookkeeping.
    let entry_a = restored.get(&a, PolicyKind::Lru).await.unwrap().unwrap();
    assert_eq!(entry_a.data, vec![0x5A; 24]);
    assert_eq!(entry_a.hits, 2);
    assert!(restored.get(&b, PolicyKind::Lru).await.unwrap().is_some());
    assert!(restored.in_sync(PolicyKind::Lru).await);
}

#[tokio::test]
async fn unchanged_state_re_encodes_byte_identically() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.dat");

    let driver = recovering_driver(path.clone());
    driver.init().await.unwrap();
    for name in ["k1", "k2", "k3"] {
        driver
            .set(&Identifier::from(name), PolicyKind::Fifo, payload(16), false)
            .await
            .unwrap();
    }

    driver.snapshot_now().await.unwrap();
    let first = std::fs::read(&path).unwrap();
    driver.snapshot_now().await.unwrap();
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread")]
async fn entries_expired_before_recovery_are_dropped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.dat");
    let id = Identifier::from("stale");

    {
        let driver = recovering_driver(path.clone());
        driver.init().await.unwrap();
        driver
            .set(&id, PolicyKind::Lru, payload_with_ttl(8, 100), false)
            .await
            .unwrap();
        driver.snapshot_now().await.unwrap();
        driver.close();
    }

    // The TTL elapses while "down".
    tokio::time::sleep(Duration::from_millis(400)).await;

    let restored = recovering_driver(path.clone());
    restored.init().await.unwrap();
    assert!(restored.get(&id, PolicyKind::Lru).await.unwrap().is_none());
    assert!(restored.in_sync(PolicyKind::Lru).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn live_ttls_are_rearmed_with_the_remaining_duration() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.dat");
    let id = Identifier::from("still-warm");

    {
        let driver = recovering_driver(path.clone());
        driver.init().await.unwrap();
        driver
            .set(&id, PolicyKind::Lru, payload_with_ttl(8, 2_000), false)
            .await
            .unwrap();
        driver.snapshot_now().await.unwrap();
        driver.close();
    }

    let restored = recovering_driver(path.clone());
    restored.init().await.unwrap();

    // Restart happened well inside the TTL: the entry is present.
    assert!(restored.get(&id, PolicyKind::Lru).await.unwrap().is_some());

    // The re-armed timer still fires at the original deadline.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(restored.get(&id, PolicyKind::Lru).await.unwrap().is_none());
    assert!(restored.in_sync(PolicyKind::Lru).await);
}

#[tokio::test]
async fn invalidation_links_survive_recovery() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.dat");
    let tagged = Identifier::from("tagged");
    let plain = Identifier::from("plain");

    {
        let driver = recovering_driver(path.clone());
        driver.init().await.unwrap();
        let with_tag = EntryPayload {
            options: EntryOptions {
                invalidated_by: vec![Identifier::from("tenant-3")],
                ..Default::default()
            },
            ..payload(8)
        };
        driver.set(&tagged, PolicyKind::Mru, with_tag, false).await.unwrap();
        driver.set(&plain, PolicyKind::Mru, payload(8), false).await.unwrap();
        driver.snapshot_now().await.unwrap();
        driver.close();
    }

    let restored = recovering_driver(path.clone());
    restored.init().await.unwrap();

    let removed = restored
        .invalidate(&[Identifier::from("tenant-3")], PolicyKind::Mru)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(restored.get(&tagged, PolicyKind::Mru).await.unwrap().is_none());
    assert!(restored.get(&plain, PolicyKind::Mru).await.unwrap().is_some());
}

#[tokio::test]
async fn empty_snapshot_file_is_valid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.dat");
    std::fs::write(&path, b"").unwrap();

    let driver = recovering_driver(path.clone());
    driver.init().await.unwrap();

    let id = Identifier::from("fresh");
    assert!(driver.get(&id, PolicyKind::Lru).await.unwrap().is_none());
    assert!(driver.set(&id, PolicyKind::Lru, payload(8), false).await.unwrap());
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty_instead_of_failing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memory.dat");
    std::fs::write(&path, [0xFF, 0x00, 0xBA, 0xD1]).unwrap();

    let driver = recovering_driver(path.clone());
    driver.init().await.unwrap();

    let usage = driver.resource_usage().await;
    assert_eq!(usage.total_entries, 0);

    // The driver still works, and the next snapshot replaces the garbage.
    let id = Identifier::from("recovered");
    driver.set(&id, PolicyKind::Rr, payload(8), false).await.unwrap();
    driver.snapshot_now().await.unwrap();
    let blob = snapshot::read_file(&path).unwrap().unwrap();
    assert_eq!(blob.caches[&PolicyKind::Rr].len(), 1);
}
