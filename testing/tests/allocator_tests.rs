//! Allocation tests: uniqueness under volume and concurrency, and the
//! capacity failure mode.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use std::collections::HashSet;
use std::sync::Arc;

use simtrack_core::allocator::{IccidConfig, IdentifierAllocator, is_luhn_valid};
use simtrack_core::{LifecycleManager, SimError};
use simtrack_testing::InMemorySimStore;
use simtrack_testing::mocks::test_clock;

use rand::SeedableRng;
use rand::rngs::StdRng;

fn manager(store: &InMemorySimStore) -> LifecycleManager<InMemorySimStore> {
    LifecycleManager::new(store.clone()).with_clock(Arc::new(test_clock()))
}

#[test]
fn ten_thousand_generated_iccids_are_unique_and_luhn_valid() {
    let allocator = IdentifierAllocator::default();
    let mut rng = StdRng::seed_from_u64(20_250_101);
    let mut seen = HashSet::with_capacity(10_000);
    for _ in 0..10_000 {
        let iccid = allocator.generate_iccid(&mut rng).unwrap();
        assert_eq!(iccid.len(), 19);
        assert!(is_luhn_valid(&iccid), "not Luhn-valid: {iccid}");
        assert!(seen.insert(iccid.clone()), "generated twice: {iccid}");
    }
}

#[tokio::test]
async fn store_backed_allocation_never_hands_out_a_taken_identifier() {
    let store = InMemorySimStore::new();
    let manager = manager(&store);
    for _ in 0..2_000 {
        manager.create(None).await.unwrap();
    }
    assert_eq!(store.sim_count().await, 2_000);

    let sims = store.all_sims().await;
    let iccids: HashSet<_> = sims.iter().map(|s| s.iccid.clone()).collect();
    assert_eq!(iccids.len(), sims.len());
    let msisdns: HashSet<_> = sims.iter().filter_map(|s| s.msisdn.clone()).collect();
    assert_eq!(msisdns.len(), sims.len());
    assert!(sims.iter().all(|s| is_luhn_valid(&s.iccid)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_importers_never_collide() {
    let store = InMemorySimStore::new();
    let manager = manager(&store);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..250 {
                manager.create(None).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.sim_count().await, 2_000);
    let sims = store.all_sims().await;
    let iccids: HashSet<_> = sims.iter().map(|s| s.iccid.clone()).collect();
    assert_eq!(iccids.len(), 2_000);
    let msisdns: HashSet<_> = sims.iter().filter_map(|s| s.msisdn.clone()).collect();
    assert_eq!(msisdns.len(), 2_000);
}

#[tokio::test]
async fn exhausted_identifier_space_is_a_capacity_error() {
    // One operator code and no fill digits: exactly one possible ICCID.
    let tiny = IdentifierAllocator::default()
        .with_iccid(IccidConfig {
            prefix: "89385".to_string(),
            operator_codes: vec!["01".to_string()],
            length: 8,
        })
        .with_max_attempts(5);

    let store = InMemorySimStore::new();
    let manager = manager(&store).with_allocator(tiny);

    let only = manager.create(None).await.unwrap();
    assert_eq!(only.iccid.len(), 8);

    let err = manager.create(None).await.unwrap_err();
    assert_eq!(err, SimError::IdentifierSpaceExhausted { attempts: 5 });
    assert!(!err.is_retryable());
    assert_eq!(store.sim_count().await, 1);
}
