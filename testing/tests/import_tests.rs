//! Import-path tests: checksum re-validation and the duplicate-skip policy.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic on impossible shapes

use std::sync::Arc;

use simtrack_core::{
    CustomerId, IdentifierKind, ImportOutcome, ImportSim, LifecycleManager, SimError, SimEventKind,
    SimStatus,
};
use simtrack_testing::InMemorySimStore;
use simtrack_testing::mocks::test_clock;

// Hand-checked Luhn-valid 19-digit ICCIDs.
const VALID_ICCID: &str = "8938501000000000007";
const VALID_ICCID_2: &str = "8938502000000000006";

fn manager(store: &InMemorySimStore) -> LifecycleManager<InMemorySimStore> {
    LifecycleManager::new(store.clone()).with_clock(Arc::new(test_clock()))
}

fn row(iccid: &str, msisdn: Option<&str>) -> ImportSim {
    ImportSim {
        iccid: iccid.to_string(),
        msisdn: msisdn.map(str::to_string),
        tariff_plan: None,
        note: Some("csv".to_string()),
    }
}

#[tokio::test]
async fn import_accepts_a_valid_row_and_records_it() {
    let store = InMemorySimStore::new();
    let manager = manager(&store);

    let outcome = manager
        .import(row(VALID_ICCID, Some("+385911234567")))
        .await
        .unwrap();
    let ImportOutcome::Imported(sim) = outcome else {
        panic!("expected an imported sim");
    };
    assert_eq!(sim.iccid, VALID_ICCID);
    assert_eq!(sim.msisdn.as_deref(), Some("+385911234567"));
    assert_eq!(sim.status, SimStatus::Available);

    let events = manager.events(sim.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SimEventKind::Imported);
    assert_eq!(events[0].new_status, Some(SimStatus::Available));
    assert_eq!(events[0].note.as_deref(), Some("csv"));
}

#[tokio::test]
async fn import_skips_an_existing_iccid() {
    let store = InMemorySimStore::new();
    let manager = manager(&store);

    let first = manager.import(row(VALID_ICCID, None)).await.unwrap();
    let ImportOutcome::Imported(first) = first else {
        panic!("expected an imported sim");
    };

    let second = manager.import(row(VALID_ICCID, None)).await.unwrap();
    assert_eq!(
        second,
        ImportOutcome::SkippedDuplicate {
            iccid: VALID_ICCID.to_string()
        }
    );

    // Nothing was written for the skipped row.
    assert_eq!(store.sim_count().await, 1);
    assert_eq!(store.event_count(first.id).await, 1);
}

#[tokio::test]
async fn import_rechecks_the_checksum() {
    let store = InMemorySimStore::new();
    let manager = manager(&store);

    // Same digits as a valid ICCID with the check digit off by one.
    let err = manager
        .import(row("8938501000000000008", None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SimError::InvalidIdentifier {
            kind: IdentifierKind::Iccid,
            ..
        }
    ));
    assert_eq!(store.sim_count().await, 0);
}

#[tokio::test]
async fn import_rejects_malformed_identifiers() {
    let store = InMemorySimStore::new();
    let manager = manager(&store);

    // Too short.
    assert!(manager.import(row("89385017", None)).await.is_err());
    // Non-digit.
    assert!(
        manager
            .import(row("89385010000000000x7", None))
            .await
            .is_err()
    );
    // Bad MSISDN shape on an otherwise valid row.
    let err = manager
        .import(row(VALID_ICCID, Some("0911234567")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SimError::InvalidIdentifier {
            kind: IdentifierKind::Msisdn,
            ..
        }
    ));
    assert_eq!(store.sim_count().await, 0);
}

#[tokio::test]
async fn msisdn_collision_on_a_fresh_iccid_is_an_error() {
    let store = InMemorySimStore::new();
    let manager = manager(&store);

    manager
        .import(row(VALID_ICCID, Some("+385911234567")))
        .await
        .unwrap();
    let err = manager
        .import(row(VALID_ICCID_2, Some("+385911234567")))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SimError::DuplicateIdentifier {
            kind: IdentifierKind::Msisdn
        }
    );
    assert_eq!(store.sim_count().await, 1);
}

#[tokio::test]
async fn imported_sims_enter_the_normal_lifecycle() {
    let store = InMemorySimStore::new();
    let manager = manager(&store);
    let owner = CustomerId(uuid::Uuid::new_v4());

    let ImportOutcome::Imported(sim) = manager.import(row(VALID_ICCID, None)).await.unwrap()
    else {
        panic!("expected an imported sim");
    };
    let sim = manager.reserve(sim.id, owner).await.unwrap();
    let sim = manager.activate(sim.id, None, None).await.unwrap();
    assert_eq!(sim.status, SimStatus::Active);
    assert_eq!(sim.customer, Some(owner));
}
