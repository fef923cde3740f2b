//! RelationalStore interface tests.
//!
//! These tests verify the contract of the RelationalStore trait.
//! Each relational backend should run these tests.

use dualwrite::model::Record;
use dualwrite::storage::RelationalStore;

// =============================================================================
// save / commit tests
// =============================================================================

pub async fn test_committed_record_visible<S: RelationalStore + ?Sized>(store: &S) {
    let mut tx = store.begin().await.expect("begin should succeed");
    tx.save(Record::new(101, "committed"))
        .await
        .expect("save should succeed");
    tx.commit().await.expect("commit should succeed");

    let found = store
        .find_by_id(101)
        .await
        .expect("find should succeed")
        .expect("record should exist");
    assert_eq!(found.name, "committed");
}

pub async fn test_save_assigns_id<S: RelationalStore + ?Sized>(store: &S) {
    let mut tx = store.begin().await.expect("begin should succeed");
    let saved = tx
        .save(Record::unsaved("assigned"))
        .await
        .expect("save should succeed");
    tx.commit().await.expect("commit should succeed");

    let id = saved.id.expect("saved record should carry an id");
    let found = store.find_by_id(id).await.expect("find should succeed");
    assert_eq!(found, Some(saved));
}

pub async fn test_save_updates_existing<S: RelationalStore + ?Sized>(store: &S) {
    let mut tx = store.begin().await.expect("begin should succeed");
    tx.save(Record::new(102, "before")).await.expect("save");
    tx.commit().await.expect("commit");

    let mut tx = store.begin().await.expect("begin should succeed");
    tx.save(Record::new(102, "after")).await.expect("save");
    tx.commit().await.expect("commit");

    let found = store.find_by_id(102).await.expect("find").expect("exists");
    assert_eq!(found.name, "after");
}

// =============================================================================
// visibility tests
// =============================================================================

pub async fn test_uncommitted_invisible<S: RelationalStore + ?Sized>(store: &S) {
    let mut tx = store.begin().await.expect("begin should succeed");
    tx.save(Record::new(103, "pending")).await.expect("save");

    assert_eq!(
        tx.find_by_id(103).await.expect("find in tx"),
        Some(Record::new(103, "pending")),
        "transaction should see its own write"
    );
    assert!(
        store.find_by_id(103).await.expect("find").is_none(),
        "uncommitted record should not be visible"
    );

    tx.commit().await.expect("commit");
}

pub async fn test_rollback_discards<S: RelationalStore + ?Sized>(store: &S) {
    let mut tx = store.begin().await.expect("begin should succeed");
    tx.save(Record::new(104, "rolled back")).await.expect("save");
    tx.rollback().await.expect("rollback should succeed");

    assert!(store.find_by_id(104).await.expect("find").is_none());
}

pub async fn test_drop_discards<S: RelationalStore + ?Sized>(store: &S) {
    {
        let mut tx = store.begin().await.expect("begin should succeed");
        tx.save(Record::new(105, "dropped")).await.expect("save");
    }

    assert!(store.find_by_id(105).await.expect("find").is_none());
}

pub async fn test_find_nonexistent<S: RelationalStore + ?Sized>(store: &S) {
    assert!(store.find_by_id(999_999).await.expect("find").is_none());
}

/// Exhausts the identifier space on some backends, so it runs last.
pub async fn test_save_max_id<S: RelationalStore + ?Sized>(store: &S) {
    let mut tx = store.begin().await.expect("begin should succeed");
    let saved = tx
        .save(Record::new(i64::MAX, "max"))
        .await
        .expect("save should succeed");
    tx.commit().await.expect("commit should succeed");

    assert_eq!(saved.id, Some(i64::MAX));
    assert_eq!(
        store.find_by_id(i64::MAX).await.expect("find"),
        Some(Record::new(i64::MAX, "max"))
    );
}

/// Run all RelationalStore tests against a store implementation.
#[macro_export]
macro_rules! run_relational_store_tests {
    ($store:expr) => {
        use $crate::store_contract::relational_tests::*;

        test_committed_record_visible($store).await;
        println!("  test_committed_record_visible: PASSED");

        test_save_assigns_id($store).await;
        println!("  test_save_assigns_id: PASSED");

        test_save_updates_existing($store).await;
        println!("  test_save_updates_existing: PASSED");

        test_uncommitted_invisible($store).await;
        println!("  test_uncommitted_invisible: PASSED");

        test_rollback_discards($store).await;
        println!("  test_rollback_discards: PASSED");

        test_drop_discards($store).await;
        println!("  test_drop_discards: PASSED");

        test_find_nonexistent($store).await;
        println!("  test_find_nonexistent: PASSED");

        test_save_max_id($store).await;
        println!("  test_save_max_id: PASSED");
    };
}
