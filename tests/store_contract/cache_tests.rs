//! DistributedCache interface tests.
//!
//! These tests verify the contract of the DistributedCache trait and of
//! cache transactions built on it. Each cache backend should run these tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use dualwrite::cache::{
    CacheEntry, CacheError, CacheTransaction, DistributedCache, TransactionOptions,
    TransactionState,
};

fn entry(key: &str) -> CacheEntry {
    CacheEntry::new(key, json!({ "key": key, "n": 1 }))
}

fn unique_key(name: &str) -> String {
    format!("{}-{}", name, Uuid::new_v4())
}

// =============================================================================
// immediate operations
// =============================================================================

pub async fn test_put_get<C: DistributedCache + ?Sized>(cache: &C) {
    let key = unique_key("put-get");
    cache.put(entry(&key)).await.expect("put should succeed");

    let found = cache.get(&key).await.expect("get should succeed");
    assert_eq!(found, Some(entry(&key)));
}

pub async fn test_get_nonexistent<C: DistributedCache + ?Sized>(cache: &C) {
    let found = cache
        .get(&unique_key("missing"))
        .await
        .expect("get should succeed");
    assert!(found.is_none());
}

pub async fn test_put_replaces<C: DistributedCache + ?Sized>(cache: &C) {
    let key = unique_key("replace");
    cache.put(CacheEntry::new(&key, json!(1))).await.expect("put");
    cache.put(CacheEntry::new(&key, json!(2))).await.expect("put");

    let found = cache.get(&key).await.expect("get").expect("exists");
    assert_eq!(found.payload, json!(2));
}

pub async fn test_remove<C: DistributedCache + ?Sized>(cache: &C) {
    let key = unique_key("remove");
    cache.put(entry(&key)).await.expect("put");
    cache.remove(&key).await.expect("remove should succeed");

    assert!(cache.get(&key).await.expect("get").is_none());
}

pub async fn test_entry_with_ttl_readable<C: DistributedCache + ?Sized>(cache: &C) {
    let key = unique_key("ttl");
    let with_ttl = entry(&key).with_ttl(Duration::from_secs(60));
    cache.put(with_ttl.clone()).await.expect("put");

    assert_eq!(cache.get(&key).await.expect("get"), Some(with_ttl));
}

// =============================================================================
// locks
// =============================================================================

pub async fn test_lock_excludes_other_owner<C: DistributedCache + ?Sized>(cache: &C) {
    let keys = vec![unique_key("lock")];
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let lease = Duration::from_secs(30);

    assert!(cache.try_lock(&keys, first, lease).await.expect("lock"));
    assert!(!cache.try_lock(&keys, second, lease).await.expect("lock"));

    cache.unlock(&keys, first).await.expect("unlock");
    assert!(cache.try_lock(&keys, second, lease).await.expect("lock"));
    cache.unlock(&keys, second).await.expect("unlock");
}

pub async fn test_lock_all_or_nothing<C: DistributedCache + ?Sized>(cache: &C) {
    let held = unique_key("held");
    let free = unique_key("free");
    let holder = Uuid::new_v4();
    let lease = Duration::from_secs(30);

    assert!(cache
        .try_lock(&[held.clone()], holder, lease)
        .await
        .expect("lock"));

    let contender = Uuid::new_v4();
    assert!(!cache
        .try_lock(&[free.clone(), held.clone()], contender, lease)
        .await
        .expect("lock"));

    // The free key must not have been taken by the failed attempt.
    let other = Uuid::new_v4();
    assert!(cache.try_lock(&[free.clone()], other, lease).await.expect("lock"));

    cache.unlock(&[held], holder).await.expect("unlock");
    cache.unlock(&[free], other).await.expect("unlock");
}

pub async fn test_entry_keys_separate_from_locks<C: DistributedCache + ?Sized>(cache: &C) {
    let key = unique_key("locked");
    let lookalike = format!("lock:{key}");
    let owner = Uuid::new_v4();
    let lease = Duration::from_secs(30);

    assert!(cache
        .try_lock(&[key.clone()], owner, lease)
        .await
        .expect("lock"));
    cache.put(entry(&lookalike)).await.expect("put");

    assert_eq!(
        cache.get(&lookalike).await.expect("get"),
        Some(entry(&lookalike))
    );
    assert!(
        !cache
            .try_lock(&[key.clone()], Uuid::new_v4(), lease)
            .await
            .expect("lock"),
        "an entry write must not disturb the lock"
    );

    cache.unlock(&[key.clone()], owner).await.expect("unlock");
    let next = Uuid::new_v4();
    assert!(cache.try_lock(&[key.clone()], next, lease).await.expect("lock"));
    assert_eq!(
        cache.get(&lookalike).await.expect("get"),
        Some(entry(&lookalike))
    );

    cache.unlock(&[key], next).await.expect("unlock");
    cache.remove(&lookalike).await.expect("remove");
}

pub async fn test_clear_keeps_locks<C: DistributedCache + ?Sized>(cache: &C) {
    let key = unique_key("clear-lock");
    let owner = Uuid::new_v4();
    let lease = Duration::from_secs(30);

    cache.put(entry(&key)).await.expect("put");
    assert!(cache
        .try_lock(&[key.clone()], owner, lease)
        .await
        .expect("lock"));

    cache.clear().await.expect("clear");

    assert!(cache.get(&key).await.expect("get").is_none());
    assert!(
        !cache
            .try_lock(&[key.clone()], Uuid::new_v4(), lease)
            .await
            .expect("lock"),
        "clear must not release a held lock"
    );
    cache.unlock(&[key], owner).await.expect("unlock");
}

// =============================================================================
// transactions
// =============================================================================

pub async fn test_transaction_commit_visible(cache: Arc<dyn DistributedCache>) {
    let key = unique_key("tx-commit");
    let tx = CacheTransaction::begin(cache.clone(), TransactionOptions::default());

    tx.put(entry(&key)).await.expect("stage");
    assert!(
        cache.get(&key).await.expect("get").is_none(),
        "staged write should not be visible"
    );

    tx.commit().await.expect("commit should succeed");
    assert_eq!(cache.get(&key).await.expect("get"), Some(entry(&key)));
    assert_eq!(tx.state().await, TransactionState::Committed);
}

pub async fn test_transaction_rollback_discards(cache: Arc<dyn DistributedCache>) {
    let key = unique_key("tx-rollback");
    let tx = CacheTransaction::begin(cache.clone(), TransactionOptions::default());

    tx.put(entry(&key)).await.expect("stage");
    tx.rollback().await.expect("rollback");
    tx.rollback().await.expect("second rollback is a no-op");

    assert!(cache.get(&key).await.expect("get").is_none());
    assert!(matches!(
        tx.commit().await,
        Err(CacheError::AlreadyResolved { .. })
    ));
}

pub async fn test_transaction_contention(cache: Arc<dyn DistributedCache>) {
    let key = unique_key("tx-contention");
    let options = TransactionOptions::default()
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(1)
        .with_retry_interval(Duration::from_millis(50));

    let holder = Uuid::new_v4();
    assert!(cache
        .try_lock(&[key.clone()], holder, Duration::from_secs(30))
        .await
        .expect("lock"));

    let tx = CacheTransaction::begin(cache.clone(), options);
    tx.put(entry(&key)).await.expect("stage");

    let err = tx.commit().await.expect_err("commit should fail under contention");
    assert!(matches!(
        err,
        CacheError::ContentionExhausted { attempts: 2, .. }
    ));
    assert_eq!(tx.state().await, TransactionState::Open);

    tx.rollback().await.expect("rollback");
    assert!(cache.get(&key).await.expect("get").is_none());
    cache.unlock(&[key], holder).await.expect("unlock");
}

/// Run all DistributedCache tests against a cache implementation.
///
/// `$cache` is an `Arc` of the concrete cache.
#[macro_export]
macro_rules! run_cache_tests {
    ($cache:expr) => {
        use $crate::store_contract::cache_tests::*;

        let cache = $cache;

        test_put_get(cache.as_ref()).await;
        println!("  test_put_get: PASSED");

        test_get_nonexistent(cache.as_ref()).await;
        println!("  test_get_nonexistent: PASSED");

        test_put_replaces(cache.as_ref()).await;
        println!("  test_put_replaces: PASSED");

        test_remove(cache.as_ref()).await;
        println!("  test_remove: PASSED");

        test_entry_with_ttl_readable(cache.as_ref()).await;
        println!("  test_entry_with_ttl_readable: PASSED");

        test_lock_excludes_other_owner(cache.as_ref()).await;
        println!("  test_lock_excludes_other_owner: PASSED");

        test_lock_all_or_nothing(cache.as_ref()).await;
        println!("  test_lock_all_or_nothing: PASSED");

        test_entry_keys_separate_from_locks(cache.as_ref()).await;
        println!("  test_entry_keys_separate_from_locks: PASSED");

        test_clear_keeps_locks(cache.as_ref()).await;
        println!("  test_clear_keeps_locks: PASSED");

        test_transaction_commit_visible(cache.clone()).await;
        println!("  test_transaction_commit_visible: PASSED");

        test_transaction_rollback_discards(cache.clone()).await;
        println!("  test_transaction_rollback_discards: PASSED");

        test_transaction_contention(cache.clone()).await;
        println!("  test_transaction_contention: PASSED");
    };
}
