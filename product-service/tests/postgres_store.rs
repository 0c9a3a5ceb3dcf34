mod support;

use product_service::id_allocator::IdAllocator;
use product_service::retry::RetryPolicy;
use product_service::store::{CounterStore, PgStore, ProductRepository, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use support::{metrics, pid, record, test_database_url};

async fn fresh_store() -> Option<PgStore> {
    let url = test_database_url()?;
    let store = PgStore::connect(&url, 16).await.expect("connect to test database");
    store.migrate().await.expect("run migrations");
    sqlx::query("TRUNCATE products, product_id_tracker")
        .execute(store.pool())
        .await
        .expect("truncate tables");
    Some(store)
}

// The tests below share one database, so they run as a single test to avoid truncating under each other.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn postgres_store_round_trip() {
    let Some(store) = fresh_store().await else { return };

    // Seeding and first id.
    let allocator = IdAllocator::new(Arc::new(store.clone()), RetryPolicy::default(), metrics());
    assert_eq!(allocator.allocate_unique_id().await.unwrap().as_str(), "100001");

    // Concurrent allocations across pooled connections without the local lock.
    let policy = RetryPolicy {
        max_attempts: 50,
        base_delay: Duration::from_millis(2),
        max_delay: Duration::from_millis(50),
        attempt_timeout: Duration::from_secs(5),
    };
    let allocator = IdAllocator::new(Arc::new(store.clone()), policy, metrics());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let allocator = allocator.clone();
        handles.push(tokio::spawn(async move { allocator.allocate_unique_id().await }));
    }
    let mut ids = HashSet::new();
    for handle in handles {
        if let Ok(id) = handle.await.unwrap() {
            assert!(ids.insert(id), "duplicate id issued");
        }
    }
    assert!(!ids.is_empty());

    // Serialization failures surface as transient conflicts.
    let mut first = store.begin_serializable().await.unwrap();
    let mut second = store.begin_serializable().await.unwrap();
    let a = first.read_counter().await.unwrap().unwrap();
    let b = second.read_counter().await.unwrap().unwrap();
    first.write_counter(a.last_issued + 1).await.unwrap();
    first.commit().await.unwrap();
    let err = match second.write_counter(b.last_issued + 1).await {
        Ok(()) => second.commit().await.unwrap_err(),
        Err(err) => err,
    };
    assert!(err.is_transient(), "expected conflict, got {err}");

    // Repository CRUD and stock compare-and-swap.
    let product = record("200001", 5);
    store.add(&product).await.unwrap();
    assert!(matches!(store.add(&product).await, Err(StoreError::Duplicate(_))));
    assert_eq!(store.get_by_id(&pid("200001")).await.unwrap(), Some(product.clone()));
    assert!(store.exists(&pid("200001")).await.unwrap());
    assert!(!store.compare_and_set_stock(&pid("200001"), 4, 1).await.unwrap());
    assert!(store.compare_and_set_stock(&pid("200001"), 5, 1).await.unwrap());
    assert!(!store.update(&record("200002", 1)).await.unwrap());
    assert!(store.delete(&pid("200001")).await.unwrap());
    assert!(store.get_by_id(&pid("200001")).await.unwrap().is_none());
}
