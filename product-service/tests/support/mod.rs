#![allow(dead_code)]

use async_trait::async_trait;
use common_money::Price;
use common_observability::ProductMetrics;
use product_service::model::{CounterState, ProductId, ProductRecord};
use product_service::store::{CounterStore, CounterTx, MemoryStore, ProductRepository, StoreError};
use std::env;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn metrics() -> Arc<ProductMetrics> {
    Arc::new(ProductMetrics::new().expect("metrics registry"))
}

pub fn record(id: &str, stock: i32) -> ProductRecord {
    ProductRecord {
        id: ProductId::parse(id).expect("valid test id"),
        name: format!("Product {id}"),
        description: None,
        stock_available: stock,
        price: "9.99".parse::<Price>().expect("valid price"),
    }
}

pub fn pid(id: &str) -> ProductId {
    ProductId::parse(id).expect("valid test id")
}

/// Postgres URL for integration tests, or `None` (and a note on stderr) to skip them.
pub fn test_database_url() -> Option<String> {
    match env::var("PRODUCT_TEST_DATABASE_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping product-service Postgres tests: set PRODUCT_TEST_DATABASE_URL to run them.");
            None
        }
    }
}

/// Counts transactions opened against the wrapped store.
#[derive(Clone)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub begins: Arc<AtomicU32>,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self { inner, begins: Arc::new(AtomicU32::new(0)) }
    }

    pub fn begins(&self) -> u32 { self.begins.load(Ordering::SeqCst) }
}

#[async_trait]
impl CounterStore for CountingStore {
    async fn begin_serializable(&self) -> Result<Box<dyn CounterTx>, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.inner.begin_serializable().await
    }
}

/// Fails the first `failures` commits with a serialization conflict.
#[derive(Clone)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    remaining_failures: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, failures: u32) -> Self {
        Self { inner, remaining_failures: Arc::new(AtomicU32::new(failures)) }
    }
}

struct FlakyTx {
    inner: Box<dyn CounterTx>,
    remaining_failures: Arc<AtomicU32>,
}

#[async_trait]
impl CounterStore for FlakyStore {
    async fn begin_serializable(&self) -> Result<Box<dyn CounterTx>, StoreError> {
        let inner = self.inner.begin_serializable().await?;
        Ok(Box::new(FlakyTx { inner, remaining_failures: self.remaining_failures.clone() }))
    }
}

#[async_trait]
impl CounterTx for FlakyTx {
    async fn read_counter(&mut self) -> Result<Option<CounterState>, StoreError> { self.inner.read_counter().await }
    async fn insert_counter(&mut self, seed: i64) -> Result<CounterState, StoreError> { self.inner.insert_counter(seed).await }
    async fn write_counter(&mut self, last_issued: i64) -> Result<(), StoreError> { self.inner.write_counter(last_issued).await }
    async fn product_exists(&mut self, id: &ProductId) -> Result<bool, StoreError> { self.inner.product_exists(id).await }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            self.inner.rollback().await?;
            return Err(StoreError::Conflict("could not serialize access due to concurrent update".into()));
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> { self.inner.rollback().await }
}

/// Every transaction fails to open with a non-transient error.
pub struct BrokenStore;

#[async_trait]
impl CounterStore for BrokenStore {
    async fn begin_serializable(&self) -> Result<Box<dyn CounterTx>, StoreError> {
        Err(StoreError::Corrupt("counter row holds a negative value".into()))
    }
}

/// Opens transactions only after `delay`, so per-attempt timeouts fire.
pub struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
}

#[async_trait]
impl CounterStore for SlowStore {
    async fn begin_serializable(&self) -> Result<Box<dyn CounterTx>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.begin_serializable().await
    }
}

/// Repository whose stock compare-and-swap always loses the race.
pub struct StaleStockRepo {
    pub inner: MemoryStore,
}

#[async_trait]
impl ProductRepository for StaleStockRepo {
    async fn get_all(&self) -> Result<Vec<ProductRecord>, StoreError> { self.inner.get_all().await }
    async fn get_by_id(&self, id: &ProductId) -> Result<Option<ProductRecord>, StoreError> { self.inner.get_by_id(id).await }
    async fn add(&self, record: &ProductRecord) -> Result<(), StoreError> { self.inner.add(record).await }
    async fn update(&self, record: &ProductRecord) -> Result<bool, StoreError> { self.inner.update(record).await }
    async fn delete(&self, id: &ProductId) -> Result<bool, StoreError> { self.inner.delete(id).await }
    async fn exists(&self, id: &ProductId) -> Result<bool, StoreError> { self.inner.exists(id).await }

    async fn compare_and_set_stock(&self, _id: &ProductId, _expected: i32, _new: i32) -> Result<bool, StoreError> {
        Ok(false)
    }
}
