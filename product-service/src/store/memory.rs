use super::{CounterStore, CounterTx, ProductRepository, StoreError};
use crate::model::{CounterState, ProductId, ProductRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    counter: Option<i64>,
    /// Bumped on every committed counter write, including the seed insert.
    counter_version: u64,
    products: BTreeMap<ProductId, ProductRecord>,
}

/// In-process store with optimistic serializable validation.
///
/// Counter transactions record which counter version they read and which product
/// ids they saw as absent. Commit fails with [`StoreError::Conflict`] if either
/// observation no longer holds.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Overwrites (or removes) the counter row outside any transaction.
    pub async fn reset_counter(&self, last_issued: Option<i64>) {
        let mut state = self.state.lock().await;
        state.counter = last_issued;
        state.counter_version += 1;
    }

    pub async fn counter(&self) -> Option<i64> {
        self.state.lock().await.counter
    }
}

pub struct MemoryCounterTx {
    state: Arc<Mutex<State>>,
    read_version: Option<u64>,
    pending_counter: Option<i64>,
    absent_ids: Vec<ProductId>,
}

impl MemoryCounterTx {
    fn observe(&mut self, version: u64) {
        self.read_version.get_or_insert(version);
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn begin_serializable(&self) -> Result<Box<dyn CounterTx>, StoreError> {
        Ok(Box::new(MemoryCounterTx {
            state: Arc::clone(&self.state),
            read_version: None,
            pending_counter: None,
            absent_ids: Vec::new(),
        }))
    }
}

#[async_trait]
impl CounterTx for MemoryCounterTx {
    async fn read_counter(&mut self) -> Result<Option<CounterState>, StoreError> {
        let (counter, version) = {
            let state = self.state.lock().await;
            (state.counter, state.counter_version)
        };
        self.observe(version);
        let last_issued = self.pending_counter.or(counter);
        Ok(last_issued.map(|last_issued| CounterState { last_issued }))
    }

    async fn insert_counter(&mut self, seed: i64) -> Result<CounterState, StoreError> {
        let (exists, version) = {
            let state = self.state.lock().await;
            (state.counter.is_some(), state.counter_version)
        };
        if exists || self.pending_counter.is_some() {
            return Err(StoreError::Conflict("counter row seeded concurrently".into()));
        }
        self.observe(version);
        self.pending_counter = Some(seed);
        Ok(CounterState { last_issued: seed })
    }

    async fn write_counter(&mut self, last_issued: i64) -> Result<(), StoreError> {
        let (counter, version) = {
            let state = self.state.lock().await;
            (state.counter, state.counter_version)
        };
        if counter.is_none() && self.pending_counter.is_none() {
            return Err(StoreError::Corrupt("counter row vanished inside its own transaction".into()));
        }
        self.observe(version);
        self.pending_counter = Some(last_issued);
        Ok(())
    }

    async fn product_exists(&mut self, id: &ProductId) -> Result<bool, StoreError> {
        let exists = self.state.lock().await.products.contains_key(id);
        if !exists {
            self.absent_ids.push(id.clone());
        }
        Ok(exists)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(read_version) = self.read_version {
            if read_version != state.counter_version {
                return Err(StoreError::Conflict(format!(
                    "counter changed since read (version {read_version} -> {})",
                    state.counter_version
                )));
            }
        }
        if let Some(taken) = self.absent_ids.iter().find(|id| state.products.contains_key(*id)) {
            return Err(StoreError::Conflict(format!("product {taken} inserted since read")));
        }
        if let Some(value) = self.pending_counter {
            state.counter = Some(value);
            state.counter_version += 1;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn get_all(&self) -> Result<Vec<ProductRecord>, StoreError> {
        Ok(self.state.lock().await.products.values().cloned().collect())
    }

    async fn get_by_id(&self, id: &ProductId) -> Result<Option<ProductRecord>, StoreError> {
        Ok(self.state.lock().await.products.get(id).cloned())
    }

    async fn add(&self, record: &ProductRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.products.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.clone()));
        }
        state.products.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &ProductRecord) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.products.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &ProductId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.products.remove(id).is_some())
    }

    async fn exists(&self, id: &ProductId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.products.contains_key(id))
    }

    async fn compare_and_set_stock(&self, id: &ProductId, expected: i32, new: i32) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.products.get_mut(id) {
            Some(record) if record.stock_available == expected => {
                record.stock_available = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_money::Price;

    fn record(id: &str, stock: i32) -> ProductRecord {
        ProductRecord {
            id: ProductId::parse(id).unwrap(),
            name: "Widget".into(),
            description: None,
            stock_available: stock,
            price: Price::zero(),
        }
    }

    #[tokio::test]
    async fn interleaved_counter_writes_conflict() {
        let store = MemoryStore::new();
        store.reset_counter(Some(100_000)).await;

        let mut first = store.begin_serializable().await.unwrap();
        let mut second = store.begin_serializable().await.unwrap();
        let a = first.read_counter().await.unwrap().unwrap();
        let b = second.read_counter().await.unwrap().unwrap();
        first.write_counter(a.last_issued + 1).await.unwrap();
        second.write_counter(b.last_issued + 1).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.counter().await, Some(100_001));
    }

    #[tokio::test]
    async fn concurrent_seed_conflicts() {
        let store = MemoryStore::new();
        let mut first = store.begin_serializable().await.unwrap();
        let mut second = store.begin_serializable().await.unwrap();
        assert!(first.read_counter().await.unwrap().is_none());
        assert!(second.read_counter().await.unwrap().is_none());
        first.insert_counter(100_000).await.unwrap();
        second.insert_counter(100_000).await.unwrap();
        first.commit().await.unwrap();
        assert!(matches!(second.commit().await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn insert_after_visible_seed_conflicts() {
        let store = MemoryStore::new();
        store.reset_counter(Some(100_000)).await;
        let mut tx = store.begin_serializable().await.unwrap();
        assert!(matches!(tx.insert_counter(100_000).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn product_inserted_after_absence_check_conflicts() {
        let store = MemoryStore::new();
        let id = ProductId::parse("100001").unwrap();
        let mut tx = store.begin_serializable().await.unwrap();
        assert!(!tx.product_exists(&id).await.unwrap());
        store.add(&record("100001", 1)).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn rollback_discards_pending_counter() {
        let store = MemoryStore::new();
        let mut tx = store.begin_serializable().await.unwrap();
        tx.insert_counter(100_000).await.unwrap();
        tx.write_counter(100_001).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(store.counter().await, None);
    }

    #[tokio::test]
    async fn repository_crud_and_cas() {
        let store = MemoryStore::new();
        let id = ProductId::parse("100001").unwrap();
        store.add(&record("100001", 5)).await.unwrap();
        assert!(matches!(store.add(&record("100001", 5)).await, Err(StoreError::Duplicate(_))));

        assert!(!store.compare_and_set_stock(&id, 4, 9).await.unwrap());
        assert!(store.compare_and_set_stock(&id, 5, 9).await.unwrap());
        assert_eq!(store.get_by_id(&id).await.unwrap().unwrap().stock_available, 9);

        assert!(!store.update(&record("100002", 1)).await.unwrap());
        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
