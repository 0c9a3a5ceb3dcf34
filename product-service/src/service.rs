use crate::id_allocator::{AllocationError, IdAllocator};
use crate::model::{NewProduct, ProductId, ProductRecord, UpdateProduct, ValidationError};
use crate::retry::RetryPolicy;
use crate::stock::{AdjustError, StockAdjuster};
use crate::store::{CounterStore, ProductRepository, StoreError};
use common_observability::ProductMetrics;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("path id {path} does not match body id {body}")]
    IdMismatch { path: String, body: String },
    #[error("product {0} not found")]
    NotFound(ProductId),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Adjust(#[from] AdjustError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Facade over id allocation, record persistence and stock adjustment.
#[derive(Clone)]
pub struct ProductService {
    allocator: IdAllocator,
    repo: Arc<dyn ProductRepository>,
    adjuster: StockAdjuster,
}

impl ProductService {
    pub fn new(allocator: IdAllocator, repo: Arc<dyn ProductRepository>, adjuster: StockAdjuster) -> Self {
        Self { allocator, repo, adjuster }
    }

    /// Wires every component onto one backing store.
    pub fn from_store<S>(store: S, policy: RetryPolicy, metrics: Arc<ProductMetrics>, local_lock: bool) -> Self
    where
        S: CounterStore + ProductRepository + 'static,
    {
        let store = Arc::new(store);
        let allocator = IdAllocator::new(store.clone(), policy, metrics.clone()).with_local_lock(local_lock);
        let adjuster = StockAdjuster::new(store.clone(), policy, metrics);
        Self::new(allocator, store, adjuster)
    }

    pub async fn create(&self, input: NewProduct) -> Result<ProductRecord, ServiceError> {
        let draft = input.validate()?;
        let id = self.allocator.allocate_unique_id().await?;
        let record = draft.into_record(id);
        self.repo.add(&record).await?;
        tracing::info!(product_id = %record.id, name = %record.name, "Created product");
        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<ProductRecord>, ServiceError> {
        Ok(self.repo.get_all().await?)
    }

    pub async fn get(&self, id: &ProductId) -> Result<ProductRecord, ServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))
    }

    pub async fn update(&self, id: &ProductId, input: UpdateProduct) -> Result<ProductRecord, ServiceError> {
        if input.id != id.as_str() {
            return Err(ServiceError::IdMismatch { path: id.to_string(), body: input.id });
        }
        let record = input.validate()?;
        if !self.repo.update(&record).await? {
            return Err(ServiceError::NotFound(id.clone()));
        }
        tracing::info!(product_id = %id, "Updated product");
        Ok(record)
    }

    pub async fn delete(&self, id: &ProductId) -> Result<(), ServiceError> {
        if !self.repo.delete(id).await? {
            return Err(ServiceError::NotFound(id.clone()));
        }
        tracing::info!(product_id = %id, "Deleted product");
        Ok(())
    }

    pub async fn adjust_stock(&self, id: &ProductId, quantity: i32, increase: bool) -> Result<ProductRecord, ServiceError> {
        Ok(self.adjuster.adjust_stock(id, quantity, increase).await?)
    }
}
