use crate::model::{ProductId, ProductRecord};
use crate::retry::RetryPolicy;
use crate::store::{ProductRepository, StoreError};
use common_observability::ProductMetrics;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum AdjustError {
    #[error("quantity must be a positive amount that keeps stock in range, got {0}")]
    InvalidQuantity(i32),
    #[error("product {0} not found")]
    NotFound(ProductId),
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i32, available: i32 },
    #[error("stock update for {id} lost the race {attempts} times")]
    Contention { id: ProductId, attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AdjustError {
    fn outcome_label(&self) -> &'static str {
        match self {
            AdjustError::InvalidQuantity(_) => "invalid_quantity",
            AdjustError::NotFound(_) => "not_found",
            AdjustError::InsufficientStock { .. } => "insufficient_stock",
            AdjustError::Contention { .. } => "contention",
            AdjustError::Store(_) => "store_error",
        }
    }
}

/// New stock level after moving `quantity` units in or out of `available`.
pub fn apply_adjustment(available: i32, quantity: i32, increase: bool) -> Result<i32, AdjustError> {
    if quantity <= 0 {
        return Err(AdjustError::InvalidQuantity(quantity));
    }
    if increase {
        available.checked_add(quantity).ok_or(AdjustError::InvalidQuantity(quantity))
    } else if available < quantity {
        Err(AdjustError::InsufficientStock { requested: quantity, available })
    } else {
        Ok(available - quantity)
    }
}

#[derive(Clone)]
pub struct StockAdjuster {
    repo: Arc<dyn ProductRepository>,
    policy: RetryPolicy,
    metrics: Arc<ProductMetrics>,
}

impl StockAdjuster {
    pub fn new(repo: Arc<dyn ProductRepository>, policy: RetryPolicy, metrics: Arc<ProductMetrics>) -> Self {
        Self { repo, policy, metrics }
    }

    /// Read, compute, then compare-and-swap the stock level; a lost swap re-reads
    /// and tries again until the retry budget runs out.
    pub async fn adjust_stock(&self, id: &ProductId, quantity: i32, increase: bool) -> Result<ProductRecord, AdjustError> {
        let direction = if increase { "increase" } else { "decrease" };
        let result = self.adjust_with_retries(id, quantity, increase).await;
        match &result {
            Ok(record) => {
                self.metrics.stock_adjustment(direction, "applied");
                tracing::info!(product_id = %id, quantity, direction, stock_available = record.stock_available, "Adjusted stock");
            }
            Err(err @ AdjustError::Store(_)) => {
                self.metrics.stock_adjustment(direction, err.outcome_label());
                tracing::error!(product_id = %id, quantity, direction, error = %err, "Stock adjustment failed");
            }
            Err(err) => {
                self.metrics.stock_adjustment(direction, err.outcome_label());
                tracing::warn!(product_id = %id, quantity, direction, error = %err, "Stock adjustment rejected");
            }
        }
        result
    }

    async fn adjust_with_retries(&self, id: &ProductId, quantity: i32, increase: bool) -> Result<ProductRecord, AdjustError> {
        if quantity <= 0 {
            return Err(AdjustError::InvalidQuantity(quantity));
        }
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let mut record = self
                .repo
                .get_by_id(id)
                .await?
                .ok_or_else(|| AdjustError::NotFound(id.clone()))?;
            let updated = apply_adjustment(record.stock_available, quantity, increase)?;
            if self.repo.compare_and_set_stock(id, record.stock_available, updated).await? {
                record.stock_available = updated;
                return Ok(record);
            }
            self.metrics.stock_cas_retries.inc();
            tracing::debug!(product_id = %id, attempt, "Stock changed underneath adjustment; retrying");
            if attempt < max_attempts {
                sleep(self.policy.backoff(attempt)).await;
            }
        }
        Err(AdjustError::Contention { id: id.clone(), attempts: max_attempts })
    }
}
