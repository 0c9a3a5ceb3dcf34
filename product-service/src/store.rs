//! Persistence seams for the product service.
//!
//! [`CounterStore`] / [`CounterTx`] expose exactly what the id allocator needs from
//! the database: a serializable transaction in which the singleton counter row can
//! be read, seeded and advanced, and in which product-id existence can be checked.
//! [`ProductRepository`] covers the plain record reads and writes.
//!
//! Both traits are implemented by [`PgStore`] (PostgreSQL via sqlx) and by
//! [`MemoryStore`], an in-process store that validates read sets at commit time so
//! it rejects the same interleavings a serializable database would.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::model::{CounterState, ProductId, ProductRecord};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// SQLSTATE for `serialization_failure`.
pub const PG_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for `deadlock_detected`.
pub const PG_DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE for `unique_violation`.
pub const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another transaction won the race; the attempt can be replayed.
    #[error("transaction conflict: {0}")]
    Conflict(String),
    #[error("product {0} already exists")]
    Duplicate(ProductId),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// Whether replaying the whole transaction may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Timeout(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let code = match &err {
            sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
            _ => None,
        };
        match code.as_deref() {
            Some(PG_SERIALIZATION_FAILURE) | Some(PG_DEADLOCK_DETECTED) => StoreError::Conflict(err.to_string()),
            _ => StoreError::Database(err),
        }
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Opens a transaction at the serializable isolation level.
    async fn begin_serializable(&self) -> Result<Box<dyn CounterTx>, StoreError>;
}

/// One serializable transaction over the counter row and the product table.
///
/// Dropping a transaction without calling [`CounterTx::commit`] discards its writes.
#[async_trait]
pub trait CounterTx: Send {
    async fn read_counter(&mut self) -> Result<Option<CounterState>, StoreError>;
    /// Creates the singleton row. Fails with [`StoreError::Conflict`] if a concurrent
    /// transaction created it first.
    async fn insert_counter(&mut self, seed: i64) -> Result<CounterState, StoreError>;
    async fn write_counter(&mut self, last_issued: i64) -> Result<(), StoreError>;
    async fn product_exists(&mut self, id: &ProductId) -> Result<bool, StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<ProductRecord>, StoreError>;
    async fn get_by_id(&self, id: &ProductId) -> Result<Option<ProductRecord>, StoreError>;
    async fn add(&self, record: &ProductRecord) -> Result<(), StoreError>;
    /// Full update; `false` when no record has `record.id`.
    async fn update(&self, record: &ProductRecord) -> Result<bool, StoreError>;
    async fn delete(&self, id: &ProductId) -> Result<bool, StoreError>;
    async fn exists(&self, id: &ProductId) -> Result<bool, StoreError>;
    /// Sets `stock_available` to `new` only if it still equals `expected`.
    async fn compare_and_set_stock(&self, id: &ProductId, expected: i32, new: i32) -> Result<bool, StoreError>;
}
