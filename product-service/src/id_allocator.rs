//! Unique sequential product-id allocation.
//!
//! Each attempt runs in one serializable transaction: read (or seed) the counter
//! row, increment it, verify that no product already carries the candidate id,
//! then persist the counter and commit. Conflicts and collisions roll the attempt
//! back and retry under a bounded [`RetryPolicy`]; anything else is surfaced at once.

use crate::model::{ProductId, COUNTER_SEED};
use crate::retry::RetryPolicy;
use crate::store::{CounterStore, CounterTx, StoreError};
use common_observability::ProductMetrics;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("product id allocation gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("product id space exhausted (last issued {last_issued})")]
    IdSpaceExhausted { last_issued: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AllocationError {
    fn outcome_label(&self) -> &'static str {
        match self {
            AllocationError::Exhausted { .. } => "exhausted",
            AllocationError::IdSpaceExhausted { .. } => "id_space_exhausted",
            AllocationError::Store(_) => "store_error",
        }
    }
}

enum Attempt {
    Issued(ProductId),
    /// The candidate already belongs to a product; nothing was persisted.
    Collision(ProductId),
}

enum Candidate {
    Free(ProductId),
    Taken(ProductId),
}

#[derive(Clone)]
pub struct IdAllocator {
    store: Arc<dyn CounterStore>,
    policy: RetryPolicy,
    metrics: Arc<ProductMetrics>,
    local_lock: Option<Arc<Mutex<()>>>,
}

impl IdAllocator {
    pub fn new(store: Arc<dyn CounterStore>, policy: RetryPolicy, metrics: Arc<ProductMetrics>) -> Self {
        Self { store, policy, metrics, local_lock: None }
    }

    /// Serializes attempts issued from this process before they reach the store.
    /// Cross-process safety still comes from the serializable transaction.
    pub fn with_local_lock(mut self, enabled: bool) -> Self {
        self.local_lock = enabled.then(|| Arc::new(Mutex::new(())));
        self
    }

    pub async fn allocate_unique_id(&self) -> Result<ProductId, AllocationError> {
        let started = Instant::now();
        let result = self.allocate_with_retries().await;
        self.metrics
            .id_allocation_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => self.metrics.allocation_outcome("issued"),
            Err(err) => self.metrics.allocation_outcome(err.outcome_label()),
        }
        result
    }

    async fn allocate_with_retries(&self) -> Result<ProductId, AllocationError> {
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            self.metrics.id_allocation_attempts.inc();
            match self.guarded_attempt().await {
                Ok(Attempt::Issued(id)) => {
                    tracing::info!(product_id = %id, attempt, "Allocated product id");
                    return Ok(id);
                }
                Ok(Attempt::Collision(candidate)) => {
                    self.metrics.id_allocation_collisions.inc();
                    tracing::warn!(candidate = %candidate, attempt, "Candidate product id already in use; retrying");
                }
                Err(AllocationError::Store(err)) if err.is_transient() => {
                    self.metrics.id_allocation_conflicts.inc();
                    tracing::warn!(error = %err, attempt, "Product id allocation conflicted; retrying");
                }
                Err(err) => {
                    tracing::error!(error = %err, attempt, "Product id allocation failed");
                    return Err(err);
                }
            }
            if attempt < max_attempts {
                sleep(self.policy.backoff(attempt)).await;
            }
        }
        tracing::error!(attempts = max_attempts, "Product id allocation exhausted its retries");
        Err(AllocationError::Exhausted { attempts: max_attempts })
    }

    /// Runs one attempt under the local lock and the per-attempt timeout.
    ///
    /// A timeout that fires while the commit is in flight may drop an attempt the
    /// database already committed; the retry then issues the next value and the
    /// committed one is left as a gap. Uniqueness is unaffected.
    async fn guarded_attempt(&self) -> Result<Attempt, AllocationError> {
        let _guard = match &self.local_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        // Dropping a timed-out attempt drops its transaction, which rolls it back.
        match timeout(self.policy.attempt_timeout, self.run_attempt()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(StoreError::Timeout(self.policy.attempt_timeout).into()),
        }
    }

    async fn run_attempt(&self) -> Result<Attempt, AllocationError> {
        let mut tx = self.store.begin_serializable().await?;
        match next_candidate(tx.as_mut()).await {
            Ok(Candidate::Free(id)) => {
                tx.commit().await?;
                Ok(Attempt::Issued(id))
            }
            Ok(Candidate::Taken(id)) => {
                rollback_quietly(tx).await;
                Ok(Attempt::Collision(id))
            }
            Err(err) => {
                rollback_quietly(tx).await;
                Err(err)
            }
        }
    }
}

async fn next_candidate(tx: &mut dyn CounterTx) -> Result<Candidate, AllocationError> {
    let state = match tx.read_counter().await? {
        Some(state) => state,
        None => tx.insert_counter(COUNTER_SEED).await?,
    };
    let next = state.last_issued.saturating_add(1);
    let candidate = ProductId::from_counter(next)
        .ok_or(AllocationError::IdSpaceExhausted { last_issued: state.last_issued })?;
    if tx.product_exists(&candidate).await? {
        return Ok(Candidate::Taken(candidate));
    }
    tx.write_counter(next).await?;
    Ok(Candidate::Free(candidate))
}

async fn rollback_quietly(tx: Box<dyn CounterTx>) {
    if let Err(err) = tx.rollback().await {
        tracing::warn!(error = %err, "Rollback of product id attempt failed");
    }
}
