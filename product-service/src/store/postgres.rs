use super::{CounterStore, CounterTx, ProductRepository, StoreError, PG_UNIQUE_VIOLATION};
use crate::model::{CounterState, ProductId, ProductRecord, COUNTER_ROW_ID};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use common_money::Price;
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, query_as, query_scalar, PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool { &self.pool }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION))
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    description: Option<String>,
    stock_available: i32,
    price: BigDecimal,
}

impl TryFrom<ProductRow> for ProductRecord {
    type Error = StoreError;
    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let id = ProductId::parse(&row.id).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let price = Price::new(row.price).map_err(|e| StoreError::Corrupt(format!("product {id}: {e}")))?;
        Ok(ProductRecord { id, name: row.name, description: row.description, stock_available: row.stock_available, price })
    }
}

const PRODUCT_COLUMNS: &str = "id, name, description, stock_available, price";

pub struct PgCounterTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CounterStore for PgStore {
    async fn begin_serializable(&self) -> Result<Box<dyn CounterTx>, StoreError> {
        let mut tx = self.pool.begin().await?;
        query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgCounterTx { tx }))
    }
}

#[async_trait]
impl CounterTx for PgCounterTx {
    async fn read_counter(&mut self) -> Result<Option<CounterState>, StoreError> {
        let last_issued = query_scalar::<_, i64>("SELECT last_id FROM product_id_tracker WHERE id = $1")
            .bind(COUNTER_ROW_ID)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(last_issued.map(|last_issued| CounterState { last_issued }))
    }

    async fn insert_counter(&mut self, seed: i64) -> Result<CounterState, StoreError> {
        query("INSERT INTO product_id_tracker (id, last_id) VALUES ($1, $2)")
            .bind(COUNTER_ROW_ID)
            .bind(seed)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Conflict(format!("counter row seeded concurrently: {err}"))
                } else {
                    StoreError::from(err)
                }
            })?;
        Ok(CounterState { last_issued: seed })
    }

    async fn write_counter(&mut self, last_issued: i64) -> Result<(), StoreError> {
        let result = query("UPDATE product_id_tracker SET last_id = $2 WHERE id = $1")
            .bind(COUNTER_ROW_ID)
            .bind(last_issued)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt("counter row vanished inside its own transaction".into()));
        }
        Ok(())
    }

    async fn product_exists(&mut self, id: &ProductId) -> Result<bool, StoreError> {
        let exists = query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(id.as_str())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for PgStore {
    async fn get_all(&self) -> Result<Vec<ProductRecord>, StoreError> {
        let rows = query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ProductRecord::try_from).collect()
    }

    async fn get_by_id(&self, id: &ProductId) -> Result<Option<ProductRecord>, StoreError> {
        let row = query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProductRecord::try_from).transpose()
    }

    async fn add(&self, record: &ProductRecord) -> Result<(), StoreError> {
        query("INSERT INTO products (id, name, description, stock_available, price) VALUES ($1, $2, $3, $4, $5)")
            .bind(record.id.as_str())
            .bind(&record.name)
            .bind(record.description.as_deref())
            .bind(record.stock_available)
            .bind(record.price.inner())
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::Duplicate(record.id.clone())
                } else {
                    StoreError::from(err)
                }
            })?;
        Ok(())
    }

    async fn update(&self, record: &ProductRecord) -> Result<bool, StoreError> {
        let result = query(
            "UPDATE products SET name = $2, description = $3, stock_available = $4, price = $5 WHERE id = $1",
        )
        .bind(record.id.as_str())
        .bind(&record.name)
        .bind(record.description.as_deref())
        .bind(record.stock_available)
        .bind(record.price.inner())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &ProductId) -> Result<bool, StoreError> {
        let result = query("DELETE FROM products WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, id: &ProductId) -> Result<bool, StoreError> {
        let exists = query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn compare_and_set_stock(&self, id: &ProductId, expected: i32, new: i32) -> Result<bool, StoreError> {
        let result = query("UPDATE products SET stock_available = $3 WHERE id = $1 AND stock_available = $2")
            .bind(id.as_str())
            .bind(expected)
            .bind(new)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
