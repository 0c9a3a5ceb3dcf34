use bigdecimal::BigDecimal;
use common_money::{MoneyError, Price};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Width of every issued product id.
pub const ID_WIDTH: usize = 6;
/// Value the counter row is seeded with; the first issued id is one above it.
pub const COUNTER_SEED: i64 = 100_000;
/// Largest counter value that still formats into [`ID_WIDTH`] digits.
pub const MAX_COUNTER_VALUE: i64 = 999_999;
/// Primary key of the singleton counter row.
pub const COUNTER_ROW_ID: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("product id must be exactly 6 ASCII digits, got {0:?}")]
pub struct InvalidProductId(pub String);

/// Six-digit, zero-padded product identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Formats a counter value, or `None` when it does not fit in six digits.
    pub fn from_counter(value: i64) -> Option<Self> {
        if (0..=MAX_COUNTER_VALUE).contains(&value) {
            Some(Self(format!("{value:0width$}", width = ID_WIDTH)))
        } else {
            None
        }
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidProductId> {
        if raw.len() == ID_WIDTH && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidProductId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn value(&self) -> i64 {
        // parse() and from_counter() only admit six ASCII digits
        self.0.bytes().fold(0, |acc, b| acc * 10 + i64::from(b - b'0'))
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for ProductId {
    type Err = InvalidProductId;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl TryFrom<String> for ProductId {
    type Error = InvalidProductId;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<ProductId> for String {
    fn from(value: ProductId) -> Self { value.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub stock_available: i32,
    pub price: Price,
}

/// Persisted allocator state: the last id handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub last_issued: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("stock_available must not be negative, got {0}")]
    NegativeStock(i32),
    #[error(transparent)]
    InvalidPrice(#[from] MoneyError),
    #[error(transparent)]
    InvalidId(#[from] InvalidProductId),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stock_available: i32,
    pub price: BigDecimal, // accept raw then normalize via Price
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub stock_available: i32,
    pub price: BigDecimal,
}

/// Validated product fields that only lack an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    pub name: String,
    pub description: Option<String>,
    pub stock_available: i32,
    pub price: Price,
}

impl ProductDraft {
    pub fn into_record(self, id: ProductId) -> ProductRecord {
        ProductRecord {
            id,
            name: self.name,
            description: self.description,
            stock_available: self.stock_available,
            price: self.price,
        }
    }
}

fn validate_fields(
    name: String,
    description: Option<String>,
    stock_available: i32,
    price: BigDecimal,
) -> Result<ProductDraft, ValidationError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if stock_available < 0 {
        return Err(ValidationError::NegativeStock(stock_available));
    }
    let description = description.filter(|d| !d.trim().is_empty());
    Ok(ProductDraft { name, description, stock_available, price: Price::new(price)? })
}

impl NewProduct {
    pub fn validate(self) -> Result<ProductDraft, ValidationError> {
        validate_fields(self.name, self.description, self.stock_available, self.price)
    }
}

impl UpdateProduct {
    pub fn validate(self) -> Result<ProductRecord, ValidationError> {
        let id = ProductId::parse(&self.id)?;
        Ok(validate_fields(self.name, self.description, self.stock_available, self.price)?.into_record(id))
    }
}
