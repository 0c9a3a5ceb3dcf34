use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits kept for stored prices.
pub const PRICE_SCALE: i64 = 2;
/// Integer digits a stored price may have (`NUMERIC(12, 2)`).
pub const PRICE_INTEGER_DIGITS: u32 = 10;

/// Normalize a monetary value to 2 decimal places (BigDecimal truncates when reducing scale)
pub fn normalize_scale(value: &BigDecimal) -> BigDecimal {
    value.with_scale(PRICE_SCALE)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("price must not be negative, got {0}")]
    Negative(String),
    #[error("invalid price literal: {0:?}")]
    Parse(String),
    #[error("price must be below 10^10, got {0}")]
    TooLarge(String),
}

/// Non-negative product price held at [`PRICE_SCALE`] decimal places.
///
/// Deserializing goes through [`Price::new`], so a negative amount in a payload is
/// rejected instead of being silently stored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "BigDecimal", into = "BigDecimal")]
pub struct Price(BigDecimal);

impl Price {
    pub fn new(raw: BigDecimal) -> Result<Self, MoneyError> {
        if raw < BigDecimal::from(0) {
            return Err(MoneyError::Negative(raw.to_string()));
        }
        let normalized = normalize_scale(&raw);
        if normalized >= BigDecimal::from(10u64.pow(PRICE_INTEGER_DIGITS)) {
            return Err(MoneyError::TooLarge(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn zero() -> Self {
        Self(normalize_scale(&BigDecimal::from(0)))
    }

    pub fn inner(&self) -> &BigDecimal { &self.0 }
}

impl TryFrom<BigDecimal> for Price {
    type Error = MoneyError;
    fn try_from(value: BigDecimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Price> for BigDecimal {
    fn from(value: Price) -> Self { value.0 }
}

impl FromStr for Price {
    type Err = MoneyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = BigDecimal::from_str(s.trim()).map_err(|_| MoneyError::Parse(s.to_string()))?;
        Self::new(raw)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
