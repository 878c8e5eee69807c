//! Exact-decimal monetary amounts.
//!
//! Prices and order totals are carried as [`rust_decimal::Decimal`] so that
//! summing many order lines never accumulates binary floating point error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Monetary amount in the shop currency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Decimal places kept for every stored amount.
    pub const SCALE: u32 = 2;
    /// Integer digits of a unit price (`NUMERIC(10,2)`).
    pub const PRICE_DIGITS: u32 = 8;
    /// Integer digits of an order total (`NUMERIC(12,2)`).
    pub const TOTAL_DIGITS: u32 = 10;

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Whether the amount fits in [`Money::SCALE`] decimal places without rounding.
    pub fn has_cent_precision(&self) -> bool {
        self.0.normalize().scale() <= Self::SCALE
    }

    /// A unit price that can be stored exactly: positive, whole cents, below
    /// `10^PRICE_DIGITS`.
    pub fn ensure_price(&self) -> DomainResult<()> {
        if !self.is_positive() {
            return Err(DomainError::validation("price must be greater than 0"));
        }
        if !self.has_cent_precision() {
            return Err(DomainError::validation(format!(
                "price {} has more than {} decimal places",
                self.0,
                Self::SCALE
            )));
        }
        let limit = power_of_ten(Self::PRICE_DIGITS);
        if self.0 >= limit {
            return Err(DomainError::validation(format!("price {} must be below {limit}", self.0)));
        }
        Ok(())
    }

    /// An order total that can be stored exactly (below `10^TOTAL_DIGITS`).
    pub fn ensure_order_total(&self) -> DomainResult<()> {
        let limit = power_of_ten(Self::TOTAL_DIGITS);
        if self.0 >= limit {
            return Err(DomainError::validation(format!(
                "order total {} must be below {limit}",
                self.0
            )));
        }
        Ok(())
    }

    /// `self × quantity`, exact.
    pub fn times(self, quantity: u32) -> DomainResult<Money> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Money)
            .ok_or_else(|| DomainError::invariant(format!("amount overflow: {} x {quantity}", self.0)))
    }

    pub fn plus(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant(format!("amount overflow: {} + {}", self.0, other.0)))
    }
}

fn power_of_ten(exp: u32) -> Decimal {
    Decimal::from(10_i64.pow(exp))
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
