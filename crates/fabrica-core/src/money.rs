//! # Money Type
//!
//! Integer-cents money for prices and sales amounts.
//!
//! ## Why Integer Cents?
//! Floating point cannot represent 0.10 exactly; accumulating report totals
//! over thousands of sales records would drift. All monetary values are
//! carried as i64 cents and only formatted as decimals for display.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Money represented as integer cents.
///
/// ## Example
/// ```rust
/// use fabrica_core::Money;
///
/// let price = Money::from_cents(1099); // 10.99
/// assert_eq!(price.cents(), 1099);
/// assert_eq!(price.to_string(), "10.99");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates money from cents (never from floats!).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the amount in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero amount.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checked addition, for report accumulation.
    pub fn checked_add(self, other: Money) -> CoreResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(CoreError::MoneyOverflow {
                operation: "add".to_string(),
            })
    }

    /// Multiplies by a quantity (line totals).
    pub fn checked_mul(self, quantity: i64) -> CoreResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or(CoreError::MoneyOverflow {
                operation: "mul".to_string(),
            })
    }

    /// Applies a basis-point markup (100 bps = 1%), rounding half away
    /// from zero. Used when an import does not preserve factory prices.
    pub fn with_markup_bps(self, bps: u32) -> CoreResult<Money> {
        let raw = (self.0 as i128) * (10_000 + bps as i128);
        let rounded = (raw + 5_000) / 10_000;
        i64::try_from(rounded)
            .map(Money)
            .map_err(|_| CoreError::MoneyOverflow {
                operation: "markup".to_string(),
            })
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn test_checked_add() {
        let a = Money::from_cents(100);
        let b = Money::from_cents(250);
        assert_eq!(a.checked_add(b).unwrap().cents(), 350);

        let max = Money::from_cents(i64::MAX);
        assert!(max.checked_add(Money::from_cents(1)).is_err());
    }

    #[test]
    fn test_markup() {
        // 10.00 + 8.25% = 10.83 (rounded from 10.825)
        let price = Money::from_cents(1000);
        assert_eq!(price.with_markup_bps(825).unwrap().cents(), 1083);

        // Zero markup is identity
        assert_eq!(price.with_markup_bps(0).unwrap().cents(), 1000);
    }
}
