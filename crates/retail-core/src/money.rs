//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Prices, totals and discounts are i64 cents end to end.              │
//! │    Operator input "5.5" is parsed digit by digit into 550 cents,       │
//! │    never through f64.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use retail_core::money::Money;
//!
//! let price = Money::from_cents(1000);
//! let line = price.multiply_quantity(2);
//! assert_eq!(line.cents(), 2000);
//!
//! let discount = Money::parse("5").unwrap();
//! assert_eq!((line - discount).cents(), 1500);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

use crate::error::ValidationError;

/// Digits allowed before the decimal point when parsing operator input.
const MAX_MAJOR_DIGITS: usize = 12;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Where Money Flows
/// ```text
/// Product.price_cents ──► DraftLine.unit_price ──► DraftLine.line_total
///                                                        │
///                                  Σ lines ──► BillDraft.total()
///                                                        │
///                       min(discount, total) ──► Bill.discount_cents
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use retail_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion (truncated toward zero).
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the fractional portion, always 0-99.
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Line total for a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Parses a non-negative decimal amount typed by the operator.
    ///
    /// ## Accepted Input
    /// ```text
    /// "5"      → 500
    /// "5.5"    → 550
    /// "12.05"  → 1205
    /// ".75"    → 75
    /// "-1"     → MustNotBeNegative
    /// "1.234"  → InvalidFormat (more than 2 decimals)
    /// "abc"    → InvalidFormat
    /// ```
    pub fn parse(input: &str) -> Result<Money, ValidationError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(ValidationError::required("amount"));
        }

        if input.starts_with('-') {
            return Err(ValidationError::MustNotBeNegative {
                field: "amount".to_string(),
            });
        }

        let (major, minor) = match input.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (input, ""),
        };

        if major.is_empty() && minor.is_empty() {
            return Err(ValidationError::invalid("amount", "expected a number"));
        }

        if !major.chars().all(|c| c.is_ascii_digit()) || !minor.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ValidationError::invalid("amount", "expected a number"));
        }

        if minor.len() > 2 {
            return Err(ValidationError::invalid(
                "amount",
                "at most 2 decimal places",
            ));
        }

        if major.len() > MAX_MAJOR_DIGITS {
            return Err(ValidationError::invalid("amount", "amount is too large"));
        }

        let major_value: i64 = if major.is_empty() {
            0
        } else {
            major
                .parse()
                .map_err(|_| ValidationError::invalid("amount", "expected a number"))?
        };

        // "5.5" means 50 cents, not 5
        let minor_value: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().unwrap_or(0) * 10,
            _ => minor.parse::<i64>().unwrap_or(0),
        };

        Ok(Money(major_value * 100 + minor_value))
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-style rendering with a `$` prefix.
///
/// The presentation layer formats with the configured currency symbol and
/// thousands grouping instead.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
