//! # Domain Types
//!
//! Core domain types used throughout the retail counter bot.
//!
//! Products, bills and customer summaries as stored, plus `DraftLine` and
//! `NewBill` for a bill still being built. `DraftLine` carries the price
//! snapshot taken when stock was reserved.
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4, immutable, used for relations and option identifiers
//! - Business ID: `code`, `bill_number`, `phone`, human-readable

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

/// Generates a new entity identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Product
// =============================================================================

/// A sellable product.
///
/// `stock` is never negative: the store rejects any adjustment that would
/// take it below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub code: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub cost_cents: i64,
    pub stock: i64,
    pub min_stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Builds a new product with fresh id and timestamps.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        price: Money,
        stock: i64,
    ) -> Self {
        let now = Utc::now();
        Product {
            id: new_id(),
            code: code.into(),
            name: name.into(),
            category: category.into(),
            description: None,
            price_cents: price.cents(),
            cost_cents: 0,
            stock,
            min_stock: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Bill Lines
// =============================================================================

/// A line on a bill that has not been committed yet.
///
/// ## Snapshot Pattern
/// `code`, `name` and `unit_price` are copied when the stock is reserved.
/// A later price change does not touch the draft or the committed bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLine {
    pub product_id: String,
    pub code: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl DraftLine {
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// Everything needed to commit a bill in one transaction.
#[derive(Debug, Clone)]
pub struct NewBill {
    /// Draft whose stock reservations this bill consumes.
    pub draft_id: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub items: Vec<DraftLine>,
    /// Requested discount; clamped to the total when stored.
    pub discount: Money,
    /// Business date used in the bill number.
    pub issued_on: NaiveDate,
}

impl NewBill {
    /// Sum of `quantity × unit_price` over all lines.
    pub fn total(&self) -> Money {
        self.items.iter().map(DraftLine::line_total).sum()
    }
}

// =============================================================================
// Bill
// =============================================================================

/// A committed bill. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Bill {
    pub id: String,
    pub bill_number: String,
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub total_amount_cents: i64,
    pub discount_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl Bill {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    /// Amount the customer pays.
    #[inline]
    pub fn payable(&self) -> Money {
        self.total() - self.discount()
    }
}

/// A stored bill line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BillItem {
    pub id: String,
    pub bill_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl BillItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A customer with aggregates over their bills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CustomerSummary {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub bill_count: i64,
    /// Σ (total - discount) over all bills.
    pub total_spent_cents: i64,
    pub last_purchase: Option<DateTime<Utc>>,
}

impl CustomerSummary {
    #[inline]
    pub fn total_spent(&self) -> Money {
        Money::from_cents(self.total_spent_cents)
    }
}

/// One row of a customer's purchase history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseRecord {
    pub bill_id: String,
    pub bill_number: String,
    pub created_at: DateTime<Utc>,
    /// Units sold on the bill (sum of line quantities).
    pub item_count: i64,
    pub total_amount_cents: i64,
    pub discount_cents: i64,
}

impl PurchaseRecord {
    #[inline]
    pub fn payable(&self) -> Money {
        Money::from_cents(self.total_amount_cents - self.discount_cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(qty: i64, price: i64) -> DraftLine {
        DraftLine {
            product_id: new_id(),
            code: "SKU".to_string(),
            name: "Item".to_string(),
            quantity: qty,
            unit_price: Money::from_cents(price),
        }
    }

    #[test]
    fn test_new_bill_total_sums_lines() {
        let bill = NewBill {
            draft_id: new_id(),
            customer_name: "Asha".to_string(),
            customer_phone: None,
            items: vec![line(2, 1000), line(3, 250)],
            discount: Money::zero(),
            issued_on: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert_eq!(bill.total().cents(), 2750);
    }

    #[test]
    fn test_product_price() {
        let product = Product::new("SKU1", "Tea", "Beverages", Money::from_cents(1000), 5);
        assert_eq!(product.price().cents(), 1000);
        assert_eq!(product.stock, 5);
    }

    #[test]
    fn test_bill_payable() {
        let bill = Bill {
            id: new_id(),
            bill_number: "INV-20240301-0001".to_string(),
            customer_id: None,
            customer_name: "Asha".to_string(),
            customer_phone: None,
            total_amount_cents: 2000,
            discount_cents: 500,
            created_at: Utc::now(),
        };
        assert_eq!(bill.payable().cents(), 1500);
    }

    #[test]
    fn test_draft_line_serializes_price_as_cents() {
        let json = serde_json::to_value(line(2, 1000)).unwrap();
        assert_eq!(json["unit_price"], 1000);
        assert_eq!(json["quantity"], 2);
    }
}
