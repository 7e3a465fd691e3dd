//! # Bill Repository
//!
//! Commits billing drafts as immutable bills.
//!
//! ## What One Transaction Covers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       create_bill (single tx)                           │
//! │                                                                         │
//! │  1. sequences     INSERT .. ON CONFLICT DO UPDATE value + 1 RETURNING  │
//! │                   → bill number INV-20240301-0007                      │
//! │  2. customers     match by phone / phoneless name, else insert         │
//! │  3. bills         total = Σ qty × unit price, discount clamped         │
//! │  4. bill_items    one row per draft line (price snapshot)              │
//! │  5. stock_reservations  DELETE for this draft: stock stays taken       │
//! │                                                                         │
//! │  Any failure → ROLLBACK: no bill, no items, no sequence increment,     │
//! │  reservations intact so the draft can still be cancelled or retried.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use retail_core::{format_bill_number, new_id, sequence_name, Bill, BillItem, Money, NewBill};

const BILL_COLUMNS: &str = "id, bill_number, customer_id, customer_name, customer_phone, \
                            total_amount_cents, discount_cents, created_at";

/// Repository for bill database operations.
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: SqlitePool,
}

impl BillRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BillRepository { pool }
    }

    /// Commits a draft as a bill, with its items, in one transaction.
    ///
    /// ## Arguments
    /// * `bill` - Draft contents, discount and business date
    /// * `prefix` - Bill number prefix (e.g. "INV")
    ///
    /// ## Returns
    /// The stored bill. `total_amount_cents` is recomputed from the items and
    /// `discount_cents` is clamped to `[0, total]`.
    pub async fn create_bill(&self, bill: &NewBill, prefix: &str) -> DbResult<Bill> {
        if bill.items.is_empty() {
            return Err(DbError::CheckViolation {
                message: "bill must have at least one item".to_string(),
            });
        }

        let total = bill.total();
        let discount = if bill.discount.is_negative() {
            Money::zero()
        } else {
            bill.discount.min(total)
        };
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let sequence = allocate_sequence(&mut tx, &sequence_name(bill.issued_on)).await?;
        let bill_number = format_bill_number(prefix, bill.issued_on, sequence);

        debug!(bill_number = %bill_number, lines = bill.items.len(), "Creating bill");

        let customer_id =
            upsert_customer(&mut tx, &bill.customer_name, bill.customer_phone.as_deref()).await?;

        let stored = Bill {
            id: new_id(),
            bill_number,
            customer_id: Some(customer_id),
            customer_name: bill.customer_name.clone(),
            customer_phone: bill.customer_phone.clone(),
            total_amount_cents: total.cents(),
            discount_cents: discount.cents(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO bills (
                id, bill_number, customer_id, customer_name, customer_phone,
                total_amount_cents, discount_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.bill_number)
        .bind(&stored.customer_id)
        .bind(&stored.customer_name)
        .bind(&stored.customer_phone)
        .bind(stored.total_amount_cents)
        .bind(stored.discount_cents)
        .bind(stored.created_at)
        .execute(&mut *tx)
        .await?;

        for line in &bill.items {
            sqlx::query(
                r#"
                INSERT INTO bill_items (id, bill_id, product_id, quantity, unit_price_cents)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(new_id())
            .bind(&stored.id)
            .bind(&line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        // The sold stock is now accounted for by the bill
        sqlx::query("DELETE FROM stock_reservations WHERE draft_id = ?1")
            .bind(&bill.draft_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            bill_number = %stored.bill_number,
            total = stored.total_amount_cents,
            discount = stored.discount_cents,
            "Bill created"
        );

        Ok(stored)
    }

    /// Gets a bill by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Bill>> {
        let sql = format!("SELECT {} FROM bills WHERE id = ?1", BILL_COLUMNS);

        let bill = sqlx::query_as::<_, Bill>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(bill)
    }

    /// Items of a bill, in insertion order.
    pub async fn items(&self, bill_id: &str) -> DbResult<Vec<BillItem>> {
        let items = sqlx::query_as::<_, BillItem>(
            r#"
            SELECT id, bill_id, product_id, quantity, unit_price_cents
            FROM bill_items
            WHERE bill_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Counts bills (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bills")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Atomic increment-and-read of a named counter. The first call for a name
/// returns 1.
async fn allocate_sequence(tx: &mut Transaction<'_, Sqlite>, name: &str) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (name, value) VALUES (?1, 1)
        ON CONFLICT (name) DO UPDATE SET value = value + 1
        RETURNING value
        "#,
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await?;

    Ok(value)
}

/// Finds the customer a bill belongs to, creating one if needed.
///
/// ## Matching
/// - With a phone: the customer owning that phone
/// - Without: a phoneless customer with the same name (case-insensitive)
///
/// An existing customer keeps their stored name; the bill carries its own
/// snapshot.
async fn upsert_customer(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    phone: Option<&str>,
) -> DbResult<String> {
    let existing: Option<String> = match phone {
        Some(phone) => {
            sqlx::query_scalar("SELECT id FROM customers WHERE phone = ?1")
                .bind(phone)
                .fetch_optional(&mut **tx)
                .await?
        }
        None => {
            sqlx::query_scalar(
                r#"
                SELECT id FROM customers
                WHERE phone IS NULL AND name = ?1 COLLATE NOCASE
                ORDER BY created_at
                LIMIT 1
                "#,
            )
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?
        }
    };

    if let Some(id) = existing {
        return Ok(id);
    }

    let id = new_id();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO customers (id, name, phone, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&id)
    .bind(name)
    .bind(phone)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    debug!(customer_id = %id, "Created customer");
    Ok(id)
}

// =============================================================================
// Unit Tests
// =============================================================================
