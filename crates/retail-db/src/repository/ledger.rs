//! # Stock Ledger
//!
//! Every change to `products.stock` goes through this module.
//!
//! ## The Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Atomic Compare-and-Update                            │
//! │                                                                         │
//! │  ❌ WRONG: read, check in Rust, then write                             │
//! │     stock = SELECT stock ...          (both sessions read 5)           │
//! │     if stock >= 3 { UPDATE stock - 3 } (both succeed → -1)             │
//! │                                                                         │
//! │  ✅ CORRECT: the condition lives in the UPDATE                         │
//! │     UPDATE products SET stock = stock + :delta                         │
//! │      WHERE id = :id AND stock + :delta >= 0                            │
//! │      RETURNING stock                                                   │
//! │                                                                         │
//! │  Session A: 5 - 3 → row returned, stock 2                              │
//! │  Session B: 2 - 3 → no row → Rejected { available: 2 }                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Draft Reservations
//! Billing takes stock as soon as a line is added. Each such decrement is
//! journalled in `stock_reservations` inside the same transaction, keyed by
//! the draft id. The journal is how stock comes back:
//!
//! ```text
//! reserve()          UPDATE guard + INSERT reservation      (one tx)
//! release_draft()    DELETE reservations RETURNING + UPDATE (one tx)
//! create_bill()      DELETE reservations, stock stays taken (bill tx)
//! release_orphaned() release_draft() for drafts no live session owns
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use retail_core::{new_id, DraftLine, Money};

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a guarded stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StockAdjustment {
    /// The update ran; stock is now `new_stock`.
    Applied { new_stock: i64 },
    /// The guard refused it. `available` is read after the refusal and is
    /// informational only.
    Rejected { available: i64 },
}

/// Result of reserving stock for a billing draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// Stock was taken; `line` carries the price snapshot.
    Reserved { line: DraftLine, remaining_stock: i64 },
    /// Not enough stock.
    Insufficient { available: i64 },
}

/// A reservation handed back to stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleasedLine {
    pub product_id: String,
    pub quantity: i64,
    pub new_stock: i64,
}

// =============================================================================
// Ledger
// =============================================================================

/// Atomic stock adjustments and the draft reservation journal.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Applies `stock += delta` if and only if the result is non-negative
    /// and still fits in an `i64`.
    ///
    /// Safe to call concurrently for the same product: SQLite serializes the
    /// writers and the condition is evaluated against the current row.
    ///
    /// ## Returns
    /// * `Ok(Applied)` - stock changed
    /// * `Ok(Rejected)` - stock unchanged
    /// * `Err(DbError::NotFound)` - no such product
    pub async fn adjust_stock(&self, product_id: &str, delta: i64) -> DbResult<StockAdjustment> {
        debug!(product_id = %product_id, delta, "Adjusting stock");

        let new_stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock + ?2, updated_at = ?3
            WHERE id = ?1 AND stock + ?2 >= 0 AND (?2 <= 0 OR stock <= ?4 - ?2)
            RETURNING stock
            "#,
        )
        .bind(product_id)
        .bind(delta)
        .bind(Utc::now())
        .bind(i64::MAX)
        .fetch_optional(&self.pool)
        .await?;

        match new_stock {
            Some(new_stock) => Ok(StockAdjustment::Applied { new_stock }),
            None => {
                let available = self.require_stock(product_id).await?;
                debug!(product_id = %product_id, delta, available, "Stock guard rejected adjustment");
                Ok(StockAdjustment::Rejected { available })
            }
        }
    }

    /// Takes `quantity` units for a billing draft and journals the reservation.
    ///
    /// The decrement and the journal row commit together. The returned line
    /// carries the product's code, name and price as of the decrement.
    pub async fn reserve(
        &self,
        draft_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<Reservation> {
        debug!(draft_id = %draft_id, product_id = %product_id, quantity, "Reserving stock");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let taken: Option<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            UPDATE products
            SET stock = stock - ?2, updated_at = ?3
            WHERE id = ?1 AND stock - ?2 >= 0
            RETURNING code, name, price_cents, stock
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((code, name, price_cents, remaining_stock)) = taken else {
            tx.rollback().await?;
            let available = self.require_stock(product_id).await?;
            return Ok(Reservation::Insufficient { available });
        };

        sqlx::query(
            r#"
            INSERT INTO stock_reservations (id, draft_id, product_id, quantity, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(new_id())
        .bind(draft_id)
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Reservation::Reserved {
            line: DraftLine {
                product_id: product_id.to_string(),
                code,
                name,
                quantity,
                unit_price: Money::from_cents(price_cents),
            },
            remaining_stock,
        })
    }

    /// Returns every reservation of a draft to stock, exactly.
    ///
    /// Idempotent: a draft with no journal rows (never reserved, already
    /// released, or already billed) releases nothing.
    pub async fn release_draft(&self, draft_id: &str) -> DbResult<Vec<ReleasedLine>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock from the start
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "DELETE FROM stock_reservations WHERE draft_id = ?1 RETURNING product_id, quantity",
        )
        .bind(draft_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut released = Vec::with_capacity(rows.len());

        for (product_id, quantity) in rows {
            let new_stock: i64 = sqlx::query_scalar(
                "UPDATE products SET stock = stock + ?2, updated_at = ?3 WHERE id = ?1 RETURNING stock",
            )
            .bind(&product_id)
            .bind(quantity)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            released.push(ReleasedLine {
                product_id,
                quantity,
                new_stock,
            });
        }

        tx.commit().await?;

        if !released.is_empty() {
            let units: i64 = released.iter().map(|r| r.quantity).sum();
            info!(draft_id = %draft_id, lines = released.len(), units, "Released draft stock");
        }

        Ok(released)
    }

    /// Drafts with journal rows whose latest reservation is older than `cutoff`.
    pub async fn drafts_reserved_before(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<String>> {
        let drafts: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT draft_id FROM stock_reservations
            GROUP BY draft_id
            HAVING MAX(created_at) < ?1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(drafts)
    }

    /// Releases drafts reserved before `cutoff` that no live session owns.
    ///
    /// At startup there are no live sessions, so every journalled draft is an
    /// orphan of the previous process.
    ///
    /// ## Returns
    /// Number of drafts released.
    pub async fn release_orphaned(
        &self,
        live_drafts: &HashSet<String>,
        cutoff: DateTime<Utc>,
    ) -> DbResult<usize> {
        let mut released = 0;

        for draft_id in self.drafts_reserved_before(cutoff).await? {
            if live_drafts.contains(&draft_id) {
                continue;
            }
            self.release_draft(&draft_id).await?;
            released += 1;
        }

        if released > 0 {
            info!(released, "Released orphaned draft reservations");
        }

        Ok(released)
    }

    /// Units currently reserved by a draft.
    #[cfg(test)]
    pub(crate) async fn reserved_units(&self, draft_id: &str) -> DbResult<i64> {
        let units: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM stock_reservations WHERE draft_id = ?1",
        )
        .bind(draft_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(units)
    }

    async fn require_stock(&self, product_id: &str) -> DbResult<i64> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        stock.ok_or_else(|| DbError::not_found("Product", product_id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use retail_core::Product;

    async fn setup(stock: i64) -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = Product::new("SKU1", "Green Tea", "Beverages", Money::from_cents(1000), stock);
        db.products().insert(&product).await.unwrap();
        (db, product)
    }

    async fn stock_of(db: &Database, id: &str) -> i64 {
        db.products().get_by_id(id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn test_adjust_never_goes_negative() {
        let (db, p) = setup(5).await;
        let ledger = db.ledger();

        let deltas = [-2, -2, -2, 4, -5, -1, 3, -10];
        let mut expected = 5;
        for delta in deltas {
            let outcome = ledger.adjust_stock(&p.id, delta).await.unwrap();
            if expected + delta >= 0 {
                expected += delta;
                assert_eq!(outcome, StockAdjustment::Applied { new_stock: expected });
            } else {
                assert_eq!(outcome, StockAdjustment::Rejected { available: expected });
            }
            assert_eq!(stock_of(&db, &p.id).await, expected);
            assert!(expected >= 0);
        }
    }

    #[tokio::test]
    async fn test_large_quantities_bounded_only_by_stock() {
        let (db, p) = setup(2000).await;
        let ledger = db.ledger();

        let outcome = ledger.reserve("draft-1", &p.id, 1000).await.unwrap();
        assert!(matches!(outcome, Reservation::Reserved { remaining_stock: 1000, .. }));

        assert_eq!(
            ledger.adjust_stock(&p.id, 250_000).await.unwrap(),
            StockAdjustment::Applied { new_stock: 251_000 }
        );
    }

    #[tokio::test]
    async fn test_adjust_rejects_overflow() {
        let (db, p) = setup(10).await;
        let ledger = db.ledger();

        assert_eq!(
            ledger.adjust_stock(&p.id, i64::MAX).await.unwrap(),
            StockAdjustment::Rejected { available: 10 }
        );
        assert_eq!(stock_of(&db, &p.id).await, 10);

        assert_eq!(
            ledger.adjust_stock(&p.id, i64::MAX - 10).await.unwrap(),
            StockAdjustment::Applied { new_stock: i64::MAX }
        );
    }

    #[tokio::test]
    async fn test_adjust_unknown_product() {
        let (db, _) = setup(5).await;
        let err = db.ledger().adjust_stock("missing", -1).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reserve_snapshots_price_and_journals() {
        let (db, p) = setup(5).await;
        let ledger = db.ledger();

        let outcome = ledger.reserve("draft-1", &p.id, 2).await.unwrap();
        let Reservation::Reserved { line, remaining_stock } = outcome else {
            panic!("expected reservation");
        };
        assert_eq!(remaining_stock, 3);
        assert_eq!(line.code, "SKU1");
        assert_eq!(line.unit_price.cents(), 1000);
        assert_eq!(ledger.reserved_units("draft-1").await.unwrap(), 2);

        let refused = ledger.reserve("draft-1", &p.id, 4).await.unwrap();
        assert_eq!(refused, Reservation::Insufficient { available: 3 });
        assert_eq!(ledger.reserved_units("draft-1").await.unwrap(), 2);
        assert_eq!(stock_of(&db, &p.id).await, 3);
    }

    #[tokio::test]
    async fn test_release_restores_exactly() {
        let (db, p) = setup(10).await;
        let other = Product::new("SKU2", "Cookies", "Snacks", Money::from_cents(250), 4);
        db.products().insert(&other).await.unwrap();
        let ledger = db.ledger();

        ledger.reserve("draft-1", &p.id, 3).await.unwrap();
        ledger.reserve("draft-1", &other.id, 4).await.unwrap();
        ledger.reserve("draft-1", &p.id, 2).await.unwrap();
        ledger.reserve("draft-2", &p.id, 1).await.unwrap();
        assert_eq!(stock_of(&db, &p.id).await, 4);
        assert_eq!(stock_of(&db, &other.id).await, 0);

        let released = ledger.release_draft("draft-1").await.unwrap();
        let units: i64 = released.iter().map(|r| r.quantity).sum();
        assert_eq!(units, 9);
        assert_eq!(stock_of(&db, &p.id).await, 9);
        assert_eq!(stock_of(&db, &other.id).await, 4);

        // Releasing again is a no-op; draft-2 is untouched
        assert!(ledger.release_draft("draft-1").await.unwrap().is_empty());
        assert_eq!(ledger.reserved_units("draft-2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_release_orphaned_skips_live_drafts() {
        let (db, p) = setup(10).await;
        let ledger = db.ledger();

        ledger.reserve("live", &p.id, 2).await.unwrap();
        ledger.reserve("orphan", &p.id, 3).await.unwrap();

        let live: HashSet<String> = ["live".to_string()].into_iter().collect();
        let cutoff = Utc::now() + chrono::Duration::seconds(1);

        assert_eq!(ledger.release_orphaned(&live, cutoff).await.unwrap(), 1);
        assert_eq!(stock_of(&db, &p.id).await, 8);
        assert_eq!(ledger.reserved_units("live").await.unwrap(), 2);

        // A cutoff in the past keeps recent drafts even when nobody owns them
        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(ledger.release_orphaned(&HashSet::new(), past).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_on_file_database() {
        let dir = std::env::temp_dir().join(format!("retail-ledger-{}", new_id()));
        std::fs::create_dir_all(&dir).unwrap();
        let db = Database::new(DbConfig::new(dir.join("ledger.db")).max_connections(4))
            .await
            .unwrap();
        let product = Product::new("SKU1", "Green Tea", "Beverages", Money::from_cents(1000), 5);
        db.products().insert(&product).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..6 {
            let ledger = db.ledger();
            let id = product.id.clone();
            tasks.push(tokio::spawn(async move {
                ledger.reserve(&format!("draft-{}", i), &id, 2).await.unwrap()
            }));
        }

        let mut reserved = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), Reservation::Reserved { .. }) {
                reserved += 1;
            }
        }

        assert_eq!(reserved, 2);
        assert_eq!(stock_of(&db, &product.id).await, 1);

        db.close().await;
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
