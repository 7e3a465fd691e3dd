//! # Customer Repository
//!
//! Lookups, edits and purchase aggregates for customers. Customers are created
//! by [`BillRepository::create_bill`](super::bill::BillRepository::create_bill);
//! this repository never inserts.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::like_escape;
use crate::error::{DbError, DbResult};
use retail_core::{CustomerSummary, PurchaseRecord};

/// Customer row joined with its bill aggregates. Callers append a WHERE
/// clause before the GROUP BY.
const SUMMARY_SELECT: &str = r#"
    SELECT c.id, c.name, c.phone,
           COUNT(b.id) AS bill_count,
           COALESCE(SUM(b.total_amount_cents - b.discount_cents), 0) AS total_spent_cents,
           MAX(b.created_at) AS last_purchase
    FROM customers c
    LEFT JOIN bills b ON b.customer_id = c.id
"#;

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Exact phone match.
    pub async fn find_by_phone(&self, phone: &str) -> DbResult<Option<CustomerSummary>> {
        let sql = format!("{} WHERE c.phone = ?1 GROUP BY c.id", SUMMARY_SELECT);

        let summary = sqlx::query_as::<_, CustomerSummary>(&sql)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;

        Ok(summary)
    }

    /// Best name match for `query`.
    ///
    /// ## Match Policy
    /// Case-insensitive substring. Among several matches the customer with the
    /// most recent purchase wins, then the alphabetically first name.
    pub async fn search_by_name(&self, query: &str) -> DbResult<Option<CustomerSummary>> {
        let query = query.trim();
        debug!(query = %query, "Searching customers by name");

        let sql = format!(
            "{} WHERE c.name LIKE ?1 ESCAPE '\\' GROUP BY c.id \
             ORDER BY last_purchase DESC, c.name COLLATE NOCASE, c.id LIMIT 1",
            SUMMARY_SELECT
        );

        let summary = sqlx::query_as::<_, CustomerSummary>(&sql)
            .bind(format!("%{}%", like_escape(query)))
            .fetch_optional(&self.pool)
            .await?;

        Ok(summary)
    }

    /// Summary for a known customer.
    pub async fn summary(&self, id: &str) -> DbResult<CustomerSummary> {
        let sql = format!("{} WHERE c.id = ?1 GROUP BY c.id", SUMMARY_SELECT);

        sqlx::query_as::<_, CustomerSummary>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    /// Replaces a customer's name and phone. Committed bills keep their snapshot.
    ///
    /// ## Returns
    /// * `Ok(CustomerSummary)` - the refreshed summary
    /// * `Err(DbError::UniqueViolation)` on `customers.phone` - phone belongs
    ///   to another customer
    /// * `Err(DbError::NotFound)` - no such customer
    pub async fn update(
        &self,
        id: &str,
        name: &str,
        phone: Option<&str>,
    ) -> DbResult<CustomerSummary> {
        debug!(customer_id = %id, "Updating customer");

        let result =
            sqlx::query("UPDATE customers SET name = ?2, phone = ?3, updated_at = ?4 WHERE id = ?1")
                .bind(id)
                .bind(name)
                .bind(phone)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        self.summary(id).await
    }

    /// Past bills of a customer, newest first.
    pub async fn history(&self, id: &str, limit: u32) -> DbResult<Vec<PurchaseRecord>> {
        let records = sqlx::query_as::<_, PurchaseRecord>(
            r#"
            SELECT b.id AS bill_id, b.bill_number, b.created_at,
                   COALESCE(SUM(i.quantity), 0) AS item_count,
                   b.total_amount_cents, b.discount_cents
            FROM bills b
            LEFT JOIN bill_items i ON i.bill_id = b.id
            WHERE b.customer_id = ?1
            GROUP BY b.id
            ORDER BY b.created_at DESC, b.bill_number DESC
            LIMIT ?2
            "#,
        )
        .bind(id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
