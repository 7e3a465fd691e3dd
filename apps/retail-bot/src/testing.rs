//! Shared fixtures for the bot's tests: an in-memory store, a small config
//! and product/bill helpers.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;

use crate::config::BotConfig;
use crate::dispatcher::Dispatcher;
use crate::event::InputEvent;
use crate::flows::Context;
use retail_core::{new_id, Bill, DraftLine, Money, NewBill, Product};
use retail_db::{Database, DbConfig};

pub fn test_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.store.company_name = "Test Mart".to_string();
    config.store.bill_prefix = "TEST".to_string();
    config
}

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

/// A database file in its own temp directory, so several pooled connections
/// can write at once. The caller removes the directory.
pub async fn file_db(connections: u32) -> (Database, PathBuf) {
    let dir = std::env::temp_dir().join(format!("retail-bot-{}", new_id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let db = Database::new(DbConfig::new(dir.join("bot.db")).max_connections(connections))
        .await
        .expect("file database");
    (db, dir)
}

pub async fn context() -> Context {
    Context::new(test_db().await, Arc::new(test_config()))
}

pub async fn dispatcher() -> Dispatcher {
    Dispatcher::new(test_db().await, Arc::new(test_config()))
}

pub async fn product(
    db: &Database,
    code: &str,
    name: &str,
    category: &str,
    price_cents: i64,
    stock: i64,
) -> Product {
    let product = Product::new(code, name, category, Money::from_cents(price_cents), stock);
    db.products().insert(&product).await.expect("insert product")
}

pub async fn stock_of(db: &Database, product_id: &str) -> i64 {
    db.products()
        .get_by_id(product_id)
        .await
        .expect("read product")
        .expect("product exists")
        .stock
}

/// Changes a catalog price behind the flows' back.
pub async fn set_price(db: &Database, product_id: &str, price_cents: i64) {
    sqlx::query("UPDATE products SET price_cents = ?2 WHERE id = ?1")
        .bind(product_id)
        .bind(price_cents)
        .execute(db.pool())
        .await
        .expect("update price");
}

pub async fn bill_by_number(db: &Database, bill_number: &str) -> Bill {
    let id: String = sqlx::query_scalar("SELECT id FROM bills WHERE bill_number = ?1")
        .bind(bill_number)
        .fetch_one(db.pool())
        .await
        .expect("bill exists");
    db.bills().get_by_id(&id).await.expect("read bill").expect("bill row")
}

/// Commits a one-line bill for a customer, creating its product on the way.
pub async fn bill_for(db: &Database, customer: &str, phone: Option<&str>) {
    let code = format!("SKU-{}", &new_id()[..8]);
    let item = product(db, &code, "Sample", "Misc", 500, 10).await;

    let bill = NewBill {
        draft_id: new_id(),
        customer_name: customer.to_string(),
        customer_phone: phone.map(str::to_string),
        items: vec![DraftLine {
            product_id: item.id,
            code: item.code,
            name: item.name,
            quantity: 1,
            unit_price: Money::from_cents(500),
        }],
        discount: Money::zero(),
        issued_on: Local::now().date_naive(),
    };

    db.bills().create_bill(&bill, "TEST").await.expect("create bill");
}

pub fn text(s: impl Into<String>) -> InputEvent {
    InputEvent::text(s)
}

pub fn select(id: impl Into<String>) -> InputEvent {
    InputEvent::select(id)
}
