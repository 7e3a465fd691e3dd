//! # Seed Data
//!
//! Populates the database with a small demo catalogue.
//!
//! ## Usage
//! ```bash
//! # Seed the default database (./retail_dev.db, or $RETAIL_DB_PATH)
//! cargo run -p retail-db --bin seed
//!
//! # Specify database path
//! cargo run -p retail-db --bin seed -- --db ./data/retail.db
//! ```
//!
//! Products are keyed by code: running the seed twice inserts nothing new,
//! and stock or prices changed since the last run are left alone.

use std::env;

use retail_core::{Money, Product};
use retail_db::{Database, DbConfig};

/// (code, name, price in cents, stock, reorder threshold) per category
type SeedProduct = (&'static str, &'static str, i64, i64, i64);

const CATALOGUE: &[(&str, &[SeedProduct])] = &[
    (
        "Beverages",
        &[
            ("BEV-001", "Green Tea 100g", 1000, 40, 10),
            ("BEV-002", "Masala Chai 250g", 1450, 25, 10),
            ("BEV-003", "Instant Coffee 50g", 2199, 12, 15),
            ("BEV-004", "Orange Juice 1L", 349, 30, 12),
            ("BEV-005", "Mineral Water 1L", 99, 120, 48),
        ],
    ),
    (
        "Snacks",
        &[
            ("SNK-001", "Salted Chips 150g", 250, 60, 20),
            ("SNK-002", "Butter Cookies 200g", 420, 35, 10),
            ("SNK-003", "Roasted Peanuts 500g", 675, 8, 10),
            ("SNK-004", "Dark Chocolate 90g", 299, 45, 15),
        ],
    ),
    (
        "Dairy",
        &[
            ("DRY-001", "Whole Milk 1L", 189, 24, 24),
            ("DRY-002", "Greek Yogurt 400g", 399, 14, 6),
            ("DRY-003", "Cheddar Cheese 200g", 550, 3, 5),
            ("DRY-004", "Salted Butter 500g", 825, 10, 4),
        ],
    ),
    (
        "Grocery",
        &[
            ("GRO-001", "Basmati Rice 5kg", 1899, 20, 5),
            ("GRO-002", "Wheat Flour 10kg", 1525, 0, 4),
            ("GRO-003", "Sugar 1kg", 145, 50, 20),
            ("GRO-004", "Sunflower Oil 1L", 399, 18, 10),
            ("GRO-005", "Red Lentils 1kg", 289, 22, 8),
        ],
    ),
    (
        "Household",
        &[
            ("HSE-001", "Dish Soap 500ml", 325, 16, 6),
            ("HSE-002", "Laundry Powder 2kg", 1175, 9, 4),
            ("HSE-003", "Paper Towels 4-Pack", 599, 30, 8),
        ],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = env::var("RETAIL_DB_PATH").unwrap_or_else(|_| String::from("./retail_dev.db"));

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Retail Counter Seed Data");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $RETAIL_DB_PATH or ./retail_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
            }
        }
        i += 1;
    }

    println!("Retail Counter Seed Data");
    println!("========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");
    println!();

    let mut inserted = 0;
    let mut skipped = 0;

    for (category, products) in CATALOGUE {
        for &(code, name, price_cents, stock, min_stock) in products.iter() {
            if db.products().get_by_code(code).await?.is_some() {
                skipped += 1;
                continue;
            }

            let mut product = Product::new(code, name, *category, Money::from_cents(price_cents), stock);
            product.min_stock = min_stock;
            product.cost_cents = price_cents * 7 / 10;

            if let Err(e) = db.products().insert(&product).await {
                eprintln!("Failed to insert {}: {}", code, e);
                continue;
            }
            inserted += 1;
        }
        println!("  {:<10} {} products", category, products.len());
    }

    println!();
    println!("✓ Inserted {} products ({} already present)", inserted, skipped);
    println!("  Low stock: {}", db.products().list_low_stock().await?.len());

    db.close().await;
    Ok(())
}
