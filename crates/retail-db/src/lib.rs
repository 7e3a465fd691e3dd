//! # retail-db: Database Layer
//!
//! SQLite access for the retail counter bot, through sqlx.
//!
//! `Database` owns the pool and hands out one repository per table group:
//! products, the stock ledger, bills and customers. Migrations are embedded and
//! run on connect.
//!
//! ## Atomicity Rules
//! - Stock only moves through [`StockLedger`], as one conditional UPDATE.
//! - A bill, its items, its sequence value and its customer row are written
//!   in one transaction by [`BillRepository::create_bill`].

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::bill::BillRepository;
pub use repository::customer::CustomerRepository;
pub use repository::ledger::{ReleasedLine, Reservation, StockAdjustment, StockLedger};
pub use repository::product::ProductRepository;
