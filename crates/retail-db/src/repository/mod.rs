//! # Repositories
//!
//! One repository per aggregate, each holding a clone of the pool.
//!
//! | Repository           | Tables                          |
//! |----------------------|---------------------------------|
//! | `ProductRepository`  | products (reads, inserts)       |
//! | `StockLedger`        | products.stock, stock_reservations |
//! | `BillRepository`     | bills, bill_items, sequences, customers (upsert) |
//! | `CustomerRepository` | customers, bills (aggregates)   |

pub mod bill;
pub mod customer;
pub mod ledger;
pub mod product;

/// Escapes `%`, `_` and `\` so user text matches literally inside `LIKE .. ESCAPE '\'`.
pub(crate) fn like_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
