//! # Text Rendering
//!
//! Turns an [`OutputIntent`] into plain text plus a numbered list of choices.
//! This is the only place that knows about currency symbols, thousands
//! separators and wording.
//!
//! ```text
//! Reply::ItemAdded { quantity: 2, product: "Green Tea", line_total: 2000, .. }
//!     │
//!     ▼
//! Rendered {
//!     text: "Added 2 × Green Tea ($20.00). Bill total: $20.00 (1 line)",
//!     choices: [#1 Add item, #2 Finish, #3 Cancel],
//! }
//! ```

use chrono::Local;
use serde::Serialize;

use crate::event::InventoryAction;
use crate::intent::{Options, OutputIntent, Receipt, Reply};
use retail_core::Money;

const RULE: &str = "----------------------------------------";

/// `$1,234.50`: symbol, thousands grouping, two decimals.
pub fn format_money(amount: Money, symbol: &str) -> String {
    let cents = amount.cents();
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();

    let major = (cents / 100).to_string();
    let mut grouped = String::with_capacity(major.len() + major.len() / 3);
    for (i, digit) in major.chars().enumerate() {
        if i > 0 && (major.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}{}{}.{:02}", sign, symbol, grouped, cents % 100)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered {
    pub text: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    currency_symbol: String,
}

impl Renderer {
    pub fn new(currency_symbol: impl Into<String>) -> Self {
        Renderer {
            currency_symbol: currency_symbol.into(),
        }
    }

    pub fn render(&self, intent: &OutputIntent) -> Rendered {
        Rendered {
            text: self.text(&intent.reply),
            choices: self.choices(&intent.options),
        }
    }

    fn money(&self, amount: Money) -> String {
        format_money(amount, &self.currency_symbol)
    }

    fn choices(&self, options: &Options) -> Vec<Choice> {
        match options {
            Options::None => Vec::new(),
            Options::Buttons { rows } => rows
                .iter()
                .flatten()
                .map(|b| Choice {
                    id: b.id.clone(),
                    label: b.label.clone(),
                })
                .collect(),
            Options::Entities { entries, .. } => entries
                .iter()
                .map(|e| {
                    let label = match (e.price, e.stock) {
                        (Some(price), Some(stock)) => {
                            format!("{} ({}, {} in stock)", e.name, self.money(price), stock)
                        }
                        _ => e.name.clone(),
                    };
                    Choice {
                        id: e.id.clone(),
                        label,
                    }
                })
                .collect(),
        }
    }

    fn text(&self, reply: &Reply) -> String {
        match reply {
            // ---- General -------------------------------------------------
            Reply::Welcome { company_name } => format!(
                "Welcome to {}!\nWhat would you like to do?",
                company_name
            ),
            Reply::Help => [
                "Commands:",
                "  Generate Bill  start a new bill (/bill)",
                "  Inventory      add or remove stock, low stock report (/inventory)",
                "  Customers      look up a customer by phone or name (/customers)",
                "  cancel         leave the current flow at any point",
                "  /menu          show the main menu",
            ]
            .join("\n"),
            Reply::InvalidInput => "Sorry, I didn't understand that.".to_string(),
            Reply::TransientFailure => {
                "Something went wrong on our side. Please try again.".to_string()
            }
            Reply::Cancelled => "Cancelled.".to_string(),

            // ---- Billing -------------------------------------------------
            Reply::AskCustomerName { error } => {
                with_error(error, "Customer name?".to_string())
            }
            Reply::AskPhone {
                customer_name,
                error,
            } => with_error(
                error,
                format!("Phone number for {}? (10 digits, or 'skip')", customer_name),
            ),
            Reply::ChooseCategory => "Choose a category:".to_string(),
            Reply::NoProducts => "There are no products in the catalogue yet.".to_string(),
            Reply::ChooseProduct { category } => format!("{}: choose a product", category),
            Reply::EmptyCategory { category } => format!("No products in {}.", category),
            Reply::ProductUnavailable => "That product is no longer available.".to_string(),
            Reply::AskQuantity {
                product,
                available,
                error,
            } => with_error(
                error,
                format!("How many {}? ({} in stock)", product, available),
            ),
            Reply::InsufficientStock {
                product,
                available,
                requested,
            } => format!(
                "Only {} {} left, cannot add {}. Enter a smaller quantity.",
                available, product, requested
            ),
            Reply::ItemAdded {
                product,
                quantity,
                line_total,
                running_total,
                lines,
            } => format!(
                "Added {} × {} ({}). Bill total: {} ({} {})",
                quantity,
                product,
                self.money(*line_total),
                self.money(*running_total),
                lines,
                if *lines == 1 { "line" } else { "lines" }
            ),
            Reply::EmptyBill => "Add at least one item before finishing.".to_string(),
            Reply::ConfirmDiscount {
                lines,
                total,
                error,
            } => {
                let mut out = String::from("Bill summary:\n");
                for line in lines {
                    out.push_str(&format!(
                        "  {} × {} = {}\n",
                        line.quantity,
                        line.name,
                        self.money(line.line_total())
                    ));
                }
                out.push_str(&format!(
                    "Total: {}\nDiscount amount? (0 for none)",
                    self.money(*total)
                ));
                with_error(error, out)
            }
            Reply::Receipt(receipt) => self.receipt(receipt),
            Reply::BillCancelled { restored_units } => format!(
                "Bill cancelled. {} unit(s) returned to stock.",
                restored_units
            ),

            // ---- Inventory -----------------------------------------------
            Reply::ChooseInventoryAction => "Inventory: choose an action".to_string(),
            Reply::AskProductSearch { action, error } => with_error(
                error,
                format!("Product to {}? Type a name or code.", verb(*action)),
            ),
            Reply::SearchResults { query } => format!("Products matching '{}':", query),
            Reply::NoProductsFound { query } => format!("No products match '{}'.", query),
            Reply::AskAdjustment {
                action,
                product,
                stock,
                error,
            } => with_error(
                error,
                format!(
                    "How many units of {} to {}? Current stock: {}",
                    product,
                    verb(*action),
                    stock
                ),
            ),
            Reply::StockRejected {
                product,
                available,
                requested,
            } => format!(
                "Cannot remove {} × {}: only {} in stock.",
                requested, product, available
            ),
            Reply::StockUpdated {
                product,
                action,
                quantity,
                new_stock,
            } => format!(
                "{} {} × {}. Stock is now {}.",
                match action {
                    InventoryAction::Remove => "Removed",
                    _ => "Added",
                },
                quantity,
                product,
                new_stock
            ),
            Reply::LowStockReport { products } if products.is_empty() => {
                "All products are at or above their reorder level.".to_string()
            }
            Reply::LowStockReport { products } => {
                let mut out = String::from("Low stock:");
                for p in products {
                    out.push_str(&format!(
                        "\n  {} {}: {} left (reorder at {})",
                        p.code, p.name, p.stock, p.min_stock
                    ));
                }
                out
            }

            // ---- Customers -----------------------------------------------
            Reply::AskCustomerSearch { error } => with_error(
                error,
                "Customer phone number or name?".to_string(),
            ),
            Reply::CustomerNotFound { query } => format!("No customer found for '{}'.", query),
            Reply::CustomerProfile(c) | Reply::CustomerUpdated(c) => {
                let heading = if matches!(reply, Reply::CustomerUpdated(_)) {
                    "Customer updated.\n"
                } else {
                    ""
                };
                format!(
                    "{}{}\nPhone: {}\nBills: {}\nTotal spent: {}\nLast purchase: {}",
                    heading,
                    c.name,
                    c.phone.as_deref().unwrap_or("-"),
                    c.bill_count,
                    self.money(c.total_spent()),
                    c.last_purchase
                        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "never".to_string())
                )
            }
            Reply::AskCustomerEdit { error } => with_error(
                error,
                "New details as 'Name, Phone' (phone may be 'skip' to clear):".to_string(),
            ),
            Reply::PurchaseHistory { customer, records } if records.is_empty() => {
                format!("{} has no purchases yet.", customer)
            }
            Reply::PurchaseHistory { customer, records } => {
                let mut out = format!("Purchases of {}:", customer);
                for r in records {
                    out.push_str(&format!(
                        "\n  {}  {}  {} item(s)  {}",
                        r.bill_number,
                        r.created_at.with_timezone(&Local).format("%Y-%m-%d"),
                        r.item_count,
                        self.money(r.payable())
                    ));
                }
                out
            }
        }
    }

    fn receipt(&self, r: &Receipt) -> String {
        let mut out = vec![
            r.company_name.clone(),
            format!("Bill: {}", r.bill_number),
            format!(
                "Date: {}",
                r.issued_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            ),
        ];

        match &r.customer_phone {
            Some(phone) => out.push(format!("Customer: {} ({})", r.customer_name, phone)),
            None => out.push(format!("Customer: {}", r.customer_name)),
        }

        out.push(RULE.to_string());
        for line in &r.lines {
            out.push(format!(
                "{} × {} @ {} = {}",
                line.quantity,
                line.name,
                self.money(line.unit_price),
                self.money(line.line_total())
            ));
        }
        out.push(RULE.to_string());

        out.push(format!("Subtotal: {}", self.money(r.subtotal)));
        out.push(format!("Discount: {}", self.money(r.discount)));
        out.push(format!("Payable:  {}", self.money(r.payable)));
        out.push(String::new());
        out.push("Thank you for shopping with us!".to_string());

        out.join("\n")
    }
}

fn verb(action: InventoryAction) -> &'static str {
    match action {
        InventoryAction::Add => "add",
        InventoryAction::Remove => "remove",
        InventoryAction::ViewLowStock => "review",
    }
}

fn with_error(error: &Option<String>, prompt: String) -> String {
    match error {
        Some(error) => format!("{}\n{}", error, prompt),
        None => prompt,
    }
}
