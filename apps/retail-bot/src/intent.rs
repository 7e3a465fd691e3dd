//! # Output Intents
//!
//! What the conversation wants shown, without deciding how it looks.
//!
//! Replies carry raw data (`Money`, counts, names). Currency symbols,
//! grouping and wording live in [`render`](crate::render) only.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::{self, InventoryAction};
use retail_core::{CustomerSummary, DraftLine, Money, Product, PurchaseRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputIntent {
    pub reply: Reply,
    pub options: Options,
}

impl OutputIntent {
    pub fn new(reply: Reply) -> Self {
        OutputIntent {
            reply,
            options: Options::None,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

impl From<Reply> for OutputIntent {
    fn from(reply: Reply) -> Self {
        OutputIntent::new(reply)
    }
}

// =============================================================================
// Replies
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    // ---- General -----------------------------------------------------------
    Welcome { company_name: String },
    Help,
    InvalidInput,
    TransientFailure,
    Cancelled,

    // ---- Billing -----------------------------------------------------------
    AskCustomerName { error: Option<String> },
    AskPhone { customer_name: String, error: Option<String> },
    ChooseCategory,
    /// The catalogue has no products at all.
    NoProducts,
    ChooseProduct { category: String },
    EmptyCategory { category: String },
    /// A selected product no longer exists.
    ProductUnavailable,
    AskQuantity { product: String, available: i64, error: Option<String> },
    InsufficientStock { product: String, available: i64, requested: i64 },
    ItemAdded {
        product: String,
        quantity: i64,
        line_total: Money,
        running_total: Money,
        lines: usize,
    },
    EmptyBill,
    ConfirmDiscount {
        lines: Vec<DraftLine>,
        total: Money,
        error: Option<String>,
    },
    Receipt(Receipt),
    BillCancelled { restored_units: i64 },

    // ---- Inventory ---------------------------------------------------------
    ChooseInventoryAction,
    AskProductSearch { action: InventoryAction, error: Option<String> },
    SearchResults { query: String },
    NoProductsFound { query: String },
    AskAdjustment {
        action: InventoryAction,
        product: String,
        stock: i64,
        error: Option<String>,
    },
    StockRejected { product: String, available: i64, requested: i64 },
    StockUpdated {
        product: String,
        action: InventoryAction,
        quantity: i64,
        new_stock: i64,
    },
    LowStockReport { products: Vec<LowStockLine> },

    // ---- Customers ---------------------------------------------------------
    AskCustomerSearch { error: Option<String> },
    CustomerNotFound { query: String },
    CustomerProfile(CustomerSummary),
    AskCustomerEdit { error: Option<String> },
    CustomerUpdated(CustomerSummary),
    PurchaseHistory {
        customer: String,
        records: Vec<PurchaseRecord>,
    },
}

/// A committed bill, as printed for the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub company_name: String,
    pub bill_number: String,
    pub issued_at: DateTime<Utc>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub lines: Vec<DraftLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub payable: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockLine {
    pub code: String,
    pub name: String,
    pub stock: i64,
    pub min_stock: i64,
}

impl From<&Product> for LowStockLine {
    fn from(product: &Product) -> Self {
        LowStockLine {
            code: product.code.clone(),
            name: product.name.clone(),
            stock: product.stock,
            min_stock: product.min_stock,
        }
    }
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Options {
    None,
    /// Rows of labelled commands.
    Buttons { rows: Vec<Vec<Button>> },
    /// Selectable entities with opaque ids (`category:<name>`, `product:<uuid>`).
    Entities { entity: EntityKind, entries: Vec<Entity> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub id: String,
    pub label: String,
}

impl Button {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Button {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Product,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub price: Option<Money>,
    pub stock: Option<i64>,
}

impl Options {
    pub fn buttons(rows: Vec<Vec<Button>>) -> Self {
        Options::Buttons { rows }
    }

    /// Generate Bill / Inventory / Customers / Help.
    pub fn main_menu() -> Self {
        Options::buttons(vec![
            vec![
                Button::new(event::MENU_BILL, "Generate Bill"),
                Button::new(event::MENU_INVENTORY, "Inventory"),
            ],
            vec![
                Button::new(event::MENU_CUSTOMERS, "Customers"),
                Button::new(event::MENU_HELP, "Help"),
            ],
        ])
    }

    pub fn cancel_only() -> Self {
        Options::buttons(vec![vec![cancel_button()]])
    }

    pub fn categories(names: &[String]) -> Self {
        Options::Entities {
            entity: EntityKind::Category,
            entries: names
                .iter()
                .map(|name| Entity {
                    id: format!("{}{}", event::CATEGORY_PREFIX, name),
                    name: name.clone(),
                    price: None,
                    stock: None,
                })
                .collect(),
        }
    }

    pub fn products(products: &[Product]) -> Self {
        Options::Entities {
            entity: EntityKind::Product,
            entries: products
                .iter()
                .map(|p| Entity {
                    id: format!("{}{}", event::PRODUCT_PREFIX, p.id),
                    name: p.name.clone(),
                    price: Some(p.price()),
                    stock: Some(p.stock),
                })
                .collect(),
        }
    }

    /// Every selectable id with its label, in display order.
    pub fn choices(&self) -> Vec<(&str, &str)> {
        match self {
            Options::None => Vec::new(),
            Options::Buttons { rows } => rows
                .iter()
                .flatten()
                .map(|b| (b.id.as_str(), b.label.as_str()))
                .collect(),
            Options::Entities { entries, .. } => entries
                .iter()
                .map(|e| (e.id.as_str(), e.name.as_str()))
                .collect(),
        }
    }
}

pub fn cancel_button() -> Button {
    Button::new(event::CANCEL, "Cancel")
}
