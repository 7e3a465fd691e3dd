//! # Inventory Flow
//!
//! ```text
//! SelectingAction ──add/remove──► SelectingProduct ──search──► results
//!       │  ▲                            │    ▲                    │
//!       │  └────────── back ────────────┘    └─ not found ────────┤
//!       │                                                         │
//!       │                              product selected ◄─────────┘
//!       │                                     │
//!       │                                     ▼
//!       │                              EnteringQuantity ──guarded update──► Done
//!       │                                     │
//!       │                                     └─ would go negative: stay
//!       │
//!       └──low stock──► report ──► Done
//! ```
//!
//! Adjustments go through [`StockLedger::adjust_stock`](retail_db::StockLedger::adjust_stock),
//! the same guard billing uses, so a removal racing a sale cannot take stock
//! below zero.

use tracing::info;

use super::{invalid, Context, Transition};
use crate::error::BotResult;
use crate::event::{self, Event, InventoryAction};
use crate::intent::{cancel_button, Button, LowStockLine, Options, OutputIntent, Reply};
use crate::session::{InventorySession, InventoryState, SelectedProduct, Session};
use retail_core::validation::{parse_quantity, validate_search_query};
use retail_db::{DbError, StockAdjustment};

pub fn start() -> Transition {
    let session = InventorySession {
        state: InventoryState::SelectingAction,
    };
    Transition::to(Session::Inventory(session), vec![choose_action()])
}

pub async fn step(ctx: &Context, s: &InventorySession, event: Event) -> BotResult<Transition> {
    if event == Event::CancelRequested {
        return Ok(Transition::done(vec![
            OutputIntent::new(Reply::Cancelled).with_options(Options::main_menu())
        ]));
    }

    match (&s.state, event) {
        (InventoryState::SelectingAction, Event::ActionSelected(InventoryAction::ViewLowStock)) => {
            low_stock_report(ctx).await
        }
        (InventoryState::SelectingAction, Event::ActionSelected(action)) => Ok(Transition::to(
            with_state(InventoryState::SelectingProduct { action }),
            vec![ask_search(action, None)],
        )),

        (InventoryState::SelectingProduct { action }, Event::Text(text)) => {
            search(ctx, *action, &text).await
        }
        (InventoryState::SelectingProduct { action }, Event::ProductSelected(id)) => {
            select_product(ctx, *action, &id).await
        }
        (InventoryState::SelectingProduct { .. }, Event::BackToActions) => Ok(Transition::to(
            with_state(InventoryState::SelectingAction),
            vec![choose_action()],
        )),

        (InventoryState::EnteringQuantity { action, product }, Event::Text(text)) => {
            adjust(ctx, s, *action, product, &text).await
        }
        (InventoryState::EnteringQuantity { action, .. }, Event::BackToActions) => {
            Ok(Transition::to(
                with_state(InventoryState::SelectingProduct { action: *action }),
                vec![ask_search(*action, None)],
            ))
        }

        _ => {
            let prompt = current_prompt(ctx, s).await?;
            Ok(invalid(Session::Inventory(s.clone()), prompt))
        }
    }
}

async fn low_stock_report(ctx: &Context) -> BotResult<Transition> {
    let products = ctx.db.products().list_low_stock().await?;
    let products = products.iter().map(LowStockLine::from).collect();

    Ok(Transition::done(vec![
        OutputIntent::new(Reply::LowStockReport { products }).with_options(Options::main_menu())
    ]))
}

async fn search(ctx: &Context, action: InventoryAction, text: &str) -> BotResult<Transition> {
    let state = with_state(InventoryState::SelectingProduct { action });

    let query = match validate_search_query(text) {
        Ok(query) => query,
        Err(e) => return Ok(Transition::to(state, vec![ask_search(action, Some(e.to_string()))])),
    };

    let products = ctx
        .db
        .products()
        .search(&query, ctx.config.session.search_limit)
        .await?;

    if products.is_empty() {
        let replies = vec![
            OutputIntent::new(Reply::NoProductsFound { query }),
            ask_search(action, None),
        ];
        return Ok(Transition::to(state, replies));
    }

    let results =
        OutputIntent::new(Reply::SearchResults { query }).with_options(Options::products(&products));
    Ok(Transition::to(state, vec![results]))
}

async fn select_product(ctx: &Context, action: InventoryAction, id: &str) -> BotResult<Transition> {
    let Some(product) = ctx.db.products().get_by_id(id).await? else {
        return Ok(Transition::to(
            with_state(InventoryState::SelectingProduct { action }),
            vec![OutputIntent::new(Reply::ProductUnavailable), ask_search(action, None)],
        ));
    };

    let prompt = ask_adjustment(action, &product.name, product.stock, None);
    let selected = SelectedProduct {
        id: product.id,
        code: product.code,
        name: product.name,
    };

    Ok(Transition::to(
        with_state(InventoryState::EnteringQuantity {
            action,
            product: selected,
        }),
        vec![prompt],
    ))
}

async fn adjust(
    ctx: &Context,
    s: &InventorySession,
    action: InventoryAction,
    product: &SelectedProduct,
    text: &str,
) -> BotResult<Transition> {
    let quantity = match parse_quantity(text) {
        Ok(quantity) => quantity,
        Err(e) => {
            let stock = current_stock(ctx, &product.id).await?;
            let prompt = ask_adjustment(action, &product.name, stock, Some(e.to_string()));
            return Ok(Transition::to(Session::Inventory(s.clone()), vec![prompt]));
        }
    };

    let delta = match action {
        InventoryAction::Remove => -quantity,
        _ => quantity,
    };

    match ctx.db.ledger().adjust_stock(&product.id, delta).await {
        Ok(StockAdjustment::Applied { new_stock }) => {
            info!(code = %product.code, delta, new_stock, "Stock adjusted");

            let reply = Reply::StockUpdated {
                product: product.name.clone(),
                action,
                quantity,
                new_stock,
            };
            Ok(Transition::done(vec![
                OutputIntent::new(reply).with_options(Options::main_menu())
            ]))
        }
        Ok(StockAdjustment::Rejected { available }) if action == InventoryAction::Add => {
            let error = "that would take stock past the largest storable amount".to_string();
            let prompt = ask_adjustment(action, &product.name, available, Some(error));
            Ok(Transition::to(Session::Inventory(s.clone()), vec![prompt]))
        }
        Ok(StockAdjustment::Rejected { available }) => {
            let reply = Reply::StockRejected {
                product: product.name.clone(),
                available,
                requested: quantity,
            };
            Ok(Transition::to(
                Session::Inventory(s.clone()),
                vec![OutputIntent::new(reply).with_options(adjustment_buttons())],
            ))
        }
        Err(DbError::NotFound { .. }) => Ok(Transition::to(
            with_state(InventoryState::SelectingProduct { action }),
            vec![OutputIntent::new(Reply::ProductUnavailable), ask_search(action, None)],
        )),
        Err(e) => Err(e.into()),
    }
}

async fn current_stock(ctx: &Context, product_id: &str) -> BotResult<i64> {
    Ok(ctx
        .db
        .products()
        .get_by_id(product_id)
        .await?
        .map_or(0, |p| p.stock))
}

async fn current_prompt(ctx: &Context, s: &InventorySession) -> BotResult<OutputIntent> {
    match &s.state {
        InventoryState::SelectingAction => Ok(choose_action()),
        InventoryState::SelectingProduct { action } => Ok(ask_search(*action, None)),
        InventoryState::EnteringQuantity { action, product } => {
            let stock = current_stock(ctx, &product.id).await?;
            Ok(ask_adjustment(*action, &product.name, stock, None))
        }
    }
}

fn choose_action() -> OutputIntent {
    OutputIntent::new(Reply::ChooseInventoryAction).with_options(Options::buttons(vec![
        vec![
            Button::new(event::STOCK_ADD, "Add stock"),
            Button::new(event::STOCK_REMOVE, "Remove stock"),
        ],
        vec![Button::new(event::LOW_STOCK, "Low stock report")],
        vec![cancel_button()],
    ]))
}

fn ask_search(action: InventoryAction, error: Option<String>) -> OutputIntent {
    OutputIntent::new(Reply::AskProductSearch { action, error }).with_options(adjustment_buttons())
}

fn ask_adjustment(
    action: InventoryAction,
    product: &str,
    stock: i64,
    error: Option<String>,
) -> OutputIntent {
    OutputIntent::new(Reply::AskAdjustment {
        action,
        product: product.to_string(),
        stock,
        error,
    })
    .with_options(adjustment_buttons())
}

fn adjustment_buttons() -> Options {
    Options::buttons(vec![
        vec![Button::new(event::BACK, "Back")],
        vec![cancel_button()],
    ])
}

fn with_state(state: InventoryState) -> Session {
    Session::Inventory(InventorySession { state })
}
