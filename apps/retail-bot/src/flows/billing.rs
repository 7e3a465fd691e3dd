//! # Billing Flow
//!
//! ```text
//! AwaitingName ──text──► AwaitingPhone ──10 digits / skip──► SelectingItems
//!                                                               │   ▲
//!                              category ─► product list ────────┤   │
//!                              product  ─► pending, ask qty ────┤   │
//!                              quantity ─► reserve stock, line ─┘   │
//!                                                                   │
//!                              finish (≥1 line) ─► ConfirmingDiscount
//!                                                        │
//!                              discount ─► create_bill ─► receipt ─► Done
//!
//! cancel (any state) ─► release_draft ─► Done
//! ```
//!
//! ## Stock
//! Stock is taken when a line is added, not at finalization. The ledger
//! journals each decrement under the session's `draft_id`, so cancel, idle
//! expiry and the startup sweep can hand back exactly what was taken.

use chrono::Local;
use tracing::{debug, info};

use super::{invalid, Context, Transition};
use crate::config::BotConfig;
use crate::error::BotResult;
use crate::event::{self, Event};
use crate::intent::{cancel_button, Button, Options, OutputIntent, Receipt, Reply};
use crate::session::{BillDraft, BillingSession, BillingState, PendingProduct, Session};
use retail_core::validation::{
    is_skip, parse_discount, parse_phone, parse_quantity, validate_customer_name,
};
use retail_core::{new_id, NewBill};
use retail_db::{DbError, Reservation};

/// Opens a new draft and asks for the customer's name.
pub fn start() -> Transition {
    let session = BillingSession {
        draft_id: new_id(),
        state: BillingState::AwaitingName,
        draft: BillDraft::default(),
    };

    debug!(draft_id = %session.draft_id, "Billing started");
    Transition::to(Session::Billing(session), vec![ask_name(None)])
}

pub async fn step(ctx: &Context, s: &BillingSession, event: Event) -> BotResult<Transition> {
    if event == Event::CancelRequested {
        return cancel(ctx, s).await;
    }

    match (&s.state, event) {
        (BillingState::AwaitingName, Event::Text(text)) => Ok(on_name(s, &text)),

        (BillingState::AwaitingPhone, Event::SkipPhone) => enter_items(ctx, s, None).await,
        (BillingState::AwaitingPhone, Event::Text(text)) => on_phone(ctx, s, &text).await,

        (BillingState::SelectingItems { .. }, Event::CategorySelected(category)) => {
            on_category(ctx, s, category).await
        }
        (BillingState::SelectingItems { .. }, Event::ProductSelected(id)) => {
            on_product(ctx, s, &id).await
        }
        (BillingState::SelectingItems { pending: Some(pending) }, Event::Text(text)) => {
            on_quantity(ctx, s, pending, &text).await
        }
        (BillingState::SelectingItems { .. }, Event::BrowseCategories) => {
            let next = with_state(s, BillingState::SelectingItems { pending: None });
            Ok(Transition::to(next, vec![category_prompt(ctx).await?]))
        }
        (BillingState::SelectingItems { .. }, Event::FinishRequested) => on_finish(ctx, s).await,

        (BillingState::ConfirmingDiscount, Event::Text(text)) => on_discount(ctx, s, &text).await,

        _ => {
            let prompt = current_prompt(ctx, s).await?;
            Ok(invalid(Session::Billing(s.clone()), prompt))
        }
    }
}

/// Hands every reserved unit of the draft back to stock.
pub async fn release(ctx: &Context, s: &BillingSession) -> BotResult<i64> {
    let released = ctx.db.ledger().release_draft(&s.draft_id).await?;
    Ok(released.iter().map(|r| r.quantity).sum())
}

// =============================================================================
// Steps
// =============================================================================

fn on_name(s: &BillingSession, text: &str) -> Transition {
    match validate_customer_name(text) {
        Ok(name) => {
            let mut next = s.clone();
            next.draft.customer_name = name;
            next.state = BillingState::AwaitingPhone;
            let prompt = ask_phone(&next.draft.customer_name, None);
            Transition::to(Session::Billing(next), vec![prompt])
        }
        Err(e) => stay(s, ask_name(Some(e.to_string()))),
    }
}

async fn on_phone(ctx: &Context, s: &BillingSession, text: &str) -> BotResult<Transition> {
    if is_skip(text) {
        return enter_items(ctx, s, None).await;
    }

    match parse_phone(text) {
        Ok(phone) => enter_items(ctx, s, Some(phone)).await,
        Err(e) => Ok(stay(s, ask_phone(&s.draft.customer_name, Some(e.to_string())))),
    }
}

async fn enter_items(
    ctx: &Context,
    s: &BillingSession,
    phone: Option<String>,
) -> BotResult<Transition> {
    let prompt = category_prompt(ctx).await?;

    let mut next = s.clone();
    next.draft.customer_phone = phone;
    next.state = BillingState::SelectingItems { pending: None };

    Ok(Transition::to(Session::Billing(next), vec![prompt]))
}

async fn on_category(ctx: &Context, s: &BillingSession, category: String) -> BotResult<Transition> {
    let products = ctx.db.products().list_by_category(&category).await?;
    let next = with_state(s, BillingState::SelectingItems { pending: None });

    if products.is_empty() {
        let replies = vec![
            OutputIntent::new(Reply::EmptyCategory { category }),
            category_prompt(ctx).await?,
        ];
        return Ok(Transition::to(next, replies));
    }

    let prompt =
        OutputIntent::new(Reply::ChooseProduct { category }).with_options(Options::products(&products));
    Ok(Transition::to(next, vec![prompt]))
}

async fn on_product(ctx: &Context, s: &BillingSession, product_id: &str) -> BotResult<Transition> {
    let Some(product) = ctx.db.products().get_by_id(product_id).await? else {
        return product_vanished(ctx, s).await;
    };

    let pending = PendingProduct {
        product_id: product.id.clone(),
        name: product.name.clone(),
    };
    let prompt = ask_quantity(&product.name, product.stock, None);

    Ok(Transition::to(
        with_state(s, BillingState::SelectingItems { pending: Some(pending) }),
        vec![prompt],
    ))
}

async fn on_quantity(
    ctx: &Context,
    s: &BillingSession,
    pending: &PendingProduct,
    text: &str,
) -> BotResult<Transition> {
    let quantity = match parse_quantity(text) {
        Ok(quantity) => quantity,
        Err(e) => return reprompt_quantity(ctx, s, pending, e.to_string()).await,
    };

    // The ledger's conditional UPDATE is the stock check
    match ctx.db.ledger().reserve(&s.draft_id, &pending.product_id, quantity).await {
        Ok(Reservation::Reserved { line, remaining_stock }) => {
            debug!(
                draft_id = %s.draft_id,
                product_id = %line.product_id,
                quantity,
                remaining_stock,
                "Line added"
            );

            let mut next = s.clone();
            let line_total = line.line_total();
            let product = line.name.clone();
            next.draft.items.push(line);
            next.state = BillingState::SelectingItems { pending: None };

            let reply = Reply::ItemAdded {
                product,
                quantity,
                line_total,
                running_total: next.draft.total(),
                lines: next.draft.items.len(),
            };

            Ok(Transition::to(
                Session::Billing(next),
                vec![OutputIntent::new(reply).with_options(after_add_buttons())],
            ))
        }
        Ok(Reservation::Insufficient { available }) => {
            let reply = Reply::InsufficientStock {
                product: pending.name.clone(),
                available,
                requested: quantity,
            };
            Ok(stay(s, OutputIntent::new(reply).with_options(quantity_buttons())))
        }
        Err(DbError::NotFound { .. }) => product_vanished(ctx, s).await,
        Err(e) => Err(e.into()),
    }
}

async fn reprompt_quantity(
    ctx: &Context,
    s: &BillingSession,
    pending: &PendingProduct,
    error: String,
) -> BotResult<Transition> {
    match ctx.db.products().get_by_id(&pending.product_id).await? {
        Some(product) => Ok(stay(s, ask_quantity(&product.name, product.stock, Some(error)))),
        None => product_vanished(ctx, s).await,
    }
}

async fn on_finish(ctx: &Context, s: &BillingSession) -> BotResult<Transition> {
    if s.draft.is_empty() {
        let replies = vec![OutputIntent::new(Reply::EmptyBill), category_prompt(ctx).await?];
        return Ok(Transition::to(Session::Billing(s.clone()), replies));
    }

    let mut next = s.clone();
    next.state = BillingState::ConfirmingDiscount;
    let prompt = discount_prompt(&ctx.config, &next, None);

    Ok(Transition::to(Session::Billing(next), vec![prompt]))
}

async fn on_discount(ctx: &Context, s: &BillingSession, text: &str) -> BotResult<Transition> {
    let requested = match parse_discount(text) {
        Ok(discount) => discount,
        Err(e) => return Ok(stay(s, discount_prompt(&ctx.config, s, Some(e.to_string())))),
    };

    let new_bill = NewBill {
        draft_id: s.draft_id.clone(),
        customer_name: s.draft.customer_name.clone(),
        customer_phone: s.draft.customer_phone.clone(),
        items: s.draft.items.clone(),
        discount: requested.min(s.draft.total()),
        issued_on: Local::now().date_naive(),
    };

    let bill = ctx
        .db
        .bills()
        .create_bill(&new_bill, &ctx.config.store.bill_prefix)
        .await?;

    info!(
        bill_number = %bill.bill_number,
        draft_id = %s.draft_id,
        payable = bill.payable().cents(),
        "Bill finalized"
    );

    let receipt = Receipt {
        company_name: ctx.config.store.company_name.clone(),
        bill_number: bill.bill_number.clone(),
        issued_at: bill.created_at,
        customer_name: bill.customer_name.clone(),
        customer_phone: bill.customer_phone.clone(),
        lines: new_bill.items,
        subtotal: bill.total(),
        discount: bill.discount(),
        payable: bill.payable(),
    };

    Ok(Transition::done(vec![
        OutputIntent::new(Reply::Receipt(receipt)).with_options(Options::main_menu())
    ]))
}

async fn cancel(ctx: &Context, s: &BillingSession) -> BotResult<Transition> {
    let restored_units = release(ctx, s).await?;

    info!(draft_id = %s.draft_id, restored_units, "Billing cancelled");

    Ok(Transition::done(vec![OutputIntent::new(Reply::BillCancelled {
        restored_units,
    })
    .with_options(Options::main_menu())]))
}

async fn product_vanished(ctx: &Context, s: &BillingSession) -> BotResult<Transition> {
    let replies = vec![
        OutputIntent::new(Reply::ProductUnavailable),
        category_prompt(ctx).await?,
    ];
    Ok(Transition::to(
        with_state(s, BillingState::SelectingItems { pending: None }),
        replies,
    ))
}

// =============================================================================
// Prompts
// =============================================================================

async fn current_prompt(ctx: &Context, s: &BillingSession) -> BotResult<OutputIntent> {
    match &s.state {
        BillingState::AwaitingName => Ok(ask_name(None)),
        BillingState::AwaitingPhone => Ok(ask_phone(&s.draft.customer_name, None)),
        BillingState::SelectingItems { pending: Some(pending) } => {
            let available = ctx
                .db
                .products()
                .get_by_id(&pending.product_id)
                .await?
                .map_or(0, |p| p.stock);
            Ok(ask_quantity(&pending.name, available, None))
        }
        BillingState::SelectingItems { pending: None } if !s.draft.is_empty() => {
            Ok(OutputIntent::new(Reply::ChooseCategory).with_options(after_add_buttons()))
        }
        BillingState::SelectingItems { pending: None } => category_prompt(ctx).await,
        BillingState::ConfirmingDiscount => Ok(discount_prompt(&ctx.config, s, None)),
    }
}

async fn category_prompt(ctx: &Context) -> BotResult<OutputIntent> {
    let categories = ctx.db.products().list_categories().await?;

    if categories.is_empty() {
        return Ok(OutputIntent::new(Reply::NoProducts).with_options(Options::cancel_only()));
    }

    Ok(OutputIntent::new(Reply::ChooseCategory).with_options(Options::categories(&categories)))
}

fn ask_name(error: Option<String>) -> OutputIntent {
    OutputIntent::new(Reply::AskCustomerName { error }).with_options(Options::cancel_only())
}

fn ask_phone(customer_name: &str, error: Option<String>) -> OutputIntent {
    OutputIntent::new(Reply::AskPhone {
        customer_name: customer_name.to_string(),
        error,
    })
    .with_options(Options::buttons(vec![
        vec![Button::new(event::SKIP_PHONE, "Skip")],
        vec![cancel_button()],
    ]))
}

fn ask_quantity(product: &str, available: i64, error: Option<String>) -> OutputIntent {
    OutputIntent::new(Reply::AskQuantity {
        product: product.to_string(),
        available,
        error,
    })
    .with_options(quantity_buttons())
}

fn discount_prompt(config: &BotConfig, s: &BillingSession, error: Option<String>) -> OutputIntent {
    let presets = config
        .store
        .discount_presets
        .iter()
        .map(|amount| Button::new(format!("{}{}", event::DISCOUNT_PREFIX, amount), amount.to_string()))
        .collect();

    OutputIntent::new(Reply::ConfirmDiscount {
        lines: s.draft.items.clone(),
        total: s.draft.total(),
        error,
    })
    .with_options(Options::buttons(vec![presets, vec![cancel_button()]]))
}

fn quantity_buttons() -> Options {
    Options::buttons(vec![
        vec![Button::new(event::ADD_ITEM, "Back to categories")],
        vec![cancel_button()],
    ])
}

fn after_add_buttons() -> Options {
    Options::buttons(vec![
        vec![
            Button::new(event::ADD_ITEM, "Add item"),
            Button::new(event::FINISH, "Finish"),
        ],
        vec![cancel_button()],
    ])
}

// =============================================================================
// Helpers
// =============================================================================

fn stay(s: &BillingSession, prompt: OutputIntent) -> Transition {
    Transition::to(Session::Billing(s.clone()), vec![prompt])
}

fn with_state(s: &BillingSession, state: BillingState) -> Session {
    let mut next = s.clone();
    next.state = state;
    Session::Billing(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use retail_core::{Money, Product};

    async fn run(ctx: &Context, session: &Session, event: Event) -> Transition {
        super::super::step(ctx, session, event).await.unwrap()
    }

    fn billing(t: &Transition) -> &BillingSession {
        match t.next.as_ref() {
            Some(Session::Billing(b)) => b,
            other => panic!("expected billing session, got {:?}", other),
        }
    }

    fn selecting() -> Session {
        Session::Billing(BillingSession {
            draft_id: new_id(),
            state: BillingState::SelectingItems { pending: None },
            draft: BillDraft {
                customer_name: "Asha".to_string(),
                customer_phone: None,
                items: Vec::new(),
            },
        })
    }

    async fn add(ctx: &Context, session: Session, product: &Product, qty: &str) -> Session {
        let t = run(ctx, &session, Event::ProductSelected(product.id.clone())).await;
        let t = run(ctx, t.next.as_ref().unwrap(), Event::Text(qty.to_string())).await;
        assert!(
            matches!(t.replies[0].reply, Reply::ItemAdded { .. }),
            "unexpected {:?}",
            t.replies
        );
        t.next.unwrap()
    }

    #[tokio::test]
    async fn test_name_and_phone_steps() {
        let ctx = testing::context().await;
        testing::product(&ctx.db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;

        let t = start();
        assert_eq!(billing(&t).state, BillingState::AwaitingName);

        let t = run(&ctx, t.next.as_ref().unwrap(), Event::Text("   ".to_string())).await;
        assert!(matches!(t.replies[0].reply, Reply::AskCustomerName { error: Some(_) }));
        assert_eq!(billing(&t).state, BillingState::AwaitingName);

        let t = run(&ctx, t.next.as_ref().unwrap(), Event::Text(" Asha ".to_string())).await;
        assert_eq!(billing(&t).draft.customer_name, "Asha");
        assert_eq!(billing(&t).state, BillingState::AwaitingPhone);

        let before = t.next.clone().unwrap();
        let t = run(&ctx, &before, Event::Text("12345".to_string())).await;
        assert_eq!(t.next.as_ref(), Some(&before));
        assert!(matches!(t.replies[0].reply, Reply::AskPhone { error: Some(_), .. }));

        let t = run(&ctx, &before, Event::Text("SKIP".to_string())).await;
        assert_eq!(billing(&t).state, BillingState::SelectingItems { pending: None });
        assert_eq!(billing(&t).draft.customer_phone, None);
        assert_eq!(t.replies[0].reply, Reply::ChooseCategory);

        let t = run(&ctx, &before, Event::Text("9876543210".to_string())).await;
        assert_eq!(billing(&t).draft.customer_phone.as_deref(), Some("9876543210"));
    }

    #[tokio::test]
    async fn test_category_lists_products_with_price_and_stock() {
        let ctx = testing::context().await;
        let tea = testing::product(&ctx.db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;

        let t = run(&ctx, &selecting(), Event::CategorySelected("Beverages".to_string())).await;
        let Options::Entities { entries, .. } = &t.replies[0].options else {
            panic!("expected entities");
        };
        assert_eq!(entries[0].id, format!("product:{}", tea.id));
        assert_eq!(entries[0].price, Some(Money::from_cents(1000)));
        assert_eq!(entries[0].stock, Some(5));

        let t = run(&ctx, &selecting(), Event::CategorySelected("Nope".to_string())).await;
        assert_eq!(t.replies[0].reply, Reply::EmptyCategory { category: "Nope".to_string() });
    }

    #[tokio::test]
    async fn test_invalid_quantity_is_idempotent() {
        let ctx = testing::context().await;
        let tea = testing::product(&ctx.db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;

        let t = run(&ctx, &selecting(), Event::ProductSelected(tea.id.clone())).await;
        let pending = t.next.unwrap();

        for bad in ["0", "-1", "abc", "2.5", "99999999999999999999", "0", "abc"] {
            let t = run(&ctx, &pending, Event::Text(bad.to_string())).await;
            assert_eq!(t.next.as_ref(), Some(&pending));
            assert!(matches!(
                t.replies[0].reply,
                Reply::AskQuantity { error: Some(_), available: 5, .. }
            ));
        }
        assert_eq!(testing::stock_of(&ctx.db, &tea.id).await, 5);
    }

    #[tokio::test]
    async fn test_bulk_quantity_up_to_stock() {
        let ctx = testing::context().await;
        let rice = testing::product(&ctx.db, "RICE", "Basmati Rice", "Staples", 150, 2000).await;

        let session = add(&ctx, selecting(), &rice, "1000").await;
        let Session::Billing(b) = &session else {
            panic!("expected billing session");
        };
        assert_eq!(b.draft.items[0].quantity, 1000);
        assert_eq!(b.draft.total(), Money::from_cents(150_000));
        assert_eq!(testing::stock_of(&ctx.db, &rice.id).await, 1000);
    }

    #[tokio::test]
    async fn test_quantity_over_stock_keeps_pending() {
        let ctx = testing::context().await;
        let tea = testing::product(&ctx.db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;

        let t = run(&ctx, &selecting(), Event::ProductSelected(tea.id.clone())).await;
        let pending = t.next.unwrap();

        let t = run(&ctx, &pending, Event::Text("6".to_string())).await;
        assert_eq!(t.next.as_ref(), Some(&pending));
        assert_eq!(
            t.replies[0].reply,
            Reply::InsufficientStock {
                product: "Green Tea".to_string(),
                available: 5,
                requested: 6
            }
        );
        assert_eq!(testing::stock_of(&ctx.db, &tea.id).await, 5);
    }

    #[tokio::test]
    async fn test_running_total_and_empty_finish() {
        let ctx = testing::context().await;
        let tea = testing::product(&ctx.db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;
        let chips = testing::product(&ctx.db, "SNK1", "Chips", "Snacks", 250, 10).await;

        let empty = selecting();
        let t = run(&ctx, &empty, Event::FinishRequested).await;
        assert_eq!(t.replies[0].reply, Reply::EmptyBill);
        assert_eq!(t.next.as_ref(), Some(&empty));

        let session = add(&ctx, empty, &tea, "2").await;
        let t = run(&ctx, &session, Event::ProductSelected(chips.id.clone())).await;
        let t = run(&ctx, t.next.as_ref().unwrap(), Event::Text("3".to_string())).await;
        assert_eq!(
            t.replies[0].reply,
            Reply::ItemAdded {
                product: "Chips".to_string(),
                quantity: 3,
                line_total: Money::from_cents(750),
                running_total: Money::from_cents(2750),
                lines: 2,
            }
        );
        assert_eq!(billing(&t).draft.total().cents(), 2750);
    }

    #[tokio::test]
    async fn test_cancel_restores_every_line() {
        let ctx = testing::context().await;
        let tea = testing::product(&ctx.db, "SKU1", "Green Tea", "Beverages", 1000, 10).await;
        let chips = testing::product(&ctx.db, "SNK1", "Chips", "Snacks", 250, 4).await;

        let session = add(&ctx, selecting(), &tea, "2").await;
        let session = add(&ctx, session, &chips, "4").await;
        let session = add(&ctx, session, &tea, "1").await;
        assert_eq!(testing::stock_of(&ctx.db, &tea.id).await, 7);
        assert_eq!(testing::stock_of(&ctx.db, &chips.id).await, 0);

        // Cancel with a quantity prompt open
        let t = run(&ctx, &session, Event::ProductSelected(tea.id.clone())).await;
        let t = run(&ctx, t.next.as_ref().unwrap(), Event::CancelRequested).await;

        assert!(t.next.is_none());
        assert_eq!(t.replies[0].reply, Reply::BillCancelled { restored_units: 7 });
        assert_eq!(testing::stock_of(&ctx.db, &tea.id).await, 10);
        assert_eq!(testing::stock_of(&ctx.db, &chips.id).await, 4);
    }

    #[tokio::test]
    async fn test_discount_is_clamped_and_prices_are_snapshots() {
        let ctx = testing::context().await;
        let tea = testing::product(&ctx.db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;

        let session = add(&ctx, selecting(), &tea, "2").await;
        testing::set_price(&ctx.db, &tea.id, 9900).await;

        let t = run(&ctx, &session, Event::FinishRequested).await;
        let confirming = t.next.unwrap();

        let t = run(&ctx, &confirming, Event::Text("-3".to_string())).await;
        assert_eq!(t.next.as_ref(), Some(&confirming));
        assert!(matches!(t.replies[0].reply, Reply::ConfirmDiscount { error: Some(_), .. }));

        let t = run(&ctx, &confirming, Event::Text("50".to_string())).await;
        assert!(t.next.is_none());
        let Reply::Receipt(receipt) = &t.replies[0].reply else {
            panic!("expected receipt");
        };
        assert_eq!(receipt.subtotal.cents(), 2000);
        assert_eq!(receipt.discount.cents(), 2000);
        assert_eq!(receipt.payable, Money::zero());
        assert_eq!(receipt.lines[0].unit_price.cents(), 1000);
    }

    #[tokio::test]
    async fn test_unexpected_events_reprompt() {
        let ctx = testing::context().await;
        let session = start().next.unwrap();
        let t = run(&ctx, &session, Event::FinishRequested).await;
        assert_eq!(t.next.as_ref(), Some(&session));
        assert_eq!(t.replies[0].reply, Reply::InvalidInput);
        assert_eq!(t.replies[1].reply, Reply::AskCustomerName { error: None });
    }
}
