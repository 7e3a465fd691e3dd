//! # Customer Flow
//!
//! Lookup by exact phone or by name fragment, then edit or list purchases.
//!
//! ```text
//! Searching ──10 digits──► find_by_phone ──┐
//!     │                                    ├─ found ──► Viewing
//!     └──other text──► search_by_name ─────┘
//!
//! Viewing ──edit──► "Name, Phone" ──► update ──► Viewing
//!    │
//!    └──history──► last N bills, newest first
//! ```

use tracing::info;

use super::{invalid, Context, Transition};
use crate::error::BotResult;
use crate::event::{self, Event};
use crate::intent::{cancel_button, Button, Options, OutputIntent, Reply};
use crate::session::{CustomerSession, CustomerState, Session};
use retail_core::validation::{is_phone_number, parse_customer_edit, validate_search_query};
use retail_core::{CoreError, CustomerSummary};
use retail_db::DbError;

pub fn start() -> Transition {
    let session = CustomerSession {
        state: CustomerState::Searching,
    };
    Transition::to(Session::Customer(session), vec![ask_search(None)])
}

pub async fn step(ctx: &Context, s: &CustomerSession, event: Event) -> BotResult<Transition> {
    if event == Event::CancelRequested {
        return Ok(Transition::done(vec![
            OutputIntent::new(Reply::Cancelled).with_options(Options::main_menu())
        ]));
    }

    match (&s.state, event) {
        (CustomerState::Searching, Event::Text(text)) => lookup(ctx, s, &text).await,

        (CustomerState::Viewing { customer, editing: true }, Event::Text(text)) => {
            edit(ctx, s, customer, &text).await
        }
        (CustomerState::Viewing { customer, .. }, Event::EditRequested) => Ok(Transition::to(
            viewing(customer.clone(), true),
            vec![ask_edit(None)],
        )),
        (CustomerState::Viewing { customer, .. }, Event::HistoryRequested) => {
            let records = ctx
                .db
                .customers()
                .history(&customer.id, ctx.config.session.history_limit)
                .await?;

            let reply = Reply::PurchaseHistory {
                customer: customer.name.clone(),
                records,
            };
            Ok(Transition::to(
                viewing(customer.clone(), false),
                vec![OutputIntent::new(reply).with_options(profile_buttons())],
            ))
        }

        _ => Ok(invalid(Session::Customer(s.clone()), current_prompt(s))),
    }
}

async fn lookup(ctx: &Context, s: &CustomerSession, text: &str) -> BotResult<Transition> {
    let query = text.trim();

    let found = if is_phone_number(query) {
        ctx.db.customers().find_by_phone(query).await?
    } else {
        match validate_search_query(query) {
            Ok(query) => ctx.db.customers().search_by_name(&query).await?,
            Err(e) => {
                return Ok(Transition::to(
                    Session::Customer(s.clone()),
                    vec![ask_search(Some(e.to_string()))],
                ))
            }
        }
    };

    match found {
        Some(customer) => Ok(Transition::to(
            viewing(customer.clone(), false),
            vec![profile(customer)],
        )),
        None => Ok(Transition::to(
            Session::Customer(s.clone()),
            vec![
                OutputIntent::new(Reply::CustomerNotFound {
                    query: query.to_string(),
                }),
                ask_search(None),
            ],
        )),
    }
}

async fn edit(
    ctx: &Context,
    s: &CustomerSession,
    customer: &CustomerSummary,
    text: &str,
) -> BotResult<Transition> {
    let (name, phone) = match parse_customer_edit(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            return Ok(Transition::to(
                Session::Customer(s.clone()),
                vec![ask_edit(Some(e.to_string()))],
            ))
        }
    };

    match ctx.db.customers().update(&customer.id, &name, phone.as_deref()).await {
        Ok(updated) => {
            info!(customer_id = %updated.id, "Customer updated");
            Ok(Transition::to(
                viewing(updated.clone(), false),
                vec![OutputIntent::new(Reply::CustomerUpdated(updated))
                    .with_options(profile_buttons())],
            ))
        }
        Err(e) if e.is_unique_violation_on("customers.phone") => {
            let error = CoreError::PhoneInUse {
                phone: phone.unwrap_or_default(),
            };
            Ok(Transition::to(
                Session::Customer(s.clone()),
                vec![ask_edit(Some(error.to_string()))],
            ))
        }
        Err(DbError::NotFound { .. }) => Ok(Transition::to(
            Session::Customer(CustomerSession {
                state: CustomerState::Searching,
            }),
            vec![
                OutputIntent::new(Reply::CustomerNotFound {
                    query: customer.name.clone(),
                }),
                ask_search(None),
            ],
        )),
        Err(e) => Err(e.into()),
    }
}

fn current_prompt(s: &CustomerSession) -> OutputIntent {
    match &s.state {
        CustomerState::Searching => ask_search(None),
        CustomerState::Viewing { editing: true, .. } => ask_edit(None),
        CustomerState::Viewing { customer, .. } => profile(customer.clone()),
    }
}

fn viewing(customer: CustomerSummary, editing: bool) -> Session {
    Session::Customer(CustomerSession {
        state: CustomerState::Viewing { customer, editing },
    })
}

fn profile(customer: CustomerSummary) -> OutputIntent {
    OutputIntent::new(Reply::CustomerProfile(customer)).with_options(profile_buttons())
}

fn ask_search(error: Option<String>) -> OutputIntent {
    OutputIntent::new(Reply::AskCustomerSearch { error }).with_options(Options::cancel_only())
}

fn ask_edit(error: Option<String>) -> OutputIntent {
    OutputIntent::new(Reply::AskCustomerEdit { error }).with_options(Options::cancel_only())
}

fn profile_buttons() -> Options {
    Options::buttons(vec![
        vec![
            Button::new(event::EDIT_CUSTOMER, "Edit"),
            Button::new(event::CUSTOMER_HISTORY, "History"),
        ],
        vec![cancel_button()],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    async fn run(ctx: &Context, session: &Session, event: Event) -> Transition {
        super::super::step(ctx, session, event).await.unwrap()
    }

    fn viewed(t: &Transition) -> &CustomerSummary {
        match t.next.as_ref() {
            Some(Session::Customer(CustomerSession {
                state: CustomerState::Viewing { customer, .. },
            })) => customer,
            other => panic!("expected a viewed customer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_phone_miss_then_name_match() {
        let ctx = testing::context().await;
        testing::bill_for(&ctx.db, "Asha Rao", Some("9876543210")).await;

        let searching = start().next.unwrap();
        let t = run(&ctx, &searching, Event::Text("1111111111".to_string())).await;
        assert_eq!(t.next.as_ref(), Some(&searching));
        assert_eq!(
            t.replies[0].reply,
            Reply::CustomerNotFound { query: "1111111111".to_string() }
        );

        let t = run(&ctx, &searching, Event::Text("asha".to_string())).await;
        let customer = viewed(&t);
        assert_eq!(customer.name, "Asha Rao");
        assert_eq!(customer.bill_count, 1);

        let t = run(&ctx, &searching, Event::Text("9876543210".to_string())).await;
        assert_eq!(viewed(&t).name, "Asha Rao");
    }

    #[tokio::test]
    async fn test_edit_and_history() {
        let ctx = testing::context().await;
        testing::bill_for(&ctx.db, "Asha", Some("9876543210")).await;
        testing::bill_for(&ctx.db, "Asha", Some("9876543210")).await;

        let t = run(&ctx, &start().next.unwrap(), Event::Text("Asha".to_string())).await;
        let t = run(&ctx, t.next.as_ref().unwrap(), Event::EditRequested).await;
        let editing = t.next.unwrap();

        let t = run(&ctx, &editing, Event::Text("no comma".to_string())).await;
        assert_eq!(t.next.as_ref(), Some(&editing));
        assert!(matches!(t.replies[0].reply, Reply::AskCustomerEdit { error: Some(_) }));

        let t = run(&ctx, &editing, Event::Text("Asha Rao, 9000000001".to_string())).await;
        let Reply::CustomerUpdated(updated) = &t.replies[0].reply else {
            panic!("expected update");
        };
        assert_eq!(updated.name, "Asha Rao");
        assert_eq!(updated.phone.as_deref(), Some("9000000001"));

        let t = run(&ctx, t.next.as_ref().unwrap(), Event::HistoryRequested).await;
        let Reply::PurchaseHistory { records, .. } = &t.replies[0].reply else {
            panic!("expected history");
        };
        assert_eq!(records.len(), 2);
        assert!(records[0].created_at >= records[1].created_at);
    }

    #[tokio::test]
    async fn test_phone_taken_by_another_customer() {
        let ctx = testing::context().await;
        testing::bill_for(&ctx.db, "Asha", Some("9876543210")).await;
        testing::bill_for(&ctx.db, "Ravi", Some("9000000001")).await;

        let t = run(&ctx, &start().next.unwrap(), Event::Text("Ravi".to_string())).await;
        let t = run(&ctx, t.next.as_ref().unwrap(), Event::EditRequested).await;
        let editing = t.next.unwrap();

        let t = run(&ctx, &editing, Event::Text("Ravi, 9876543210".to_string())).await;
        assert_eq!(t.next.as_ref(), Some(&editing));
        let Reply::AskCustomerEdit { error: Some(error) } = &t.replies[0].reply else {
            panic!("expected edit prompt");
        };
        assert!(error.contains("9876543210"));
    }

    #[tokio::test]
    async fn test_cancel_from_search() {
        let ctx = testing::context().await;
        let t = run(&ctx, &start().next.unwrap(), Event::CancelRequested).await;
        assert!(t.next.is_none());
        assert_eq!(t.replies[0].reply, Reply::Cancelled);
    }
}
