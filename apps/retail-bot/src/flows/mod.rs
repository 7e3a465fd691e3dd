//! # Conversation Flows
//!
//! One state machine per flow. Each step is a pure function of
//! (session, event) plus store calls.
//!
//! `step` returns `Ok(Transition)` for anything the user typed, including
//! invalid input, which comes back as a re-prompt with `next` equal to the
//! current session. `Err` is reserved for store failures; the dispatcher then
//! keeps the old session.

pub mod billing;
pub mod customer;
pub mod inventory;

use std::sync::Arc;

use crate::config::BotConfig;
use crate::error::BotResult;
use crate::event::Event;
use crate::intent::{OutputIntent, Reply};
use crate::session::Session;
use retail_db::Database;

/// What every step can reach: the store and the configuration.
#[derive(Debug, Clone)]
pub struct Context {
    pub db: Database,
    pub config: Arc<BotConfig>,
}

impl Context {
    pub fn new(db: Database, config: Arc<BotConfig>) -> Self {
        Context { db, config }
    }
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// `None` ends the flow.
    pub next: Option<Session>,
    pub replies: Vec<OutputIntent>,
}

impl Transition {
    pub fn to(next: Session, replies: Vec<OutputIntent>) -> Self {
        Transition {
            next: Some(next),
            replies,
        }
    }

    pub fn done(replies: Vec<OutputIntent>) -> Self {
        Transition {
            next: None,
            replies,
        }
    }
}

/// Routes an event to the active flow.
pub async fn step(ctx: &Context, session: &Session, event: Event) -> BotResult<Transition> {
    match session {
        Session::Billing(billing) => billing::step(ctx, billing, event).await,
        Session::Inventory(inventory) => inventory::step(ctx, inventory, event).await,
        Session::Customer(customer) => customer::step(ctx, customer, event).await,
    }
}

/// Flow-specific cleanup for a session that is being dropped without
/// finishing (cancel, idle expiry, shutdown). Returns the units handed back
/// to stock.
pub async fn teardown(ctx: &Context, session: &Session) -> BotResult<i64> {
    match session {
        Session::Billing(billing) => billing::release(ctx, billing).await,
        Session::Inventory(_) | Session::Customer(_) => Ok(0),
    }
}

/// Invalid input: say so, then repeat the current prompt. State is unchanged.
fn invalid(session: Session, prompt: OutputIntent) -> Transition {
    Transition::to(session, vec![OutputIntent::new(Reply::InvalidInput), prompt])
}
