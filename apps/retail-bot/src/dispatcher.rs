//! # Dispatcher
//!
//! Entry point for every operator event.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  handle(key, InputEvent)                                               │
//! │                                                                         │
//! │  1. Event::parse(input)                                                │
//! │  2. lock the user's slot (same-user events queue here)                 │
//! │  3. active flow?  ── yes ──► flows::step(session, event)               │
//! │                   └─ no ───► menu command? start flow / welcome / help │
//! │                              otherwise InvalidInput + main menu        │
//! │  4. Ok(transition) → store `next`, update the draft registry          │
//! │     Err(_)         → log, TransientFailure, session untouched          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Housekeeping entry points used by the [`Sweeper`](crate::sweeper::Sweeper)
//! and the binary: [`Dispatcher::expire_idle`], [`Dispatcher::release_orphans`]
//! and [`Dispatcher::shutdown`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::BotConfig;
use crate::error::BotResult;
use crate::event::{Event, InputEvent, MenuCommand};
use crate::flows::{self, billing, customer, inventory, Context, Transition};
use crate::intent::{Options, OutputIntent, Reply};
use crate::session::{Session, SessionKey, SessionStore};
use retail_db::Database;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    ctx: Context,
    sessions: SessionStore,
}

impl Dispatcher {
    pub fn new(db: Database, config: Arc<BotConfig>) -> Self {
        Dispatcher {
            ctx: Context::new(db, config),
            sessions: SessionStore::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handles one event for `key` and returns what to show.
    ///
    /// Never fails: store errors are logged and answered with a transient
    /// failure reply, leaving the session as it was before the event.
    #[instrument(skip_all, fields(user = %key))]
    pub async fn handle(&self, key: &SessionKey, input: InputEvent) -> Vec<OutputIntent> {
        let event = Event::parse(input);

        let shared = self.sessions.slot(key);
        let mut slot = shared.lock().await;
        slot.last_active = Instant::now();

        let result = match slot.session.as_ref() {
            Some(session) => flows::step(&self.ctx, session, event).await,
            None => Ok(self.idle(event)),
        };

        match result {
            Ok(Transition { next, replies }) => {
                if let Some(session) = &next {
                    debug!(flow = session.flow_name(), "Session updated");
                } else if slot.session.is_some() {
                    debug!("Flow finished");
                }

                self.sessions
                    .record_draft(key, next.as_ref().and_then(Session::draft_id));
                slot.session = next;
                replies
            }
            Err(e) => {
                error!(error = %e, "Step failed, session kept");

                let options = if slot.session.is_some() {
                    Options::cancel_only()
                } else {
                    Options::main_menu()
                };
                vec![OutputIntent::new(Reply::TransientFailure).with_options(options)]
            }
        }
    }

    /// No active flow: only menu commands do anything.
    fn idle(&self, event: Event) -> Transition {
        let command = match &event {
            Event::Menu(command) => Some(*command),
            Event::Text(text) => MenuCommand::from_label(text),
            _ => None,
        };

        let Some(command) = command else {
            return Transition::done(vec![
                OutputIntent::new(Reply::InvalidInput).with_options(Options::main_menu())
            ]);
        };

        match command {
            MenuCommand::StartBilling => billing::start(),
            MenuCommand::StartInventory => inventory::start(),
            MenuCommand::StartCustomer => customer::start(),
            MenuCommand::Start => Transition::done(vec![OutputIntent::new(Reply::Welcome {
                company_name: self.ctx.config.store.company_name.clone(),
            })
            .with_options(Options::main_menu())]),
            MenuCommand::Help => Transition::done(vec![
                OutputIntent::new(Reply::Help).with_options(Options::main_menu())
            ]),
        }
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    /// Tears down sessions idle for at least `idle_timeout` as of `now`.
    ///
    /// Busy slots are skipped; they are by definition not idle. A session
    /// whose teardown fails is kept and retried on the next sweep.
    pub async fn expire_idle(&self, now: Instant) -> usize {
        let idle_timeout = self.ctx.config.session.idle_timeout();
        let mut expired = 0;

        for (key, shared) in self.sessions.slots() {
            let Ok(mut slot) = shared.try_lock() else {
                continue;
            };

            if now.saturating_duration_since(slot.last_active) < idle_timeout {
                continue;
            }
            let Some(session) = slot.session.as_ref() else {
                continue;
            };
            let flow = session.flow_name();
            let result = flows::teardown(&self.ctx, session).await;

            match result {
                Ok(restored_units) => {
                    info!(user = %key, flow, restored_units, "Session expired");
                    slot.session = None;
                    self.sessions.record_draft(&key, None);
                    expired += 1;
                }
                Err(e) => {
                    warn!(user = %key, flow, error = %e, "Session teardown failed, will retry");
                }
            }
        }

        let pruned = self.sessions.prune();
        if expired > 0 || pruned > 0 {
            debug!(expired, pruned, "Idle sweep done");
        }
        expired
    }

    /// Releases journalled reservations older than the orphan age whose draft
    /// no live session owns.
    pub async fn release_orphans(&self) -> BotResult<usize> {
        let cutoff = Utc::now() - self.ctx.config.session.orphan_age();
        let live = self.sessions.live_draft_ids();

        let released = self.ctx.db.ledger().release_orphaned(&live, cutoff).await?;
        if released > 0 {
            warn!(released, "Released orphaned reservations");
        }
        Ok(released)
    }

    /// Tears down every live session. Waits for in-flight events to finish.
    pub async fn shutdown(&self) -> usize {
        let mut closed = 0;

        for (key, shared) in self.sessions.slots() {
            let mut slot = shared.lock().await;
            let Some(session) = slot.session.as_ref() else {
                continue;
            };
            let result = flows::teardown(&self.ctx, session).await;

            match result {
                Ok(restored_units) => {
                    debug!(user = %key, restored_units, "Session closed");
                    slot.session = None;
                    self.sessions.record_draft(&key, None);
                    closed += 1;
                }
                Err(e) => {
                    // The startup sweep releases whatever is left
                    error!(user = %key, error = %e, "Session teardown failed");
                }
            }
        }

        info!(closed, "Sessions closed");
        closed
    }

    /// Drafts owned by live sessions.
    pub fn live_draft_ids(&self) -> HashSet<String> {
        self.sessions.live_draft_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, InventoryAction};
    use crate::testing::{self, select, text};
    use retail_core::Money;

    fn user(name: &str) -> SessionKey {
        SessionKey::new(name)
    }

    /// Drives a fresh billing session up to the product list of `category`.
    async fn open_bill(d: &Dispatcher, key: &SessionKey, category: &str) {
        d.handle(key, text("/bill")).await;
        d.handle(key, text("Asha")).await;
        d.handle(key, text("skip")).await;
        d.handle(key, select(format!("{}{}", event::CATEGORY_PREFIX, category))).await;
    }

    #[tokio::test]
    async fn test_idle_menu_commands() {
        let d = testing::dispatcher().await;
        let key = user("alice");

        let replies = d.handle(&key, text("/start")).await;
        assert_eq!(
            replies[0].reply,
            Reply::Welcome {
                company_name: "Test Mart".to_string()
            }
        );
        assert_eq!(replies[0].options, Options::main_menu());

        let replies = d.handle(&key, text("hello")).await;
        assert_eq!(replies[0].reply, Reply::InvalidInput);
        assert!(d.live_draft_ids().is_empty());

        let replies = d.handle(&key, text("Generate Bill")).await;
        assert_eq!(replies[0].reply, Reply::AskCustomerName { error: None });
        assert_eq!(d.live_draft_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_sku1_scenario() {
        let d = testing::dispatcher().await;
        let tea = testing::product(&d.context().db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;
        let key = user("alice");

        open_bill(&d, &key, "Beverages").await;
        d.handle(&key, select(format!("{}{}", event::PRODUCT_PREFIX, tea.id))).await;
        let replies = d.handle(&key, text("2")).await;
        assert!(matches!(
            &replies[0].reply,
            Reply::ItemAdded { running_total, .. } if *running_total == Money::from_cents(2000)
        ));
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 3);

        d.handle(&key, select(event::FINISH)).await;
        let replies = d.handle(&key, select(format!("{}5", event::DISCOUNT_PREFIX))).await;

        let Reply::Receipt(receipt) = &replies[0].reply else {
            panic!("expected receipt, got {:?}", replies);
        };
        let today = chrono::Local::now().date_naive().format("%Y%m%d");
        assert_eq!(receipt.bill_number, format!("TEST-{}-0001", today));
        assert_eq!(receipt.subtotal.cents(), 2000);
        assert_eq!(receipt.discount.cents(), 500);
        assert_eq!(receipt.payable.cents(), 1500);

        let bill = testing::bill_by_number(&d.context().db, &receipt.bill_number).await;
        assert_eq!(bill.total_amount_cents, 2000);
        assert_eq!(bill.discount_cents, 500);

        // Committed stock stays taken, and the session is gone
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 3);
        assert!(d.live_draft_ids().is_empty());
        assert_eq!(d.handle(&key, text("2")).await[0].reply, Reply::InvalidInput);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_cannot_oversell() {
        const SESSIONS: usize = 8;

        let (db, dir) = testing::file_db(SESSIONS as u32).await;
        let d = Dispatcher::new(db.clone(), Arc::new(testing::test_config()));
        let tea = testing::product(&db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;
        let pick = select(format!("{}{}", event::PRODUCT_PREFIX, tea.id));

        let mut keys = Vec::new();
        for i in 0..SESSIONS {
            let key = user(&format!("cashier-{}", i));
            open_bill(&d, &key, "Beverages").await;
            d.handle(&key, pick.clone()).await;
            keys.push(key);
        }

        let barrier = Arc::new(tokio::sync::Barrier::new(SESSIONS));
        let tasks: Vec<_> = keys
            .into_iter()
            .map(|key| {
                let d = d.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    d.handle(&key, text("3")).await
                })
            })
            .collect();

        let (mut added, mut refused) = (0, 0);
        for task in tasks {
            let replies = task.await.unwrap();
            match &replies[0].reply {
                Reply::ItemAdded { .. } => added += 1,
                Reply::InsufficientStock { .. } => refused += 1,
                other => panic!("unexpected reply {:?}", other),
            }
        }

        let stock = testing::stock_of(&db, &tea.id).await;
        assert!(stock >= 0);
        assert_eq!((added, refused), (1, SESSIONS - 1));
        assert_eq!(stock, 2);
        assert_eq!(d.live_draft_ids().len(), SESSIONS);

        db.close().await;
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_cancel_restores_stock() {
        let d = testing::dispatcher().await;
        let tea = testing::product(&d.context().db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;
        let key = user("alice");

        open_bill(&d, &key, "Beverages").await;
        d.handle(&key, select(format!("{}{}", event::PRODUCT_PREFIX, tea.id))).await;
        d.handle(&key, text("4")).await;
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 1);

        let replies = d.handle(&key, text("cancel")).await;
        assert_eq!(replies[0].reply, Reply::BillCancelled { restored_units: 4 });
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 5);
        assert!(d.live_draft_ids().is_empty());
    }

    #[tokio::test]
    async fn test_inventory_over_removal_keeps_state() {
        let d = testing::dispatcher().await;
        let tea = testing::product(&d.context().db, "SKU1", "Green Tea", "Beverages", 1000, 3).await;
        let key = user("alice");

        d.handle(&key, text("Inventory")).await;
        d.handle(&key, select(event::STOCK_REMOVE)).await;
        d.handle(&key, text("SKU1")).await;
        d.handle(&key, select(format!("{}{}", event::PRODUCT_PREFIX, tea.id))).await;

        let replies = d.handle(&key, text("10")).await;
        assert!(matches!(replies[0].reply, Reply::StockRejected { available: 3, .. }));
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 3);

        // Still entering a quantity for the same product
        let replies = d.handle(&key, text("1")).await;
        assert!(matches!(
            replies[0].reply,
            Reply::StockUpdated { action: InventoryAction::Remove, new_stock: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_input_is_idempotent() {
        let d = testing::dispatcher().await;
        let tea = testing::product(&d.context().db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;
        let key = user("alice");

        open_bill(&d, &key, "Beverages").await;
        d.handle(&key, select(format!("{}{}", event::PRODUCT_PREFIX, tea.id))).await;

        let snapshot = d.sessions().slot(&key).lock().await.session.clone();
        for _ in 0..3 {
            let replies = d.handle(&key, text("two")).await;
            assert!(matches!(replies[0].reply, Reply::AskQuantity { error: Some(_), .. }));
            let replies = d.handle(&key, select("nonsense")).await;
            assert_eq!(replies[0].reply, Reply::InvalidInput);
            assert_eq!(d.sessions().slot(&key).lock().await.session, snapshot);
        }
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 5);
    }

    #[tokio::test]
    async fn test_idle_expiry_restores_stock() {
        let d = testing::dispatcher().await;
        let tea = testing::product(&d.context().db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;
        let (key, other) = (user("alice"), user("bob"));

        open_bill(&d, &key, "Beverages").await;
        d.handle(&key, select(format!("{}{}", event::PRODUCT_PREFIX, tea.id))).await;
        d.handle(&key, text("3")).await;
        d.handle(&other, text("/start")).await;

        assert_eq!(d.expire_idle(Instant::now()).await, 0);
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 2);

        let later = Instant::now()
            + d.context().config.session.idle_timeout()
            + std::time::Duration::from_secs(1);
        assert_eq!(d.expire_idle(later).await, 1);
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 5);
        assert!(d.live_draft_ids().is_empty());
        assert!(d.sessions().is_empty());

        let replies = d.handle(&key, text("3")).await;
        assert_eq!(replies[0].reply, Reply::InvalidInput);
    }

    #[tokio::test]
    async fn test_orphan_release_skips_live_drafts() {
        let d = testing::dispatcher().await;
        let tea = testing::product(&d.context().db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;
        let key = user("alice");

        open_bill(&d, &key, "Beverages").await;
        d.handle(&key, select(format!("{}{}", event::PRODUCT_PREFIX, tea.id))).await;
        d.handle(&key, text("2")).await;

        // A draft left behind by a session that no longer exists
        d.context().db.ledger().reserve("lost-draft", &tea.id, 1).await.unwrap();
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 2);

        let live = d.live_draft_ids();
        let released = d
            .context()
            .db
            .ledger()
            .release_orphaned(&live, Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(released, 1);
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 3);

        // Nothing is old enough for the periodic sweep
        assert_eq!(d.release_orphans().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_session() {
        let d = testing::dispatcher().await;
        let tea = testing::product(&d.context().db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;
        let key = user("alice");

        open_bill(&d, &key, "Beverages").await;
        d.handle(&key, select(format!("{}{}", event::PRODUCT_PREFIX, tea.id))).await;
        let snapshot = d.sessions().slot(&key).lock().await.session.clone();

        d.context().db.close().await;

        let replies = d.handle(&key, text("2")).await;
        assert_eq!(replies[0].reply, Reply::TransientFailure);
        assert_eq!(replies[0].options, Options::cancel_only());
        assert_eq!(d.sessions().slot(&key).lock().await.session, snapshot);
    }

    #[tokio::test]
    async fn test_shutdown_releases_drafts() {
        let d = testing::dispatcher().await;
        let tea = testing::product(&d.context().db, "SKU1", "Green Tea", "Beverages", 1000, 5).await;
        let key = user("alice");

        open_bill(&d, &key, "Beverages").await;
        d.handle(&key, select(format!("{}{}", event::PRODUCT_PREFIX, tea.id))).await;
        d.handle(&key, text("5")).await;
        d.handle(&user("bob"), text("/customers")).await;
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 0);

        assert_eq!(d.shutdown().await, 2);
        assert_eq!(testing::stock_of(&d.context().db, &tea.id).await, 5);
    }
}
