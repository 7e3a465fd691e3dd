//! # Session State
//!
//! One in-memory session per operator, holding the active flow and its draft.
//!
//! ## Thread Safety
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SessionStore                                     │
//! │                                                                         │
//! │  std::sync::Mutex<HashMap<SessionKey, Entry>>                          │
//! │  └── held only to find or insert a slot, never across .await          │
//! │                                                                         │
//! │  Entry                                                                  │
//! │  ├── slot: Arc<tokio::sync::Mutex<SessionSlot>>                        │
//! │  │         └── held for a whole event: same-user events run in order  │
//! │  └── draft_id: billing draft owned by this user, if any                │
//! │              (readable without the slot lock, for the orphan sweep)    │
//! │                                                                         │
//! │  User A ──► slot A ──► flow step ──┐                                   │
//! │  User B ──► slot B ──► flow step ──┼──► Database (shared pool)         │
//! │  Sweeper ─► slot.try_lock() ───────┘    busy slots are skipped         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::event::InventoryAction;
use retail_core::{CustomerSummary, DraftLine, Money};

// =============================================================================
// Session Key
// =============================================================================

/// Identity of the operator a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        SessionKey(key.into())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Session
// =============================================================================

/// The active flow. "No flow" is the absence of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Billing(BillingSession),
    Inventory(InventorySession),
    Customer(CustomerSession),
}

impl Session {
    pub fn flow_name(&self) -> &'static str {
        match self {
            Session::Billing(_) => "billing",
            Session::Inventory(_) => "inventory",
            Session::Customer(_) => "customer",
        }
    }

    /// The billing draft whose reservations this session owns.
    pub fn draft_id(&self) -> Option<&str> {
        match self {
            Session::Billing(billing) => Some(&billing.draft_id),
            _ => None,
        }
    }
}

// ---- Billing ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingSession {
    /// Key of this draft's rows in the reservation journal.
    pub draft_id: String,
    pub state: BillingState,
    pub draft: BillDraft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingState {
    AwaitingName,
    AwaitingPhone,
    /// `pending` is set between picking a product and entering its quantity.
    SelectingItems { pending: Option<PendingProduct> },
    ConfirmingDiscount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProduct {
    pub product_id: String,
    pub name: String,
}

/// A bill under construction.
///
/// Every line's stock is already taken (and journalled) when it is appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillDraft {
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub items: Vec<DraftLine>,
}

impl BillDraft {
    /// Σ quantity × unit price. Never stored.
    pub fn total(&self) -> Money {
        self.items.iter().map(DraftLine::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---- Inventory -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySession {
    pub state: InventoryState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryState {
    SelectingAction,
    SelectingProduct {
        action: InventoryAction,
    },
    EnteringQuantity {
        action: InventoryAction,
        product: SelectedProduct,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedProduct {
    pub id: String,
    pub code: String,
    pub name: String,
}

// ---- Customer --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSession {
    pub state: CustomerState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerState {
    Searching,
    Viewing {
        customer: CustomerSummary,
        /// Waiting for a `Name, Phone` line.
        editing: bool,
    },
}

// =============================================================================
// Session Store
// =============================================================================

#[derive(Debug)]
pub struct SessionSlot {
    pub session: Option<Session>,
    pub last_active: Instant,
}

impl SessionSlot {
    fn new() -> Self {
        SessionSlot {
            session: None,
            last_active: Instant::now(),
        }
    }
}

pub type SharedSlot = Arc<tokio::sync::Mutex<SessionSlot>>;

#[derive(Debug)]
struct Entry {
    slot: SharedSlot,
    draft_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    entries: Arc<Mutex<HashMap<SessionKey, Entry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, Entry>> {
        // The map holds no invariant a panicking holder could break
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The slot for `key`, created on first use.
    pub fn slot(&self, key: &SessionKey) -> SharedSlot {
        let mut entries = self.lock();
        entries
            .entry(key.clone())
            .or_insert_with(|| Entry {
                slot: Arc::new(tokio::sync::Mutex::new(SessionSlot::new())),
                draft_id: None,
            })
            .slot
            .clone()
    }

    /// Records which draft (if any) `key` owns. Call after every session change.
    pub fn record_draft(&self, key: &SessionKey, draft_id: Option<&str>) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.draft_id = draft_id.map(str::to_string);
        }
    }

    /// Drafts owned by live sessions.
    pub fn live_draft_ids(&self) -> HashSet<String> {
        self.lock()
            .values()
            .filter_map(|entry| entry.draft_id.clone())
            .collect()
    }

    /// Snapshot of all slots.
    pub fn slots(&self) -> Vec<(SessionKey, SharedSlot)> {
        self.lock()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.slot.clone()))
            .collect()
    }

    /// Drops slots with no session that nobody else holds.
    ///
    /// Slots are only cloned under the map lock, so a reference count of one
    /// seen under that lock cannot grow while we remove it.
    pub fn prune(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            if Arc::strong_count(&entry.slot) > 1 {
                return true;
            }
            match entry.slot.try_lock() {
                Ok(slot) => slot.session.is_some(),
                Err(_) => true,
            }
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
