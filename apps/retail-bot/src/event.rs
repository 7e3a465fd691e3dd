//! # Events
//!
//! What the transport hands in, and what the flows match on.
//!
//! ```text
//! InputEvent::Text("cancel")            → Event::CancelRequested
//! InputEvent::Text("/help")             → Event::Menu(Help)
//! InputEvent::Text("3")                 → Event::Text("3")
//! InputEvent::Select("product:<uuid>")  → Event::ProductSelected(<uuid>)
//! InputEvent::Select("billing:finish")  → Event::FinishRequested
//! InputEvent::Select("discount:5")      → Event::Text("5")
//! ```
//!
//! Option ids are opaque to the transport; it only echoes back an id it was
//! offered. The constants below are the only ids this crate ever offers.

use serde::{Deserialize, Serialize};

pub const MENU_BILL: &str = "menu:bill";
pub const MENU_INVENTORY: &str = "menu:inventory";
pub const MENU_CUSTOMERS: &str = "menu:customers";
pub const MENU_HELP: &str = "menu:help";

pub const CANCEL: &str = "flow:cancel";

pub const SKIP_PHONE: &str = "billing:skip_phone";
pub const ADD_ITEM: &str = "billing:add_item";
pub const FINISH: &str = "billing:finish";
pub const DISCOUNT_PREFIX: &str = "discount:";

pub const STOCK_ADD: &str = "inventory:add";
pub const STOCK_REMOVE: &str = "inventory:remove";
pub const LOW_STOCK: &str = "inventory:low_stock";
pub const BACK: &str = "inventory:back";

pub const EDIT_CUSTOMER: &str = "customer:edit";
pub const CUSTOMER_HISTORY: &str = "customer:history";

pub const CATEGORY_PREFIX: &str = "category:";
pub const PRODUCT_PREFIX: &str = "product:";

/// Raw input from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Free text typed by the operator.
    Text(String),
    /// An option id previously offered in an [`OutputIntent`](crate::intent::OutputIntent).
    Select(String),
}

impl InputEvent {
    pub fn text(s: impl Into<String>) -> Self {
        InputEvent::Text(s.into())
    }

    pub fn select(id: impl Into<String>) -> Self {
        InputEvent::Select(id.into())
    }
}

/// Commands that start something from the idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    StartBilling,
    StartInventory,
    StartCustomer,
    /// `/start` or `/menu`: welcome text and main menu.
    Start,
    Help,
}

impl MenuCommand {
    /// Matches the main menu labels typed as text (case-insensitive).
    pub fn from_label(text: &str) -> Option<Self> {
        let text = text.trim();
        [
            ("generate bill", MenuCommand::StartBilling),
            ("inventory", MenuCommand::StartInventory),
            ("customers", MenuCommand::StartCustomer),
            ("help", MenuCommand::Help),
        ]
        .into_iter()
        .find(|(label, _)| text.eq_ignore_ascii_case(label))
        .map(|(_, command)| command)
    }

    fn from_slash(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "/start" | "/menu" => Some(MenuCommand::Start),
            "/help" => Some(MenuCommand::Help),
            "/bill" => Some(MenuCommand::StartBilling),
            "/inventory" => Some(MenuCommand::StartInventory),
            "/customers" => Some(MenuCommand::StartCustomer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryAction {
    Add,
    Remove,
    ViewLowStock,
}

/// An input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Text(String),
    Menu(MenuCommand),
    CategorySelected(String),
    ProductSelected(String),
    BrowseCategories,
    SkipPhone,
    FinishRequested,
    ActionSelected(InventoryAction),
    BackToActions,
    EditRequested,
    HistoryRequested,
    CancelRequested,
    /// An option id this crate never offers. Every state treats it as
    /// invalid input.
    Unknown(String),
}

impl Event {
    pub fn parse(input: InputEvent) -> Event {
        match input {
            InputEvent::Text(text) => Self::parse_text(text),
            InputEvent::Select(id) => Self::parse_select(id),
        }
    }

    fn parse_text(text: String) -> Event {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("cancel") || trimmed.eq_ignore_ascii_case("/cancel") {
            return Event::CancelRequested;
        }
        if let Some(command) = MenuCommand::from_slash(trimmed) {
            return Event::Menu(command);
        }
        Event::Text(text)
    }

    fn parse_select(id: String) -> Event {
        if let Some(name) = id.strip_prefix(CATEGORY_PREFIX) {
            return Event::CategorySelected(name.to_string());
        }
        if let Some(product_id) = id.strip_prefix(PRODUCT_PREFIX) {
            return Event::ProductSelected(product_id.to_string());
        }
        if let Some(amount) = id.strip_prefix(DISCOUNT_PREFIX) {
            return Event::Text(amount.to_string());
        }

        match id.as_str() {
            MENU_BILL => Event::Menu(MenuCommand::StartBilling),
            MENU_INVENTORY => Event::Menu(MenuCommand::StartInventory),
            MENU_CUSTOMERS => Event::Menu(MenuCommand::StartCustomer),
            MENU_HELP => Event::Menu(MenuCommand::Help),
            CANCEL => Event::CancelRequested,
            SKIP_PHONE => Event::SkipPhone,
            ADD_ITEM => Event::BrowseCategories,
            FINISH => Event::FinishRequested,
            STOCK_ADD => Event::ActionSelected(InventoryAction::Add),
            STOCK_REMOVE => Event::ActionSelected(InventoryAction::Remove),
            LOW_STOCK => Event::ActionSelected(InventoryAction::ViewLowStock),
            BACK => Event::BackToActions,
            EDIT_CUSTOMER => Event::EditRequested,
            CUSTOMER_HISTORY => Event::HistoryRequested,
            _ => Event::Unknown(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_forms() {
        for text in ["cancel", " CANCEL ", "/cancel"] {
            assert_eq!(Event::parse(InputEvent::text(text)), Event::CancelRequested);
        }
        assert_eq!(Event::parse(InputEvent::select(CANCEL)), Event::CancelRequested);
        assert_eq!(
            Event::parse(InputEvent::text("cancelled")),
            Event::Text("cancelled".to_string())
        );
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!(Event::parse(InputEvent::text("/start")), Event::Menu(MenuCommand::Start));
        assert_eq!(Event::parse(InputEvent::text("/menu")), Event::Menu(MenuCommand::Start));
        assert_eq!(Event::parse(InputEvent::text("/HELP")), Event::Menu(MenuCommand::Help));
    }

    #[test]
    fn test_menu_labels_stay_text() {
        // Labels typed inside a flow are data (a customer may be called "Help")
        assert_eq!(Event::parse(InputEvent::text("Help")), Event::Text("Help".to_string()));
        assert_eq!(MenuCommand::from_label("generate BILL"), Some(MenuCommand::StartBilling));
        assert_eq!(MenuCommand::from_label("billing"), None);
    }

    #[test]
    fn test_entity_selection() {
        assert_eq!(
            Event::parse(InputEvent::select("category:Snacks & Sweets")),
            Event::CategorySelected("Snacks & Sweets".to_string())
        );
        assert_eq!(
            Event::parse(InputEvent::select("product:abc-123")),
            Event::ProductSelected("abc-123".to_string())
        );
        assert_eq!(Event::parse(InputEvent::select("discount:10")), Event::Text("10".to_string()));
        assert_eq!(
            Event::parse(InputEvent::select("nonsense")),
            Event::Unknown("nonsense".to_string())
        );
    }

    #[test]
    fn test_inventory_actions() {
        assert_eq!(
            Event::parse(InputEvent::select(STOCK_REMOVE)),
            Event::ActionSelected(InventoryAction::Remove)
        );
        assert_eq!(Event::parse(InputEvent::select(BACK)), Event::BackToActions);
    }
}
