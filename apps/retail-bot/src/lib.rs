//! # Retail Counter Bot
//!
//! Conversation engine for a chat-driven retail counter: billing with live
//! stock reservation, inventory adjustments and customer lookup.
//!
//! ## Module Organization
//! ```text
//! retail_bot/
//! ├── lib.rs          ◄─── You are here (module exports)
//! ├── config.rs       ◄─── BotConfig: defaults, TOML file, RETAIL_* env
//! ├── error.rs        ◄─── BotError
//! ├── event.rs        ◄─── InputEvent (transport) → Event (flows)
//! ├── intent.rs       ◄─── OutputIntent: structured replies + options
//! ├── session.rs      ◄─── Session union, per-user slots
//! ├── flows/
//! │   ├── mod.rs      ◄─── step / teardown routing, Transition
//! │   ├── billing.rs  ◄─── name → phone → items → discount → receipt
//! │   ├── inventory.rs◄─── add / remove stock, low stock report
//! │   └── customer.rs ◄─── phone or name lookup, edit, history
//! ├── dispatcher.rs   ◄─── per-user serialization, idle expiry
//! ├── sweeper.rs      ◄─── background expiry + orphan release
//! ├── render.rs       ◄─── intent → text, currency formatting
//! └── console.rs      ◄─── stdin/stdout transport
//! ```
//!
//! The console turns lines into `InputEvent`s, the dispatcher parses them into
//! `Event`s for the active flow, and the flow's `Transition` carries the
//! `OutputIntent`s that `render` turns back into text.

pub mod config;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod flows;
pub mod intent;
pub mod render;
pub mod session;
pub mod sweeper;

#[cfg(test)]
mod testing;

pub use config::{BotConfig, ConfigError};
pub use dispatcher::Dispatcher;
pub use error::{BotError, BotResult};
pub use event::InputEvent;
pub use intent::{OutputIntent, Reply};
pub use session::SessionKey;
