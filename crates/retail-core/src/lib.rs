//! # retail-core: Pure Business Logic
//!
//! Domain types and rules for the retail counter bot. Nothing in this crate
//! touches the database, the clock, or the chat transport.
//!
//! Money and its parsing, the domain types, input validation and bill
//! numbering. Used by `retail-db` for row types and by `retail-bot` throughout.

pub mod bill_number;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

pub use bill_number::{format_bill_number, sequence_name};
pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use types::*;

/// Length of a valid customer phone number (digits only).
pub const PHONE_DIGITS: usize = 10;

/// Token accepted in place of a phone number.
pub const SKIP_TOKEN: &str = "skip";
