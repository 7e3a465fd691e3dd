//! # Validation Module
//!
//! Parsing and validation of the free text an operator types into the chat.
//!
//! Failures here re-prompt in the same state. Stock bounds are not checked
//! here; the ledger's conditional UPDATE does that, and SQLite CHECK and UNIQUE
//! constraints back both up.
//!
//! ## Usage
//! ```rust
//! use retail_core::validation::{parse_phone, parse_quantity};
//!
//! assert_eq!(parse_phone(" 9876543210 ").unwrap(), "9876543210");
//! assert_eq!(parse_quantity("3").unwrap(), 3);
//! assert!(parse_quantity("0").is_err());
//! ```

use std::num::{IntErrorKind, ParseIntError};

use crate::error::ValidationError;
use crate::money::Money;
use crate::{PHONE_DIGITS, SKIP_TOKEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_CHARS: usize = 100;
const MAX_QUERY_CHARS: usize = 100;

// =============================================================================
// Text Validators
// =============================================================================

/// Validates a customer name and returns it trimmed.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 100 characters
pub fn validate_customer_name(name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required("name"));
    }

    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_CHARS,
        });
    }

    Ok(name.to_string())
}

/// Validates a search query and returns it trimmed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.is_empty() {
        return Err(ValidationError::required("search"));
    }

    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(ValidationError::TooLong {
            field: "search".to_string(),
            max: MAX_QUERY_CHARS,
        });
    }

    Ok(query.to_string())
}

/// True when the input is exactly ten ASCII digits.
pub fn is_phone_number(input: &str) -> bool {
    let input = input.trim();
    input.len() == PHONE_DIGITS && input.bytes().all(|b| b.is_ascii_digit())
}

/// True when the operator typed the skip token (case-insensitive).
pub fn is_skip(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(SKIP_TOKEN)
}

/// Parses a phone number.
///
/// ## Rules
/// - Exactly 10 digits, nothing else (no spaces, no `+`)
pub fn parse_phone(input: &str) -> ValidationResult<String> {
    let input = input.trim();

    if input.is_empty() {
        return Err(ValidationError::required("phone"));
    }

    if !is_phone_number(input) {
        return Err(ValidationError::invalid(
            "phone",
            format!("expected exactly {} digits", PHONE_DIGITS),
        ));
    }

    Ok(input.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Parses a positive whole quantity. There is no upper bound here; how
/// much can be taken is decided by the stock guard.
///
/// ## User Workflow
/// ```text
/// "3"                    → Ok(3)
/// "0"                    → MustBePositive
/// "-2"                   → MustBePositive
/// "2.5"                  → InvalidFormat
/// "99999999999999999999" → InvalidFormat (does not fit in i64)
/// ```
pub fn parse_quantity(input: &str) -> ValidationResult<i64> {
    let input = input.trim();

    if input.is_empty() {
        return Err(ValidationError::required("quantity"));
    }

    let qty: i64 = input.parse().map_err(|e: ParseIntError| match e.kind() {
        IntErrorKind::PosOverflow => ValidationError::invalid("quantity", "quantity is too large"),
        _ => ValidationError::invalid("quantity", "expected a whole number"),
    })?;

    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(qty)
}

/// Parses a discount amount. Any non-negative decimal is accepted here;
/// clamping to the bill total happens at finalization.
pub fn parse_discount(input: &str) -> ValidationResult<Money> {
    Money::parse(input).map_err(|err| match err {
        ValidationError::Required { .. } => ValidationError::required("discount"),
        ValidationError::MustNotBeNegative { .. } => ValidationError::MustNotBeNegative {
            field: "discount".to_string(),
        },
        ValidationError::InvalidFormat { reason, .. } => {
            ValidationError::invalid("discount", reason)
        }
        other => other,
    })
}

// =============================================================================
// Customer Edit
// =============================================================================

/// Parses the customer edit line, `Name, Phone`.
///
/// The phone part may be `skip` to clear the stored number.
///
/// ```rust
/// use retail_core::validation::parse_customer_edit;
///
/// let (name, phone) = parse_customer_edit("Asha Rao, 9876543210").unwrap();
/// assert_eq!(name, "Asha Rao");
/// assert_eq!(phone.as_deref(), Some("9876543210"));
///
/// let (_, phone) = parse_customer_edit("Asha Rao, skip").unwrap();
/// assert!(phone.is_none());
/// ```
pub fn parse_customer_edit(input: &str) -> ValidationResult<(String, Option<String>)> {
    let (name, phone) = input
        .rsplit_once(',')
        .ok_or_else(|| ValidationError::invalid("customer", "expected 'Name, Phone'"))?;

    let name = validate_customer_name(name)?;

    let phone = if is_skip(phone) {
        None
    } else {
        Some(parse_phone(phone)?)
    };

    Ok((name, phone))
}
