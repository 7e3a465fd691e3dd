//! # Error Types
//!
//! Domain-specific error types for retail-core.
//!
//! `ValidationError` covers malformed operator input and `CoreError` covers
//! business rule violations. Both are answered with a re-prompt; store failures
//! live in `retail_db::DbError`.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
///
/// Every variant has a corrective message; none of them is a failure of the
/// system itself.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Another customer already owns this phone number.
    #[error("Phone {phone} already belongs to another customer")]
    PhoneInUse { phone: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Produced while parsing free text typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (not a number, wrong digit count, ...).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    pub(crate) fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::PhoneInUse {
            phone: "9876543210".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Phone 9876543210 already belongs to another customer"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(ValidationError::required("name").to_string(), "name is required");

        let err = ValidationError::invalid("phone", "expected 10 digits");
        assert_eq!(err.to_string(), "phone has invalid format: expected 10 digits");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("quantity").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
