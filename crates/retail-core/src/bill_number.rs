//! # Bill Numbers
//!
//! Human-readable bill numbers: `{PREFIX}-{YYYYMMDD}-{NNNN}`.
//!
//! ```text
//! INV-20240301-0001
//! │   │        └── per-day sequence, zero-padded to 4 (widens past 9999)
//! │   └── business date
//! └── configured prefix
//! ```
//!
//! The counter is a named row in the `sequences` table, one row per business
//! date, so numbering restarts every day. Because the date is part of the
//! number, a value is never issued twice.

use chrono::NaiveDate;

/// Base name of the bill counter in the `sequences` table.
pub const BILL_SEQUENCE: &str = "bill_sequence";

/// Sequence row used for bills issued on `date`.
pub fn sequence_name(date: NaiveDate) -> String {
    format!("{}:{}", BILL_SEQUENCE, date.format("%Y%m%d"))
}

/// Formats a bill number from its parts.
///
/// ```rust
/// use chrono::NaiveDate;
/// use retail_core::format_bill_number;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// assert_eq!(format_bill_number("INV", date, 1), "INV-20240301-0001");
/// ```
pub fn format_bill_number(prefix: &str, date: NaiveDate, sequence: i64) -> String {
    format!("{}-{}-{:04}", prefix, date.format("%Y%m%d"), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
    }

    #[test]
    fn test_format_pads_sequence() {
        assert_eq!(format_bill_number("RB", date(), 7), "RB-20241231-0007");
        assert_eq!(format_bill_number("RB", date(), 12345), "RB-20241231-12345");
    }

    #[test]
    fn test_sequence_name_is_per_day() {
        assert_eq!(sequence_name(date()), "bill_sequence:20241231");
        assert_ne!(sequence_name(date()), sequence_name(date().pred_opt().unwrap()));
    }
}
