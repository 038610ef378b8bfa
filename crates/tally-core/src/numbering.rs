//! # Document Numbering
//!
//! Human-readable business keys for sales and purchase orders.
//!
//! ## Sale Numbers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A-0001 → A-0002 → … → A-9999                                          │
//! │                          │  numeric part exhausted                      │
//! │                          ▼                                              │
//! │  B-0001 → … → Z-9999 → AA-0001 → … → ZZ-9999 → AAA-0001                 │
//! │                                                                         │
//! │  The prefix counts like an odometer over A..Z; when every letter is    │
//! │  Z it grows by one letter.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The next number is derived from the most recently created sale. Anything
//! that doesn't parse restarts the sequence at `A-0001`; the unique index on
//! `sales.sale_number` rejects a collision and the transaction rolls back.
//!
//! ## PO Numbers
//! `PO-YYYYMMDD-NNNN`, where `NNNN` is the unix time in seconds modulo
//! 10000. Uniqueness is best-effort; the engine bumps the suffix when the
//! number is already taken.

use chrono::{DateTime, Utc};

/// First sale number of a fresh store.
pub const FIRST_SALE_NUMBER: &str = "A-0001";

/// Largest numeric part before the prefix rolls over.
const MAX_SALE_SEQUENCE: i64 = 9999;

/// Returns the sale number following `last`.
///
/// ## Example
/// ```rust
/// use tally_core::numbering::next_sale_number;
///
/// assert_eq!(next_sale_number(None), "A-0001");
/// assert_eq!(next_sale_number(Some("A-0041")), "A-0042");
/// assert_eq!(next_sale_number(Some("A-9999")), "B-0001");
/// assert_eq!(next_sale_number(Some("ZZ-9999")), "AAA-0001");
/// assert_eq!(next_sale_number(Some("garbage")), "A-0001");
/// ```
pub fn next_sale_number(last: Option<&str>) -> String {
    let Some(last) = last.filter(|s| !s.is_empty()) else {
        return FIRST_SALE_NUMBER.to_string();
    };

    let parts: Vec<&str> = last.split('-').collect();
    let [prefix, digits] = parts.as_slice() else {
        return FIRST_SALE_NUMBER.to_string();
    };

    let Ok(num) = digits.parse::<i64>() else {
        return FIRST_SALE_NUMBER.to_string();
    };

    if num < MAX_SALE_SEQUENCE {
        format!("{}-{:04}", prefix, num + 1)
    } else {
        format!("{}-0001", increment_prefix(prefix))
    }
}

/// Increments an alphabetic prefix like an odometer over `A..=Z`.
///
/// Any character at or past `Z` wraps to `A` and carries left.
///
/// ## Example
/// ```rust
/// use tally_core::numbering::increment_prefix;
///
/// assert_eq!(increment_prefix("A"), "B");
/// assert_eq!(increment_prefix("AZ"), "BA");
/// assert_eq!(increment_prefix("Z"), "AA");
/// assert_eq!(increment_prefix(""), "A");
/// ```
pub fn increment_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        return "A".to_string();
    }

    let mut chars: Vec<char> = prefix.chars().collect();

    for c in chars.iter_mut().rev() {
        if *c < 'Z' {
            // char has no +1; step through u32
            *c = char::from_u32(*c as u32 + 1).unwrap_or('A');
            return chars.into_iter().collect();
        }
        *c = 'A';
    }

    // every position carried
    let mut grown = String::with_capacity(chars.len() + 1);
    grown.push('A');
    grown.extend(chars);
    grown
}

/// Builds a purchase order number from a timestamp.
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use tally_core::numbering::po_number;
///
/// let at = Utc.timestamp_opt(1_700_000_123, 0).unwrap(); // 2023-11-14
/// assert_eq!(po_number(at), "PO-20231114-0123");
/// ```
pub fn po_number(at: DateTime<Utc>) -> String {
    po_number_with_suffix(at, at.timestamp().rem_euclid(10000))
}

/// Builds a purchase order number with an explicit suffix (wrapped into
/// `0..10000`). Used to step past a number that is already taken.
pub fn po_number_with_suffix(at: DateTime<Utc>, suffix: i64) -> String {
    format!("PO-{}-{:04}", at.format("%Y%m%d"), suffix.rem_euclid(10000))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_first_sale_number() {
        assert_eq!(next_sale_number(None), "A-0001");
        assert_eq!(next_sale_number(Some("")), "A-0001");
    }

    #[test]
    fn test_increments_within_prefix() {
        assert_eq!(next_sale_number(Some("A-0001")), "A-0002");
        assert_eq!(next_sale_number(Some("C-0999")), "C-1000");
        assert_eq!(next_sale_number(Some("AB-9998")), "AB-9999");
    }

    #[test]
    fn test_rollover() {
        assert_eq!(next_sale_number(Some("A-9999")), "B-0001");
        assert_eq!(next_sale_number(Some("Z-9999")), "AA-0001");
        assert_eq!(next_sale_number(Some("AZ-9999")), "BA-0001");
        assert_eq!(next_sale_number(Some("ZZ-9999")), "AAA-0001");
    }

    #[test]
    fn test_unparsable_falls_back() {
        assert_eq!(next_sale_number(Some("A0001")), "A-0001");
        assert_eq!(next_sale_number(Some("A-00-01")), "A-0001");
        assert_eq!(next_sale_number(Some("A-x1")), "A-0001");
        assert_eq!(next_sale_number(Some("A-")), "A-0001");
    }

    #[test]
    fn test_oversized_sequence_rolls_prefix() {
        assert_eq!(next_sale_number(Some("A-12345")), "B-0001");
    }

    #[test]
    fn test_walks_full_prefix() {
        let mut number = "A-9999".to_string();
        for _ in 0..25 {
            number = next_sale_number(Some(&number)).replace("-0001", "-9999");
        }
        assert_eq!(number, "Z-9999");
        assert_eq!(next_sale_number(Some(&number)), "AA-0001");
    }

    #[test]
    fn test_po_number() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 7).unwrap();
        let expected_suffix = at.timestamp() % 10000;
        assert_eq!(po_number(at), format!("PO-20240105-{:04}", expected_suffix));
        assert_eq!(po_number_with_suffix(at, 10000), "PO-20240105-0000");
        assert_eq!(po_number_with_suffix(at, 42), "PO-20240105-0042");
    }
}
