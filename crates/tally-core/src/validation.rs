//! # Validation Module
//!
//! Input validation utilities for Tally POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request types (requests.rs)                                  │
//! │  ├── Deserialization (shape)                                           │
//! │  └── validate() → THIS MODULE: field rules                             │
//! │           │   nothing has been written yet when these fail             │
//! │           ▼                                                             │
//! │  Layer 2: Engines (tally-db)                                           │
//! │  └── Business rules that need stored state (stock, amount due)         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock >= 0)                                                │
//! │  ├── UNIQUE (sku, sale_number, po_number, product+supplier)            │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{CoreError, ValidationError};
use crate::{MAX_AMOUNT_CENTS, MAX_LINE_ITEMS, MAX_PAYMENT_DAYS, MAX_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only letters, digits, hyphens, underscores and dots
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_sku;
///
/// assert!(validate_sku("COLA-330").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.chars().count() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, underscores, and dots"
                .to_string(),
        });
    }

    Ok(())
}

/// Validates a required display name (product, supplier).
///
/// ## Rules
/// - Must not be blank
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a search query; returns it trimmed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: `1..=MAX_QUANTITY` units.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 1 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the number of lines on a sale or purchase order.
pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if count > MAX_LINE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_LINE_ITEMS as i64,
        });
    }

    Ok(())
}

/// Validates an amount that may be zero but not negative
/// (prices, costs, tax, discount, down payment).
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_non_negative;
///
/// assert!(validate_non_negative("tax", 0).is_ok());
/// assert!(validate_non_negative("tax", -1).is_err());
/// assert!(validate_non_negative("tax", i64::MAX).is_err());
/// ```
pub fn validate_non_negative(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    validate_ceiling(field, cents)
}

/// Validates a payment amount in cents: strictly positive.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    validate_ceiling("amount", cents)
}

fn validate_ceiling(field: &str, value: i64) -> ValidationResult<()> {
    if value > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// Validates purchase order payment days: `0..=365`.
pub fn validate_payment_days(days: i64) -> ValidationResult<()> {
    if !(0..=MAX_PAYMENT_DAYS).contains(&days) {
        return Err(ValidationError::OutOfRange {
            field: "payment_days".to_string(),
            min: 0,
            max: MAX_PAYMENT_DAYS,
        });
    }

    Ok(())
}

/// Validates an absolute stock count.
pub fn validate_stock_level(stock: i64) -> ValidationResult<()> {
    validate_non_negative("stock", stock)
}

/// Validates a 1-based page number and a page size (1..=500).
pub fn validate_pagination(page: i64, limit: i64) -> ValidationResult<()> {
    if page < 1 {
        return Err(ValidationError::MustBePositive {
            field: "page".to_string(),
        });
    }

    if !(1..=500).contains(&limit) {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: 500,
        });
    }

    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// Parses a `YYYY-MM-DD` order date into midnight UTC of that day.
///
/// ## Example
/// ```rust
/// use tally_core::validation::parse_order_date;
///
/// let date = parse_order_date("2024-02-29").unwrap();
/// assert_eq!(date.to_rfc3339(), "2024-02-29T00:00:00+00:00");
/// assert!(parse_order_date("29/02/2024").is_err());
/// assert!(parse_order_date("2023-02-29").is_err());
/// ```
pub fn parse_order_date(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CoreError::InvalidDate(raw.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================
