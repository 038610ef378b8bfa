//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - Core | Db, returned by every engine operation  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, ID, amounts)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. Any of them aborts the
/// surrounding engine operation and rolls its transaction back.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found.
    ///
    /// ## When This Occurs
    /// - Product ID in a sale line doesn't exist
    /// - Product was soft deleted
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Supplier cannot be found.
    #[error("Supplier not found: {0}")]
    SupplierNotFound(String),

    /// Sale cannot be found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Purchase order cannot be found.
    #[error("Purchase order not found: {0}")]
    PurchaseOrderNotFound(String),

    /// Product/supplier link (lot) cannot be found, or does not belong to
    /// the product and supplier it was referenced with.
    #[error("Product supplier link not found: {0}")]
    LinkNotFound(String),

    /// User cannot be found.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Insufficient stock to complete a sale line.
    ///
    /// ## When This Occurs
    /// - Explicit supplier: the chosen lot holds fewer units than requested
    /// - Legacy mode: the sum of all active lots is below the request
    ///
    /// ## User Workflow
    /// ```text
    /// Sale line (qty: 10)
    ///      │
    ///      ▼
    /// Sum active lots: 5 + 3 = 8
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Cola 330ml", available: 8, requested: 10 }
    ///      │
    ///      ▼
    /// Whole sale rolled back, no stock touched
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// The explicitly selected supplier has no active lot for the product.
    #[error("Selected supplier {supplier_ref} not found or inactive for product {product}")]
    SupplierNotLinkedOrInactive {
        supplier_ref: String,
        product: String,
    },

    /// Sale is already cancelled; voiding twice would restore stock twice.
    #[error("Sale {0} is already cancelled")]
    AlreadyCancelled(String),

    /// Payment is larger than what is still owed.
    #[error("Payment amount {amount} exceeds amount due {due}")]
    AmountExceedsDue { amount: Money, due: Money },

    /// Down payment on a credit purchase order is larger than its total.
    #[error("Down payment {down_payment} cannot exceed total amount {total}")]
    DownPaymentExceedsTotal { down_payment: Money, total: Money },

    /// Payment method is not accepted for this kind of document.
    #[error("Invalid payment method '{method}', expected one of: {allowed}")]
    InvalidPaymentMethod { method: String, allowed: String },

    /// Payment term is not one of the known schedules.
    #[error("Invalid payment term '{0}', expected one of: cash, net7, net15, net30, net60, net90")]
    InvalidPaymentTerm(String),

    /// A date string could not be parsed as `YYYY-MM-DD`.
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Payment status cannot move from `from` to `to`.
    #[error("Invalid payment status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns true for the "thing does not exist" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::ProductNotFound(_)
                | CoreError::SupplierNotFound(_)
                | CoreError::SaleNotFound(_)
                | CoreError::PurchaseOrderNotFound(_)
                | CoreError::LinkNotFound(_)
                | CoreError::UserNotFound(_)
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when request input doesn't meet requirements.
/// Raised before any transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid SKU characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate SKU).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product: "COLA-330".to_string(),
            available: 8,
            requested: 10,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for COLA-330: available 8, requested 10"
        );

        let err = CoreError::AmountExceedsDue {
            amount: Money::from_cents(5000),
            due: Money::from_cents(2500),
        };
        assert_eq!(
            err.to_string(),
            "Payment amount $50.00 exceeds amount due $25.00"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: sku is required");
    }

    #[test]
    fn test_is_not_found() {
        assert!(CoreError::SaleNotFound("x".into()).is_not_found());
        assert!(CoreError::LinkNotFound("x".into()).is_not_found());
        assert!(!CoreError::AlreadyCancelled("x".into()).is_not_found());
    }
}
