//! # tally-core: Pure Business Logic for Tally POS
//!
//! Everything about sales, purchase orders, stock lots and payments that can
//! be decided without a database lives here, as pure functions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Callers (HTTP layer, CLI, seed binary)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ request types                          │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            tally-db engines (SaleEngine, PurchaseEngine)        │   │
//! │  │       one SQLite transaction per operation, all-or-nothing      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ plans, balances                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ allocator │  │  ledger   │  │ numbering │  │   │
//! │  │   │  Product  │  │ deduction │  │  Balance  │  │  A-0001   │  │   │
//! │  │   │   Sale    │  │  receipt  │  │  status   │  │  PO-…     │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities (Product, ProductSupplier, Sale, PurchaseOrder, ...)
//! - [`terms`] - Payment methods and payment terms
//! - [`money`] - Money type with integer arithmetic
//! - [`allocator`] - Plans which lots a sale line draws from
//! - [`ledger`] - Payment balance math and status transitions
//! - [`numbering`] - Sale and purchase order numbers
//! - [`requests`] - Typed request structs with `validate()`
//! - [`validation`] - Field rules
//! - [`clock`] - Injected time source
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::ledger;
//! use tally_core::{Money, PaymentStatus, PaymentTerm};
//! use chrono::Utc;
//!
//! let now = Utc::now();
//! let balance = ledger::initial_sale_settlement(
//!     Money::from_cents(10_000),
//!     PaymentTerm::Net30,
//!     Money::from_cents(2_500),
//!     now,
//! )
//! .unwrap();
//!
//! assert_eq!(balance.status, PaymentStatus::Pending);
//! assert_eq!(balance.amount_due.cents(), 7_500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

#[macro_use]
mod macros;

pub mod allocator;
pub mod clock;
pub mod error;
pub mod ledger;
pub mod money;
pub mod numbering;
pub mod requests;
pub mod terms;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use terms::*;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Markup applied to the cost of a lot created by a purchase order:
/// price = cost × 1.2.
pub const DEFAULT_MARKUP_BPS: u32 = 2000;

/// Reorder threshold of a lot created by a purchase order.
pub const DEFAULT_MIN_STOCK: i64 = 10;

/// Ledger rounding tolerance, in cents.
pub const PAYMENT_TOLERANCE_CENTS: i64 = 1;

/// Longest payment window of a purchase order.
pub const MAX_PAYMENT_DAYS: i64 = 365;

/// Most units a single line may move.
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Largest single amount a request may carry: $100,000,000.00.
pub const MAX_AMOUNT_CENTS: i64 = 10_000_000_000;

/// Most lines a sale or purchase order may carry.
pub const MAX_LINE_ITEMS: usize = 500;
