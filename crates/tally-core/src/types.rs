//! # Domain Types
//!
//! Core domain types used throughout Tally POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │──►│ ProductSupplier │◄──│    Supplier     │       │
//! │  │  ─────────────  │ n │  (a "lot")      │ n │  ─────────────  │       │
//! │  │  id (UUID)      │   │  cost / price   │   │  id (UUID)      │       │
//! │  │  sku (business) │   │  stock ≥ 0      │   │  name           │       │
//! │  └─────────────────┘   │  min_stock      │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Sale       │   │  PurchaseOrder  │   │  StockMovement  │       │
//! │  │  sale_number    │   │  po_number      │   │  in/out/adjust  │       │
//! │  │  SaleItem[]     │   │  POItem[]       │   │  append-only    │       │
//! │  │  SalePayment[]  │   │  PurchPayment[] │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, sale_number, po_number) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::Money;
use crate::terms::{PaymentTerm, PurchasePaymentMethod, SalePaymentMethod};
use crate::ValidationError;

/// Generates a new row id (UUID v4, hyphenated).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// Status Enums
// =============================================================================

/// Lifecycle status of a committed sale. Cancellation is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Sale was committed.
    #[default]
    Completed,
    /// Sale was voided; its stock has been restored.
    Cancelled,
}

string_enum!(SaleStatus, |_: &str| CoreError::Validation(ValidationError::NotAllowed {
    field: "status".to_string(),
    allowed: SaleStatus::ALL.iter().map(|s| s.as_str().to_string()).collect(),
}), {
    Completed => "completed",
    Cancelled => "cancelled",
});

/// Payment status shared by sales and purchase orders.
///
/// ## Transitions
/// ```text
/// pending ──► paid
///    │         ▲
///    ▼         │
/// overdue ─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    #[default]
    Pending,
    Overdue,
}

string_enum!(PaymentStatus, |_: &str| CoreError::Validation(ValidationError::NotAllowed {
    field: "payment_status".to_string(),
    allowed: PaymentStatus::ALL.iter().map(|s| s.as_str().to_string()).collect(),
}), {
    Paid => "paid",
    Pending => "pending",
    Overdue => "overdue",
});

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Stock received (purchase, void restore).
    In,
    /// Stock removed (sale, purchase reversal).
    Out,
    /// Stock counted and set to an absolute value.
    Adjustment,
}

string_enum!(MovementType, |_: &str| CoreError::Validation(ValidationError::NotAllowed {
    field: "type".to_string(),
    allowed: MovementType::ALL.iter().map(|s| s.as_str().to_string()).collect(),
}), {
    In => "in",
    Out => "out",
    Adjustment => "adjustment",
});

/// Kind of ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// Captured when the document was created.
    Downpayment,
    /// An instalment recorded later.
    Payment,
    /// A correction of an earlier down payment. May be negative.
    Adjustment,
}

string_enum!(PaymentType, |_: &str| CoreError::Validation(ValidationError::NotAllowed {
    field: "payment_type".to_string(),
    allowed: PaymentType::ALL.iter().map(|s| s.as_str().to_string()).collect(),
}), {
    Downpayment => "downpayment",
    Payment => "payment",
    Adjustment => "adjustment",
});

// =============================================================================
// User
// =============================================================================

/// The acting user. Identity is resolved by the caller; this row only
/// exists so documents can reference and display who created them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog. Stock and prices live on its supplier links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Stock Keeping Unit - business identifier, unique.
    pub sku: String,

    pub description: Option<String>,

    pub category: Option<String>,

    /// Shelf / storage location.
    pub location: Option<String>,

    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Set when the product is soft deleted. Deleted products are invisible
    /// to every lookup.
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Supplier
// =============================================================================

/// A supplier of products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub website: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Product Supplier (Lot)
// =============================================================================

/// The link between a product and one of its suppliers, carrying that
/// supplier's cost, selling price and current stock.
///
/// ## Invariants
/// - `stock >= 0` (enforced by a CHECK constraint and by guarded updates)
/// - unique per (product_id, supplier_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductSupplier {
    pub id: String,
    pub product_id: String,
    pub supplier_id: String,
    /// Read from the joined supplier row; not stored on the link.
    pub supplier_name: String,
    /// Purchase price from this supplier, in cents.
    pub cost_cents: i64,
    /// Selling price of this supplier's stock, in cents.
    pub price_cents: i64,
    pub stock: i64,
    pub min_stock: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ProductSupplier {
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// True when this lot is active and at or below its reorder threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.is_active && self.stock <= self.min_stock
    }
}

/// A product together with its supplier links in stored (creation) order.
///
/// This is what the allocator plans against: the engine loads it explicitly
/// before planning a deduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductWithLinks {
    #[serde(flatten)]
    pub product: Product,
    pub suppliers: Vec<ProductSupplier>,
}

impl ProductWithLinks {
    /// Active links, in stored order.
    pub fn active_links(&self) -> impl Iterator<Item = &ProductSupplier> {
        self.suppliers.iter().filter(|l| l.is_active)
    }

    /// Sum of stock across active links.
    pub fn total_active_stock(&self) -> i64 {
        self.active_links().map(|l| l.stock).sum()
    }

    /// Lowest selling price among active links; zero when there are none.
    pub fn lowest_active_price(&self) -> Money {
        self.active_links()
            .map(|l| l.price())
            .min()
            .unwrap_or_default()
    }

    /// Lowest cost among active links; zero when there are none.
    pub fn lowest_active_cost(&self) -> Money {
        self.active_links()
            .map(|l| l.cost())
            .min()
            .unwrap_or_default()
    }

    /// True when any active link is at or below its minimum stock.
    pub fn is_low_stock(&self) -> bool {
        self.suppliers.iter().any(ProductSupplier::is_low_stock)
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Immutable audit record of a stock change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    /// Sale number, PO number, or free text.
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// `<alpha prefix>-<4 digits>`, e.g. `A-0042`.
    pub sale_number: String,
    pub user_id: String,
    pub customer_name: Option<String>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    /// subtotal + tax - discount
    pub total_cents: i64,
    pub payment_method: SalePaymentMethod,
    pub payment_term: PaymentTerm,
    pub payment_status: PaymentStatus,
    pub down_payment_cents: i64,
    #[ts(as = "Option<String>")]
    pub due_date: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub paid_date: Option<DateTime<Utc>>,
    pub amount_paid_cents: i64,
    pub amount_due_cents: i64,
    pub status: SaleStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    #[inline]
    pub fn amount_due(&self) -> Money {
        Money::from_cents(self.amount_due_cents)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.status == SaleStatus::Cancelled
    }
}

/// A line of a sale, priced at sale time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// Zero-based position in the request; items are read back in this order.
    pub line_no: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Cost at sale time (for profit reporting).
    pub unit_cost_cents: i64,
    /// quantity × unit price
    pub total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// How many units of a sale item were drawn from which lot.
///
/// Written at sale time so that voiding the sale can put stock back into
/// the lots it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItemAllocation {
    pub id: String,
    pub sale_item_id: String,
    pub product_supplier_id: String,
    pub quantity: i64,
}

/// Sale item with its product and lot allocations loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItemDetail {
    #[serde(flatten)]
    pub item: SaleItem,
    /// `None` once the product has been deleted.
    pub product: Option<Product>,
    pub allocations: Vec<SaleItemAllocation>,
}

/// A sale rehydrated with its user and items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDetail {
    #[serde(flatten)]
    pub sale: Sale,
    pub user: Option<User>,
    pub items: Vec<SaleItemDetail>,
}

impl SaleDetail {
    /// Sum of the item line totals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|i| i.item.line_total()).sum()
    }
}

// =============================================================================
// Purchase Order
// =============================================================================

/// A purchase order. Goods are received in full when the order is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrder {
    pub id: String,
    /// `PO-YYYYMMDD-NNNN`
    pub po_number: String,
    pub supplier_id: String,
    pub user_id: String,
    pub payment_method: PurchasePaymentMethod,
    /// Days after the order date the balance is due (credit orders).
    pub payment_days: i64,
    pub payment_status: PaymentStatus,
    pub total_cents: i64,
    pub down_payment_cents: i64,
    pub amount_paid_cents: i64,
    pub amount_due_cents: i64,
    #[ts(as = "Option<String>")]
    pub due_date: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub paid_date: Option<DateTime<Utc>>,
    /// Midnight UTC of the order's calendar date.
    #[ts(as = "String")]
    pub order_date: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub received_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    #[inline]
    pub fn amount_due(&self) -> Money {
        Money::from_cents(self.amount_due_cents)
    }
}

/// A received line of a purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrderItem {
    pub id: String,
    pub purchase_order_id: String,
    pub product_id: String,
    /// The lot the goods were received into.
    pub product_supplier_id: Option<String>,
    pub line_no: i64,
    pub quantity_ordered: i64,
    pub quantity_received: i64,
    pub unit_cost_cents: i64,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Purchase order item with its product and lot loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrderItemDetail {
    #[serde(flatten)]
    pub item: PurchaseOrderItem,
    pub product: Option<Product>,
    pub product_supplier: Option<ProductSupplier>,
}

/// A purchase order rehydrated with supplier, user and items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub supplier: Option<Supplier>,
    pub user: Option<User>,
    pub items: Vec<PurchaseOrderItemDetail>,
}

// =============================================================================
// Payments
// =============================================================================

/// Append-only ledger row against a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SalePayment {
    pub id: String,
    pub sale_id: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub payment_method: SalePaymentMethod,
    pub payment_type: PaymentType,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Append-only ledger row against a purchase order.
///
/// `payment_method` is free text: down payments carry the order's method,
/// instalments carry a settlement method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchasePayment {
    pub id: String,
    pub purchase_order_id: String,
    pub user_id: String,
    /// Negative for down payment reductions.
    pub amount_cents: i64,
    pub payment_method: String,
    pub payment_type: PaymentType,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: &str, stock: i64, price: i64, cost: i64, active: bool) -> ProductSupplier {
        let now = Utc::now();
        ProductSupplier {
            id: id.to_string(),
            product_id: "p1".to_string(),
            supplier_id: format!("sup-{id}"),
            supplier_name: format!("Supplier {id}"),
            cost_cents: cost,
            price_cents: price,
            stock,
            min_stock: 10,
            is_active: active,
            created_at: now,
            updated_at: now,
        }
    }

    fn product(links: Vec<ProductSupplier>) -> ProductWithLinks {
        let now = Utc::now();
        ProductWithLinks {
            product: Product {
                id: "p1".to_string(),
                name: "Cola".to_string(),
                sku: "COLA".to_string(),
                description: None,
                category: None,
                location: None,
                is_active: true,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
            suppliers: links,
        }
    }

    #[test]
    fn test_aggregates_ignore_inactive_links() {
        let p = product(vec![
            link("a", 5, 1000, 700, true),
            link("b", 3, 800, 600, true),
            link("c", 50, 100, 50, false),
        ]);
        assert_eq!(p.total_active_stock(), 8);
        assert_eq!(p.lowest_active_price().cents(), 800);
        assert_eq!(p.lowest_active_cost().cents(), 600);
    }

    #[test]
    fn test_aggregates_without_links() {
        let p = product(vec![]);
        assert_eq!(p.total_active_stock(), 0);
        assert!(p.lowest_active_price().is_zero());
        assert!(!p.is_low_stock());
    }

    #[test]
    fn test_low_stock() {
        assert!(product(vec![link("a", 10, 100, 50, true)]).is_low_stock());
        assert!(!product(vec![link("a", 11, 100, 50, true)]).is_low_stock());
        assert!(!product(vec![link("a", 0, 100, 50, false)]).is_low_stock());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("overdue".parse::<PaymentStatus>().unwrap(), PaymentStatus::Overdue);
        assert_eq!("in".parse::<MovementType>().unwrap(), MovementType::In);
        assert!("sideways".parse::<MovementType>().is_err());
        assert_eq!(SaleStatus::default(), SaleStatus::Completed);
    }
}
