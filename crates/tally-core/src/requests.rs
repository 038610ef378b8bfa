//! # Request Types
//!
//! What callers send to the engines and repositories. Every request is plain
//! data (serde) plus a `validate()` that checks field rules and parses the
//! string-typed methods and terms. Validation happens before any
//! transaction is opened, so a rejected request never touches the database.
//!
//! ## Request → Engine Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  JSON / struct literal                                                  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  CreateSaleRequest::validate() ──► SaleTerms { method, term }          │
//! │        │                               (CoreError on bad input)         │
//! │        ▼                                                                │
//! │  SaleEngine::create_sale(request, user)                                │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  BEGIN … plan / apply / insert … COMMIT                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::allocator::PriceOverrides;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::terms::{PaymentTerm, PurchasePaymentMethod, SalePaymentMethod, SettlementMethod};
use crate::types::{MovementType, PaymentStatus};
use crate::validation::{
    parse_order_date, validate_name, validate_non_negative, validate_pagination,
    validate_line_count, validate_payment_amount, validate_payment_days, validate_quantity,
    validate_sku,
    validate_stock_level,
};

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Parses an optional, possibly blank, string into `T`.
fn parse_optional<T>(raw: Option<&str>) -> CoreResult<Option<T>>
where
    T: std::str::FromStr<Err = CoreError>,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some),
        None => Ok(None),
    }
}

/// Blank strings count as absent.
fn non_blank(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// =============================================================================
// Sales
// =============================================================================

/// One line of a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Sell from this supplier's lot (supplier id or link id). When absent
    /// the line draws from every active lot in stored order.
    #[serde(default)]
    pub supplier_id: Option<String>,
    /// Unit price override, in cents.
    #[serde(default)]
    pub price_cents: Option<i64>,
    /// Unit cost override, in cents.
    #[serde(default)]
    pub cost_cents: Option<i64>,
}

impl SaleLineRequest {
    pub fn validate(&self) -> CoreResult<()> {
        if self.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "product_id".to_string(),
            }
            .into());
        }
        validate_quantity(self.quantity)?;
        if let Some(price) = self.price_cents {
            validate_non_negative("price", price)?;
        }
        if let Some(cost) = self.cost_cents {
            validate_non_negative("cost", cost)?;
        }
        Ok(())
    }

    /// The explicit lot reference, if one was given.
    pub fn supplier_ref(&self) -> Option<&str> {
        non_blank(&self.supplier_id)
    }

    pub fn overrides(&self) -> PriceOverrides {
        PriceOverrides {
            price: self.price_cents.map(Money::from_cents),
            cost: self.cost_cents.map(Money::from_cents),
        }
    }
}

/// A point-of-sale transaction.
///
/// ## Example
/// ```rust
/// use tally_core::requests::CreateSaleRequest;
/// use tally_core::{PaymentTerm, SalePaymentMethod};
///
/// let request: CreateSaleRequest = serde_json::from_str(r#"{
///     "payment_method": "credit",
///     "items": [{ "product_id": "p-1", "quantity": 2 }]
/// }"#).unwrap();
///
/// let terms = request.validate().unwrap();
/// assert_eq!(terms.method, SalePaymentMethod::Credit);
/// assert_eq!(terms.term, PaymentTerm::Net30);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateSaleRequest {
    pub items: Vec<SaleLineRequest>,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub payment_method: String,
    #[serde(default)]
    pub payment_term: Option<String>,
    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub down_payment_cents: i64,
}

/// Parsed payment terms of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleTerms {
    pub method: SalePaymentMethod,
    pub term: PaymentTerm,
}

impl CreateSaleRequest {
    /// Checks the request and resolves its method and term. A missing term
    /// defaults from the method (credit → net30, otherwise cash).
    pub fn validate(&self) -> CoreResult<SaleTerms> {
        let method: SalePaymentMethod = self.payment_method.parse()?;
        let term = parse_optional::<PaymentTerm>(self.payment_term.as_deref())?
            .unwrap_or_else(|| method.default_term());

        validate_line_count(self.items.len())?;
        for line in &self.items {
            line.validate()?;
        }

        validate_non_negative("tax", self.tax_cents)?;
        validate_non_negative("discount", self.discount_cents)?;
        validate_non_negative("down_payment", self.down_payment_cents)?;

        Ok(SaleTerms { method, term })
    }

    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    pub fn down_payment(&self) -> Money {
        Money::from_cents(self.down_payment_cents)
    }

    pub fn customer_name(&self) -> Option<&str> {
        non_blank(&self.customer_name)
    }
}

// =============================================================================
// Purchase Orders
// =============================================================================

/// One delivered line of a purchase order, identified by SKU. Unknown SKUs
/// create the product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseLineRequest {
    pub sku: String,
    /// Name for a newly created product. Defaults to the SKU.
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    /// Receive into this exact lot. Must belong to the product and the
    /// order's supplier.
    #[serde(default)]
    pub product_supplier_id: Option<String>,
}

impl PurchaseLineRequest {
    pub fn validate(&self) -> CoreResult<()> {
        validate_sku(&self.sku)?;
        if let Some(name) = non_blank(&self.product_name) {
            validate_name("product_name", name)?;
        }
        validate_quantity(self.quantity)?;
        validate_non_negative("unit_cost", self.unit_cost_cents)?;
        Ok(())
    }

    pub fn sku(&self) -> &str {
        self.sku.trim()
    }

    /// Name for a product created from this line.
    pub fn product_name(&self) -> &str {
        non_blank(&self.product_name).unwrap_or_else(|| self.sku())
    }

    pub fn category(&self) -> Option<&str> {
        non_blank(&self.category)
    }

    pub fn description(&self) -> Option<&str> {
        non_blank(&self.description)
    }

    pub fn link_ref(&self) -> Option<&str> {
        non_blank(&self.product_supplier_id)
    }

    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }
}

/// A delivery from one supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: String,
    /// cash | transfer | credit | qris. Defaults to cash.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Days until a credit order is due. Takes precedence over
    /// `payment_term`.
    #[serde(default)]
    pub payment_days: Option<i64>,
    /// Alternative to `payment_days`: net7, net30, ...
    #[serde(default)]
    pub payment_term: Option<String>,
    #[serde(default)]
    pub down_payment_cents: i64,
    #[serde(default)]
    pub notes: Option<String>,
    /// `YYYY-MM-DD`.
    pub order_date: String,
    pub items: Vec<PurchaseLineRequest>,
}

/// Parsed payment terms of a purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseTerms {
    pub method: PurchasePaymentMethod,
    pub payment_days: i64,
    /// Midnight UTC of the order date.
    pub order_date: DateTime<Utc>,
}

impl CreatePurchaseOrderRequest {
    pub fn validate(&self) -> CoreResult<PurchaseTerms> {
        let method = parse_optional::<PurchasePaymentMethod>(self.payment_method.as_deref())?
            .unwrap_or_default();
        let payment_days = resolve_payment_days(
            method,
            self.payment_days,
            parse_optional::<PaymentTerm>(self.payment_term.as_deref())?,
        )?;

        if self.supplier_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "supplier_id".to_string(),
            }
            .into());
        }

        let order_date = parse_order_date(&self.order_date)?;

        validate_line_count(self.items.len())?;
        for line in &self.items {
            line.validate()?;
        }

        validate_non_negative("down_payment", self.down_payment_cents)?;

        Ok(PurchaseTerms {
            method,
            payment_days,
            order_date,
        })
    }

    pub fn down_payment(&self) -> Money {
        Money::from_cents(self.down_payment_cents)
    }

    pub fn notes(&self) -> Option<&str> {
        non_blank(&self.notes)
    }
}

/// Payment days of a purchase order: explicit days win over a term; a
/// credit order with no days is due in 30.
fn resolve_payment_days(
    method: PurchasePaymentMethod,
    days: Option<i64>,
    term: Option<PaymentTerm>,
) -> CoreResult<i64> {
    let days = days.or(term.map(|t| t.days())).unwrap_or(0);
    validate_payment_days(days)?;

    Ok(if days == 0 && method.is_credit() {
        PurchasePaymentMethod::DEFAULT_CREDIT_DAYS
    } else {
        days
    })
}

/// Partial update of a purchase order. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdatePurchaseOrderRequest {
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_days: Option<i64>,
    #[serde(default)]
    pub payment_term: Option<String>,
    /// New down payment. Only applied to credit orders.
    #[serde(default)]
    pub down_payment_cents: Option<i64>,
}

/// A validated [`UpdatePurchaseOrderRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseOrderPatch {
    pub supplier_id: Option<String>,
    pub notes: Option<String>,
    pub payment_method: Option<PurchasePaymentMethod>,
    pub payment_days: Option<i64>,
    pub down_payment: Option<Money>,
}

impl UpdatePurchaseOrderRequest {
    pub fn validate(&self) -> CoreResult<PurchaseOrderPatch> {
        let payment_method =
            parse_optional::<PurchasePaymentMethod>(self.payment_method.as_deref())?;
        let term = parse_optional::<PaymentTerm>(self.payment_term.as_deref())?;

        let payment_days = self.payment_days.or(term.map(|t| t.days()));
        if let Some(days) = payment_days {
            validate_payment_days(days)?;
        }

        if let Some(dp) = self.down_payment_cents {
            validate_non_negative("down_payment", dp)?;
        }

        Ok(PurchaseOrderPatch {
            supplier_id: non_blank(&self.supplier_id).map(str::to_string),
            notes: self.notes.clone(),
            payment_method,
            // zero days means "unchanged"
            payment_days: payment_days.filter(|d| *d > 0),
            down_payment: self.down_payment_cents.map(Money::from_cents),
        })
    }
}

// =============================================================================
// Payments
// =============================================================================

/// An instalment against a sale or purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecordPaymentRequest {
    pub amount_cents: i64,
    pub payment_method: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RecordPaymentRequest {
    /// Validates against the sale method set.
    pub fn validate_for_sale(&self) -> CoreResult<SalePaymentMethod> {
        let method = self.payment_method.parse()?;
        validate_payment_amount(self.amount_cents)?;
        Ok(method)
    }

    /// Validates against the purchase settlement method set.
    pub fn validate_for_purchase(&self) -> CoreResult<SettlementMethod> {
        let method = self.payment_method.parse()?;
        validate_payment_amount(self.amount_cents)?;
        Ok(method)
    }

    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    pub fn notes(&self) -> Option<&str> {
        non_blank(&self.notes)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A new product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewProduct {
    /// A minimal active product.
    pub fn new(name: impl Into<String>, sku: impl Into<String>) -> Self {
        NewProduct {
            name: name.into(),
            sku: sku.into(),
            description: None,
            category: None,
            location: None,
            is_active: true,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_name("name", &self.name)?;
        validate_sku(&self.sku)?;
        Ok(())
    }
}

/// Partial product update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

impl ProductPatch {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        if let Some(sku) = &self.sku {
            validate_sku(sku)?;
        }
        Ok(())
    }
}

/// A new supplier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSupplier {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

impl NewSupplier {
    pub fn named(name: impl Into<String>) -> Self {
        NewSupplier {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_name("name", &self.name)?;
        Ok(())
    }
}

/// Partial supplier update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SupplierPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    pub website: Option<String>,
    pub is_active: Option<bool>,
}

impl SupplierPatch {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        Ok(())
    }
}

/// A new product/supplier link (lot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewLink {
    pub product_id: String,
    pub supplier_id: String,
    pub cost_cents: i64,
    pub price_cents: i64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_min_stock")]
    pub min_stock: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewLink {
    pub fn validate(&self) -> CoreResult<()> {
        validate_non_negative("cost", self.cost_cents)?;
        validate_non_negative("price", self.price_cents)?;
        validate_stock_level(self.stock)?;
        validate_non_negative("min_stock", self.min_stock)?;
        Ok(())
    }
}

/// Partial link update. Stock is changed through stock adjustments only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LinkPatch {
    pub cost_cents: Option<i64>,
    pub price_cents: Option<i64>,
    pub min_stock: Option<i64>,
    pub is_active: Option<bool>,
}

impl LinkPatch {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(cost) = self.cost_cents {
            validate_non_negative("cost", cost)?;
        }
        if let Some(price) = self.price_cents {
            validate_non_negative("price", price)?;
        }
        if let Some(min) = self.min_stock {
            validate_non_negative("min_stock", min)?;
        }
        Ok(())
    }
}

/// A manual stock change on one lot.
///
/// `in` adds, `out` subtracts, `adjustment` sets the counted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustment {
    #[serde(rename = "type")]
    pub movement_type: String,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StockAdjustment {
    pub fn validate(&self) -> CoreResult<MovementType> {
        let movement_type: MovementType = self.movement_type.parse()?;
        match movement_type {
            MovementType::Adjustment => validate_stock_level(self.quantity)?,
            MovementType::In | MovementType::Out => validate_quantity(self.quantity)?,
        }
        Ok(movement_type)
    }

    pub fn notes(&self) -> Option<&str> {
        non_blank(&self.notes)
    }
}

/// A new user row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

impl NewUser {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("name", &self.name)?;
        if !self.email.contains('@') {
            return Err(ValidationError::InvalidFormat {
                field: "email".to_string(),
                reason: "must be an email address".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_min_stock() -> i64 {
    crate::DEFAULT_MIN_STOCK
}

fn default_role() -> String {
    "cashier".to_string()
}

// =============================================================================
// Filters
// =============================================================================

/// 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn new(page: i64, limit: i64) -> Self {
        Page { page, limit }
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_pagination(self.page, self.limit)?;
        Ok(())
    }

    /// Rows to skip.
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// Half-open time window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        DateRange { from, to }
    }

    /// Whole days from `start` through `end` inclusive, both `YYYY-MM-DD`.
    pub fn from_dates(start: &str, end: &str) -> CoreResult<Self> {
        let from = parse_order_date(start)?;
        let to = parse_order_date(end)? + chrono::Duration::days(1);
        Ok(DateRange { from, to })
    }
}

/// Product list filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    /// Matches name, SKU or description.
    pub search: Option<String>,
    pub active: Option<bool>,
    /// Only products with an active lot at or below its minimum.
    #[serde(default)]
    pub low_stock: bool,
    #[serde(default)]
    pub page: Page,
}

/// Sale list filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaleFilter {
    pub range: Option<DateRange>,
    pub user_id: Option<String>,
    pub payment_method: Option<SalePaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub page: Page,
}

/// Stock movement list filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<String>,
    pub movement_type: Option<MovementType>,
    #[serde(default)]
    pub page: Page,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(method: &str, term: Option<&str>) -> CreateSaleRequest {
        CreateSaleRequest {
            items: vec![SaleLineRequest {
                product_id: "p-1".to_string(),
                quantity: 1,
                supplier_id: None,
                price_cents: None,
                cost_cents: None,
            }],
            customer_name: None,
            payment_method: method.to_string(),
            payment_term: term.map(str::to_string),
            tax_cents: 0,
            discount_cents: 0,
            down_payment_cents: 0,
        }
    }

    fn purchase(method: Option<&str>, days: Option<i64>) -> CreatePurchaseOrderRequest {
        CreatePurchaseOrderRequest {
            supplier_id: "s-1".to_string(),
            payment_method: method.map(str::to_string),
            payment_days: days,
            payment_term: None,
            down_payment_cents: 0,
            notes: None,
            order_date: "2024-03-01".to_string(),
            items: vec![PurchaseLineRequest {
                sku: "RICE-5KG".to_string(),
                product_name: None,
                category: None,
                description: None,
                quantity: 10,
                unit_cost_cents: 500,
                product_supplier_id: None,
            }],
        }
    }

    #[test]
    fn test_sale_term_defaults() {
        assert_eq!(sale("cash", None).validate().unwrap().term, PaymentTerm::Cash);
        assert_eq!(sale("card", Some("")).validate().unwrap().term, PaymentTerm::Cash);
        assert_eq!(sale("credit", None).validate().unwrap().term, PaymentTerm::Net30);
        assert_eq!(
            sale("transfer", Some("net7")).validate().unwrap().term,
            PaymentTerm::Net7
        );
    }

    #[test]
    fn test_sale_rejects_bad_method_and_term() {
        assert!(matches!(
            sale("qris", None).validate(),
            Err(CoreError::InvalidPaymentMethod { .. })
        ));
        assert!(matches!(
            sale("cash", Some("net45")).validate(),
            Err(CoreError::InvalidPaymentTerm(_))
        ));
    }

    #[test]
    fn test_sale_line_rules() {
        let mut req = sale("cash", None);
        req.items[0].quantity = 0;
        assert!(req.validate().is_err());

        let mut req = sale("cash", None);
        req.items[0].price_cents = Some(-1);
        assert!(req.validate().is_err());

        let mut req = sale("cash", None);
        req.items.clear();
        assert!(req.validate().is_err());

        let mut req = sale("cash", None);
        req.discount_cents = -5;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_oversized_lines_are_rejected() {
        let mut req = purchase(None, None);
        req.items[0].quantity = 4_000_000_000_000;
        req.items[0].unit_cost_cents = 5_000_000;
        assert!(matches!(
            req.validate(),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let mut req = sale("cash", None);
        req.items[0].price_cents = Some(i64::MAX);
        assert!(req.validate().is_err());

        let mut req = sale("cash", None);
        req.items = vec![req.items[0].clone(); crate::MAX_LINE_ITEMS + 1];
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_purchase_defaults() {
        let terms = purchase(None, None).validate().unwrap();
        assert_eq!(terms.method, PurchasePaymentMethod::Cash);
        assert_eq!(terms.payment_days, 0);
        assert_eq!(terms.order_date.to_rfc3339(), "2024-03-01T00:00:00+00:00");

        let terms = purchase(Some("credit"), None).validate().unwrap();
        assert_eq!(terms.payment_days, 30);

        let terms = purchase(Some("credit"), Some(14)).validate().unwrap();
        assert_eq!(terms.payment_days, 14);
    }

    #[test]
    fn test_purchase_term_and_days() {
        let mut req = purchase(Some("credit"), None);
        req.payment_term = Some("net60".to_string());
        assert_eq!(req.validate().unwrap().payment_days, 60);

        req.payment_days = Some(10);
        assert_eq!(req.validate().unwrap().payment_days, 10);

        assert!(purchase(Some("credit"), Some(366)).validate().is_err());
        assert!(purchase(Some("card"), None).validate().is_err());
    }

    #[test]
    fn test_purchase_rejects_bad_date() {
        let mut req = purchase(None, None);
        req.order_date = "03/01/2024".to_string();
        assert!(matches!(req.validate(), Err(CoreError::InvalidDate(_))));
    }

    #[test]
    fn test_purchase_line_name_defaults_to_sku() {
        let req = purchase(None, None);
        assert_eq!(req.items[0].product_name(), "RICE-5KG");
    }

    #[test]
    fn test_update_patch() {
        let patch = UpdatePurchaseOrderRequest {
            payment_method: Some("credit".to_string()),
            payment_days: Some(0),
            down_payment_cents: Some(1500),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(patch.payment_method, Some(PurchasePaymentMethod::Credit));
        assert_eq!(patch.payment_days, None);
        assert_eq!(patch.down_payment, Some(Money::from_cents(1500)));

        let bad = UpdatePurchaseOrderRequest {
            payment_method: Some("cheque".to_string()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_record_payment_method_sets() {
        let req = RecordPaymentRequest {
            amount_cents: 100,
            payment_method: "wire".to_string(),
            notes: None,
        };
        assert!(req.validate_for_sale().is_err());
        assert_eq!(req.validate_for_purchase().unwrap(), SettlementMethod::Wire);

        let zero = RecordPaymentRequest {
            amount_cents: 0,
            payment_method: "cash".to_string(),
            notes: None,
        };
        assert!(zero.validate_for_sale().is_err());
    }

    #[test]
    fn test_stock_adjustment() {
        let adj = StockAdjustment {
            movement_type: "adjustment".to_string(),
            quantity: 0,
            notes: None,
        };
        assert_eq!(adj.validate().unwrap(), MovementType::Adjustment);

        let out = StockAdjustment {
            movement_type: "out".to_string(),
            quantity: 0,
            notes: None,
        };
        assert!(out.validate().is_err());

        let bogus = StockAdjustment {
            movement_type: "transfer".to_string(),
            quantity: 1,
            notes: None,
        };
        assert!(bogus.validate().is_err());
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::default().offset(), 0);
        assert_eq!(Page::new(3, 20).offset(), 40);
        assert!(Page::new(0, 20).validate().is_err());
    }

    #[test]
    fn test_date_range_is_inclusive_of_end_day() {
        let range = DateRange::from_dates("2024-01-01", "2024-01-31").unwrap();
        assert_eq!(range.to.to_rfc3339(), "2024-02-01T00:00:00+00:00");
    }
}
