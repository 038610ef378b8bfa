//! # Stock Allocator
//!
//! Resolves "deduct N units of product P" into concrete per-lot decrements,
//! and "N units of P received from supplier S" into the lot to increment.
//!
//! Planning is pure: it looks at a [`ProductWithLinks`] snapshot and returns
//! a plan. Applying the plan (the guarded `UPDATE`s) is done by the engine
//! inside its transaction, see `tally_db::engine::stock`.
//!
//! ## Deduction Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Lots (stored order):  S1 stock=5 price=10    S2 stock=3 price=8        │
//! │                                                                         │
//! │  EXPLICIT (supplier_ref = S2, qty 3)                                   │
//! │    match active lot by link id OR supplier id ──► S2                   │
//! │    S2.stock ≥ 3 ?  ──► plan [S2×3], price 8 (S2's own)                  │
//! │                                                                         │
//! │  LEGACY (no supplier_ref, qty 7)                                       │
//! │    Σ active stock = 8 ≥ 7 ?                                            │
//! │    walk active lots with stock > 0: S1×5, S2×2                          │
//! │    price = lowest active price (8), cost = lowest active cost          │
//! │                                                                         │
//! │  Overrides on the line always win over the lot's price/cost.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Legacy pricing uses the cheapest active lot's price even when the units
//! come from a dearer lot. Existing stores depend on that price, so it is
//! kept as is; `legacy_mode_prices_at_lowest_active_price` pins it.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{ProductSupplier, ProductWithLinks};
use crate::validation::validate_quantity;
use crate::{DEFAULT_MARKUP_BPS, DEFAULT_MIN_STOCK};

// =============================================================================
// Deduction
// =============================================================================

/// Caller-supplied price/cost for a sale line, replacing the lot's values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOverrides {
    pub price: Option<Money>,
    pub cost: Option<Money>,
}

/// One lot decrement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLine {
    pub link_id: String,
    pub supplier_id: String,
    pub quantity: i64,
}

/// The resolved allocation of one sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionPlan {
    pub product_id: String,
    pub quantity: i64,
    pub lines: Vec<PlanLine>,
    pub unit_price: Money,
    pub unit_cost: Money,
    /// Set in explicit mode; ends up in the stock movement notes.
    pub supplier_name: Option<String>,
}

impl DeductionPlan {
    /// quantity × unit price
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// Units drawn across all lines. Always equals `quantity`.
    pub fn planned_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Notes for the `out` stock movement of this line.
    pub fn movement_notes(&self) -> String {
        match &self.supplier_name {
            Some(name) => format!("Sale transaction - Supplier: {name}"),
            None => "Sale transaction".to_string(),
        }
    }
}

/// Plans the deduction of `quantity` units of `product`.
///
/// ## Errors
/// - `Validation` when `quantity < 1`
/// - `SupplierNotLinkedOrInactive` when `supplier_ref` matches no active lot
/// - `InsufficientStock` when the chosen lot (explicit) or all active lots
///   together (legacy) hold fewer than `quantity` units
pub fn plan_deduction(
    product: &ProductWithLinks,
    quantity: i64,
    supplier_ref: Option<&str>,
    overrides: PriceOverrides,
) -> CoreResult<DeductionPlan> {
    validate_quantity(quantity)?;

    match supplier_ref {
        Some(reference) => plan_explicit(product, quantity, reference, overrides),
        None => plan_legacy(product, quantity, overrides),
    }
}

fn plan_explicit(
    product: &ProductWithLinks,
    quantity: i64,
    reference: &str,
    overrides: PriceOverrides,
) -> CoreResult<DeductionPlan> {
    let lot = product
        .suppliers
        .iter()
        .find(|l| l.is_active && (l.supplier_id == reference || l.id == reference))
        .ok_or_else(|| CoreError::SupplierNotLinkedOrInactive {
            supplier_ref: reference.to_string(),
            product: product.product.name.clone(),
        })?;

    if lot.stock < quantity {
        return Err(CoreError::InsufficientStock {
            product: product.product.name.clone(),
            available: lot.stock,
            requested: quantity,
        });
    }

    Ok(DeductionPlan {
        product_id: product.product.id.clone(),
        quantity,
        lines: vec![PlanLine {
            link_id: lot.id.clone(),
            supplier_id: lot.supplier_id.clone(),
            quantity,
        }],
        unit_price: overrides.price.unwrap_or_else(|| lot.price()),
        unit_cost: overrides.cost.unwrap_or_else(|| lot.cost()),
        supplier_name: Some(lot.supplier_name.clone()),
    })
}

fn plan_legacy(
    product: &ProductWithLinks,
    quantity: i64,
    overrides: PriceOverrides,
) -> CoreResult<DeductionPlan> {
    let available = product.total_active_stock();
    if available < quantity {
        return Err(CoreError::InsufficientStock {
            product: product.product.name.clone(),
            available,
            requested: quantity,
        });
    }

    let mut remaining = quantity;
    let mut lines = Vec::new();

    for lot in product.active_links().filter(|l| l.stock > 0) {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.stock);
        lines.push(PlanLine {
            link_id: lot.id.clone(),
            supplier_id: lot.supplier_id.clone(),
            quantity: take,
        });
        remaining -= take;
    }

    Ok(DeductionPlan {
        product_id: product.product.id.clone(),
        quantity,
        lines,
        unit_price: overrides
            .price
            .unwrap_or_else(|| product.lowest_active_price()),
        unit_cost: overrides
            .cost
            .unwrap_or_else(|| product.lowest_active_cost()),
        supplier_name: None,
    })
}

// =============================================================================
// Receipt
// =============================================================================

/// Where a received quantity goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptPlan {
    /// The product already has a lot for this supplier; its cost is
    /// refreshed to the latest unit cost.
    Existing { link_id: String, new_cost: Money },
    /// No lot yet; create one with these values, then receive into it.
    New(NewLot),
}

/// Values for a freshly created lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLot {
    pub product_id: String,
    pub supplier_id: String,
    pub cost: Money,
    pub price: Money,
    pub stock: i64,
    pub min_stock: i64,
    pub is_active: bool,
}

impl NewLot {
    /// Default lot for a first delivery: price is cost plus the default
    /// markup, no stock yet, default reorder threshold.
    pub fn for_delivery(product_id: &str, supplier_id: &str, unit_cost: Money) -> Self {
        NewLot {
            product_id: product_id.to_string(),
            supplier_id: supplier_id.to_string(),
            cost: unit_cost,
            price: unit_cost.apply_markup(DEFAULT_MARKUP_BPS),
            stock: 0,
            min_stock: DEFAULT_MIN_STOCK,
            is_active: true,
        }
    }
}

/// Plans receiving goods of `product_id` from `supplier_id` at `unit_cost`.
///
/// `existing` is the product's current lot for that supplier, if any;
/// `explicit_link` is the lot the caller named on the purchase line.
///
/// ## Errors
/// - `LinkNotFound` when `explicit_link` is given but is not the lot of
///   this (product, supplier) pair
pub fn plan_receipt(
    product_id: &str,
    supplier_id: &str,
    unit_cost: Money,
    existing: Option<&ProductSupplier>,
    explicit_link: Option<&str>,
) -> CoreResult<ReceiptPlan> {
    if let Some(link_id) = explicit_link {
        return match existing {
            Some(lot)
                if lot.id == link_id
                    && lot.product_id == product_id
                    && lot.supplier_id == supplier_id =>
            {
                Ok(ReceiptPlan::Existing {
                    link_id: lot.id.clone(),
                    new_cost: unit_cost,
                })
            }
            _ => Err(CoreError::LinkNotFound(link_id.to_string())),
        };
    }

    Ok(match existing {
        Some(lot) => ReceiptPlan::Existing {
            link_id: lot.id.clone(),
            new_cost: unit_cost,
        },
        None => ReceiptPlan::New(NewLot::for_delivery(product_id, supplier_id, unit_cost)),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;
    use chrono::Utc;

    fn lot(id: &str, stock: i64, price: i64, cost: i64, active: bool) -> ProductSupplier {
        let now = Utc::now();
        ProductSupplier {
            id: format!("link-{id}"),
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

    /// S1 stock=5 price=10, S2 stock=3 price=8
    fn two_lots() -> ProductWithLinks {
        with_lots(vec![lot("s1", 5, 10, 7, true), lot("s2", 3, 8, 6, true)])
    }

    fn with_lots(suppliers: Vec<ProductSupplier>) -> ProductWithLinks {
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
            suppliers,
        }
    }

    #[test]
    fn test_explicit_by_supplier_id() {
        let plan = plan_deduction(&two_lots(), 3, Some("sup-s2"), PriceOverrides::default())
            .unwrap();
        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].link_id, "link-s2");
        assert_eq!(plan.lines[0].quantity, 3);
        assert_eq!(plan.unit_price.cents(), 8);
        assert_eq!(plan.unit_cost.cents(), 6);
        assert_eq!(plan.movement_notes(), "Sale transaction - Supplier: Supplier s2");
    }

    #[test]
    fn test_explicit_by_link_id() {
        let plan = plan_deduction(&two_lots(), 2, Some("link-s1"), PriceOverrides::default())
            .unwrap();
        assert_eq!(plan.lines[0].link_id, "link-s1");
        assert_eq!(plan.unit_price.cents(), 10);
    }

    #[test]
    fn test_explicit_overrides_win() {
        let overrides = PriceOverrides {
            price: Some(Money::from_cents(15)),
            cost: None,
        };
        let plan = plan_deduction(&two_lots(), 1, Some("sup-s2"), overrides).unwrap();
        assert_eq!(plan.unit_price.cents(), 15);
        assert_eq!(plan.unit_cost.cents(), 6);
    }

    #[test]
    fn test_explicit_inactive_or_unknown_supplier() {
        let product = with_lots(vec![lot("s1", 5, 10, 7, false)]);
        let err = plan_deduction(&product, 1, Some("sup-s1"), PriceOverrides::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::SupplierNotLinkedOrInactive { .. }));

        let err = plan_deduction(&two_lots(), 1, Some("nobody"), PriceOverrides::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::SupplierNotLinkedOrInactive { .. }));
    }

    #[test]
    fn test_explicit_insufficient_reports_lot_stock() {
        let err = plan_deduction(&two_lots(), 4, Some("sup-s2"), PriceOverrides::default())
            .unwrap_err();
        match err {
            CoreError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 3);
                assert_eq!(requested, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Reproduced on purpose: units come from S1 first, but the line is
    /// priced at the cheapest active lot (S2's 8), not S1's 10.
    #[test]
    fn legacy_mode_prices_at_lowest_active_price() {
        let plan = plan_deduction(&two_lots(), 7, None, PriceOverrides::default()).unwrap();

        let draws: Vec<(&str, i64)> = plan
            .lines
            .iter()
            .map(|l| (l.link_id.as_str(), l.quantity))
            .collect();
        assert_eq!(draws, vec![("link-s1", 5), ("link-s2", 2)]);
        assert_eq!(plan.unit_price.cents(), 8);
        assert_eq!(plan.unit_cost.cents(), 6);
        assert_eq!(plan.supplier_name, None);
        assert_eq!(plan.movement_notes(), "Sale transaction");
        assert_eq!(plan.line_total().cents(), 56);
    }

    #[test]
    fn test_legacy_skips_inactive_and_empty_lots() {
        let product = with_lots(vec![
            lot("s1", 0, 10, 7, true),
            lot("s2", 100, 1, 1, false),
            lot("s3", 4, 12, 9, true),
        ]);
        let plan = plan_deduction(&product, 4, None, PriceOverrides::default()).unwrap();
        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].link_id, "link-s3");
        // cheapest active lot is s1 even though it is empty
        assert_eq!(plan.unit_price.cents(), 10);
    }

    #[test]
    fn test_legacy_insufficient() {
        let err = plan_deduction(&two_lots(), 10, None, PriceOverrides::default()).unwrap_err();
        match err {
            CoreError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 8);
                assert_eq!(requested, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_no_lots_is_always_insufficient() {
        let err = plan_deduction(&with_lots(vec![]), 1, None, PriceOverrides::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 0, .. }
        ));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let err = plan_deduction(&two_lots(), 0, None, PriceOverrides::default()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_planned_quantity_matches_request() {
        for qty in 1..=8 {
            let plan = plan_deduction(&two_lots(), qty, None, PriceOverrides::default()).unwrap();
            assert_eq!(plan.planned_quantity(), qty);
        }
    }

    #[test]
    fn test_receipt_new_lot_defaults() {
        let plan = plan_receipt("p1", "sup-x", Money::from_cents(1000), None, None).unwrap();
        match plan {
            ReceiptPlan::New(lot) => {
                assert_eq!(lot.cost.cents(), 1000);
                assert_eq!(lot.price.cents(), 1200);
                assert_eq!(lot.stock, 0);
                assert_eq!(lot.min_stock, 10);
                assert!(lot.is_active);
            }
            other => panic!("expected new lot, got {other:?}"),
        }
    }

    #[test]
    fn test_receipt_existing_refreshes_cost() {
        let existing = lot("s1", 5, 10, 7, true);
        let plan = plan_receipt("p1", "sup-s1", Money::from_cents(9), Some(&existing), None)
            .unwrap();
        assert_eq!(
            plan,
            ReceiptPlan::Existing {
                link_id: "link-s1".to_string(),
                new_cost: Money::from_cents(9),
            }
        );
    }

    #[test]
    fn test_receipt_explicit_link_must_match() {
        let existing = lot("s1", 5, 10, 7, true);
        assert!(plan_receipt(
            "p1",
            "sup-s1",
            Money::from_cents(9),
            Some(&existing),
            Some("link-s1")
        )
        .is_ok());

        let err = plan_receipt(
            "p1",
            "sup-s1",
            Money::from_cents(9),
            Some(&existing),
            Some("link-other"),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::LinkNotFound(_)));

        let err = plan_receipt("p1", "sup-s1", Money::from_cents(9), None, Some("link-s1"))
            .unwrap_err();
        assert!(matches!(err, CoreError::LinkNotFound(_)));
    }
}
