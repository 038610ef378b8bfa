//! # Purchase Transaction Engine
//!
//! Receives supplier deliveries into stock and tracks what is owed for them.
//! A purchase order is received in full the moment it is created.
//!
//! ## Receiving One Line
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  PurchaseLineRequest { sku: "COLA-330", quantity: 24, unit_cost: 55 }  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  product by SKU ── missing? ──► create (name defaults to the SKU)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  plan_receipt(product, supplier, unit_cost, existing lot)              │
//! │       ├── Existing lot ──► cost := unit_cost                           │
//! │       └── New lot     ──► cost 55, price 66, stock 0, min 10           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  stock += 24   ──►  `in` movement "Purchase Order PO-… - Acme"         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::allocator::plan_receipt;
use tally_core::clock::SharedClock;
use tally_core::ledger::{
    adjust_down_payment, apply_payment, check_transition, initial_purchase_settlement,
    mark_overdue, Balance,
};
use tally_core::numbering::{po_number, po_number_with_suffix};
use tally_core::requests::{
    CreatePurchaseOrderRequest, PurchaseLineRequest, RecordPaymentRequest,
    UpdatePurchaseOrderRequest,
};
use tally_core::{
    new_id, CoreError, Money, MovementType, PaymentType, Product, PurchaseOrder,
    PurchaseOrderDetail, PurchaseOrderItem, PurchasePayment,
};
use tracing::{debug, info, warn};

use crate::engine::stock;
use crate::error::{DbError, EngineResult};
use crate::repository::catalog::{
    fetch_link_for, fetch_product, fetch_product_by_sku, fetch_supplier, insert_product,
};
use crate::repository::movement::{insert_movement, NewMovement};
use crate::repository::purchase::{
    delete_order_rows, fetch_order, fetch_order_items, fetch_overdue_candidates,
    insert_order, insert_order_item, insert_purchase_payment, load_order_detail,
    po_number_exists, update_order, update_order_balance, PurchaseRepository,
};
use crate::repository::user::require_user;

const DELETE_NOTES: &str = "Purchase order deleted - stock reversed";

/// A recorded instalment and the order it settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchasePaymentReceipt {
    pub order: PurchaseOrder,
    pub payment: PurchasePayment,
}

/// Purchase order transaction engine.
#[derive(Debug, Clone)]
pub struct PurchaseEngine {
    pool: SqlitePool,
    clock: SharedClock,
}

impl PurchaseEngine {
    pub fn new(pool: SqlitePool, clock: SharedClock) -> Self {
        PurchaseEngine { pool, clock }
    }

    /// Read side of purchase orders.
    pub fn reads(&self) -> PurchaseRepository {
        PurchaseRepository::new(self.pool.clone())
    }

    /// Gets an order with supplier, user and items.
    pub async fn get_purchase_order(&self, id: &str) -> EngineResult<Option<PurchaseOrderDetail>> {
        Ok(self.reads().get_purchase_order(id).await?)
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Creates a purchase order and receives every line into stock.
    ///
    /// ## Errors
    /// - `InvalidPaymentMethod`, `InvalidPaymentTerm`, `InvalidDate`,
    ///   `Validation`
    /// - `UserNotFound`, `SupplierNotFound`
    /// - `LinkNotFound` when a line names a lot of another product/supplier
    /// - `DownPaymentExceedsTotal` on a credit order
    pub async fn create_purchase_order(
        &self,
        request: &CreatePurchaseOrderRequest,
        user_id: &str,
    ) -> EngineResult<PurchaseOrderDetail> {
        let result = self.try_create(request, user_id).await;
        if let Err(e) = &result {
            warn!(supplier_id = %request.supplier_id, error = %e, "Purchase order rejected");
        }
        result
    }

    async fn try_create(
        &self,
        request: &CreatePurchaseOrderRequest,
        user_id: &str,
    ) -> EngineResult<PurchaseOrderDetail> {
        let terms = request.validate()?;
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;

        require_user(&mut tx, user_id).await?;
        let supplier = fetch_supplier(&mut tx, &request.supplier_id)
            .await?
            .ok_or_else(|| CoreError::SupplierNotFound(request.supplier_id.clone()))?;

        let po = allocate_po_number(&mut tx, now).await?;
        let order_id = new_id();
        let movement_notes = format!("Purchase Order {po} - {}", supplier.name);

        debug!(po_number = %po, lines = request.items.len(), "Receiving purchase order");

        let mut items = Vec::with_capacity(request.items.len());
        for (line_no, line) in request.items.iter().enumerate() {
            let product = find_or_create_product(&mut tx, line, now).await?;

            let existing = fetch_link_for(&mut tx, &product.id, &supplier.id).await?;
            let plan = plan_receipt(
                &product.id,
                &supplier.id,
                line.unit_cost(),
                existing.as_ref(),
                line.link_ref(),
            )?;
            let link_id = stock::receive(&mut tx, &plan, line.quantity, now).await?;

            insert_movement(
                &mut tx,
                NewMovement {
                    product_id: &product.id,
                    user_id,
                    movement_type: MovementType::In,
                    quantity: line.quantity,
                    reference: Some(&po),
                    notes: Some(&movement_notes),
                    created_at: now,
                },
            )
            .await?;

            items.push(PurchaseOrderItem {
                id: new_id(),
                purchase_order_id: order_id.clone(),
                product_id: product.id,
                product_supplier_id: Some(link_id),
                line_no: line_no as i64,
                quantity_ordered: line.quantity,
                quantity_received: line.quantity,
                unit_cost_cents: line.unit_cost_cents,
                total_cents: line.unit_cost().multiply_quantity(line.quantity).cents(),
                created_at: now,
            });
        }

        let total: Money = items.iter().map(|i| Money::from_cents(i.total_cents)).sum();
        let down_payment = if terms.method.is_credit() {
            request.down_payment()
        } else {
            Money::zero()
        };

        let balance = initial_purchase_settlement(
            total,
            terms.method,
            down_payment,
            terms.order_date,
            terms.payment_days,
            now,
        )?;

        let order = PurchaseOrder {
            id: order_id,
            po_number: po,
            supplier_id: supplier.id.clone(),
            user_id: user_id.to_string(),
            payment_method: terms.method,
            payment_days: terms.payment_days,
            payment_status: balance.status,
            total_cents: total.cents(),
            down_payment_cents: down_payment.cents(),
            amount_paid_cents: balance.amount_paid.cents(),
            amount_due_cents: balance.amount_due.cents(),
            due_date: balance.due_date,
            paid_date: balance.paid_date,
            order_date: terms.order_date,
            received_date: Some(now),
            notes: request.notes().map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        insert_order(&mut tx, &order).await?;
        for item in &items {
            insert_order_item(&mut tx, item).await?;
        }

        if down_payment.is_positive() {
            insert_purchase_payment(
                &mut tx,
                &PurchasePayment {
                    id: new_id(),
                    purchase_order_id: order.id.clone(),
                    user_id: user_id.to_string(),
                    amount_cents: down_payment.cents(),
                    payment_method: terms.method.to_string(),
                    payment_type: PaymentType::Downpayment,
                    notes: Some(format!("Down payment for PO {}", order.po_number)),
                    created_at: now,
                },
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            po_number = %order.po_number,
            supplier = %supplier.name,
            total = %total,
            payment_status = %order.payment_status,
            "Purchase order received"
        );

        self.rehydrate(&order.id).await
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Applies a partial update.
    ///
    /// A new payment day count moves the due date of a credit order. A new
    /// down payment on a credit order shifts amount paid and due by the
    /// difference and is recorded as an `adjustment` payment row.
    pub async fn update_purchase_order(
        &self,
        order_id: &str,
        request: &UpdatePurchaseOrderRequest,
        user_id: &str,
    ) -> EngineResult<PurchaseOrderDetail> {
        let patch = request.validate()?;
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;

        require_user(&mut tx, user_id).await?;
        let mut order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| CoreError::PurchaseOrderNotFound(order_id.to_string()))?;

        if let Some(supplier_id) = &patch.supplier_id {
            let supplier = fetch_supplier(&mut tx, supplier_id)
                .await?
                .ok_or_else(|| CoreError::SupplierNotFound(supplier_id.clone()))?;
            order.supplier_id = supplier.id;
        }
        if let Some(notes) = &patch.notes {
            order.notes = Some(notes.clone());
        }
        if let Some(method) = patch.payment_method {
            order.payment_method = method;
        }

        let credit = order.payment_method.is_credit();

        if let Some(days) = patch.payment_days {
            if days != order.payment_days && credit {
                order.due_date = Some(order.order_date + Duration::days(days));
            }
            order.payment_days = days;
        }

        let original = Money::from_cents(order.down_payment_cents);
        let mut adjustment = None;

        match patch.down_payment {
            Some(requested) if credit && requested != original => {
                let (balance, delta) =
                    adjust_down_payment(Balance::of_purchase(&order), original, requested, now)?;
                apply_balance(&mut order, &balance);
                order.down_payment_cents = requested.cents();
                adjustment = Some((original, requested, delta));
            }
            _ => {}
        }

        order.updated_at = now;
        update_order(&mut tx, &order).await?;

        if let Some((from, to, delta)) = adjustment.filter(|(_, _, d)| !d.is_zero()) {
            insert_purchase_payment(
                &mut tx,
                &PurchasePayment {
                    id: new_id(),
                    purchase_order_id: order.id.clone(),
                    user_id: user_id.to_string(),
                    amount_cents: delta.cents(),
                    payment_method: order.payment_method.to_string(),
                    payment_type: PaymentType::Adjustment,
                    notes: Some(format!("Downpayment adjusted from {from} to {to}")),
                    created_at: now,
                },
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            po_number = %order.po_number,
            payment_status = %order.payment_status,
            amount_due = order.amount_due_cents,
            "Purchase order updated"
        );

        self.rehydrate(&order.id).await
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Records an instalment against an order's outstanding balance.
    ///
    /// ## Errors
    /// - `InvalidPaymentMethod` (cash, card, transfer, check, wire)
    /// - `Validation` (amount not positive)
    /// - `PurchaseOrderNotFound`, `AmountExceedsDue`
    pub async fn record_payment(
        &self,
        order_id: &str,
        request: &RecordPaymentRequest,
        user_id: &str,
    ) -> EngineResult<PurchasePaymentReceipt> {
        let method = request.validate_for_purchase()?;
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;

        require_user(&mut tx, user_id).await?;
        let order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| CoreError::PurchaseOrderNotFound(order_id.to_string()))?;

        let balance = apply_payment(Balance::of_purchase(&order), request.amount(), now)
            .map_err(|e| {
                warn!(po_number = %order.po_number, error = %e, "Payment rejected");
                e
            })?;
        update_order_balance(&mut tx, &order.id, &balance, now).await?;

        let payment = PurchasePayment {
            id: new_id(),
            purchase_order_id: order.id.clone(),
            user_id: user_id.to_string(),
            amount_cents: request.amount_cents,
            payment_method: method.to_string(),
            payment_type: PaymentType::Payment,
            notes: request.notes().map(str::to_string),
            created_at: now,
        };
        insert_purchase_payment(&mut tx, &payment).await?;

        let order = fetch_order(&mut tx, &order.id)
            .await?
            .ok_or_else(|| DbError::not_found("PurchaseOrder", order_id))?;

        tx.commit().await?;

        info!(
            po_number = %order.po_number,
            amount = %request.amount(),
            amount_due = order.amount_due_cents,
            payment_status = %order.payment_status,
            "Purchase payment recorded"
        );

        Ok(PurchasePaymentReceipt { order, payment })
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Deletes an order and takes its received stock back out of the lots,
    /// never below zero.
    pub async fn delete_purchase_order(&self, order_id: &str, user_id: &str) -> EngineResult<()> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        require_user(&mut tx, user_id).await?;
        let order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| CoreError::PurchaseOrderNotFound(order_id.to_string()))?;

        let mut reversed = 0;
        for item in fetch_order_items(&mut tx, &order.id).await? {
            if fetch_product(&mut tx, &item.product_id).await?.is_none() {
                continue;
            }
            let Some(link_id) = &item.product_supplier_id else {
                continue;
            };

            let removed = stock::reverse_receipt(&mut tx, link_id, item.quantity_received, now).await?;
            if removed == 0 {
                continue;
            }

            insert_movement(
                &mut tx,
                NewMovement {
                    product_id: &item.product_id,
                    user_id,
                    movement_type: MovementType::Out,
                    quantity: removed,
                    reference: Some(&order.po_number),
                    notes: Some(DELETE_NOTES),
                    created_at: now,
                },
            )
            .await?;
            reversed += removed;
        }

        delete_order_rows(&mut tx, &order.id).await?;
        tx.commit().await?;

        info!(po_number = %order.po_number, reversed = reversed, "Purchase order deleted");
        Ok(())
    }

    /// Moves every pending order past its due date to overdue. Returns how
    /// many orders changed.
    pub async fn refresh_overdue(&self, now: DateTime<Utc>) -> EngineResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for order in fetch_overdue_candidates(&mut tx, now).await? {
            let current = Balance::of_purchase(&order);
            if let Some(next) = mark_overdue(current, now) {
                check_transition(current.status, next.status)?;
                update_order_balance(&mut tx, &order.id, &next, now).await?;
                changed += 1;
            }
        }

        tx.commit().await?;

        if changed > 0 {
            info!(count = changed, "Purchase orders marked overdue");
        }
        Ok(changed)
    }

    async fn rehydrate(&self, order_id: &str) -> EngineResult<PurchaseOrderDetail> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_order_detail(&mut conn, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("PurchaseOrder", order_id))?)
    }
}

/// `PO-YYYYMMDD-NNNN` for `now`, stepping the suffix past taken numbers.
async fn allocate_po_number(conn: &mut SqliteConnection, now: DateTime<Utc>) -> EngineResult<String> {
    let mut number = po_number(now);
    let mut suffix = now.timestamp().rem_euclid(10000);

    while po_number_exists(&mut *conn, &number).await? {
        suffix += 1;
        number = po_number_with_suffix(now, suffix);
    }
    Ok(number)
}

/// Product of a purchase line, created from the line when its SKU is new.
async fn find_or_create_product(
    conn: &mut SqliteConnection,
    line: &PurchaseLineRequest,
    now: DateTime<Utc>,
) -> EngineResult<Product> {
    if let Some(product) = fetch_product_by_sku(&mut *conn, line.sku()).await? {
        return Ok(product);
    }

    let product = Product {
        id: new_id(),
        name: line.product_name().to_string(),
        sku: line.sku().to_string(),
        description: line.description().map(str::to_string),
        category: line.category().map(str::to_string),
        location: None,
        is_active: true,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    insert_product(&mut *conn, &product).await?;

    info!(sku = %product.sku, product_id = %product.id, "Product created from purchase line");
    Ok(product)
}

fn apply_balance(order: &mut PurchaseOrder, balance: &Balance) {
    order.amount_paid_cents = balance.amount_paid.cents();
    order.amount_due_cents = balance.amount_due.cents();
    order.payment_status = balance.status;
    order.due_date = balance.due_date;
    order.paid_date = balance.paid_date;
}

// =============================================================================
// Tests
// =============================================================================
