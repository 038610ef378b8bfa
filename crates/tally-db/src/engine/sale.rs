//! # Sale Transaction Engine
//!
//! Turns a cart into a committed sale, and undoes or settles it later.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CreateSaleRequest ──► validate ──► BEGIN                              │
//! │                                       │                                 │
//! │            for each line:             ▼                                 │
//! │            load product + lots ──► plan_deduction ──► guarded decrement │
//! │                                       │          └─► `out` movement     │
//! │                                       ▼                                 │
//! │                        subtotal, total, settlement                     │
//! │                                       │                                 │
//! │                                       ▼                                 │
//! │         sale + items + allocations (+ downpayment row) ──► COMMIT      │
//! │                                                                         │
//! │  Completed ──void──► Cancelled (stock restored, terminal)              │
//! │  Completed / Cancelled ──delete──► gone (stock restored once)          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failing line aborts the whole sale: no stock changes, no movements,
//! no sale row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::allocator::plan_deduction;
use tally_core::clock::SharedClock;
use tally_core::ledger::{
    apply_payment, check_transition, initial_sale_settlement, mark_overdue, Balance,
};
use tally_core::numbering::next_sale_number;
use tally_core::requests::{CreateSaleRequest, RecordPaymentRequest};
use tally_core::{
    new_id, CoreError, Money, MovementType, PaymentType, Sale, SaleDetail, SaleItem,
    SaleItemAllocation, SalePayment, SalePaymentMethod, SaleStatus, ValidationError,
};
use tracing::{debug, info, warn};

use crate::engine::stock;
use crate::error::{DbError, EngineResult};
use crate::repository::catalog::{fetch_product, load_product};
use crate::repository::movement::{insert_movement, NewMovement};
use crate::repository::sale::{
    delete_sale_rows, fetch_allocations, fetch_items, fetch_overdue_candidates, fetch_sale,
    insert_allocation, insert_item, insert_sale, insert_sale_payment, last_sale_number,
    load_sale_detail, sale_number_exists, set_sale_status, update_sale_balance, SaleRepository,
};
use crate::repository::user::require_user;

const VOID_NOTES: &str = "Sale void - stock restored";
const DELETE_NOTES: &str = "Sale deleted - stock restored";

/// A recorded instalment and the sale it settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalePaymentReceipt {
    pub sale: Sale,
    pub payment: SalePayment,
}

/// Sale transaction engine.
///
/// ## Usage
/// ```rust,ignore
/// let engine = db.sale_engine();
///
/// let sale = engine.create_sale(&request, &cashier.id).await?;
/// engine.record_payment(&sale.sale.id, &payment, &cashier.id).await?;
/// engine.void_sale(&sale.sale.id, &manager.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SaleEngine {
    pool: SqlitePool,
    clock: SharedClock,
}

impl SaleEngine {
    pub fn new(pool: SqlitePool, clock: SharedClock) -> Self {
        SaleEngine { pool, clock }
    }

    /// Read side of sales.
    pub fn reads(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    /// Gets a sale with user and items.
    pub async fn get_sale(&self, id: &str) -> EngineResult<Option<SaleDetail>> {
        Ok(self.reads().get_sale(id).await?)
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Creates and commits a sale.
    ///
    /// ## Errors
    /// - `InvalidPaymentMethod` / `InvalidPaymentTerm` / `Validation`
    /// - `UserNotFound`, `ProductNotFound`
    /// - `SupplierNotLinkedOrInactive`, `InsufficientStock` for a line
    /// - `Db(ConcurrentStockChange)` when a lot changed underneath the plan
    pub async fn create_sale(
        &self,
        request: &CreateSaleRequest,
        user_id: &str,
    ) -> EngineResult<SaleDetail> {
        let result = self.try_create_sale(request, user_id).await;
        if let Err(e) = &result {
            warn!(user_id = %user_id, error = %e, "Sale rejected");
        }
        result
    }

    async fn try_create_sale(
        &self,
        request: &CreateSaleRequest,
        user_id: &str,
    ) -> EngineResult<SaleDetail> {
        let terms = request.validate()?;
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;

        require_user(&mut tx, user_id).await?;
        let sale_number = allocate_sale_number(&mut tx).await?;
        let sale_id = new_id();

        debug!(sale_number = %sale_number, lines = request.items.len(), "Building sale");

        let mut items = Vec::with_capacity(request.items.len());
        let mut allocations = Vec::new();

        for (line_no, line) in request.items.iter().enumerate() {
            let product = load_product(&mut tx, &line.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;

            let plan = plan_deduction(&product, line.quantity, line.supplier_ref(), line.overrides())?;
            stock::apply_deduction(&mut tx, &plan, now).await?;

            let notes = plan.movement_notes();
            insert_movement(
                &mut tx,
                NewMovement {
                    product_id: &plan.product_id,
                    user_id,
                    movement_type: MovementType::Out,
                    quantity: plan.quantity,
                    reference: Some(&sale_number),
                    notes: Some(&notes),
                    created_at: now,
                },
            )
            .await?;

            let item = SaleItem {
                id: new_id(),
                sale_id: sale_id.clone(),
                product_id: plan.product_id.clone(),
                line_no: line_no as i64,
                quantity: plan.quantity,
                unit_price_cents: plan.unit_price.cents(),
                unit_cost_cents: plan.unit_cost.cents(),
                total_cents: plan.line_total().cents(),
                created_at: now,
            };

            allocations.extend(plan.lines.iter().map(|l| SaleItemAllocation {
                id: new_id(),
                sale_item_id: item.id.clone(),
                product_supplier_id: l.link_id.clone(),
                quantity: l.quantity,
            }));
            items.push(item);
        }

        let subtotal: Money = items.iter().map(SaleItem::line_total).sum();
        let total = subtotal + request.tax() - request.discount();
        if total.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "total".to_string(),
            }
            .into());
        }

        let balance = initial_sale_settlement(total, terms.term, request.down_payment(), now)?;

        let sale = Sale {
            id: sale_id,
            sale_number,
            user_id: user_id.to_string(),
            customer_name: request.customer_name().map(str::to_string),
            subtotal_cents: subtotal.cents(),
            tax_cents: request.tax_cents,
            discount_cents: request.discount_cents,
            total_cents: total.cents(),
            payment_method: terms.method,
            payment_term: terms.term,
            payment_status: balance.status,
            down_payment_cents: request.down_payment_cents,
            due_date: balance.due_date,
            paid_date: balance.paid_date,
            amount_paid_cents: balance.amount_paid.cents(),
            amount_due_cents: balance.amount_due.cents(),
            status: SaleStatus::Completed,
            created_at: now,
            updated_at: now,
        };

        insert_sale(&mut tx, &sale).await?;
        for item in &items {
            insert_item(&mut tx, item).await?;
        }
        for allocation in &allocations {
            insert_allocation(&mut tx, allocation).await?;
        }

        if terms.method == SalePaymentMethod::Credit && request.down_payment().is_positive() {
            insert_sale_payment(
                &mut tx,
                &SalePayment {
                    id: new_id(),
                    sale_id: sale.id.clone(),
                    user_id: user_id.to_string(),
                    amount_cents: balance.amount_paid.cents(),
                    payment_method: terms.method,
                    payment_type: PaymentType::Downpayment,
                    notes: Some(format!("Down payment for sale {}", sale.sale_number)),
                    created_at: now,
                },
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            sale_number = %sale.sale_number,
            total = %total,
            payment_status = %sale.payment_status,
            "Sale committed"
        );

        self.rehydrate(&sale.id).await
    }

    // =========================================================================
    // Void / Delete
    // =========================================================================

    /// Cancels a sale and puts its stock back into the lots it came from.
    ///
    /// ## Errors
    /// - `SaleNotFound`
    /// - `AlreadyCancelled` when the sale was voided before
    pub async fn void_sale(&self, sale_id: &str, user_id: &str) -> EngineResult<SaleDetail> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        require_user(&mut tx, user_id).await?;
        let sale = fetch_sale(&mut tx, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

        if sale.is_cancelled() {
            warn!(sale_number = %sale.sale_number, "Void rejected: already cancelled");
            return Err(CoreError::AlreadyCancelled(sale.sale_number).into());
        }

        let restored = restore_sale_stock(&mut tx, &sale, user_id, VOID_NOTES, now).await?;
        set_sale_status(&mut tx, &sale.id, SaleStatus::Cancelled, now).await?;

        tx.commit().await?;

        info!(sale_number = %sale.sale_number, restored = restored, "Sale voided");
        self.rehydrate(&sale.id).await
    }

    /// Deletes a sale with its items, allocations and payments. Stock is
    /// restored unless the sale was already voided.
    pub async fn delete_sale(&self, sale_id: &str, user_id: &str) -> EngineResult<()> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        require_user(&mut tx, user_id).await?;
        let sale = fetch_sale(&mut tx, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

        let restored = if sale.is_cancelled() {
            0
        } else {
            restore_sale_stock(&mut tx, &sale, user_id, DELETE_NOTES, now).await?
        };

        delete_sale_rows(&mut tx, &sale.id).await?;
        tx.commit().await?;

        info!(sale_number = %sale.sale_number, restored = restored, "Sale deleted");
        Ok(())
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Records an instalment against a sale's outstanding balance.
    ///
    /// ## Errors
    /// - `InvalidPaymentMethod`, `Validation` (amount not positive)
    /// - `SaleNotFound`, `AlreadyCancelled`
    /// - `AmountExceedsDue`
    pub async fn record_payment(
        &self,
        sale_id: &str,
        request: &RecordPaymentRequest,
        user_id: &str,
    ) -> EngineResult<SalePaymentReceipt> {
        let method = request.validate_for_sale()?;
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;

        require_user(&mut tx, user_id).await?;
        let sale = fetch_sale(&mut tx, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

        if sale.is_cancelled() {
            return Err(CoreError::AlreadyCancelled(sale.sale_number).into());
        }

        let balance = apply_payment(Balance::of_sale(&sale), request.amount(), now).map_err(|e| {
            warn!(sale_number = %sale.sale_number, error = %e, "Payment rejected");
            e
        })?;
        update_sale_balance(&mut tx, &sale.id, &balance, now).await?;

        let payment = SalePayment {
            id: new_id(),
            sale_id: sale.id.clone(),
            user_id: user_id.to_string(),
            amount_cents: request.amount_cents,
            payment_method: method,
            payment_type: PaymentType::Payment,
            notes: request.notes().map(str::to_string),
            created_at: now,
        };
        insert_sale_payment(&mut tx, &payment).await?;

        let sale = fetch_sale(&mut tx, &sale.id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?;

        tx.commit().await?;

        info!(
            sale_number = %sale.sale_number,
            amount = %request.amount(),
            amount_due = sale.amount_due_cents,
            payment_status = %sale.payment_status,
            "Sale payment recorded"
        );

        Ok(SalePaymentReceipt { sale, payment })
    }

    /// Moves every pending sale past its due date to overdue. Returns how
    /// many sales changed.
    pub async fn refresh_overdue(&self, now: DateTime<Utc>) -> EngineResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for sale in fetch_overdue_candidates(&mut tx, now).await? {
            let current = Balance::of_sale(&sale);
            if let Some(next) = mark_overdue(current, now) {
                check_transition(current.status, next.status)?;
                update_sale_balance(&mut tx, &sale.id, &next, now).await?;
                changed += 1;
            }
        }

        tx.commit().await?;

        if changed > 0 {
            info!(count = changed, "Sales marked overdue");
        }
        Ok(changed)
    }

    async fn rehydrate(&self, sale_id: &str) -> EngineResult<SaleDetail> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_sale_detail(&mut conn, sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?)
    }
}

/// Next free sale number after the most recent one.
async fn allocate_sale_number(conn: &mut SqliteConnection) -> EngineResult<String> {
    let mut number = next_sale_number(last_sale_number(&mut *conn).await?.as_deref());
    while sale_number_exists(&mut *conn, &number).await? {
        number = next_sale_number(Some(&number));
    }
    Ok(number)
}

/// Restores the stock of every item whose product still exists and writes
/// one `in` movement per item. Returns the units restored.
async fn restore_sale_stock(
    conn: &mut SqliteConnection,
    sale: &Sale,
    user_id: &str,
    notes: &str,
    now: DateTime<Utc>,
) -> EngineResult<i64> {
    let mut total = 0;

    for item in fetch_items(&mut *conn, &sale.id).await? {
        if fetch_product(&mut *conn, &item.product_id).await?.is_none() {
            debug!(product_id = %item.product_id, "Product gone, skipping restore");
            continue;
        }

        let allocations = fetch_allocations(&mut *conn, &item.id).await?;
        let restored = stock::restore_allocations(&mut *conn, &allocations, now).await?;
        if restored == 0 {
            continue;
        }

        insert_movement(
            &mut *conn,
            NewMovement {
                product_id: &item.product_id,
                user_id,
                movement_type: MovementType::In,
                quantity: restored,
                reference: Some(&sale.sale_number),
                notes: Some(notes),
                created_at: now,
            },
        )
        .await?;
        total += restored;
    }

    Ok(total)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{cashier, lot, noon, product, stock_of, supplier, test_db};
    use crate::error::EngineError;
    use crate::pool::Database;
    use chrono::Duration;
    use tally_core::requests::{MovementFilter, SaleFilter, SaleLineRequest};
    use tally_core::{PaymentStatus, ProductSupplier, User};

    /// Widget with two lots: Acme (5 @ $10.00, cost $6.00) then
    /// Bolt (3 @ $8.00, cost $5.00).
    struct Shelf {
        db: Database,
        user: User,
        product_id: String,
        acme: ProductSupplier,
        bolt: ProductSupplier,
    }

    async fn shelf() -> Shelf {
        let db = test_db().await;
        let user = cashier(&db).await;
        let widget = product(&db, "Widget", "WID-1").await;
        let acme = supplier(&db, "Acme").await;
        let bolt = supplier(&db, "Bolt").await;
        let acme = lot(&db, &widget, &acme, 600, 1000, 5).await;
        let bolt = lot(&db, &widget, &bolt, 500, 800, 3).await;

        Shelf {
            db,
            user,
            product_id: widget.id,
            acme,
            bolt,
        }
    }

    fn line(product_id: &str, quantity: i64) -> SaleLineRequest {
        SaleLineRequest {
            product_id: product_id.to_string(),
            quantity,
            supplier_id: None,
            price_cents: None,
            cost_cents: None,
        }
    }

    fn cart(items: Vec<SaleLineRequest>, method: &str) -> CreateSaleRequest {
        CreateSaleRequest {
            items,
            customer_name: None,
            payment_method: method.to_string(),
            payment_term: None,
            tax_cents: 0,
            discount_cents: 0,
            down_payment_cents: 0,
        }
    }

    fn pay(cents: i64) -> RecordPaymentRequest {
        RecordPaymentRequest {
            amount_cents: cents,
            payment_method: "cash".to_string(),
            notes: None,
        }
    }

    async fn movement_count(db: &Database) -> i64 {
        db.movements()
            .list_movements(&MovementFilter::default())
            .await
            .unwrap()
            .total
    }

    #[tokio::test]
    async fn test_legacy_sale_draws_lots_in_order() {
        let s = shelf().await;

        let sale = s
            .db
            .sale_engine()
            .create_sale(&cart(vec![line(&s.product_id, 7)], "cash"), &s.user.id)
            .await
            .unwrap();

        assert_eq!(stock_of(&s.db, &s.acme).await, 0);
        assert_eq!(stock_of(&s.db, &s.bolt).await, 1);

        let item = &sale.items[0];
        assert_eq!(item.item.unit_price_cents, 800);
        assert_eq!(item.item.unit_cost_cents, 500);
        let drawn: Vec<(String, i64)> = item
            .allocations
            .iter()
            .map(|a| (a.product_supplier_id.clone(), a.quantity))
            .collect();
        assert_eq!(drawn, vec![(s.acme.id.clone(), 5), (s.bolt.id.clone(), 2)]);

        assert_eq!(sale.sale.subtotal_cents, 5600);
        assert_eq!(sale.items_total(), Money::from_cents(sale.sale.subtotal_cents));
        assert_eq!(sale.sale.payment_status, PaymentStatus::Paid);
        assert_eq!(sale.sale.amount_due_cents, 0);
        assert_eq!(sale.sale.paid_date, Some(noon()));
        assert_eq!(sale.sale.sale_number, "A-0001");
    }

    #[tokio::test]
    async fn test_explicit_supplier_sale() {
        let s = shelf().await;
        let mut request = cart(vec![line(&s.product_id, 3)], "card");
        request.items[0].supplier_id = Some(s.bolt.supplier_id.clone());

        let sale = s
            .db
            .sale_engine()
            .create_sale(&request, &s.user.id)
            .await
            .unwrap();

        assert_eq!(stock_of(&s.db, &s.acme).await, 5);
        assert_eq!(stock_of(&s.db, &s.bolt).await, 0);
        assert_eq!(sale.items[0].item.unit_price_cents, 800);
        assert_eq!(sale.sale.total_cents, 2400);

        let movements = s
            .db
            .movements()
            .movements_for_reference(&sale.sale.sale_number)
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::Out);
        assert_eq!(movements[0].quantity, 3);
        assert_eq!(movements[0].created_at, noon());
        assert_eq!(
            movements[0].notes.as_deref(),
            Some("Sale transaction - Supplier: Bolt")
        );

        let lot = s.db.catalog().get_link(&s.bolt.id).await.unwrap().unwrap();
        assert_eq!(lot.updated_at, noon());
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_lots_untouched() {
        let s = shelf().await;

        let err = s
            .db
            .sale_engine()
            .create_sale(&cart(vec![line(&s.product_id, 10)], "cash"), &s.user.id)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock {
                available: 8,
                requested: 10,
                ..
            })
        ));
        assert_eq!(stock_of(&s.db, &s.acme).await, 5);
        assert_eq!(stock_of(&s.db, &s.bolt).await, 3);
        assert_eq!(movement_count(&s.db).await, 0);
    }

    #[tokio::test]
    async fn test_failing_line_rolls_back_whole_sale() {
        let s = shelf().await;
        let request = cart(
            vec![
                line(&s.product_id, 2),
                line("no-such-product", 1),
                line(&s.product_id, 1),
            ],
            "cash",
        );

        let err = s
            .db
            .sale_engine()
            .create_sale(&request, &s.user.id)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Core(CoreError::ProductNotFound(_))));
        assert_eq!(stock_of(&s.db, &s.acme).await, 5);
        assert_eq!(stock_of(&s.db, &s.bolt).await, 3);
        assert_eq!(movement_count(&s.db).await, 0);

        let sales = s.db.sales().list_sales(&SaleFilter::default()).await.unwrap();
        assert_eq!(sales.total, 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_rejected() {
        let s = shelf().await;

        let err = s
            .db
            .sale_engine()
            .create_sale(&cart(vec![line(&s.product_id, 1)], "cash"), "ghost")
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Core(CoreError::UserNotFound(_))));
        assert_eq!(stock_of(&s.db, &s.acme).await, 5);
    }

    #[tokio::test]
    async fn test_credit_sale_with_down_payment_then_settled() {
        let s = shelf().await;
        let engine = s.db.sale_engine();
        let mut request = cart(vec![line(&s.product_id, 2)], "credit");
        request.down_payment_cents = 600;

        let sale = engine.create_sale(&request, &s.user.id).await.unwrap().sale;

        assert_eq!(sale.total_cents, 1600);
        assert_eq!(sale.amount_paid_cents, 600);
        assert_eq!(sale.amount_due_cents, 1000);
        assert_eq!(sale.payment_status, PaymentStatus::Pending);
        assert_eq!(sale.due_date, Some(noon() + Duration::days(30)));
        assert_eq!(sale.paid_date, None);

        let payments = s.db.sales().sale_payments(&sale.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payment_type, PaymentType::Downpayment);
        assert_eq!(payments[0].amount_cents, 600);

        let err = engine.record_payment(&sale.id, &pay(1001), &s.user.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::AmountExceedsDue { .. })));

        let receipt = engine.record_payment(&sale.id, &pay(400), &s.user.id).await.unwrap();
        assert_eq!(receipt.sale.amount_due_cents, 600);
        assert_eq!(receipt.sale.payment_status, PaymentStatus::Pending);

        let receipt = engine.record_payment(&sale.id, &pay(600), &s.user.id).await.unwrap();
        let settled = receipt.sale;
        assert_eq!(settled.amount_due_cents, 0);
        assert_eq!(settled.payment_status, PaymentStatus::Paid);
        assert_eq!(settled.paid_date, Some(noon()));
        assert_eq!(
            settled.amount_paid_cents + settled.amount_due_cents,
            settled.total_cents
        );

        let payments = s.db.sales().sale_payments(&sale.id).await.unwrap();
        assert_eq!(payments.len(), 3);
        let paid: i64 = payments.iter().map(|p| p.amount_cents).sum();
        assert_eq!(paid, settled.amount_paid_cents);
    }

    #[tokio::test]
    async fn test_down_payment_covering_total_settles_sale() {
        let s = shelf().await;
        let mut request = cart(vec![line(&s.product_id, 2)], "credit");
        request.down_payment_cents = 1600;

        let sale = s
            .db
            .sale_engine()
            .create_sale(&request, &s.user.id)
            .await
            .unwrap()
            .sale;

        assert_eq!(sale.payment_status, PaymentStatus::Paid);
        assert_eq!(sale.amount_due_cents, 0);
        assert_eq!(sale.paid_date, Some(noon()));
    }

    #[tokio::test]
    async fn test_down_payment_above_total_settles_at_total() {
        let s = shelf().await;
        let mut request = cart(vec![line(&s.product_id, 1)], "credit");
        request.down_payment_cents = 1000;

        let sale = s
            .db
            .sale_engine()
            .create_sale(&request, &s.user.id)
            .await
            .unwrap()
            .sale;

        assert_eq!(sale.total_cents, 800);
        assert_eq!(sale.payment_status, PaymentStatus::Paid);
        assert_eq!(sale.paid_date, Some(noon()));
        assert_eq!(sale.amount_paid_cents, 800);
        assert_eq!(sale.amount_due_cents, 0);
        assert_eq!(sale.down_payment_cents, 1000);

        let payments = s.db.sales().sale_payments(&sale.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount_cents, 800);
        assert_eq!(stock_of(&s.db, &s.acme).await, 4);
    }

    #[tokio::test]
    async fn test_void_restores_original_lots() {
        let s = shelf().await;
        let engine = s.db.sale_engine();
        let sale = engine
            .create_sale(&cart(vec![line(&s.product_id, 7)], "cash"), &s.user.id)
            .await
            .unwrap();

        let voided = engine.void_sale(&sale.sale.id, &s.user.id).await.unwrap();

        assert_eq!(voided.sale.status, SaleStatus::Cancelled);
        assert_eq!(stock_of(&s.db, &s.acme).await, 5);
        assert_eq!(stock_of(&s.db, &s.bolt).await, 3);

        let movements = s
            .db
            .movements()
            .movements_for_reference(&sale.sale.sale_number)
            .await
            .unwrap();
        let restore = movements.last().unwrap();
        assert_eq!(restore.movement_type, MovementType::In);
        assert_eq!(restore.quantity, 7);
        assert_eq!(restore.notes.as_deref(), Some(VOID_NOTES));

        let err = engine.void_sale(&sale.sale.id, &s.user.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::AlreadyCancelled(_))));

        let err = engine
            .record_payment(&sale.sale.id, &pay(100), &s.user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::AlreadyCancelled(_))));
    }

    #[tokio::test]
    async fn test_delete_after_void_restores_only_once() {
        let s = shelf().await;
        let engine = s.db.sale_engine();
        let sale = engine
            .create_sale(&cart(vec![line(&s.product_id, 4)], "cash"), &s.user.id)
            .await
            .unwrap();

        engine.void_sale(&sale.sale.id, &s.user.id).await.unwrap();
        engine.delete_sale(&sale.sale.id, &s.user.id).await.unwrap();

        assert_eq!(stock_of(&s.db, &s.acme).await, 5);
        assert_eq!(stock_of(&s.db, &s.bolt).await, 3);
        assert!(engine.get_sale(&sale.sale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_restores_stock_and_payments() {
        let s = shelf().await;
        let engine = s.db.sale_engine();
        let mut request = cart(vec![line(&s.product_id, 6)], "credit");
        request.down_payment_cents = 100;
        let sale = engine.create_sale(&request, &s.user.id).await.unwrap();

        engine.delete_sale(&sale.sale.id, &s.user.id).await.unwrap();

        assert_eq!(stock_of(&s.db, &s.acme).await, 5);
        assert_eq!(stock_of(&s.db, &s.bolt).await, 3);
        assert!(s.db.sales().sale_payments(&sale.sale.id).await.unwrap().is_empty());

        let err = engine.delete_sale(&sale.sale.id, &s.user.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::SaleNotFound(_))));
    }

    #[tokio::test]
    async fn test_negative_total_is_rejected() {
        let s = shelf().await;
        let mut request = cart(vec![line(&s.product_id, 1)], "cash");
        request.discount_cents = 5000;

        let err = s
            .db
            .sale_engine()
            .create_sale(&request, &s.user.id)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
        assert_eq!(stock_of(&s.db, &s.acme).await, 5);
    }

    #[tokio::test]
    async fn test_sale_numbers_follow_each_other() {
        let s = shelf().await;
        let engine = s.db.sale_engine();

        let first = engine
            .create_sale(&cart(vec![line(&s.product_id, 1)], "cash"), &s.user.id)
            .await
            .unwrap();
        let second = engine
            .create_sale(&cart(vec![line(&s.product_id, 1)], "cash"), &s.user.id)
            .await
            .unwrap();

        assert_eq!(first.sale.sale_number, "A-0001");
        assert_eq!(second.sale.sale_number, "A-0002");
    }

    #[tokio::test]
    async fn test_refresh_overdue_marks_past_due_credit_sales() {
        let s = shelf().await;
        let engine = s.db.sale_engine();
        let credit = engine
            .create_sale(&cart(vec![line(&s.product_id, 1)], "credit"), &s.user.id)
            .await
            .unwrap();
        engine
            .create_sale(&cart(vec![line(&s.product_id, 1)], "cash"), &s.user.id)
            .await
            .unwrap();

        assert_eq!(engine.refresh_overdue(noon() + Duration::days(29)).await.unwrap(), 0);

        let later = noon() + Duration::days(31);
        assert_eq!(engine.refresh_overdue(later).await.unwrap(), 1);
        assert_eq!(engine.refresh_overdue(later).await.unwrap(), 0);

        let sale = engine.get_sale(&credit.sale.id).await.unwrap().unwrap();
        assert_eq!(sale.sale.payment_status, PaymentStatus::Overdue);

        let overdue = s.db.sales().overdue_sales(later).await.unwrap();
        assert_eq!(overdue.len(), 1);
    }
}
