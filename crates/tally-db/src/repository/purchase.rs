//! # Purchase Order Repository
//!
//! Row-level access to purchase orders, their received items and payments.
//! Writes are free functions for the purchase engine's transaction;
//! [`PurchaseRepository`] serves reads and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::ledger::{Balance, TOLERANCE};
use tally_core::requests::{DateRange, Page};
use tally_core::{
    CoreError, PurchaseOrder, PurchaseOrderDetail, PurchaseOrderItem, PurchaseOrderItemDetail,
    PurchasePayment,
};
use tracing::debug;
use ts_rs::TS;

use crate::error::{DbError, DbResult, EngineResult};
use crate::repository::catalog::{fetch_link, fetch_product, fetch_supplier};
use crate::repository::user::fetch_user;
use crate::repository::Paged;

// =============================================================================
// Writes
// =============================================================================

/// Inserts the order header.
pub async fn insert_order(conn: &mut SqliteConnection, order: &PurchaseOrder) -> DbResult<()> {
    debug!(po_number = %order.po_number, total = order.total_cents, "Inserting purchase order");

    sqlx::query(
        r#"
        INSERT INTO purchase_orders (
            id, po_number, supplier_id, user_id, payment_method, payment_days,
            payment_status, total_cents, down_payment_cents, amount_paid_cents,
            amount_due_cents, due_date, paid_date, order_date, received_date,
            notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
        "#,
    )
    .bind(&order.id)
    .bind(&order.po_number)
    .bind(&order.supplier_id)
    .bind(&order.user_id)
    .bind(order.payment_method)
    .bind(order.payment_days)
    .bind(order.payment_status)
    .bind(order.total_cents)
    .bind(order.down_payment_cents)
    .bind(order.amount_paid_cents)
    .bind(order.amount_due_cents)
    .bind(order.due_date)
    .bind(order.paid_date)
    .bind(order.order_date)
    .bind(order.received_date)
    .bind(&order.notes)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Rewrites every mutable column of an order.
pub async fn update_order(conn: &mut SqliteConnection, order: &PurchaseOrder) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE purchase_orders SET
            supplier_id = ?2,
            payment_method = ?3,
            payment_days = ?4,
            payment_status = ?5,
            total_cents = ?6,
            down_payment_cents = ?7,
            amount_paid_cents = ?8,
            amount_due_cents = ?9,
            due_date = ?10,
            paid_date = ?11,
            notes = ?12,
            updated_at = ?13
        WHERE id = ?1
        "#,
    )
    .bind(&order.id)
    .bind(&order.supplier_id)
    .bind(order.payment_method)
    .bind(order.payment_days)
    .bind(order.payment_status)
    .bind(order.total_cents)
    .bind(order.down_payment_cents)
    .bind(order.amount_paid_cents)
    .bind(order.amount_due_cents)
    .bind(order.due_date)
    .bind(order.paid_date)
    .bind(&order.notes)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("PurchaseOrder", &order.id));
    }

    Ok(())
}

/// Writes the payment fields of an order.
pub async fn update_order_balance(
    conn: &mut SqliteConnection,
    order_id: &str,
    balance: &Balance,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE purchase_orders SET
            amount_paid_cents = ?2,
            amount_due_cents = ?3,
            payment_status = ?4,
            due_date = ?5,
            paid_date = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(order_id)
    .bind(balance.amount_paid.cents())
    .bind(balance.amount_due.cents())
    .bind(balance.status)
    .bind(balance.due_date)
    .bind(balance.paid_date)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("PurchaseOrder", order_id));
    }

    Ok(())
}

/// Inserts a received line.
pub async fn insert_order_item(
    conn: &mut SqliteConnection,
    item: &PurchaseOrderItem,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO purchase_order_items (
            id, purchase_order_id, product_id, product_supplier_id, line_no,
            quantity_ordered, quantity_received, unit_cost_cents, total_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&item.id)
    .bind(&item.purchase_order_id)
    .bind(&item.product_id)
    .bind(&item.product_supplier_id)
    .bind(item.line_no)
    .bind(item.quantity_ordered)
    .bind(item.quantity_received)
    .bind(item.unit_cost_cents)
    .bind(item.total_cents)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Appends a payment row.
pub async fn insert_purchase_payment(
    conn: &mut SqliteConnection,
    payment: &PurchasePayment,
) -> DbResult<()> {
    debug!(
        purchase_order_id = %payment.purchase_order_id,
        amount = payment.amount_cents,
        payment_type = %payment.payment_type,
        "Recording purchase payment"
    );

    sqlx::query(
        r#"
        INSERT INTO purchase_payments (
            id, purchase_order_id, user_id, amount_cents, payment_method,
            payment_type, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.purchase_order_id)
    .bind(&payment.user_id)
    .bind(payment.amount_cents)
    .bind(&payment.payment_method)
    .bind(payment.payment_type)
    .bind(&payment.notes)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Removes an order with its items and payments.
pub async fn delete_order_rows(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    debug!(purchase_order_id = %order_id, "Deleting purchase order rows");

    sqlx::query("DELETE FROM purchase_order_items WHERE purchase_order_id = ?1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM purchase_payments WHERE purchase_order_id = ?1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query("DELETE FROM purchase_orders WHERE id = ?1")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("PurchaseOrder", order_id));
    }

    Ok(())
}

// =============================================================================
// Reads
// =============================================================================

/// True when `po_number` is already used.
pub async fn po_number_exists(conn: &mut SqliteConnection, po_number: &str) -> DbResult<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM purchase_orders WHERE po_number = ?1")
            .bind(po_number)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(found.is_some())
}

/// Loads an order header.
pub async fn fetch_order(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<PurchaseOrder>> {
    let order = sqlx::query_as::<_, PurchaseOrder>("SELECT * FROM purchase_orders WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(order)
}

/// Items of an order in request order.
pub async fn fetch_order_items(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<PurchaseOrderItem>> {
    let items = sqlx::query_as::<_, PurchaseOrderItem>(
        "SELECT * FROM purchase_order_items WHERE purchase_order_id = ?1 ORDER BY line_no",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// Loads an order with supplier, user and items (each with product and lot).
pub async fn load_order_detail(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<PurchaseOrderDetail>> {
    let Some(order) = fetch_order(&mut *conn, id).await? else {
        return Ok(None);
    };
    Ok(Some(hydrate(conn, order).await?))
}

async fn hydrate(conn: &mut SqliteConnection, order: PurchaseOrder) -> DbResult<PurchaseOrderDetail> {
    let supplier = fetch_supplier(&mut *conn, &order.supplier_id).await?;
    let user = fetch_user(&mut *conn, &order.user_id).await?;

    let mut items = Vec::new();
    for item in fetch_order_items(&mut *conn, &order.id).await? {
        let product = fetch_product(&mut *conn, &item.product_id).await?;
        let product_supplier = match &item.product_supplier_id {
            Some(link_id) => fetch_link(&mut *conn, link_id).await?,
            None => None,
        };
        items.push(PurchaseOrderItemDetail {
            item,
            product,
            product_supplier,
        });
    }

    Ok(PurchaseOrderDetail {
        order,
        supplier,
        user,
        items,
    })
}

/// Orders still marked pending whose due date has passed.
pub async fn fetch_overdue_candidates(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> DbResult<Vec<PurchaseOrder>> {
    let orders = sqlx::query_as::<_, PurchaseOrder>(
        r#"
        SELECT * FROM purchase_orders
        WHERE payment_status = 'pending'
          AND amount_due_cents > ?1
          AND due_date IS NOT NULL AND due_date < ?2
        ORDER BY due_date
        "#,
    )
    .bind(TOLERANCE.cents())
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;

    Ok(orders)
}

// =============================================================================
// Report DTOs
// =============================================================================

/// Payment history of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentHistory {
    pub payments: Vec<PurchasePayment>,
    pub total_payments: i64,
    /// Signed sum of the rows; down payment reductions count negative.
    pub total_paid_cents: i64,
    pub remaining_due_cents: i64,
}

/// Headline numbers for orders created in a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseSummary {
    pub total_orders: i64,
    pub total_amount_cents: i64,
    pub pending_cents: i64,
    pub overdue_cents: i64,
}

// =============================================================================
// Repository
// =============================================================================

/// Read side of purchase orders.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Gets an order with supplier, user and items.
    pub async fn get_purchase_order(&self, id: &str) -> DbResult<Option<PurchaseOrderDetail>> {
        let mut conn = self.pool.acquire().await?;
        load_order_detail(&mut conn, id).await
    }

    /// Lists orders, newest order date first.
    pub async fn list_purchase_orders(&self, page: Page) -> EngineResult<Paged<PurchaseOrderDetail>> {
        page.validate()?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchase_orders")
            .fetch_one(&self.pool)
            .await?;

        let orders = sqlx::query_as::<_, PurchaseOrder>(
            "SELECT * FROM purchase_orders ORDER BY order_date DESC, rowid DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let mut items = Vec::with_capacity(orders.len());
        for order in orders {
            items.push(hydrate(&mut conn, order).await?);
        }

        Ok(Paged::new(items, total, page))
    }

    /// Open orders that are overdue at `now`, earliest due first.
    pub async fn overdue_purchase_orders(
        &self,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<PurchaseOrderDetail>> {
        let orders = sqlx::query_as::<_, PurchaseOrder>(
            r#"
            SELECT * FROM purchase_orders
            WHERE payment_status = 'overdue'
               OR (payment_status = 'pending' AND due_date IS NOT NULL AND due_date < ?1)
            ORDER BY due_date
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            out.push(hydrate(&mut conn, order).await?);
        }
        Ok(out)
    }

    /// Payment rows of an order, newest first, with totals.
    pub async fn purchase_payments(&self, order_id: &str) -> EngineResult<PaymentHistory> {
        let mut conn = self.pool.acquire().await?;
        let order = fetch_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| CoreError::PurchaseOrderNotFound(order_id.to_string()))?;

        let payments = sqlx::query_as::<_, PurchasePayment>(
            r#"
            SELECT * FROM purchase_payments
            WHERE purchase_order_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(PaymentHistory {
            total_payments: payments.len() as i64,
            total_paid_cents: payments.iter().map(|p| p.amount_cents).sum(),
            remaining_due_cents: order.amount_due_cents,
            payments,
        })
    }

    /// Totals for orders created in `range`. Overdue is judged at `now`.
    pub async fn purchase_summary(
        &self,
        range: DateRange,
        now: DateTime<Utc>,
    ) -> DbResult<PurchaseSummary> {
        let (total_orders, total_amount_cents, pending_cents, overdue_cents): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(total_cents), 0),
                    COALESCE(SUM(CASE WHEN amount_due_cents > 0 THEN amount_due_cents ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN amount_due_cents > 0 AND due_date IS NOT NULL AND due_date < ?3
                                      THEN amount_due_cents ELSE 0 END), 0)
                FROM purchase_orders
                WHERE created_at >= ?1 AND created_at < ?2
                "#,
            )
            .bind(range.from)
            .bind(range.to)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(PurchaseSummary {
            total_orders,
            total_amount_cents,
            pending_cents,
            overdue_cents,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{cashier, noon, supplier, test_db};
    use crate::error::EngineError;
    use chrono::Duration;
    use tally_core::requests::{CreatePurchaseOrderRequest, PurchaseLineRequest};

    #[tokio::test]
    async fn test_summary_and_listing() {
        let db = test_db().await;
        let user = cashier(&db).await;
        let acme = supplier(&db, "Acme").await;

        for (method, cost) in [("cash", 300), ("credit", 500)] {
            db.purchase_engine()
                .create_purchase_order(
                    &CreatePurchaseOrderRequest {
                        supplier_id: acme.id.clone(),
                        payment_method: Some(method.to_string()),
                        payment_days: Some(15),
                        payment_term: None,
                        down_payment_cents: 0,
                        notes: None,
                        order_date: "2024-03-01".to_string(),
                        items: vec![PurchaseLineRequest {
                            sku: "RICE-5".to_string(),
                            product_name: Some("Rice 5kg".to_string()),
                            category: Some("Grocery".to_string()),
                            description: None,
                            quantity: 10,
                            unit_cost_cents: cost,
                            product_supplier_id: None,
                        }],
                    },
                    &user.id,
                )
                .await
                .unwrap();
        }

        let march = DateRange::from_dates("2024-03-01", "2024-03-31").unwrap();
        let summary = db.purchases().purchase_summary(march, noon()).await.unwrap();
        assert_eq!(summary.total_orders, 2);
        assert_eq!(summary.total_amount_cents, 8000);
        assert_eq!(summary.pending_cents, 5000);
        assert_eq!(summary.overdue_cents, 0);

        let later = db
            .purchases()
            .purchase_summary(march, noon() + Duration::days(20))
            .await
            .unwrap();
        assert_eq!(later.overdue_cents, 5000);

        let page = db.purchases().list_purchase_orders(Page::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page
            .items
            .iter()
            .all(|o| o.supplier.as_ref().map(|s| s.name.as_str()) == Some("Acme")));

        let err = db.purchases().purchase_payments("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::PurchaseOrderNotFound(_))));
    }
}
