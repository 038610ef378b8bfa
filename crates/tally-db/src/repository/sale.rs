//! # Sale Repository
//!
//! Row-level access to sales, their items, lot allocations and payments,
//! plus the sale reports.
//!
//! ## Rows Written by One Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  sales ─────────────┬── sale_items (line 0) ── sale_item_allocations  │
//! │  A-0042             │                            lot A x5, lot B x2    │
//! │  total $56.00       ├── sale_items (line 1) ── sale_item_allocations  │
//! │                     │                            lot C x1              │
//! │                     └── sale_payments (downpayment, credit only)       │
//! │                                                                         │
//! │  All inserted by the sale engine inside one transaction.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes are free functions over `&mut SqliteConnection` so the engine can
//! run them on its transaction. [`SaleRepository`] serves reads and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tally_core::ledger::{Balance, TOLERANCE};
use tally_core::requests::{DateRange, SaleFilter};
use tally_core::{
    Sale, SaleDetail, SaleItem, SaleItemAllocation, SaleItemDetail, SalePayment,
    SalePaymentMethod, SaleStatus,
};
use tracing::debug;
use ts_rs::TS;

use crate::error::{DbError, DbResult, EngineResult};
use crate::repository::catalog::fetch_product;
use crate::repository::user::fetch_user;
use crate::repository::Paged;

// =============================================================================
// Writes
// =============================================================================

/// Inserts the sale header.
pub async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(sale_number = %sale.sale_number, total = sale.total_cents, "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, sale_number, user_id, customer_name,
            subtotal_cents, tax_cents, discount_cents, total_cents,
            payment_method, payment_term, payment_status, down_payment_cents,
            due_date, paid_date, amount_paid_cents, amount_due_cents,
            status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.sale_number)
    .bind(&sale.user_id)
    .bind(&sale.customer_name)
    .bind(sale.subtotal_cents)
    .bind(sale.tax_cents)
    .bind(sale.discount_cents)
    .bind(sale.total_cents)
    .bind(sale.payment_method)
    .bind(sale.payment_term)
    .bind(sale.payment_status)
    .bind(sale.down_payment_cents)
    .bind(sale.due_date)
    .bind(sale.paid_date)
    .bind(sale.amount_paid_cents)
    .bind(sale.amount_due_cents)
    .bind(sale.status)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts a sale item.
pub async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, product_id, line_no, quantity,
            unit_price_cents, unit_cost_cents, total_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(item.line_no)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.unit_cost_cents)
    .bind(item.total_cents)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Records how many units of an item came from one lot.
pub async fn insert_allocation(
    conn: &mut SqliteConnection,
    allocation: &SaleItemAllocation,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_item_allocations (id, sale_item_id, product_supplier_id, quantity)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&allocation.id)
    .bind(&allocation.sale_item_id)
    .bind(&allocation.product_supplier_id)
    .bind(allocation.quantity)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Appends a payment row.
pub async fn insert_sale_payment(conn: &mut SqliteConnection, payment: &SalePayment) -> DbResult<()> {
    debug!(
        sale_id = %payment.sale_id,
        amount = payment.amount_cents,
        payment_type = %payment.payment_type,
        "Recording sale payment"
    );

    sqlx::query(
        r#"
        INSERT INTO sale_payments (
            id, sale_id, user_id, amount_cents, payment_method, payment_type, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.sale_id)
    .bind(&payment.user_id)
    .bind(payment.amount_cents)
    .bind(payment.payment_method)
    .bind(payment.payment_type)
    .bind(&payment.notes)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes the payment fields of a sale.
pub async fn update_sale_balance(
    conn: &mut SqliteConnection,
    sale_id: &str,
    balance: &Balance,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE sales SET
            amount_paid_cents = ?2,
            amount_due_cents = ?3,
            payment_status = ?4,
            due_date = ?5,
            paid_date = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(sale_id)
    .bind(balance.amount_paid.cents())
    .bind(balance.amount_due.cents())
    .bind(balance.status)
    .bind(balance.due_date)
    .bind(balance.paid_date)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", sale_id));
    }

    Ok(())
}

/// Sets the lifecycle status of a sale.
pub async fn set_sale_status(
    conn: &mut SqliteConnection,
    sale_id: &str,
    status: SaleStatus,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE sales SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(sale_id)
        .bind(status)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", sale_id));
    }

    Ok(())
}

/// Removes a sale and everything hanging off it, children first.
pub async fn delete_sale_rows(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<()> {
    debug!(sale_id = %sale_id, "Deleting sale rows");

    sqlx::query(
        r#"
        DELETE FROM sale_item_allocations
        WHERE sale_item_id IN (SELECT id FROM sale_items WHERE sale_id = ?1)
        "#,
    )
    .bind(sale_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM sale_items WHERE sale_id = ?1")
        .bind(sale_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM sale_payments WHERE sale_id = ?1")
        .bind(sale_id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
        .bind(sale_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", sale_id));
    }

    Ok(())
}

// =============================================================================
// Reads
// =============================================================================

/// Number of the most recently created sale.
pub async fn last_sale_number(conn: &mut SqliteConnection) -> DbResult<Option<String>> {
    let number: Option<String> =
        sqlx::query_scalar("SELECT sale_number FROM sales ORDER BY rowid DESC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;

    Ok(number)
}

/// True when `number` is already used.
pub async fn sale_number_exists(conn: &mut SqliteConnection, number: &str) -> DbResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sales WHERE sale_number = ?1")
        .bind(number)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

/// Loads a sale header.
pub async fn fetch_sale(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(sale)
}

/// Items of a sale in request order.
pub async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let items = sqlx::query_as::<_, SaleItem>(
        "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY line_no",
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// Lot allocations of one item, in the order they were drawn.
pub async fn fetch_allocations(
    conn: &mut SqliteConnection,
    item_id: &str,
) -> DbResult<Vec<SaleItemAllocation>> {
    let allocations = sqlx::query_as::<_, SaleItemAllocation>(
        "SELECT * FROM sale_item_allocations WHERE sale_item_id = ?1 ORDER BY rowid",
    )
    .bind(item_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(allocations)
}

/// Loads a sale with its user and items (each with product and allocations).
pub async fn load_sale_detail(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<SaleDetail>> {
    let Some(sale) = fetch_sale(&mut *conn, id).await? else {
        return Ok(None);
    };
    Ok(Some(hydrate(conn, sale).await?))
}

pub(crate) async fn hydrate(conn: &mut SqliteConnection, sale: Sale) -> DbResult<SaleDetail> {
    let user = fetch_user(&mut *conn, &sale.user_id).await?;

    let mut items = Vec::new();
    for item in fetch_items(&mut *conn, &sale.id).await? {
        let product = fetch_product(&mut *conn, &item.product_id).await?;
        let allocations = fetch_allocations(&mut *conn, &item.id).await?;
        items.push(SaleItemDetail {
            item,
            product,
            allocations,
        });
    }

    Ok(SaleDetail { sale, user, items })
}

/// Completed sales still marked pending whose due date has passed.
pub async fn fetch_overdue_candidates(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> DbResult<Vec<Sale>> {
    let sales = sqlx::query_as::<_, Sale>(
        r#"
        SELECT * FROM sales
        WHERE status = 'completed'
          AND payment_status = 'pending'
          AND amount_due_cents > ?1
          AND due_date IS NOT NULL AND due_date < ?2
        ORDER BY due_date
        "#,
    )
    .bind(TOLERANCE.cents())
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;

    Ok(sales)
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a SaleFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(range) = &filter.range {
        qb.push(" AND created_at >= ").push_bind(range.from);
        qb.push(" AND created_at < ").push_bind(range.to);
    }
    if let Some(user_id) = &filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.as_str());
    }
    if let Some(method) = filter.payment_method {
        qb.push(" AND payment_method = ").push_bind(method);
    }
    if let Some(status) = filter.payment_status {
        qb.push(" AND payment_status = ").push_bind(status);
    }
}

// =============================================================================
// Report DTOs
// =============================================================================

/// Headline numbers for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesSummary {
    /// Sum of sale totals.
    pub total_sales_cents: i64,
    pub transaction_count: i64,
    /// Outstanding balance of sales in the period.
    pub pending_cents: i64,
    /// The part of `pending_cents` already past its due date.
    pub overdue_cents: i64,
}

/// Count and total per payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, TS)]
#[ts(export)]
pub struct MethodTotal {
    pub payment_method: SalePaymentMethod,
    pub count: i64,
    pub total_cents: i64,
}

/// A best seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, TS)]
#[ts(export)]
pub struct TopProduct {
    pub product_id: String,
    pub product_name: String,
    pub total_sold: i64,
    pub revenue_cents: i64,
}

/// Sales report for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesReport {
    pub total_sales: i64,
    pub total_revenue_cents: i64,
    pub payment_methods: Vec<MethodTotal>,
    /// Top 10 products by quantity sold.
    pub top_products: Vec<TopProduct>,
}

// =============================================================================
// Repository
// =============================================================================

/// Read side of sales.
///
/// Cancelled sales are listed and readable but left out of the summary and
/// report figures.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale with user and items.
    pub async fn get_sale(&self, id: &str) -> DbResult<Option<SaleDetail>> {
        let mut conn = self.pool.acquire().await?;
        load_sale_detail(&mut conn, id).await
    }

    /// Lists sales, newest first.
    pub async fn list_sales(&self, filter: &SaleFilter) -> EngineResult<Paged<SaleDetail>> {
        filter.page.validate()?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sales");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM sales");
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(filter.page.limit)
            .push(" OFFSET ")
            .push_bind(filter.page.offset());

        let sales = select.build_query_as::<Sale>().fetch_all(&self.pool).await?;

        let mut conn = self.pool.acquire().await?;
        let mut items = Vec::with_capacity(sales.len());
        for sale in sales {
            items.push(hydrate(&mut conn, sale).await?);
        }

        Ok(Paged::new(items, total, filter.page))
    }

    /// Open sales that are overdue at `now`: already marked overdue, or
    /// pending past their due date. Earliest due first.
    pub async fn overdue_sales(&self, now: DateTime<Utc>) -> DbResult<Vec<SaleDetail>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT * FROM sales
            WHERE status = 'completed'
              AND (payment_status = 'overdue'
                   OR (payment_status = 'pending' AND due_date IS NOT NULL AND due_date < ?1))
            ORDER BY due_date
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let mut out = Vec::with_capacity(sales.len());
        for sale in sales {
            out.push(hydrate(&mut conn, sale).await?);
        }
        Ok(out)
    }

    /// Payment history of a sale, newest first.
    pub async fn sale_payments(&self, sale_id: &str) -> DbResult<Vec<SalePayment>> {
        let payments = sqlx::query_as::<_, SalePayment>(
            "SELECT * FROM sale_payments WHERE sale_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Totals for sales created in `range`. Overdue is judged at `now`.
    pub async fn sales_summary(&self, range: DateRange, now: DateTime<Utc>) -> DbResult<SalesSummary> {
        let (total_sales_cents, transaction_count, pending_cents, overdue_cents): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COALESCE(SUM(total_cents), 0),
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN amount_due_cents > 0 THEN amount_due_cents ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN amount_due_cents > 0 AND due_date IS NOT NULL AND due_date < ?3
                                      THEN amount_due_cents ELSE 0 END), 0)
                FROM sales
                WHERE status = 'completed' AND created_at >= ?1 AND created_at < ?2
                "#,
            )
            .bind(range.from)
            .bind(range.to)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(SalesSummary {
            total_sales_cents,
            transaction_count,
            pending_cents,
            overdue_cents,
        })
    }

    /// Revenue, per-method totals and best sellers for `range`.
    pub async fn sales_report(&self, range: DateRange) -> DbResult<SalesReport> {
        let (total_sales, total_revenue_cents): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(total_cents), 0)
            FROM sales
            WHERE status = 'completed' AND created_at >= ?1 AND created_at < ?2
            "#,
        )
        .bind(range.from)
        .bind(range.to)
        .fetch_one(&self.pool)
        .await?;

        let payment_methods = sqlx::query_as::<_, MethodTotal>(
            r#"
            SELECT payment_method, COUNT(*) AS count, COALESCE(SUM(total_cents), 0) AS total_cents
            FROM sales
            WHERE status = 'completed' AND created_at >= ?1 AND created_at < ?2
            GROUP BY payment_method
            ORDER BY payment_method
            "#,
        )
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        let top_products = sqlx::query_as::<_, TopProduct>(
            r#"
            SELECT
                si.product_id AS product_id,
                p.name AS product_name,
                SUM(si.quantity) AS total_sold,
                SUM(si.total_cents) AS revenue_cents
            FROM sale_items si
            INNER JOIN products p ON p.id = si.product_id
            INNER JOIN sales s ON s.id = si.sale_id
            WHERE s.status = 'completed' AND s.created_at >= ?1 AND s.created_at < ?2
            GROUP BY si.product_id, p.name
            ORDER BY total_sold DESC, p.name
            LIMIT 10
            "#,
        )
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(SalesReport {
            total_sales,
            total_revenue_cents,
            payment_methods,
            top_products,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
