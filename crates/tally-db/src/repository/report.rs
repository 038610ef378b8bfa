//! # Report Repository
//!
//! The back-office dashboard: one read that gathers sales, profit,
//! purchasing and stock figures.
//!
//! ## Where the Numbers Come From
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  sales (completed)     ──► count, revenue, recent, 7-day chart         │
//! │  sale_items            ──► profit = Σ quantity × (price − cost)        │
//! │                             top products by quantity                   │
//! │  purchase_orders       ──► purchasing total / paid / due               │
//! │  product_suppliers     ──► products with a lot at or below minimum     │
//! │                                                                         │
//! │  "Today" is the UTC day containing `now`.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancelled sales are left out of every sales figure, as in
//! [`SaleRepository`](crate::repository::sale::SaleRepository).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tally_core::requests::DateRange;
use tally_core::{Sale, SaleDetail};
use tracing::debug;
use ts_rs::TS;

use crate::error::DbResult;
use crate::repository::sale::{hydrate, TopProduct};

/// Days shown on the dashboard sales chart, today included.
pub const CHART_DAYS: i64 = 7;

/// Sales on one day of the dashboard chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailySales {
    /// `YYYY-MM-DD`
    pub date: String,
    pub sales: i64,
    pub revenue_cents: i64,
}

/// Back-office dashboard figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_products: i64,
    pub total_sales: i64,
    pub today_sales: i64,
    pub total_revenue_cents: i64,
    pub today_revenue_cents: i64,
    pub total_profit_cents: i64,
    pub today_profit_cents: i64,
    pub purchasing_total_cents: i64,
    pub purchasing_paid_cents: i64,
    pub purchasing_due_cents: i64,
    /// Products with an active lot at or below its minimum.
    pub low_stock_products: i64,
    /// Last 10 sales, newest first.
    pub recent_sales: Vec<SaleDetail>,
    /// Top 5 products by quantity sold.
    pub top_products: Vec<TopProduct>,
    /// Oldest day first.
    pub sales_chart: Vec<DailySales>,
}

/// Midnight-to-midnight UTC window holding `at`.
fn day_of(at: DateTime<Utc>) -> DateRange {
    let from = at
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(at, |midnight| midnight.and_utc());
    DateRange::new(from, from + Duration::days(1))
}

/// Cross-table reports.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Dashboard figures as of `now`.
    pub async fn dashboard_stats(&self, now: DateTime<Utc>) -> DbResult<DashboardStats> {
        let today = day_of(now);
        debug!(day = %today.from.format("%Y-%m-%d"), "Building dashboard stats");

        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let total_products: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        let (total_sales, total_revenue_cents): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total_cents), 0) FROM sales WHERE status = 'completed'",
        )
        .fetch_one(&self.pool)
        .await?;

        let (today_sales, today_revenue_cents) = self.sales_in(today).await?;

        let total_profit_cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(si.quantity * (si.unit_price_cents - si.unit_cost_cents)), 0)
            FROM sale_items si
            INNER JOIN sales s ON s.id = si.sale_id
            WHERE s.status = 'completed'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let today_profit_cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(si.quantity * (si.unit_price_cents - si.unit_cost_cents)), 0)
            FROM sale_items si
            INNER JOIN sales s ON s.id = si.sale_id
            WHERE s.status = 'completed' AND s.created_at >= ?1 AND s.created_at < ?2
            "#,
        )
        .bind(today.from)
        .bind(today.to)
        .fetch_one(&self.pool)
        .await?;

        let (purchasing_total_cents, purchasing_paid_cents, purchasing_due_cents): (i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COALESCE(SUM(total_cents), 0),
                    COALESCE(SUM(amount_paid_cents), 0),
                    COALESCE(SUM(amount_due_cents), 0)
                FROM purchase_orders
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        let low_stock_products: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT p.id)
            FROM products p
            INNER JOIN product_suppliers ps ON ps.product_id = p.id
            WHERE p.deleted_at IS NULL AND ps.is_active = 1 AND ps.stock <= ps.min_stock
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let recent = sqlx::query_as::<_, Sale>(
            r#"
            SELECT * FROM sales
            WHERE status = 'completed'
            ORDER BY created_at DESC, rowid DESC
            LIMIT 10
            "#,
        )
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
            WHERE s.status = 'completed'
            GROUP BY si.product_id, p.name
            ORDER BY total_sold DESC, p.name
            LIMIT 5
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sales_chart = Vec::with_capacity(CHART_DAYS as usize);
        for back in (0..CHART_DAYS).rev() {
            let day = day_of(now - Duration::days(back));
            let (sales, revenue_cents) = self.sales_in(day).await?;
            sales_chart.push(DailySales {
                date: day.from.format("%Y-%m-%d").to_string(),
                sales,
                revenue_cents,
            });
        }

        let mut conn = self.pool.acquire().await?;
        let mut recent_sales = Vec::with_capacity(recent.len());
        for sale in recent {
            recent_sales.push(hydrate(&mut conn, sale).await?);
        }

        Ok(DashboardStats {
            total_users,
            total_products,
            total_sales,
            today_sales,
            total_revenue_cents,
            today_revenue_cents,
            total_profit_cents,
            today_profit_cents,
            purchasing_total_cents,
            purchasing_paid_cents,
            purchasing_due_cents,
            low_stock_products,
            recent_sales,
            top_products,
            sales_chart,
        })
    }

    /// Count and revenue of completed sales in `range`.
    async fn sales_in(&self, range: DateRange) -> DbResult<(i64, i64)> {
        let row = sqlx::query_as(
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

        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{cashier, lot, noon, product, supplier, test_db};
    use std::sync::Arc;
    use tally_core::clock::FixedClock;
    use tally_core::requests::{
        CreatePurchaseOrderRequest, CreateSaleRequest, PurchaseLineRequest, SaleLineRequest,
    };

    fn cart(product_id: &str, quantity: i64) -> CreateSaleRequest {
        CreateSaleRequest {
            items: vec![SaleLineRequest {
                product_id: product_id.to_string(),
                quantity,
                supplier_id: None,
                price_cents: None,
                cost_cents: None,
            }],
            customer_name: None,
            payment_method: "cash".to_string(),
            payment_term: None,
            tax_cents: 0,
            discount_cents: 0,
            down_payment_cents: 0,
        }
    }

    #[tokio::test]
    async fn test_dashboard_stats_with_profit() {
        let db = test_db().await;
        let user = cashier(&db).await;
        let acme = supplier(&db, "Acme").await;
        let widget = product(&db, "Widget", "WID-1").await;
        let gadget = product(&db, "Gadget", "GAD-1").await;
        lot(&db, &widget, &acme, 600, 1000, 20).await;
        lot(&db, &gadget, &acme, 300, 500, 3).await;

        // two days ago: 2 widgets, profit 2 × 400
        let earlier = db
            .clone()
            .with_clock(Arc::new(FixedClock(noon() - Duration::days(2))));
        earlier
            .sale_engine()
            .create_sale(&cart(&widget.id, 2), &user.id)
            .await
            .unwrap();

        // today: 3 widgets and 1 gadget, profit 3 × 400 + 200
        let engine = db.sale_engine();
        engine.create_sale(&cart(&widget.id, 3), &user.id).await.unwrap();
        engine.create_sale(&cart(&gadget.id, 1), &user.id).await.unwrap();
        let voided = engine.create_sale(&cart(&widget.id, 4), &user.id).await.unwrap();
        engine.void_sale(&voided.sale.id, &user.id).await.unwrap();

        db.purchase_engine()
            .create_purchase_order(
                &CreatePurchaseOrderRequest {
                    supplier_id: acme.id.clone(),
                    payment_method: Some("credit".to_string()),
                    payment_days: None,
                    payment_term: None,
                    down_payment_cents: 1000,
                    notes: None,
                    order_date: "2024-03-01".to_string(),
                    items: vec![PurchaseLineRequest {
                        sku: "BOLT-1".to_string(),
                        product_name: Some("Bolt".to_string()),
                        category: None,
                        description: None,
                        quantity: 12,
                        unit_cost_cents: 400,
                        product_supplier_id: None,
                    }],
                },
                &user.id,
            )
            .await
            .unwrap();

        let stats = db.reports().dashboard_stats(noon()).await.unwrap();

        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.total_products, 3);
        assert_eq!(stats.total_sales, 3);
        assert_eq!(stats.today_sales, 2);
        assert_eq!(stats.total_revenue_cents, 2000 + 3000 + 500);
        assert_eq!(stats.today_revenue_cents, 3500);
        assert_eq!(stats.total_profit_cents, 800 + 1200 + 200);
        assert_eq!(stats.today_profit_cents, 1400);

        assert_eq!(stats.purchasing_total_cents, 4800);
        assert_eq!(stats.purchasing_paid_cents, 1000);
        assert_eq!(stats.purchasing_due_cents, 3800);

        // gadget is down to 2 of a minimum of 2; the new bolt lot holds 12 of 10
        assert_eq!(stats.low_stock_products, 1);

        assert_eq!(stats.recent_sales.len(), 3);
        assert_eq!(stats.recent_sales[2].sale.created_at, noon() - Duration::days(2));
        assert_eq!(stats.top_products[0].product_name, "Widget");
        assert_eq!(stats.top_products[0].total_sold, 5);

        assert_eq!(stats.sales_chart.len(), CHART_DAYS as usize);
        assert_eq!(stats.sales_chart[6].date, "2024-03-01");
        assert_eq!(stats.sales_chart[6].sales, 2);
        assert_eq!(stats.sales_chart[4].date, "2024-02-28");
        assert_eq!(stats.sales_chart[4].revenue_cents, 2000);
        assert_eq!(stats.sales_chart[5].sales, 0);
    }
}
