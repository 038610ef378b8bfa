//! # Stock Updates
//!
//! Applies allocator plans to lot rows. Every function runs on the caller's
//! connection, which inside the engines is the open transaction.
//!
//! ## Guarded Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  UPDATE product_suppliers                                               │
//! │     SET stock = stock - :n                                              │
//! │   WHERE id = :lot AND stock >= :n                                       │
//! │                                                                         │
//! │  1 row  → done                                                          │
//! │  0 rows → the lot changed since it was planned against                 │
//! │           → DbError::ConcurrentStockChange → transaction rolls back    │
//! │                                                                         │
//! │  Stock never goes below zero, even if two sales race for one lot.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tally_core::allocator::{DeductionPlan, ReceiptPlan};
use tally_core::SaleItemAllocation;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::repository::catalog::{fetch_link, insert_link, update_link_cost};

/// Subtracts `quantity` from a lot, refusing to go below zero.
pub async fn decrement(
    conn: &mut SqliteConnection,
    link_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE product_suppliers
        SET stock = stock - ?2, updated_at = ?3
        WHERE id = ?1 AND stock >= ?2
        "#,
    )
    .bind(link_id)
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(link_id = %link_id, requested = quantity, "Guarded stock decrement missed");
        return Err(DbError::ConcurrentStockChange {
            link_id: link_id.to_string(),
            requested: quantity,
        });
    }

    Ok(())
}

/// Adds `quantity` to a lot.
pub async fn increment(
    conn: &mut SqliteConnection,
    link_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE product_suppliers SET stock = stock + ?2, updated_at = ?3 WHERE id = ?1",
    )
    .bind(link_id)
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("ProductSupplier", link_id));
    }

    Ok(())
}

/// Sets a lot to a counted level.
pub async fn set_level(
    conn: &mut SqliteConnection,
    link_id: &str,
    level: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result =
        sqlx::query("UPDATE product_suppliers SET stock = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(link_id)
            .bind(level)
            .bind(now)
            .execute(&mut *conn)
            .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("ProductSupplier", link_id));
    }

    Ok(())
}

/// Applies every lot decrement of a deduction plan.
pub async fn apply_deduction(
    conn: &mut SqliteConnection,
    plan: &DeductionPlan,
    now: DateTime<Utc>,
) -> DbResult<()> {
    for line in &plan.lines {
        debug!(
            product_id = %plan.product_id,
            link_id = %line.link_id,
            quantity = line.quantity,
            "Deducting stock"
        );
        decrement(&mut *conn, &line.link_id, line.quantity, now).await?;
    }
    Ok(())
}

/// Receives `quantity` units according to a receipt plan and returns the
/// id of the lot that took them.
pub async fn receive(
    conn: &mut SqliteConnection,
    plan: &ReceiptPlan,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let link_id = match plan {
        ReceiptPlan::Existing { link_id, new_cost } => {
            update_link_cost(&mut *conn, link_id, *new_cost, now).await?;
            link_id.clone()
        }
        ReceiptPlan::New(lot) => insert_link(&mut *conn, lot, now).await?,
    };

    increment(&mut *conn, &link_id, quantity, now).await?;
    Ok(link_id)
}

/// Puts the units of a sale item back into the lots they were drawn from.
/// Lots that no longer exist are skipped. Returns the units restored.
pub async fn restore_allocations(
    conn: &mut SqliteConnection,
    allocations: &[SaleItemAllocation],
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let mut restored = 0;

    for allocation in allocations {
        if fetch_link(&mut *conn, &allocation.product_supplier_id)
            .await?
            .is_none()
        {
            debug!(link_id = %allocation.product_supplier_id, "Lot gone, skipping restore");
            continue;
        }
        increment(
            &mut *conn,
            &allocation.product_supplier_id,
            allocation.quantity,
            now,
        )
        .await?;
        restored += allocation.quantity;
    }

    Ok(restored)
}

/// Takes received units back out of a lot, flooring at zero. Returns the
/// units actually removed.
pub async fn reverse_receipt(
    conn: &mut SqliteConnection,
    link_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let Some(lot) = fetch_link(&mut *conn, link_id).await? else {
        return Ok(0);
    };

    let removed = quantity.min(lot.stock).max(0);
    set_level(&mut *conn, link_id, lot.stock - removed, now).await?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::noon;
    use crate::pool::{Database, DbConfig};
    use tally_core::allocator::{NewLot, PlanLine};
    use tally_core::requests::{NewProduct, NewSupplier};
    use tally_core::Money;

    async fn lot_with_stock(db: &Database, stock: i64) -> String {
        let product = db
            .catalog()
            .create_product(&NewProduct::new("Cola", "COLA-1"))
            .await
            .unwrap();
        let supplier = db
            .catalog()
            .create_supplier(&NewSupplier::named("Acme"))
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let mut lot = NewLot::for_delivery(&product.id, &supplier.id, Money::from_cents(100));
        lot.stock = stock;
        insert_link(&mut conn, &lot, noon()).await.unwrap()
    }

    async fn stock_of(db: &Database, link_id: &str) -> i64 {
        db.catalog().get_link(link_id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn test_guarded_decrement_refuses_to_go_negative() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let link_id = lot_with_stock(&db, 3).await;
        let mut conn = db.pool().acquire().await.unwrap();

        decrement(&mut conn, &link_id, 2, noon()).await.unwrap();
        let err = decrement(&mut conn, &link_id, 2, noon()).await.unwrap_err();
        assert!(matches!(err, DbError::ConcurrentStockChange { requested: 2, .. }));
        drop(conn);

        assert_eq!(stock_of(&db, &link_id).await, 1);
    }

    #[tokio::test]
    async fn test_apply_deduction_and_restore() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let link_id = lot_with_stock(&db, 10).await;
        let mut conn = db.pool().acquire().await.unwrap();

        let plan = DeductionPlan {
            product_id: "p".to_string(),
            quantity: 4,
            lines: vec![PlanLine {
                link_id: link_id.clone(),
                supplier_id: "s".to_string(),
                quantity: 4,
            }],
            unit_price: Money::from_cents(120),
            unit_cost: Money::from_cents(100),
            supplier_name: None,
        };
        apply_deduction(&mut conn, &plan, noon()).await.unwrap();

        let allocations = vec![
            SaleItemAllocation {
                id: "a1".to_string(),
                sale_item_id: "i1".to_string(),
                product_supplier_id: link_id.clone(),
                quantity: 4,
            },
            SaleItemAllocation {
                id: "a2".to_string(),
                sale_item_id: "i1".to_string(),
                product_supplier_id: "gone".to_string(),
                quantity: 7,
            },
        ];
        let restored = restore_allocations(&mut conn, &allocations, noon()).await.unwrap();
        assert_eq!(restored, 4);
        drop(conn);

        assert_eq!(stock_of(&db, &link_id).await, 10);
    }

    #[tokio::test]
    async fn test_reverse_receipt_floors_at_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let link_id = lot_with_stock(&db, 3).await;
        let mut conn = db.pool().acquire().await.unwrap();

        assert_eq!(reverse_receipt(&mut conn, &link_id, 5, noon()).await.unwrap(), 3);
        assert_eq!(
            reverse_receipt(&mut conn, "missing", 5, noon()).await.unwrap(),
            0
        );
        drop(conn);

        assert_eq!(stock_of(&db, &link_id).await, 0);
    }

    #[tokio::test]
    async fn test_updates_stamp_the_given_time() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let link_id = lot_with_stock(&db, 3).await;
        let later = noon() + chrono::Duration::days(2);

        let mut conn = db.pool().acquire().await.unwrap();
        increment(&mut conn, &link_id, 1, later).await.unwrap();
        drop(conn);

        let lot = db.catalog().get_link(&link_id).await.unwrap().unwrap();
        assert_eq!(lot.stock, 4);
        assert_eq!(lot.created_at, noon());
        assert_eq!(lot.updated_at, later);
    }
}
