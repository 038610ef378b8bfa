//! # Stock Movement Repository
//!
//! Append-only audit trail of every stock change: sales (`out`), purchase
//! deliveries and void restores (`in`), purchase reversals (`out`) and manual
//! counts (`adjustment`). Rows are never updated or deleted.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tally_core::requests::MovementFilter;
use tally_core::{new_id, MovementType, StockMovement};
use tracing::debug;

use crate::error::{DbResult, EngineResult};
use crate::repository::Paged;

/// A movement about to be written.
#[derive(Debug, Clone)]
pub struct NewMovement<'a> {
    pub product_id: &'a str,
    pub user_id: &'a str,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Appends a movement.
pub async fn insert_movement(
    conn: &mut SqliteConnection,
    movement: NewMovement<'_>,
) -> DbResult<StockMovement> {
    let row = StockMovement {
        id: new_id(),
        product_id: movement.product_id.to_string(),
        user_id: movement.user_id.to_string(),
        movement_type: movement.movement_type,
        quantity: movement.quantity,
        reference: movement.reference.map(str::to_string),
        notes: movement.notes.map(str::to_string),
        created_at: movement.created_at,
    };

    debug!(
        product_id = %row.product_id,
        movement_type = %row.movement_type,
        quantity = row.quantity,
        "Recording stock movement"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, product_id, user_id, movement_type, quantity, reference, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&row.id)
    .bind(&row.product_id)
    .bind(&row.user_id)
    .bind(row.movement_type)
    .bind(row.quantity)
    .bind(&row.reference)
    .bind(&row.notes)
    .bind(row.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(row)
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a MovementFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(product_id) = &filter.product_id {
        qb.push(" AND product_id = ").push_bind(product_id.as_str());
    }
    if let Some(kind) = filter.movement_type {
        qb.push(" AND movement_type = ").push_bind(kind);
    }
}

/// Repository for stock movement history.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// Lists movements, newest first.
    pub async fn list_movements(&self, filter: &MovementFilter) -> EngineResult<Paged<StockMovement>> {
        filter.page.validate()?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM stock_movements");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM stock_movements");
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(filter.page.limit)
            .push(" OFFSET ")
            .push_bind(filter.page.offset());

        let items = select
            .build_query_as::<StockMovement>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Paged::new(items, total, filter.page))
    }

    /// Every movement carrying `reference` (a sale or PO number), oldest first.
    pub async fn movements_for_reference(&self, reference: &str) -> DbResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, StockMovement>(
            "SELECT * FROM stock_movements WHERE reference = ?1 ORDER BY rowid",
        )
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
