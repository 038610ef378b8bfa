//! # Catalog Repository
//!
//! Products, suppliers and the lots (product/supplier links) that carry
//! stock and prices.
//!
//! ## Where Stock Lives
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  products                 product_suppliers (lots)        suppliers    │
//! │  ┌──────────────┐        ┌────────────────────────┐      ┌──────────┐ │
//! │  │ COLA-330     │───────►│ lot A  stock 5  $1.00  │◄─────│ Acme     │ │
//! │  │ (no stock)   │        │ lot B  stock 3  $0.80  │◄─────│ Bolt     │ │
//! │  └──────────────┘        └────────────────────────┘      └──────────┘ │
//! │                                                                         │
//! │  A product's stock is the sum of its active lots. Lots are listed in   │
//! │  stored (rowid) order; the allocator walks them in that order.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Soft-deleted products (`deleted_at` set) are invisible to every lookup
//! here and in the engines.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tally_core::allocator::NewLot;
use tally_core::requests::{
    LinkPatch, NewLink, NewProduct, NewSupplier, ProductFilter, ProductPatch, StockAdjustment,
    SupplierPatch,
};
use tally_core::validation::validate_search_query;
use tally_core::{
    new_id, CoreError, Money, MovementType, Product, ProductSupplier, ProductWithLinks, Supplier,
    ValidationError,
};
use tracing::{debug, info, warn};

use crate::engine::stock;
use crate::error::{DbError, DbResult, EngineResult};
use crate::repository::movement::{insert_movement, NewMovement};
use crate::repository::Paged;

/// Lot columns, with the supplier name joined in.
const LINK_SELECT: &str = r#"
    SELECT
        ps.id,
        ps.product_id,
        ps.supplier_id,
        s.name AS supplier_name,
        ps.cost_cents,
        ps.price_cents,
        ps.stock,
        ps.min_stock,
        ps.is_active,
        ps.created_at,
        ps.updated_at
    FROM product_suppliers ps
    INNER JOIN suppliers s ON s.id = ps.supplier_id
"#;

// =============================================================================
// Query Functions
// =============================================================================

/// Loads a live (not soft-deleted) product.
pub async fn fetch_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE id = ?1 AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(product)
}

/// Loads a live product by SKU.
pub async fn fetch_product_by_sku(
    conn: &mut SqliteConnection,
    sku: &str,
) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE sku = ?1 AND deleted_at IS NULL",
    )
    .bind(sku)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(product)
}

/// Inserts a product row.
pub async fn insert_product(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(sku = %product.sku, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, sku, description, category, location,
            is_active, created_at, updated_at, deleted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.sku)
    .bind(&product.description)
    .bind(&product.category)
    .bind(&product.location)
    .bind(product.is_active)
    .bind(product.created_at)
    .bind(product.updated_at)
    .bind(product.deleted_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Loads a supplier.
pub async fn fetch_supplier(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Supplier>> {
    let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(supplier)
}

/// All lots of a product, in stored order.
pub async fn fetch_links(
    conn: &mut SqliteConnection,
    product_id: &str,
) -> DbResult<Vec<ProductSupplier>> {
    let sql = format!("{LINK_SELECT} WHERE ps.product_id = ?1 ORDER BY ps.rowid");
    let links = sqlx::query_as::<_, ProductSupplier>(&sql)
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(links)
}

/// Loads one lot.
pub async fn fetch_link(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<ProductSupplier>> {
    let sql = format!("{LINK_SELECT} WHERE ps.id = ?1");
    let link = sqlx::query_as::<_, ProductSupplier>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(link)
}

/// Loads the lot of a (product, supplier) pair.
pub async fn fetch_link_for(
    conn: &mut SqliteConnection,
    product_id: &str,
    supplier_id: &str,
) -> DbResult<Option<ProductSupplier>> {
    let sql = format!("{LINK_SELECT} WHERE ps.product_id = ?1 AND ps.supplier_id = ?2");
    let link = sqlx::query_as::<_, ProductSupplier>(&sql)
        .bind(product_id)
        .bind(supplier_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(link)
}

/// Inserts a lot and returns its id.
pub async fn insert_link(
    conn: &mut SqliteConnection,
    lot: &NewLot,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let id = new_id();

    debug!(
        product_id = %lot.product_id,
        supplier_id = %lot.supplier_id,
        "Inserting product supplier link"
    );

    sqlx::query(
        r#"
        INSERT INTO product_suppliers (
            id, product_id, supplier_id, cost_cents, price_cents,
            stock, min_stock, is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        "#,
    )
    .bind(&id)
    .bind(&lot.product_id)
    .bind(&lot.supplier_id)
    .bind(lot.cost.cents())
    .bind(lot.price.cents())
    .bind(lot.stock)
    .bind(lot.min_stock)
    .bind(lot.is_active)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

/// Sets the cost of a lot.
pub async fn update_link_cost(
    conn: &mut SqliteConnection,
    link_id: &str,
    cost: Money,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE product_suppliers SET cost_cents = ?2, updated_at = ?3 WHERE id = ?1",
    )
    .bind(link_id)
    .bind(cost.cents())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("ProductSupplier", link_id));
    }

    Ok(())
}

/// Loads a live product with its lots.
pub async fn load_product(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<ProductWithLinks>> {
    let Some(product) = fetch_product(&mut *conn, id).await? else {
        return Ok(None);
    };
    let suppliers = fetch_links(&mut *conn, &product.id).await?;

    Ok(Some(ProductWithLinks { product, suppliers }))
}

/// Attaches lots to each product.
pub async fn attach_links(
    conn: &mut SqliteConnection,
    products: Vec<Product>,
) -> DbResult<Vec<ProductWithLinks>> {
    let mut out = Vec::with_capacity(products.len());
    for product in products {
        let suppliers = fetch_links(&mut *conn, &product.id).await?;
        out.push(ProductWithLinks { product, suppliers });
    }
    Ok(out)
}

fn push_product_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a ProductFilter) {
    qb.push(" WHERE p.deleted_at IS NULL");

    if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
        qb.push(" AND p.category = ").push_bind(category);
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        qb.push(" AND (LOWER(p.name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(p.sku) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(p.description, '')) LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(active) = filter.active {
        qb.push(" AND p.is_active = ").push_bind(active);
    }

    if filter.low_stock {
        qb.push(
            " AND EXISTS (SELECT 1 FROM product_suppliers ps \
             WHERE ps.product_id = p.id AND ps.is_active = 1 AND ps.stock <= ps.min_stock)",
        );
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the catalog.
///
/// ## Usage
/// ```rust,ignore
/// let catalog = db.catalog();
///
/// let product = catalog.create_product(&NewProduct::new("Cola 330ml", "COLA-330")).await?;
/// let supplier = catalog.create_supplier(&NewSupplier::named("Acme")).await?;
/// catalog.create_link(&NewLink { product_id, supplier_id, ... }).await?;
/// ```
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Creates a product. The SKU must be unique.
    pub async fn create_product(&self, new: &NewProduct) -> EngineResult<Product> {
        new.validate()?;

        let mut conn = self.pool.acquire().await?;
        let sku = new.sku.trim();

        if sku_taken(&mut conn, sku, None).await? {
            return Err(ValidationError::Duplicate {
                field: "sku".to_string(),
                value: sku.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let product = Product {
            id: new_id(),
            name: new.name.trim().to_string(),
            sku: sku.to_string(),
            description: new.description.clone(),
            category: new.category.clone(),
            location: new.location.clone(),
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        insert_product(&mut conn, &product).await?;

        info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    /// Gets a live product by id.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    /// Gets a live product by SKU.
    pub async fn get_product_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product_by_sku(&mut conn, sku).await
    }

    /// Gets a live product with its lots.
    pub async fn get_product_with_links(&self, id: &str) -> DbResult<Option<ProductWithLinks>> {
        let mut conn = self.pool.acquire().await?;
        load_product(&mut conn, id).await
    }

    /// Applies a partial update.
    pub async fn update_product(&self, id: &str, patch: &ProductPatch) -> EngineResult<Product> {
        patch.validate()?;

        let mut conn = self.pool.acquire().await?;
        let mut product = fetch_product(&mut conn, id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(id.to_string()))?;

        if let Some(sku) = patch.sku.as_deref().map(str::trim) {
            if sku != product.sku && sku_taken(&mut conn, sku, Some(id)).await? {
                return Err(ValidationError::Duplicate {
                    field: "sku".to_string(),
                    value: sku.to_string(),
                }
                .into());
            }
            product.sku = sku.to_string();
        }
        if let Some(name) = &patch.name {
            product.name = name.trim().to_string();
        }
        if patch.description.is_some() {
            product.description = patch.description.clone();
        }
        if patch.category.is_some() {
            product.category = patch.category.clone();
        }
        if patch.location.is_some() {
            product.location = patch.location.clone();
        }
        if let Some(active) = patch.is_active {
            product.is_active = active;
        }
        product.updated_at = Utc::now();

        debug!(id = %product.id, "Updating product");

        sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                sku = ?3,
                description = ?4,
                category = ?5,
                location = ?6,
                is_active = ?7,
                updated_at = ?8
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.location)
        .bind(product.is_active)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(product)
    }

    /// Soft-deletes a product. Sales and purchase history keep pointing at
    /// the row.
    pub async fn delete_product(&self, id: &str) -> EngineResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE products SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ProductNotFound(id.to_string()).into());
        }

        info!(product_id = %id, "Product deleted");
        Ok(())
    }

    /// Lists products with their lots, ordered by name.
    pub async fn list_products(&self, filter: &ProductFilter) -> EngineResult<Paged<ProductWithLinks>> {
        filter.page.validate()?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM products p");
        push_product_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT p.* FROM products p");
        push_product_filters(&mut select, filter);
        select
            .push(" ORDER BY p.name, p.rowid LIMIT ")
            .push_bind(filter.page.limit)
            .push(" OFFSET ")
            .push_bind(filter.page.offset());

        let products = select
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;

        let mut conn = self.pool.acquire().await?;
        let items = attach_links(&mut conn, products).await?;

        Ok(Paged::new(items, total, filter.page))
    }

    /// Case-insensitive search over name, SKU and description of active
    /// products.
    pub async fn search_products(&self, query: &str, limit: i64) -> EngineResult<Vec<ProductWithLinks>> {
        let query = validate_search_query(query)?;
        if query.is_empty() {
            return Err(ValidationError::Required {
                field: "query".to_string(),
            }
            .into());
        }

        debug!(query = %query, limit = limit, "Searching products");

        let pattern = format!("%{}%", query.to_lowercase());
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE deleted_at IS NULL
              AND is_active = 1
              AND (LOWER(name) LIKE ?1 OR LOWER(sku) LIKE ?1 OR LOWER(COALESCE(description, '')) LIKE ?1)
            ORDER BY name
            LIMIT ?2
            "#,
        )
        .bind(&pattern)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        Ok(attach_links(&mut conn, products).await?)
    }

    /// Distinct non-empty categories of active products.
    pub async fn categories(&self) -> DbResult<Vec<String>> {
        let categories: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT category FROM products
            WHERE deleted_at IS NULL AND is_active = 1
              AND category IS NOT NULL AND category != ''
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Active products with at least one active lot at or below its minimum.
    pub async fn low_stock_products(&self) -> DbResult<Vec<ProductWithLinks>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT p.* FROM products p
            WHERE p.deleted_at IS NULL AND p.is_active = 1
              AND EXISTS (
                  SELECT 1 FROM product_suppliers ps
                  WHERE ps.product_id = p.id AND ps.is_active = 1 AND ps.stock <= ps.min_stock
              )
            ORDER BY p.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        attach_links(&mut conn, products).await
    }

    // -------------------------------------------------------------------------
    // Suppliers
    // -------------------------------------------------------------------------

    /// Creates a supplier.
    pub async fn create_supplier(&self, new: &NewSupplier) -> EngineResult<Supplier> {
        new.validate()?;

        let now = Utc::now();
        let supplier = Supplier {
            id: new_id(),
            name: new.name.trim().to_string(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            address: new.address.clone(),
            contact_person: new.contact_person.clone(),
            website: new.website.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO suppliers (
                id, name, email, phone, address, contact_person, website,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&supplier.id)
        .bind(&supplier.name)
        .bind(&supplier.email)
        .bind(&supplier.phone)
        .bind(&supplier.address)
        .bind(&supplier.contact_person)
        .bind(&supplier.website)
        .bind(supplier.is_active)
        .bind(supplier.created_at)
        .bind(supplier.updated_at)
        .execute(&self.pool)
        .await?;

        info!(supplier_id = %supplier.id, name = %supplier.name, "Supplier created");
        Ok(supplier)
    }

    /// Gets a supplier.
    pub async fn get_supplier(&self, id: &str) -> DbResult<Option<Supplier>> {
        let mut conn = self.pool.acquire().await?;
        fetch_supplier(&mut conn, id).await
    }

    /// Applies a partial update.
    pub async fn update_supplier(&self, id: &str, patch: &SupplierPatch) -> EngineResult<Supplier> {
        patch.validate()?;

        let mut conn = self.pool.acquire().await?;
        let mut supplier = fetch_supplier(&mut conn, id)
            .await?
            .ok_or_else(|| CoreError::SupplierNotFound(id.to_string()))?;

        if let Some(name) = &patch.name {
            supplier.name = name.trim().to_string();
        }
        if patch.email.is_some() {
            supplier.email = patch.email.clone();
        }
        if patch.phone.is_some() {
            supplier.phone = patch.phone.clone();
        }
        if patch.address.is_some() {
            supplier.address = patch.address.clone();
        }
        if patch.contact_person.is_some() {
            supplier.contact_person = patch.contact_person.clone();
        }
        if patch.website.is_some() {
            supplier.website = patch.website.clone();
        }
        if let Some(active) = patch.is_active {
            supplier.is_active = active;
        }
        supplier.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE suppliers SET
                name = ?2, email = ?3, phone = ?4, address = ?5,
                contact_person = ?6, website = ?7, is_active = ?8, updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&supplier.id)
        .bind(&supplier.name)
        .bind(&supplier.email)
        .bind(&supplier.phone)
        .bind(&supplier.address)
        .bind(&supplier.contact_person)
        .bind(&supplier.website)
        .bind(supplier.is_active)
        .bind(supplier.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(supplier)
    }

    /// Marks a supplier inactive. Its lots stay as they are.
    pub async fn deactivate_supplier(&self, id: &str) -> EngineResult<()> {
        let result =
            sqlx::query("UPDATE suppliers SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::SupplierNotFound(id.to_string()).into());
        }

        info!(supplier_id = %id, "Supplier deactivated");
        Ok(())
    }

    /// Lists suppliers by name.
    pub async fn list_suppliers(&self, active_only: bool) -> DbResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as::<_, Supplier>(
            "SELECT * FROM suppliers WHERE (?1 = 0 OR is_active = 1) ORDER BY name",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(suppliers)
    }

    /// Case-insensitive search over supplier name, contact and email.
    pub async fn search_suppliers(&self, query: &str) -> EngineResult<Vec<Supplier>> {
        let query = validate_search_query(query)?;
        let pattern = format!("%{}%", query.to_lowercase());

        let suppliers = sqlx::query_as::<_, Supplier>(
            r#"
            SELECT * FROM suppliers
            WHERE LOWER(name) LIKE ?1
               OR LOWER(COALESCE(contact_person, '')) LIKE ?1
               OR LOWER(COALESCE(email, '')) LIKE ?1
            ORDER BY name
            LIMIT 50
            "#,
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(suppliers)
    }

    // -------------------------------------------------------------------------
    // Lots
    // -------------------------------------------------------------------------

    /// Links a supplier to a product. Fails if the pair is already linked.
    pub async fn create_link(&self, new: &NewLink) -> EngineResult<ProductSupplier> {
        new.validate()?;

        let mut conn = self.pool.acquire().await?;
        check_link_parties(&mut conn, &new.product_id, &new.supplier_id).await?;

        if fetch_link_for(&mut conn, &new.product_id, &new.supplier_id)
            .await?
            .is_some()
        {
            return Err(ValidationError::Duplicate {
                field: "product_supplier".to_string(),
                value: format!("{}/{}", new.product_id, new.supplier_id),
            }
            .into());
        }

        let id = insert_link(&mut conn, &lot_from(new), Utc::now()).await?;
        let link = fetch_link(&mut conn, &id)
            .await?
            .ok_or_else(|| DbError::not_found("ProductSupplier", &id))?;

        info!(link_id = %link.id, product_id = %link.product_id, "Product supplier link created");
        Ok(link)
    }

    /// Creates the link, or updates cost, price, minimum and active flag of
    /// the existing one. Stock of an existing lot is left alone.
    pub async fn upsert_link(&self, new: &NewLink) -> EngineResult<ProductSupplier> {
        new.validate()?;

        let mut conn = self.pool.acquire().await?;
        check_link_parties(&mut conn, &new.product_id, &new.supplier_id).await?;

        let id = match fetch_link_for(&mut conn, &new.product_id, &new.supplier_id).await? {
            Some(existing) => {
                sqlx::query(
                    r#"
                    UPDATE product_suppliers SET
                        cost_cents = ?2, price_cents = ?3, min_stock = ?4,
                        is_active = ?5, updated_at = ?6
                    WHERE id = ?1
                    "#,
                )
                .bind(&existing.id)
                .bind(new.cost_cents)
                .bind(new.price_cents)
                .bind(new.min_stock)
                .bind(new.is_active)
                .bind(Utc::now())
                .execute(&mut *conn)
                .await?;
                existing.id
            }
            None => insert_link(&mut conn, &lot_from(new), Utc::now()).await?,
        };

        Ok(fetch_link(&mut conn, &id)
            .await?
            .ok_or_else(|| DbError::not_found("ProductSupplier", &id))?)
    }

    /// Lots of a product in stored order.
    pub async fn links_for_product(&self, product_id: &str) -> DbResult<Vec<ProductSupplier>> {
        let mut conn = self.pool.acquire().await?;
        fetch_links(&mut conn, product_id).await
    }

    /// Gets one lot.
    pub async fn get_link(&self, id: &str) -> DbResult<Option<ProductSupplier>> {
        let mut conn = self.pool.acquire().await?;
        fetch_link(&mut conn, id).await
    }

    /// Updates cost, price, minimum or active flag of a lot.
    pub async fn update_link(&self, id: &str, patch: &LinkPatch) -> EngineResult<ProductSupplier> {
        patch.validate()?;

        let mut conn = self.pool.acquire().await?;
        let link = fetch_link(&mut conn, id)
            .await?
            .ok_or_else(|| CoreError::LinkNotFound(id.to_string()))?;

        sqlx::query(
            r#"
            UPDATE product_suppliers SET
                cost_cents = ?2, price_cents = ?3, min_stock = ?4,
                is_active = ?5, updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(patch.cost_cents.unwrap_or(link.cost_cents))
        .bind(patch.price_cents.unwrap_or(link.price_cents))
        .bind(patch.min_stock.unwrap_or(link.min_stock))
        .bind(patch.is_active.unwrap_or(link.is_active))
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(fetch_link(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("ProductSupplier", id))?)
    }

    /// Manual stock change on one lot, recorded as a stock movement.
    ///
    /// - `in`: adds `quantity`
    /// - `out`: subtracts `quantity`; fails with `InsufficientStock` rather
    ///   than going below zero
    /// - `adjustment`: sets the counted value
    ///
    /// The lot update and the movement commit together.
    pub async fn adjust_link_stock(
        &self,
        link_id: &str,
        adjustment: &StockAdjustment,
        user_id: &str,
    ) -> EngineResult<ProductSupplier> {
        let movement_type = adjustment.validate()?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let link = fetch_link(&mut tx, link_id)
            .await?
            .ok_or_else(|| CoreError::LinkNotFound(link_id.to_string()))?;

        match movement_type {
            MovementType::In => {
                stock::increment(&mut tx, link_id, adjustment.quantity, now).await?;
            }
            MovementType::Out => {
                if link.stock < adjustment.quantity {
                    warn!(link_id = %link_id, stock = link.stock, "Stock out rejected");
                    return Err(CoreError::InsufficientStock {
                        product: link.product_id.clone(),
                        available: link.stock,
                        requested: adjustment.quantity,
                    }
                    .into());
                }
                stock::decrement(&mut tx, link_id, adjustment.quantity, now).await?;
            }
            MovementType::Adjustment => {
                stock::set_level(&mut tx, link_id, adjustment.quantity, now).await?;
            }
        }

        insert_movement(
            &mut tx,
            NewMovement {
                product_id: &link.product_id,
                user_id,
                movement_type,
                quantity: adjustment.quantity,
                reference: None,
                notes: adjustment.notes(),
                created_at: now,
            },
        )
        .await?;

        let updated = fetch_link(&mut tx, link_id)
            .await?
            .ok_or_else(|| DbError::not_found("ProductSupplier", link_id))?;

        tx.commit().await?;

        info!(
            link_id = %link_id,
            movement_type = %movement_type,
            quantity = adjustment.quantity,
            stock = updated.stock,
            "Stock adjusted"
        );
        Ok(updated)
    }
}

async fn sku_taken(
    conn: &mut SqliteConnection,
    sku: &str,
    except_id: Option<&str>,
) -> DbResult<bool> {
    // soft-deleted rows still hold their SKU in the unique index
    let owner: Option<String> = sqlx::query_scalar("SELECT id FROM products WHERE sku = ?1")
        .bind(sku)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(matches!(owner, Some(id) if Some(id.as_str()) != except_id))
}

async fn check_link_parties(
    conn: &mut SqliteConnection,
    product_id: &str,
    supplier_id: &str,
) -> EngineResult<()> {
    if fetch_product(&mut *conn, product_id).await?.is_none() {
        return Err(CoreError::ProductNotFound(product_id.to_string()).into());
    }
    if fetch_supplier(&mut *conn, supplier_id).await?.is_none() {
        return Err(CoreError::SupplierNotFound(supplier_id.to_string()).into());
    }
    Ok(())
}

fn lot_from(new: &NewLink) -> NewLot {
    NewLot {
        product_id: new.product_id.clone(),
        supplier_id: new.supplier_id.clone(),
        cost: Money::from_cents(new.cost_cents),
        price: Money::from_cents(new.price_cents),
        stock: new.stock,
        min_stock: new.min_stock,
        is_active: new.is_active,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{cashier, lot, product, supplier, test_db};
    use crate::error::EngineError;
    use tally_core::requests::MovementFilter;

    #[tokio::test]
    async fn test_duplicate_sku_is_rejected_even_after_delete() {
        let db = test_db().await;
        let cola = product(&db, "Cola", "COLA-330").await;

        let err = db
            .catalog()
            .create_product(&NewProduct::new("Other Cola", "COLA-330"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));

        db.catalog().delete_product(&cola.id).await.unwrap();
        assert!(db.catalog().get_product(&cola.id).await.unwrap().is_none());
        assert!(db
            .catalog()
            .create_product(&NewProduct::new("Cola", "COLA-330"))
            .await
            .is_err());

        let err = db.catalog().delete_product(&cola.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_search_and_low_stock() {
        let db = test_db().await;
        let acme = supplier(&db, "Acme").await;
        let cola = product(&db, "Cola", "COLA-330").await;
        let chips = product(&db, "Chips", "CHIP-1").await;
        lot(&db, &cola, &acme, 50, 100, 40).await;
        lot(&db, &chips, &acme, 70, 120, 1).await;

        let all = db.catalog().list_products(&ProductFilter::default()).await.unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items[0].product.name, "Chips");
        assert_eq!(all.items[1].total_active_stock(), 40);

        let found = db.catalog().search_products("cola", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].product.sku, "COLA-330");

        let err = db.catalog().search_products("   ", 10).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));

        let low = db.catalog().low_stock_products().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].product.id, chips.id);

        let filtered = db
            .catalog()
            .list_products(&ProductFilter {
                low_stock: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.total, 1);
    }

    #[tokio::test]
    async fn test_links_are_unique_per_pair_and_upsert_keeps_stock() {
        let db = test_db().await;
        let acme = supplier(&db, "Acme").await;
        let cola = product(&db, "Cola", "COLA-330").await;
        let first = lot(&db, &cola, &acme, 50, 100, 40).await;
        assert_eq!(first.supplier_name, "Acme");

        let again = NewLink {
            product_id: cola.id.clone(),
            supplier_id: acme.id.clone(),
            cost_cents: 55,
            price_cents: 110,
            stock: 0,
            min_stock: 5,
            is_active: true,
        };
        let err = db.catalog().create_link(&again).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));

        let updated = db.catalog().upsert_link(&again).await.unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.price_cents, 110);
        assert_eq!(updated.stock, 40);

        let missing = NewLink {
            supplier_id: "nobody".to_string(),
            ..again
        };
        let err = db.catalog().create_link(&missing).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::SupplierNotFound(_))));
    }

    #[tokio::test]
    async fn test_adjust_link_stock_records_movements() {
        let db = test_db().await;
        let user = cashier(&db).await;
        let acme = supplier(&db, "Acme").await;
        let cola = product(&db, "Cola", "COLA-330").await;
        let link = lot(&db, &cola, &acme, 50, 100, 10).await;

        let adjust = |movement_type: &str, quantity: i64| StockAdjustment {
            movement_type: movement_type.to_string(),
            quantity,
            notes: Some("shelf count".to_string()),
        };

        let after_in = db.catalog().adjust_link_stock(&link.id, &adjust("in", 5), &user.id).await.unwrap();
        assert_eq!(after_in.stock, 15);

        let after_out = db.catalog().adjust_link_stock(&link.id, &adjust("out", 4), &user.id).await.unwrap();
        assert_eq!(after_out.stock, 11);

        let err = db
            .catalog()
            .adjust_link_stock(&link.id, &adjust("out", 12), &user.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock { available: 11, requested: 12, .. })
        ));

        let counted = db
            .catalog()
            .adjust_link_stock(&link.id, &adjust("adjustment", 7), &user.id)
            .await
            .unwrap();
        assert_eq!(counted.stock, 7);

        let movements = db
            .movements()
            .list_movements(&MovementFilter {
                product_id: Some(cola.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(movements.total, 3);
    }

    #[tokio::test]
    async fn test_deactivated_supplier_drops_from_active_list() {
        let db = test_db().await;
        let acme = supplier(&db, "Acme").await;
        supplier(&db, "Bolt").await;

        db.catalog().deactivate_supplier(&acme.id).await.unwrap();

        assert_eq!(db.catalog().list_suppliers(true).await.unwrap().len(), 1);
        assert_eq!(db.catalog().list_suppliers(false).await.unwrap().len(), 2);

        let err = db.catalog().deactivate_supplier("nobody").await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::SupplierNotFound(_))));
    }
}
