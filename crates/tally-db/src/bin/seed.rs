//! # Seed Data Generator
//!
//! Populates a database with demo suppliers, stock and a few sales.
//!
//! ## Usage
//! ```bash
//! # Receive 200 products (default)
//! cargo run -p tally-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p tally-db --bin seed -- --count 1000 --db ./data/tally.db
//!
//! # Path and pool settings from the environment
//! TALLY_DB_PATH=./data/tally.db cargo run -p tally-db --bin seed
//! ```
//!
//! Defaults come from [`AppConfig::from_env`]; `--db` overrides `TALLY_DB_PATH`.
//!
//! ## What Gets Created
//! - one admin user
//! - three suppliers
//! - one purchase order per supplier, receiving the generated products
//!   (so every product gets a lot per supplier, with different costs)
//! - a handful of cash and credit sales against that stock

use chrono::Utc;
use std::env;
use tally_core::requests::{
    CreatePurchaseOrderRequest, CreateSaleRequest, NewSupplier, NewUser, ProductFilter,
    PurchaseLineRequest, SaleLineRequest,
};
use tally_db::{init_tracing, AppConfig, Database};

/// Product families for realistic test data
const CATEGORIES: &[(&str, &str, &[&str])] = &[
    (
        "BEV",
        "Beverages",
        &["Cola", "Lemon Soda", "Mineral Water", "Orange Juice", "Iced Tea", "Coffee"],
    ),
    (
        "SNK",
        "Snacks",
        &["Potato Chips", "Peanuts", "Chocolate Bar", "Cookies", "Crackers", "Pretzels"],
    ),
    (
        "DRY",
        "Dairy",
        &["Whole Milk", "Cheddar", "Butter", "Yogurt", "Cream Cheese", "Eggs Dozen"],
    ),
    (
        "GRO",
        "Grocery",
        &["White Rice", "Spaghetti", "Canned Beans", "Flour", "Sugar", "Cooking Oil"],
    ),
];

/// Size variants and their cost addon in cents
const SIZES: &[(&str, i64)] = &[("Small", 0), ("Medium", 80), ("Large", 150), ("Family", 300)];

const SUPPLIERS: &[&str] = &["Acme Wholesale", "Bolt Distribution", "Cobalt Traders"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut config = AppConfig::from_env()?;
    let mut count: usize = 200;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to receive (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: $TALLY_DB_PATH or ./tally.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing(&config.log_filter);

    println!("🌱 Tally POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", config.database_path.display());
    println!("Products: {}", count);
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.catalog().list_products(&ProductFilter::default()).await?;
    if existing.total > 0 {
        println!("⚠ Database already has {} products", existing.total);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let admin = db
        .users()
        .create_user(&NewUser {
            name: "Admin".to_string(),
            email: "admin@tally.local".to_string(),
            role: "admin".to_string(),
        })
        .await?;
    println!("✓ Created user {}", admin.email);

    let start = std::time::Instant::now();
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let lines = generate_lines(count);

    for (index, name) in SUPPLIERS.iter().enumerate() {
        let supplier = db.catalog().create_supplier(&NewSupplier::named(*name)).await?;

        // each supplier quotes a slightly different cost
        let items = lines
            .iter()
            .map(|line| PurchaseLineRequest {
                unit_cost_cents: line.unit_cost_cents + (index as i64) * 10,
                ..line.clone()
            })
            .collect();

        let order = db
            .purchase_engine()
            .create_purchase_order(
                &CreatePurchaseOrderRequest {
                    supplier_id: supplier.id.clone(),
                    payment_method: Some(if index == 0 { "credit" } else { "cash" }.to_string()),
                    payment_days: None,
                    payment_term: None,
                    down_payment_cents: 0,
                    notes: Some("Seed delivery".to_string()),
                    order_date: today.clone(),
                    items,
                },
                &admin.id,
            )
            .await?;

        println!(
            "  Received {} lines from {} ({})",
            order.items.len(),
            supplier.name,
            order.order.po_number
        );
    }

    println!();
    println!("Ringing up demo sales...");

    let products = db.catalog().list_products(&ProductFilter::default()).await?;
    let mut sales = 0;
    for (n, product) in products.items.iter().take(10).enumerate() {
        let method = if n % 3 == 0 { "credit" } else { "cash" };
        let sale = db
            .sale_engine()
            .create_sale(
                &CreateSaleRequest {
                    items: vec![SaleLineRequest {
                        product_id: product.product.id.clone(),
                        quantity: 1 + (n as i64 % 4),
                        supplier_id: None,
                        price_cents: None,
                        cost_cents: None,
                    }],
                    customer_name: None,
                    payment_method: method.to_string(),
                    payment_term: None,
                    tax_cents: 0,
                    discount_cents: 0,
                    down_payment_cents: 0,
                },
                &admin.id,
            )
            .await;

        match sale {
            Ok(sale) => {
                sales += 1;
                println!("  {} {} {}", sale.sale.sale_number, method, sale.items_total());
            }
            Err(e) => eprintln!("  Failed sale for {}: {}", product.product.sku, e),
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!(
        "✓ Seeded {} products and {} sales in {:?}",
        products.total, sales, elapsed
    );

    Ok(())
}

/// Builds `count` purchase lines cycling through families and sizes.
fn generate_lines(count: usize) -> Vec<PurchaseLineRequest> {
    let mut lines = Vec::with_capacity(count);

    'outer: for (code, category, names) in CATEGORIES {
        for (name_idx, name) in names.iter().enumerate() {
            for (size_idx, (size, addon)) in SIZES.iter().enumerate() {
                if lines.len() >= count {
                    break 'outer;
                }

                let seed = lines.len();
                lines.push(PurchaseLineRequest {
                    sku: format!("{code}-{:02}{:02}-{:03}", name_idx, size_idx, seed),
                    product_name: Some(format!("{name} {size}")),
                    category: Some(category.to_string()),
                    description: None,
                    quantity: 10 + (seed % 40) as i64,
                    unit_cost_cents: 99 + ((seed * 37) % 700) as i64 + addon,
                    product_supplier_id: None,
                });
            }
        }
    }

    lines
}
