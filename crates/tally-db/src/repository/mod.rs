//! # Repository Module
//!
//! Database access for Tally POS.
//!
//! ## Two Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Repository structs (CatalogRepository, SaleRepository, ...)           │
//! │  ├── own a pool clone                                                  │
//! │  ├── reads, reports, single-table writes                               │
//! │  └── db.catalog().get_product(id)                                      │
//! │       │                                                                 │
//! │       │ call                                                            │
//! │       ▼                                                                 │
//! │  Free query functions (catalog::fetch_product, sale::insert_sale, ...) │
//! │  ├── take `&mut SqliteConnection`                                      │
//! │  └── the engines pass `&mut *tx`, so every step of an operation runs   │
//! │      on the same transaction                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products, suppliers, lots, manual stock changes
//! - [`MovementRepository`](movement::MovementRepository) - Stock movement history
//! - [`UserRepository`](user::UserRepository) - Users
//! - [`SaleRepository`](sale::SaleRepository) - Sale reads and reports
//! - [`PurchaseRepository`](purchase::PurchaseRepository) - Purchase order reads and reports
//! - [`ReportRepository`](report::ReportRepository) - Dashboard figures

use serde::{Deserialize, Serialize};
use tally_core::requests::Page;

pub mod catalog;
pub mod movement;
pub mod purchase;
pub mod report;
pub mod sale;
pub mod user;

/// One page of a list plus the unpaged row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        Paged {
            items,
            total,
            page: page.page,
            limit: page.limit,
        }
    }
}
