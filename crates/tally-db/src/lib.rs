//! # tally-db: Database Layer and Transaction Engines for Tally POS
//!
//! SQLite storage (via sqlx) for the catalog, sales, purchase orders and the
//! payment ledger, plus the engines that change them atomically.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  Caller (HTTP handler, CLI, test)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │    Engines    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (engine/)    │───►│ (repository/) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SaleEngine    │    │ Catalog       │    │ 001_initial  │  │   │
//! │  │   │ PurchaseEngine│    │ Sale/Purchase │    │  _schema.sql │  │   │
//! │  │   │ stock         │    │ Movement/User │    │              │  │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │           │   tally-core       │                               │   │
//! │  │           │   (allocator,      │                               │   │
//! │  │           │    ledger)         │                               │   │
//! │  └───────────┼────────────────────┼───────────────────────────────┘   │
//! │              ▼                    ▼                                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - Environment configuration and tracing setup
//! - [`error`] - Database and engine error types
//! - [`repository`] - Reads and single-table writes
//! - [`engine`] - Atomic sale and purchase operations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("tally.db")).await?;
//!
//! let sale = db.sale_engine().create_sale(&request, &user_id).await?;
//! let low = db.catalog().low_stock_products().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{init_tracing, AppConfig};
pub use error::{DbError, DbResult, EngineError, EngineResult};
pub use pool::{Database, DbConfig};

pub use engine::purchase::{PurchaseEngine, PurchasePaymentReceipt};
pub use engine::sale::{SaleEngine, SalePaymentReceipt};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::movement::MovementRepository;
pub use repository::purchase::{PaymentHistory, PurchaseRepository, PurchaseSummary};
pub use repository::report::{DailySales, DashboardStats, ReportRepository};
pub use repository::sale::{MethodTotal, SaleRepository, SalesReport, SalesSummary, TopProduct};
pub use repository::user::UserRepository;
pub use repository::Paged;
