//! # Transaction Engines
//!
//! The multi-step operations of Tally POS. Each public engine method is one
//! database transaction: it either commits every row it touched or none.
//!
//! ## Anatomy of an Engine Call
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  request.validate()            ← CoreError, nothing opened yet         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  pool.begin()                                                           │
//! │       │                                                                 │
//! │       ├── load rows            (repository free functions, &mut *tx)   │
//! │       ├── plan                 (tally-core: allocator, ledger)         │
//! │       ├── apply                (engine::stock, guarded updates)        │
//! │       └── insert documents, movements, payments                        │
//! │       │                                                                 │
//! │       ├── any error ──► tx dropped ──► ROLLBACK                        │
//! │       ▼                                                                 │
//! │  tx.commit()                                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  re-read the document with its relations and return it                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`sale::SaleEngine`] - create, void, delete, pay, overdue sweep
//! - [`purchase::PurchaseEngine`] - create, update, pay, delete, overdue sweep
//! - [`stock`] - lot updates shared by both

pub mod purchase;
pub mod sale;
pub mod stock;
