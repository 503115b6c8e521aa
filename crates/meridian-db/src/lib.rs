//! # Meridian DB
//!
//! SQLite persistence for the POS engine, built on SQLx.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        meridian-db                              │
//! │                                                                 │
//! │   pool.rs        Database handle, WAL pragmas, accessors       │
//! │   migrations.rs  Embedded migration runner                     │
//! │   repository/    One repository per aggregate                  │
//! │   error.rs       DbError / DbResult                            │
//! │                                                                 │
//! │   Transactions are owned by the engine: repositories expose    │
//! │   `&mut SqliteConnection` methods and never commit on their    │
//! │   own when composing with other writes.                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::{
    CustomerRepository, DrawerCloseout, DrawerCount, DrawerRepository, HoldRepository,
    InventoryRepository, MaterialsRepository, OutboxRepository, ProductRepository,
    PromotionRepository, RefundRepository, SaleRepository, SequenceRepository, StockAdjustment,
};
