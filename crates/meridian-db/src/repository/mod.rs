//! Repository layer: one module per aggregate, all speaking `DbResult`.
//!
//! Methods that must compose with other writes take
//! `&mut SqliteConnection` and run in the caller's transaction; plain
//! reads and standalone writes go straight to the pool.

pub mod customer;
pub mod drawer;
pub mod hold;
pub mod inventory;
pub mod materials;
pub mod outbox;
pub mod product;
pub mod promotion;
pub mod refund;
pub mod sale;
pub mod sequence;

pub use customer::CustomerRepository;
pub use drawer::{DrawerCloseout, DrawerCount, DrawerRepository};
pub use hold::HoldRepository;
pub use inventory::{InventoryRepository, StockAdjustment};
pub use materials::MaterialsRepository;
pub use outbox::OutboxRepository;
pub use product::ProductRepository;
pub use promotion::PromotionRepository;
pub use refund::RefundRepository;
pub use sale::SaleRepository;
pub use sequence::SequenceRepository;
