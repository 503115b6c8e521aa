//! # Meridian Engine
//!
//! Transaction orchestration over meridian-db.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        meridian-engine                                  │
//! │                                                                         │
//! │   sale.rs       SaleManager: atomic sale + inventory + outbox          │
//! │   hold.rs       HoldManager: park and resume carts                     │
//! │   refund.rs     RefundWorkflow: threshold approvals, restock           │
//! │   drawer.rs     DrawerManager: open / count / close sessions           │
//! │   outbox.rs     OutboxWorker + AccountingPoster seam                   │
//! │   reconcile.rs  ReconciliationSweep: drift audit + self-repair         │
//! │   materials.rs  MaterialsSync: catalog ↔ operations pool bridge        │
//! │   tasks.rs      SideEffectQueue: post-commit work                      │
//! │   config.rs     EngineConfig: injected thresholds and toggles         │
//! │                                                                         │
//! │   Everything money-critical happens inside one SQLite transaction;    │
//! │   everything else happens after commit and can only log failures.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod drawer;
pub mod error;
pub mod hold;
pub mod materials;
pub mod outbox;
pub mod reconcile;
pub mod refund;
pub mod sale;
pub mod tasks;

pub use config::EngineConfig;
pub use drawer::DrawerManager;
pub use error::{EngineError, EngineResult};
pub use hold::HoldManager;
pub use materials::{MaterialSyncOutcome, MaterialsSync};
pub use outbox::{AccountingPoster, OutboxWorker, OutboxWorkerHandle, PostOutcome};
pub use reconcile::{Finding, FindingKind, ReconciliationReport, ReconciliationSweep, Severity};
pub use refund::RefundWorkflow;
pub use sale::{CompletedSale, SaleManager};
pub use tasks::{
    LoggingReceiptSender, ReceiptSender, SideEffect, SideEffectQueue, SideEffectWorker,
    SideEffectWorkerHandle,
};
