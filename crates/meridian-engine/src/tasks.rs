//! # Post-Commit Side Effects
//!
//! The sale transaction commits first; everything non-essential happens
//! afterwards through this in-process queue.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Side Effect Pipeline                                │
//! │                                                                         │
//! │  SaleManager ──commit──▶ dispatch(SideEffect) ──mpsc──▶ worker          │
//! │                                                           │             │
//! │                                  ┌────────────────────────┤             │
//! │                                  ▼            ▼           ▼             │
//! │                          loyalty earn   promotion    receipt email,     │
//! │                                          usage       materials deduct   │
//! │                                                                         │
//! │  Each effect is applied independently; a failure is logged and the     │
//! │  next effect still runs. Nothing here can unwind the sale.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use meridian_db::Database;

use crate::error::{EngineError, EngineResult};
use crate::materials::MaterialsSync;

/// Queue depth before dispatch starts failing fast.
const QUEUE_CAPACITY: usize = 256;

// =============================================================================
// Side Effects
// =============================================================================

/// Work deferred until after a sale transaction commits.
#[derive(Debug, Clone)]
pub enum SideEffect {
    EarnLoyalty {
        customer_id: String,
        points: i64,
    },
    RecordPromotionUsage {
        promotion_id: String,
        sale_id: String,
        customer_id: Option<String>,
        discount_cents: i64,
    },
    EmailReceipt {
        sale_id: String,
        recipient: String,
    },
    DeductMaterials {
        sale_id: String,
    },
}

// =============================================================================
// Receipt Sender
// =============================================================================

/// Outbound receipt delivery. The engine only knows the seam; transports
/// live behind it.
pub trait ReceiptSender: Send + Sync + 'static {
    fn send_receipt(
        &self,
        sale_id: &str,
        recipient: &str,
    ) -> impl std::future::Future<Output = EngineResult<()>> + Send;
}

/// Receipt sender that logs instead of delivering. Default until an SMTP
/// transport is wired in.
#[derive(Debug, Clone, Default)]
pub struct LoggingReceiptSender;

impl ReceiptSender for LoggingReceiptSender {
    async fn send_receipt(&self, sale_id: &str, recipient: &str) -> EngineResult<()> {
        info!(sale_id, recipient, "Receipt email dispatched");
        Ok(())
    }
}

// =============================================================================
// Queue Handle
// =============================================================================

/// Cloneable producer half of the side-effect pipeline.
#[derive(Clone)]
pub struct SideEffectQueue {
    tx: mpsc::Sender<SideEffect>,
}

impl SideEffectQueue {
    /// Dispatches an effect. Best effort: a full or closed queue is logged
    /// and dropped, the caller's transaction has already committed.
    pub async fn dispatch(&self, effect: SideEffect) {
        if let Err(e) = self.tx.send(effect).await {
            warn!(effect = ?e.0, "Side effect dropped, queue closed");
        }
    }

    /// Queue whose worker half is gone. Every dispatch is a logged no-op;
    /// used by tests that exercise workflows without the pipeline.
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        SideEffectQueue { tx }
    }
}

/// Handle for stopping the worker.
#[derive(Clone)]
pub struct SideEffectWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SideEffectWorkerHandle {
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelClosed("Side effect shutdown channel".into()))
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Consumes the queue and applies effects one at a time.
pub struct SideEffectWorker<R: ReceiptSender> {
    db: Arc<Database>,
    materials: MaterialsSync,
    receipts: R,
    rx: mpsc::Receiver<SideEffect>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<R: ReceiptSender> SideEffectWorker<R> {
    pub fn new(
        db: Arc<Database>,
        materials: MaterialsSync,
        receipts: R,
    ) -> (Self, SideEffectQueue, SideEffectWorkerHandle) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = SideEffectWorker {
            db,
            materials,
            receipts,
            rx,
            shutdown_rx,
        };

        (
            worker,
            SideEffectQueue { tx },
            SideEffectWorkerHandle { shutdown_tx },
        )
    }

    /// Runs the worker loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!("Side effect worker starting");

        loop {
            tokio::select! {
                maybe_effect = self.rx.recv() => {
                    match maybe_effect {
                        Some(effect) => self.apply(effect).await,
                        None => {
                            info!("Side effect queue closed");
                            break;
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Side effect worker shutting down");
                    break;
                }
            }
        }

        // Drain what was queued before shutdown
        while let Ok(effect) = self.rx.try_recv() {
            self.apply(effect).await;
        }

        info!("Side effect worker stopped");
    }

    /// Applies one effect; failures are logged, never propagated.
    pub async fn apply(&self, effect: SideEffect) {
        match effect {
            SideEffect::EarnLoyalty { customer_id, points } => {
                if let Err(e) = self.db.customers().earn_loyalty_points(&customer_id, points).await
                {
                    error!(customer_id, points, error = %e, "Loyalty earn failed");
                }
            }

            SideEffect::RecordPromotionUsage {
                promotion_id,
                sale_id,
                customer_id,
                discount_cents,
            } => {
                let result = self
                    .db
                    .promotions()
                    .record_usage(&promotion_id, &sale_id, customer_id.as_deref(), discount_cents)
                    .await;
                if let Err(e) = result {
                    error!(promotion_id, sale_id, error = %e, "Promotion usage record failed");
                }
            }

            SideEffect::EmailReceipt { sale_id, recipient } => {
                if let Err(e) = self.receipts.send_receipt(&sale_id, &recipient).await {
                    error!(sale_id, recipient, error = %e, "Receipt email failed");
                }
            }

            SideEffect::DeductMaterials { sale_id } => {
                match self.materials.deduct_for_sale(&sale_id).await {
                    Ok(outcomes) => {
                        debug!(sale_id, lines = outcomes.len(), "Materials sync applied")
                    }
                    Err(e) => error!(sale_id, error = %e, "Materials sync failed"),
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
