//! # Accounting Outbox Worker
//!
//! Drains the accounting outbox and posts entries to the ledger behind the
//! [`AccountingPoster`] seam.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Outbox Worker Flow                                 │
//! │                                                                         │
//! │  1. Poll: fetch_pending(batch_size)      (pending + errored entries)   │
//! │                                                                         │
//! │  2. Guard: skip entries at MAX_RETRY_ATTEMPTS, log for operator        │
//! │                                                                         │
//! │  3. Duplicate check: find_posting(reference_id) BEFORE posting.        │
//! │     An existing posting means a previous attempt succeeded but the    │
//! │     status write was lost: mark synced and move on, never post twice. │
//! │                                                                         │
//! │  4. Post: poster.post(entry) → Posted { journal_id } | Skipped         │
//! │                                                                         │
//! │  5. Mark: synced (stamp sale.synced_to_accounting) or error            │
//! │                                                                         │
//! │  TIMING:                                                               │
//! │  • Poll interval: 5 seconds (configurable)                             │
//! │  • Batch size: 100 entries (configurable)                              │
//! │  • Max retries: 10 (then logged and skipped)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use meridian_core::{AccountingOutboxEntry, OutboxStatus};
use meridian_db::Database;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Constants
// =============================================================================

/// Maximum posting attempts before an entry is parked for an operator.
pub(crate) const MAX_RETRY_ATTEMPTS: i64 = 10;

// =============================================================================
// Poster Seam
// =============================================================================

/// Outcome of one posting attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// A journal entry was created.
    Posted { journal_id: String },

    /// The poster declined the entry (e.g. zero-value payload). Counts as
    /// synced; it will not be retried.
    Skipped,
}

/// The accounting ledger the worker posts into.
///
/// Implementations must be idempotent-friendly: `find_posting` is consulted
/// before every `post` so a reference that already has a journal entry is
/// never posted again.
pub trait AccountingPoster: Send + Sync + 'static {
    fn post(
        &self,
        entry: &AccountingOutboxEntry,
    ) -> impl std::future::Future<Output = EngineResult<PostOutcome>> + Send;

    /// Journal entry id already recorded for this reference, if any.
    fn find_posting(
        &self,
        reference_id: &str,
    ) -> impl std::future::Future<Output = EngineResult<Option<String>>> + Send;
}

// =============================================================================
// Worker
// =============================================================================

/// Background worker draining the accounting outbox.
pub struct OutboxWorker<P: AccountingPoster> {
    db: Arc<Database>,
    config: Arc<EngineConfig>,
    poster: P,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the outbox worker.
#[derive(Clone)]
pub struct OutboxWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl OutboxWorkerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelClosed("Outbox shutdown channel".into()))
    }
}

impl<P: AccountingPoster> OutboxWorker<P> {
    pub fn new(
        db: Arc<Database>,
        config: Arc<EngineConfig>,
        poster: P,
    ) -> (Self, OutboxWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = OutboxWorker {
            db,
            config,
            poster,
            shutdown_rx,
        };

        (worker, OutboxWorkerHandle { shutdown_tx })
    }

    /// Runs the worker loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!("Outbox worker starting");

        let poll_interval = Duration::from_secs(self.config.outbox.poll_interval_secs);
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.process_batch().await {
                        error!(?e, "Failed to process outbox batch");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Outbox worker shutting down");
                    break;
                }
            }
        }

        info!("Outbox worker stopped");
    }

    /// Processes one batch of pending entries. Public so the reconciliation
    /// sweep and tests can drive the worker without the timer.
    pub async fn process_batch(&self) -> EngineResult<usize> {
        let entries = self.db.outbox().fetch_pending(self.config.outbox.batch_size).await?;

        if entries.is_empty() {
            debug!("No pending outbox entries");
            return Ok(0);
        }

        info!(count = entries.len(), "Processing outbox batch");

        let mut processed = 0;
        for entry in entries {
            if entry.attempts >= MAX_RETRY_ATTEMPTS {
                warn!(
                    id = %entry.id,
                    reference_id = %entry.reference_id,
                    attempts = entry.attempts,
                    "Entry exceeded max retry attempts, operator attention needed"
                );
                continue;
            }

            self.process_entry(&entry).await;
            processed += 1;
        }

        Ok(processed)
    }

    async fn process_entry(&self, entry: &AccountingOutboxEntry) {
        // An earlier attempt may have posted and then lost the status write
        match self.poster.find_posting(&entry.reference_id).await {
            Ok(Some(journal_id)) => {
                debug!(
                    reference_id = %entry.reference_id,
                    journal_id = %journal_id,
                    "Posting already exists, marking synced"
                );
                self.finish_synced(entry).await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                self.finish_errored(entry, &e).await;
                return;
            }
        }

        match self.poster.post(entry).await {
            Ok(PostOutcome::Posted { journal_id }) => {
                info!(
                    reference_id = %entry.reference_id,
                    journal_id = %journal_id,
                    "Accounting entry posted"
                );
                self.finish_synced(entry).await;
            }
            Ok(PostOutcome::Skipped) => {
                debug!(reference_id = %entry.reference_id, "Poster skipped entry");
                self.finish_synced(entry).await;
            }
            Err(e) => {
                self.finish_errored(entry, &e).await;
            }
        }
    }

    async fn finish_synced(&self, entry: &AccountingOutboxEntry) {
        if let Err(e) = self.db.outbox().mark_status(&entry.id, OutboxStatus::Synced, None).await {
            error!(id = %entry.id, error = %e, "Failed to mark entry synced");
            return;
        }

        if let Some(sale_id) = entry.sale_id.as_deref() {
            if let Err(e) = self.db.sales().mark_synced(sale_id).await {
                error!(sale_id, error = %e, "Failed to stamp sale as synced");
            }
        }
    }

    async fn finish_errored(&self, entry: &AccountingOutboxEntry, cause: &EngineError) {
        warn!(
            id = %entry.id,
            reference_id = %entry.reference_id,
            attempts = entry.attempts + 1,
            error = %cause,
            "Posting attempt failed"
        );

        let message = cause.to_string();
        if let Err(e) = self
            .db
            .outbox()
            .mark_status(&entry.id, OutboxStatus::Error, Some(&message))
            .await
        {
            error!(id = %entry.id, error = %e, "Failed to record posting error");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
