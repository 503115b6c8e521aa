//! # Cash Drawer Sessions
//!
//! open → counted → closed, one active session per cashier per store.
//!
//! The expected figure is never cached: every count recomputes
//! `opening + cash payments on completed, fully paid sales since the
//! session opened`, so a recount after more sales always compares
//! against fresh numbers.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use chrono::Utc;
use meridian_core::{validate_opening_amount, CashDrawerSession, CoreError, DrawerStatus};
use meridian_db::{Database, DrawerCloseout, DrawerCount};

use crate::config::EngineConfig;
use crate::error::EngineResult;

/// Orchestrates drawer session lifecycles for the configured store.
#[derive(Clone)]
pub struct DrawerManager {
    db: Arc<Database>,
    config: Arc<EngineConfig>,
}

impl DrawerManager {
    pub fn new(db: Arc<Database>, config: Arc<EngineConfig>) -> Self {
        DrawerManager { db, config }
    }

    /// Opens a drawer session with a counted opening float.
    ///
    /// Idempotent: if the cashier already has an active session, that
    /// session is returned unchanged instead of failing the shift start.
    #[instrument(skip(self))]
    pub async fn open_session(
        &self,
        cashier_id: &str,
        opening_cents: i64,
        notes: Option<String>,
    ) -> EngineResult<CashDrawerSession> {
        validate_opening_amount(opening_cents)?;

        let store_id = &self.config.store.id;
        if let Some(existing) = self.db.drawers().find_active(store_id, cashier_id).await? {
            info!(
                session_id = %existing.id,
                cashier_id,
                "Drawer already open, returning existing session"
            );
            return Ok(existing);
        }

        let session = CashDrawerSession {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.clone(),
            cashier_id: cashier_id.to_string(),
            status: DrawerStatus::Open,
            opening_cents,
            expected_cents: None,
            counted_cents: None,
            difference_cents: None,
            total_cash_sales_cents: None,
            total_non_cash_sales_cents: None,
            total_transactions: None,
            notes,
            opened_at: Utc::now(),
            counted_at: None,
            closed_at: None,
        };
        self.db.drawers().insert(&session).await?;

        info!(session_id = %session.id, cashier_id, opening_cents, "Drawer session opened");
        Ok(session)
    }

    /// Records a physical count against the recomputed expectation.
    /// A counted session may be recounted until it closes.
    #[instrument(skip(self))]
    pub async fn count_session(
        &self,
        cashier_id: &str,
        counted_cents: i64,
    ) -> EngineResult<CashDrawerSession> {
        let store_id = &self.config.store.id;
        let session = self
            .db
            .drawers()
            .find_active(store_id, cashier_id)
            .await?
            .ok_or_else(|| CoreError::NoActiveDrawerSession {
                store_id: store_id.clone(),
                cashier_id: cashier_id.to_string(),
            })?;

        let cash_since = self
            .db
            .sales()
            .cash_total_since(store_id, cashier_id, session.opened_at)
            .await?;
        let expected = session.opening_cents + cash_since;
        let difference = counted_cents - expected;

        self.db
            .drawers()
            .record_count(
                &session.id,
                DrawerCount {
                    expected_cents: expected,
                    counted_cents,
                    difference_cents: difference,
                },
            )
            .await?;

        info!(
            session_id = %session.id,
            expected_cents = expected,
            counted_cents,
            difference_cents = difference,
            "Drawer counted"
        );
        self.db.drawers().get_by_id(&session.id).await.map_err(Into::into)
    }

    /// Closes a session with an end-of-shift snapshot.
    ///
    /// A final count may be supplied here instead of a separate
    /// `count_session` call. Closing without one leaves the count
    /// columns as they stand, null if the drawer was never counted.
    #[instrument(skip(self))]
    pub async fn close_session(
        &self,
        cashier_id: &str,
        counted_cents: Option<i64>,
        notes: Option<String>,
    ) -> EngineResult<CashDrawerSession> {
        let store_id = &self.config.store.id;
        let session = self
            .db
            .drawers()
            .find_active(store_id, cashier_id)
            .await?
            .ok_or_else(|| CoreError::NoActiveDrawerSession {
                store_id: store_id.clone(),
                cashier_id: cashier_id.to_string(),
            })?;

        if let Some(counted) = counted_cents {
            let cash_since = self
                .db
                .sales()
                .cash_total_since(store_id, cashier_id, session.opened_at)
                .await?;
            let expected = session.opening_cents + cash_since;
            self.db
                .drawers()
                .record_count(
                    &session.id,
                    DrawerCount {
                        expected_cents: expected,
                        counted_cents: counted,
                        difference_cents: counted - expected,
                    },
                )
                .await?;
        }

        let cash = self
            .db
            .sales()
            .cash_total_since(store_id, cashier_id, session.opened_at)
            .await?;
        let non_cash = self
            .db
            .sales()
            .non_cash_total_since(store_id, cashier_id, session.opened_at)
            .await?;
        let transactions = self
            .db
            .sales()
            .transactions_since(store_id, cashier_id, session.opened_at)
            .await?;

        self.db
            .drawers()
            .record_closeout(
                &session.id,
                DrawerCloseout {
                    total_cash_sales_cents: cash,
                    total_non_cash_sales_cents: non_cash,
                    total_transactions: transactions,
                    notes,
                },
            )
            .await?;

        info!(
            session_id = %session.id,
            total_cash_sales_cents = cash,
            total_non_cash_sales_cents = non_cash,
            total_transactions = transactions,
            "Drawer session closed"
        );
        self.db.drawers().get_by_id(&session.id).await.map_err(Into::into)
    }
}

// =============================================================================
// Tests
// =============================================================================
