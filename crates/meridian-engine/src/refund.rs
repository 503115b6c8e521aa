//! # Refund Workflow
//!
//! State machine for refunds against completed sales.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Refund Lifecycle                                   │
//! │                                                                         │
//! │   create_refund(draft)                                                  │
//! │        │                                                                │
//! │        ├── total ≤ threshold ──▶ COMPLETED (inventory restored now)     │
//! │        │                                                                │
//! │        └── total > threshold ──▶ PENDING (nothing restored yet)         │
//! │                                     │                                   │
//! │                       approve ──────┼────── reject                      │
//! │                          │          │          │                        │
//! │                          ▼          │          ▼                        │
//! │                      COMPLETED      │      CANCELLED                    │
//! │                 (inventory restored)│   (quantity released)             │
//! │                                                                         │
//! │  Cumulative cap: across all non-cancelled refunds, each sale line      │
//! │  can never refund more units than it sold. When every line reaches     │
//! │  its cap, the sale itself flips to refunded.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use chrono::Utc;
use meridian_core::{
    CoreError, Refund, RefundDraft, RefundLineItem, RefundStatus, SaleLineItem, SaleStatus,
    TransactionType, ValidationError,
};
use meridian_db::{Database, StockAdjustment};
use sqlx::SqliteConnection;

use crate::config::EngineConfig;
use crate::error::EngineResult;

/// Orchestrates the refund workflow.
#[derive(Clone)]
pub struct RefundWorkflow {
    db: Arc<Database>,
    config: Arc<EngineConfig>,
}

impl RefundWorkflow {
    pub fn new(db: Arc<Database>, config: Arc<EngineConfig>) -> Self {
        RefundWorkflow { db, config }
    }

    /// Creates a refund against a completed sale. Small refunds complete
    /// immediately; totals above the approval threshold park as pending
    /// until a manager decides.
    #[instrument(skip(self, draft), fields(sale_id = %draft.sale_id))]
    pub async fn create_refund(&self, draft: RefundDraft) -> EngineResult<Refund> {
        meridian_core::validate_refund_draft(&draft)?;

        let sale = self
            .db
            .sales()
            .get_by_id(&draft.sale_id)
            .await
            .map_err(|_| CoreError::SaleNotFound(draft.sale_id.clone()))?;
        if sale.status != SaleStatus::Completed {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id.clone(),
                current_status: format!("{:?}", sale.status).to_lowercase(),
            }
            .into());
        }

        let sale_items = self.db.sales().get_items(&sale.id).await?;
        let by_id: HashMap<&str, &SaleLineItem> =
            sale_items.iter().map(|i| (i.id.as_str(), i)).collect();

        let refund_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.db.pool().begin().await?;

        // Price the refund lines while enforcing the cumulative cap
        let mut lines = Vec::with_capacity(draft.items.len());
        let mut total = 0_i64;
        for item in &draft.items {
            let sale_item = by_id.get(item.sale_item_id.as_str()).copied().ok_or_else(|| {
                CoreError::Validation(ValidationError::InvalidFormat {
                    field: "sale_item_id".to_string(),
                    reason: format!("{} does not belong to sale {}", item.sale_item_id, sale.id),
                })
            })?;

            let already = self.db.refunds().refunded_quantity(&mut tx, &sale_item.id).await?;
            let remaining = sale_item.quantity - already;
            if item.quantity > remaining {
                return Err(CoreError::RefundExceedsSold {
                    sale_item_id: sale_item.id.clone(),
                    remaining,
                    requested: item.quantity,
                }
                .into());
            }

            // Refund the paid share of the line, tax included
            let tax_cents = sale_item.tax_cents * item.quantity / sale_item.quantity;
            let line_total_cents =
                sale_item.line_total_cents * item.quantity / sale_item.quantity;
            total += line_total_cents;

            lines.push(RefundLineItem {
                id: Uuid::new_v4().to_string(),
                refund_id: refund_id.clone(),
                sale_item_id: sale_item.id.clone(),
                product_id: sale_item.product_id.clone(),
                quantity: item.quantity,
                unit_price_cents: sale_item.unit_price_cents,
                tax_cents,
                line_total_cents,
            });
        }

        let requires_approval = total > self.config.refunds.approval_threshold_cents;
        let status = if requires_approval {
            RefundStatus::Pending
        } else {
            RefundStatus::Completed
        };

        let refund_number = self.db.sequences().issue(&mut tx, "REF", now.date_naive()).await?;

        let refund = Refund {
            id: refund_id.clone(),
            refund_number: refund_number.clone(),
            sale_id: sale.id.clone(),
            store_id: sale.store_id.clone(),
            refund_type: draft.refund_type,
            status,
            total_cents: total,
            reason: draft.reason.clone(),
            requires_approval,
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            requested_by: draft.requested_by.clone(),
            created_at: now,
        };

        self.db.refunds().insert_refund(&mut tx, &refund).await?;
        for line in &lines {
            self.db.refunds().insert_item(&mut tx, line).await?;
        }

        if status == RefundStatus::Completed {
            self.restore_inventory(&mut tx, &refund, &lines, &by_id).await?;
            self.settle_sale_status(&mut tx, &sale.id, &sale_items).await?;
            let payload = serde_json::to_string(&refund)?;
            self.db
                .outbox()
                .enqueue(&mut tx, Some(&sale.id), "pos_refund", &refund_number, &payload)
                .await?;
        }

        tx.commit().await?;

        info!(
            refund_number = %refund.refund_number,
            total_cents = total,
            requires_approval,
            "Refund created"
        );

        Ok(refund)
    }

    /// Approves a pending refund: restores inventory, flips the sale when
    /// it is now fully refunded, and enqueues the accounting reversal.
    pub async fn approve_refund(
        &self,
        refund_id: &str,
        approved_by: &str,
        notes: Option<&str>,
    ) -> EngineResult<Refund> {
        let refund = self.db.refunds().get_by_id(refund_id).await?;
        if refund.status != RefundStatus::Pending {
            return Err(CoreError::InvalidRefundStatus {
                refund_id: refund.id.clone(),
                current_status: format!("{:?}", refund.status).to_lowercase(),
            }
            .into());
        }

        let lines = self.db.refunds().get_items(refund_id).await?;
        let sale_items = self.db.sales().get_items(&refund.sale_id).await?;
        let by_id: HashMap<&str, &SaleLineItem> =
            sale_items.iter().map(|i| (i.id.as_str(), i)).collect();

        let mut tx = self.db.pool().begin().await?;

        self.db
            .refunds()
            .mark_approved(&mut tx, refund_id, approved_by, notes)
            .await?;
        self.restore_inventory(&mut tx, &refund, &lines, &by_id).await?;
        self.settle_sale_status(&mut tx, &refund.sale_id, &sale_items).await?;

        let payload = serde_json::to_string(&refund)?;
        self.db
            .outbox()
            .enqueue(
                &mut tx,
                Some(&refund.sale_id),
                "pos_refund",
                &refund.refund_number,
                &payload,
            )
            .await?;

        tx.commit().await?;

        info!(refund_number = %refund.refund_number, approved_by, "Refund approved");
        self.db.refunds().get_by_id(refund_id).await.map_err(Into::into)
    }

    /// Rejects a pending refund. The held quantities release back to the
    /// sale's refundable balance; no stock moves.
    pub async fn reject_refund(
        &self,
        refund_id: &str,
        rejected_by: &str,
        reason: &str,
    ) -> EngineResult<Refund> {
        let refund = self.db.refunds().get_by_id(refund_id).await?;
        if refund.status != RefundStatus::Pending {
            return Err(CoreError::InvalidRefundStatus {
                refund_id: refund.id.clone(),
                current_status: format!("{:?}", refund.status).to_lowercase(),
            }
            .into());
        }

        let mut tx = self.db.pool().begin().await?;
        self.db
            .refunds()
            .mark_rejected(&mut tx, refund_id, rejected_by, reason)
            .await?;
        tx.commit().await?;

        info!(refund_number = %refund.refund_number, rejected_by, "Refund rejected");
        self.db.refunds().get_by_id(refund_id).await.map_err(Into::into)
    }

    /// Puts refunded units back on the shelf, at the cost they left with.
    async fn restore_inventory(
        &self,
        conn: &mut SqliteConnection,
        refund: &Refund,
        lines: &[RefundLineItem],
        sale_items: &HashMap<&str, &SaleLineItem>,
    ) -> EngineResult<()> {
        for line in lines {
            let cost = sale_items
                .get(line.sale_item_id.as_str())
                .and_then(|i| i.cost_cents);

            self.db
                .inventory()
                .adjust(
                    &mut *conn,
                    StockAdjustment {
                        store_id: &refund.store_id,
                        product_id: &line.product_id,
                        quantity_delta: line.quantity,
                        transaction_type: TransactionType::ReturnIn,
                        reference_type: "pos_refund",
                        reference_id: &refund.refund_number,
                        unit_cost_cents: cost,
                        remarks: refund.reason.as_deref(),
                        performed_by: &refund.requested_by,
                    },
                )
                .await?;
        }

        Ok(())
    }

    /// Flips the sale to refunded once every line has refunded all its units.
    async fn settle_sale_status(
        &self,
        conn: &mut SqliteConnection,
        sale_id: &str,
        sale_items: &[SaleLineItem],
    ) -> EngineResult<()> {
        for item in sale_items {
            let returned = self
                .db
                .refunds()
                .completed_refunded_quantity(&mut *conn, &item.id)
                .await?;
            if returned < item.quantity {
                return Ok(());
            }
        }

        self.db.sales().mark_refunded(&mut *conn, sale_id).await?;
        info!(sale_id, "Sale fully refunded");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
