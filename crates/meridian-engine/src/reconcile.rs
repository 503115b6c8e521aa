//! # Reconciliation Sweep
//!
//! Periodic audit that re-walks committed state and reports anything that
//! drifted from the contracts the write paths are supposed to keep:
//!
//! * every completed sale has an accounting posting intent
//! * no posting intent is stalled past its retry budget
//! * every sale's arithmetic balances
//! * every inventory projection equals its ledger sum
//!
//! Missing outbox rows are the one finding the sweep repairs itself: the
//! enqueue is idempotent on the reference, so re-enqueueing can never
//! produce a duplicate posting.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use chrono::{DateTime, Utc};
use meridian_db::Database;

use crate::error::EngineResult;
use crate::outbox::MAX_RETRY_ATTEMPTS;

// =============================================================================
// Findings
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    /// Completed sale with no outbox row at all.
    MissingPosting,
    /// Outbox entry that exhausted its retry budget.
    StalledPosting,
    /// Sale whose totals do not add up.
    UnbalancedSale,
    /// Inventory projection that disagrees with its ledger sum.
    LedgerDrift,
}

/// One observed discrepancy.
#[derive(Debug, Clone)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub reference_id: String,
    pub message: String,
    pub auto_fixable: bool,
    pub requires_manual_review: bool,
}

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub findings: Vec<Finding>,
    pub sales_checked: usize,
    pub postings_enqueued: usize,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

// =============================================================================
// Sweep
// =============================================================================

/// Audits committed sales, outbox state and inventory conservation.
#[derive(Clone)]
pub struct ReconciliationSweep {
    db: Arc<Database>,
}

impl ReconciliationSweep {
    pub fn new(db: Arc<Database>) -> Self {
        ReconciliationSweep { db }
    }

    /// Runs one sweep over everything committed since `since`.
    #[instrument(skip(self))]
    pub async fn sweep(&self, since: DateTime<Utc>) -> EngineResult<ReconciliationReport> {
        let mut report = ReconciliationReport::default();

        self.check_sales(since, &mut report).await?;
        self.check_inventory(&mut report).await?;

        if report.is_clean() {
            info!(sales_checked = report.sales_checked, "Reconciliation sweep clean");
        } else {
            warn!(
                sales_checked = report.sales_checked,
                findings = report.findings.len(),
                enqueued = report.postings_enqueued,
                "Reconciliation sweep found discrepancies"
            );
        }

        Ok(report)
    }

    async fn check_sales(
        &self,
        since: DateTime<Utc>,
        report: &mut ReconciliationReport,
    ) -> EngineResult<()> {
        let sales = self.db.sales().completed_since(since).await?;
        report.sales_checked = sales.len();

        for sale in &sales {
            if !sale.is_balanced() {
                report.findings.push(Finding {
                    kind: FindingKind::UnbalancedSale,
                    severity: Severity::Error,
                    reference_id: sale.sale_number.clone(),
                    message: format!(
                        "subtotal {} - discount {} + tax {} != total {}",
                        sale.subtotal_cents, sale.discount_cents, sale.tax_cents, sale.total_cents
                    ),
                    auto_fixable: false,
                    requires_manual_review: true,
                });
            }

            match self.db.outbox().get_by_reference(&sale.sale_number).await? {
                None => {
                    // Repair: re-enqueue; idempotent on the reference
                    let payload = serde_json::to_string(sale)?;
                    let mut tx = self.db.pool().begin().await?;
                    self.db
                        .outbox()
                        .enqueue(&mut tx, Some(&sale.id), "pos_sale", &sale.sale_number, &payload)
                        .await?;
                    tx.commit().await?;
                    report.postings_enqueued += 1;

                    report.findings.push(Finding {
                        kind: FindingKind::MissingPosting,
                        severity: Severity::Warning,
                        reference_id: sale.sale_number.clone(),
                        message: "completed sale had no posting intent, re-enqueued".to_string(),
                        auto_fixable: true,
                        requires_manual_review: false,
                    });
                }
                Some(entry) if entry.attempts >= MAX_RETRY_ATTEMPTS => {
                    report.findings.push(Finding {
                        kind: FindingKind::StalledPosting,
                        severity: Severity::Error,
                        reference_id: sale.sale_number.clone(),
                        message: format!(
                            "posting stalled after {} attempts: {}",
                            entry.attempts,
                            entry.last_error.as_deref().unwrap_or("unknown error")
                        ),
                        auto_fixable: false,
                        requires_manual_review: true,
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    async fn check_inventory(&self, report: &mut ReconciliationReport) -> EngineResult<()> {
        for level in self.db.inventory().all_levels().await? {
            let ledger_sum = self
                .db
                .inventory()
                .ledger_sum(&level.store_id, &level.product_id)
                .await?;

            if ledger_sum != level.quantity_on_hand {
                report.findings.push(Finding {
                    kind: FindingKind::LedgerDrift,
                    severity: Severity::Error,
                    reference_id: format!("{}/{}", level.store_id, level.product_id),
                    message: format!(
                        "projection {} != ledger sum {}",
                        level.quantity_on_hand, ledger_sum
                    ),
                    auto_fixable: false,
                    requires_manual_review: true,
                });
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::sale::SaleManager;
    use crate::tasks::SideEffectQueue;
    use meridian_core::{
        PaymentDraft, PaymentMethod, PaymentStatus, Product, SaleDraft, SaleItemDraft,
        TransactionType,
    };
    use meridian_db::{DbConfig, StockAdjustment};

    async fn setup() -> (Arc<Database>, SaleManager, ReconciliationSweep) {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let config = Arc::new(EngineConfig::default());
        let sales = SaleManager::new(db.clone(), config, SideEffectQueue::detached());
        let sweep = ReconciliationSweep::new(db.clone());

        db.products()
            .insert(&Product {
                id: "p1".into(),
                sku: "ITEM".into(),
                name: "Item".into(),
                price_cents: 1000,
                cost_cents: Some(500),
                tax_rate_bps: 0,
                track_inventory: true,
                allow_negative_stock: false,
                master_stock: 0,
                is_active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        db.inventory()
            .adjust_standalone(StockAdjustment {
                store_id: "store-1",
                product_id: "p1",
                quantity_delta: 50,
                transaction_type: TransactionType::Purchase,
                reference_type: "grn",
                reference_id: "GRN-SEED",
                unit_cost_cents: Some(500),
                remarks: None,
                performed_by: "seeder",
            })
            .await
            .unwrap();

        (db, sales, sweep)
    }

    async fn sell(sales: &SaleManager, quantity: i64) -> crate::sale::CompletedSale {
        sales
            .create_sale(SaleDraft {
                store_id: "store-1".into(),
                cashier_id: "cashier-1".into(),
                customer_id: None,
                items: vec![SaleItemDraft {
                    product_id: "p1".into(),
                    quantity,
                    unit_price_cents: None,
                    discount_cents: 0,
                }],
                payments: vec![PaymentDraft {
                    method: PaymentMethod::Cash,
                    amount_cents: quantity * 1000,
                    reference: None,
                }],
                discount_cents: 0,
                promotion_id: None,
                payment_status: PaymentStatus::Paid,
            })
            .await
            .unwrap()
    }

    fn hour_ago() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn test_healthy_state_is_clean() {
        let (_db, sales, sweep) = setup().await;
        sell(&sales, 2).await;
        sell(&sales, 3).await;

        let report = sweep.sweep(hour_ago()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.sales_checked, 2);
        assert_eq!(report.postings_enqueued, 0);
    }

    #[tokio::test]
    async fn test_missing_posting_is_repaired() {
        let (db, sales, sweep) = setup().await;
        let sold = sell(&sales, 2).await;

        // Simulate a lost outbox row
        sqlx::query("DELETE FROM accounting_outbox WHERE reference_id = ?1")
            .bind(&sold.sale.sale_number)
            .execute(db.pool())
            .await
            .unwrap();

        let report = sweep.sweep(hour_ago()).await.unwrap();
        assert_eq!(report.postings_enqueued, 1);
        assert_eq!(report.findings.len(), 1);
        let finding = &report.findings[0];
        assert_eq!(finding.kind, FindingKind::MissingPosting);
        assert!(finding.auto_fixable);
        assert!(!finding.requires_manual_review);

        // Repaired: the intent exists again and a second sweep is clean
        assert!(db
            .outbox()
            .get_by_reference(&sold.sale.sale_number)
            .await
            .unwrap()
            .is_some());
        assert!(sweep.sweep(hour_ago()).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_stalled_posting_is_flagged_for_operator() {
        let (db, sales, sweep) = setup().await;
        let sold = sell(&sales, 1).await;

        let entry = db
            .outbox()
            .get_by_reference(&sold.sale.sale_number)
            .await
            .unwrap()
            .unwrap();
        for _ in 0..MAX_RETRY_ATTEMPTS {
            db.outbox()
                .mark_status(&entry.id, meridian_core::OutboxStatus::Error, Some("timeout"))
                .await
                .unwrap();
        }

        let report = sweep.sweep(hour_ago()).await.unwrap();
        assert_eq!(report.findings.len(), 1);
        let finding = &report.findings[0];
        assert_eq!(finding.kind, FindingKind::StalledPosting);
        assert_eq!(finding.severity, Severity::Error);
        assert!(finding.requires_manual_review);
        assert!(!finding.auto_fixable);
    }

    #[tokio::test]
    async fn test_ledger_drift_is_detected() {
        let (db, sales, sweep) = setup().await;
        sell(&sales, 2).await;

        // Corrupt the projection directly, bypassing the write path
        sqlx::query(
            "UPDATE inventory_levels SET quantity_on_hand = 999 WHERE product_id = 'p1'",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let report = sweep.sweep(hour_ago()).await.unwrap();
        let drift: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::LedgerDrift)
            .collect();
        assert_eq!(drift.len(), 1);
        assert!(drift[0].message.contains("999"));
    }
}
