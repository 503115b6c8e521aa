//! # Sale Workflow
//!
//! Builds and commits a complete sale from a validated draft.
//!
//! ## What Happens in One Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         create_sale(draft)                              │
//! │                                                                         │
//! │  BEFORE TX   validate draft, load products and customer, price lines   │
//! │                                                                         │
//! │  IN ONE TX   issue POS- and RCP- numbers (day-scoped sequence)         │
//! │              insert sale header + line items + payments                │
//! │              deduct inventory per line (ledger + projection)           │
//! │              enqueue accounting outbox row                             │
//! │              ── COMMIT ──                                               │
//! │                                                                         │
//! │  AFTER TX    dispatch side effects: loyalty, promotion usage,          │
//! │              receipt email, materials deduction                        │
//! │                                                                         │
//! │  A deduction that would oversell aborts the whole transaction: no     │
//! │  sale row, no ledger entry, no outbox row, and the issued numbers     │
//! │  roll back with it.                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use chrono::Utc;
use meridian_core::{
    CoreError, Money, Payment, PaymentStatus, Product, Sale, SaleDraft, SaleLineItem, SaleStatus,
    TransactionType, ValidationError,
};
use meridian_db::{Database, DbError, StockAdjustment};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::tasks::{SideEffect, SideEffectQueue};

// =============================================================================
// Result Type
// =============================================================================

/// A committed sale with its lines and payments.
#[derive(Debug, Clone)]
pub struct CompletedSale {
    pub sale: Sale,
    pub items: Vec<SaleLineItem>,
    pub payments: Vec<Payment>,
}

// One priced line, before persistence
struct PricedLine {
    product: Product,
    quantity: i64,
    unit_price_cents: i64,
    discount_cents: i64,
    tax_cents: i64,
    line_total_cents: i64,
}

// =============================================================================
// Sale Manager
// =============================================================================

/// Orchestrates the sale workflow.
#[derive(Clone)]
pub struct SaleManager {
    db: Arc<Database>,
    config: Arc<EngineConfig>,
    effects: SideEffectQueue,
}

impl SaleManager {
    pub fn new(db: Arc<Database>, config: Arc<EngineConfig>, effects: SideEffectQueue) -> Self {
        SaleManager { db, config, effects }
    }

    /// Creates and commits a sale.
    #[instrument(skip(self, draft), fields(store_id = %draft.store_id, cashier_id = %draft.cashier_id))]
    pub async fn create_sale(&self, draft: SaleDraft) -> EngineResult<CompletedSale> {
        meridian_core::validate_sale_draft(&draft)?;

        let customer = match draft.customer_id.as_deref() {
            Some(id) => Some(
                self.db
                    .customers()
                    .get_by_id(id)
                    .await
                    .map_err(|_| CoreError::CustomerNotFound(id.to_string()))?,
            ),
            None => None,
        };

        let lines = self.price_lines(&draft).await?;

        let subtotal: i64 = lines
            .iter()
            .map(|l| l.unit_price_cents * l.quantity)
            .sum();
        let line_discounts: i64 = lines.iter().map(|l| l.discount_cents).sum();
        let discount = line_discounts + draft.discount_cents;
        let tax: i64 = lines.iter().map(|l| l.tax_cents).sum();
        let total = subtotal - discount + tax;

        let amount_paid: i64 = draft.payments.iter().map(|p| p.amount_cents).sum();
        let change = match draft.payment_status {
            PaymentStatus::Paid => {
                if amount_paid < total {
                    return Err(CoreError::InvalidPaymentAmount {
                        reason: format!(
                            "paid {} is less than total {}",
                            Money::from_cents(amount_paid),
                            Money::from_cents(total)
                        ),
                    }
                    .into());
                }
                amount_paid - total
            }
            PaymentStatus::Partial | PaymentStatus::Unpaid => 0,
        };

        let sale_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let day = now.date_naive();

        let mut tx = self.db.pool().begin().await?;

        let sale_number = self.db.sequences().issue(&mut tx, "POS", day).await?;
        let receipt_number = self.db.sequences().issue(&mut tx, "RCP", day).await?;

        let sale = Sale {
            id: sale_id.clone(),
            sale_number: sale_number.clone(),
            receipt_number,
            store_id: draft.store_id.clone(),
            cashier_id: draft.cashier_id.clone(),
            customer_id: draft.customer_id.clone(),
            status: SaleStatus::Completed,
            payment_status: draft.payment_status,
            subtotal_cents: subtotal,
            discount_cents: discount,
            tax_cents: tax,
            total_cents: total,
            amount_paid_cents: amount_paid,
            change_cents: change,
            synced_to_accounting: false,
            synced_at: None,
            created_at: now,
        };
        self.db.sales().insert_sale(&mut tx, &sale).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = SaleLineItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                product_id: line.product.id.clone(),
                sku_snapshot: line.product.sku.clone(),
                name_snapshot: line.product.name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                discount_cents: line.discount_cents,
                tax_cents: line.tax_cents,
                line_total_cents: line.line_total_cents,
                cost_cents: line.product.cost_cents,
            };
            self.db.sales().insert_item(&mut tx, &item).await?;

            if line.product.track_inventory {
                let adjustment = StockAdjustment {
                    store_id: &draft.store_id,
                    product_id: &line.product.id,
                    quantity_delta: -line.quantity,
                    transaction_type: TransactionType::Sale,
                    reference_type: "pos_sale",
                    reference_id: &sale_number,
                    unit_cost_cents: line.product.cost_cents,
                    remarks: None,
                    performed_by: &draft.cashier_id,
                };
                match self.db.inventory().adjust(&mut tx, adjustment).await {
                    Ok(_) => {}
                    Err(DbError::StockDepleted { available, requested, .. }) => {
                        // Dropping the transaction rolls everything back
                        return Err(CoreError::InsufficientStock {
                            sku: line.product.sku.clone(),
                            available,
                            requested,
                        }
                        .into());
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            items.push(item);
        }

        let mut payments = Vec::with_capacity(draft.payments.len());
        for p in &draft.payments {
            let payment = Payment {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                method: p.method,
                amount_cents: p.amount_cents,
                reference: p.reference.clone(),
                received_at: now,
            };
            self.db.sales().insert_payment(&mut tx, &payment).await?;
            payments.push(payment);
        }

        let payload = serde_json::to_string(&sale)?;
        self.db
            .outbox()
            .enqueue(&mut tx, Some(&sale_id), "pos_sale", &sale_number, &payload)
            .await?;

        tx.commit().await?;

        info!(
            sale_number = %sale.sale_number,
            total_cents = total,
            items = items.len(),
            "Sale committed"
        );

        self.dispatch_side_effects(&sale, customer.as_ref(), draft.promotion_id.as_deref())
            .await;

        Ok(CompletedSale { sale, items, payments })
    }

    async fn price_lines(&self, draft: &SaleDraft) -> EngineResult<Vec<PricedLine>> {
        let mut lines = Vec::with_capacity(draft.items.len());

        for item in &draft.items {
            let product = self.db.products().get_by_id(&item.product_id).await.map_err(|_| {
                CoreError::ProductNotFound(item.product_id.clone())
            })?;
            if !product.is_active {
                return Err(CoreError::Validation(ValidationError::InvalidFormat {
                    field: "product_id".to_string(),
                    reason: format!("product {} is inactive", product.sku),
                })
                .into());
            }

            let unit_price = item.unit_price_cents.unwrap_or(product.price_cents);
            let line_subtotal = unit_price * item.quantity;
            let taxable = Money::from_cents(line_subtotal - item.discount_cents)
                .clamp_non_negative();
            let tax = taxable.calculate_tax(product.tax_rate());

            lines.push(PricedLine {
                quantity: item.quantity,
                unit_price_cents: unit_price,
                discount_cents: item.discount_cents,
                tax_cents: tax.cents(),
                line_total_cents: (taxable + tax).cents(),
                product,
            });
        }

        Ok(lines)
    }

    async fn dispatch_side_effects(
        &self,
        sale: &Sale,
        customer: Option<&meridian_core::Customer>,
        promotion_id: Option<&str>,
    ) {
        if self.config.loyalty.enabled {
            if let Some(customer) = customer {
                let points = sale.total_cents / self.config.loyalty.cents_per_point;
                if points > 0 {
                    self.effects
                        .dispatch(SideEffect::EarnLoyalty {
                            customer_id: customer.id.clone(),
                            points,
                        })
                        .await;
                }
            }
        }

        if let Some(email) = customer.and_then(|c| c.email.clone()) {
            self.effects
                .dispatch(SideEffect::EmailReceipt {
                    sale_id: sale.id.clone(),
                    recipient: email,
                })
                .await;
        }

        if let Some(promotion_id) = promotion_id {
            self.effects
                .dispatch(SideEffect::RecordPromotionUsage {
                    promotion_id: promotion_id.to_string(),
                    sale_id: sale.id.clone(),
                    customer_id: sale.customer_id.clone(),
                    discount_cents: sale.discount_cents,
                })
                .await;
        }

        self.effects
            .dispatch(SideEffect::DeductMaterials {
                sale_id: sale.id.clone(),
            })
            .await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{PaymentDraft, PaymentMethod, SaleItemDraft};
    use meridian_db::DbConfig;

    async fn setup() -> (Arc<Database>, SaleManager) {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let config = Arc::new(EngineConfig::default());
        let manager = SaleManager::new(db.clone(), config, SideEffectQueue::detached());
        (db, manager)
    }

    async fn seed_product(db: &Database, id: &str, sku: &str, price: i64, tax_bps: i64, stock: i64) {
        db.products()
            .insert(&Product {
                id: id.into(),
                sku: sku.into(),
                name: format!("{} (test)", sku),
                price_cents: price,
                cost_cents: Some(price / 2),
                tax_rate_bps: tax_bps,
                track_inventory: true,
                allow_negative_stock: false,
                master_stock: 0,
                is_active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        if stock > 0 {
            db.inventory()
                .adjust_standalone(StockAdjustment {
                    store_id: "store-1",
                    product_id: id,
                    quantity_delta: stock,
                    transaction_type: TransactionType::Purchase,
                    reference_type: "grn",
                    reference_id: "GRN-SEED",
                    unit_cost_cents: Some(price / 2),
                    remarks: None,
                    performed_by: "seeder",
                })
                .await
                .unwrap();
        }
    }

    fn draft(items: Vec<SaleItemDraft>, payments: Vec<PaymentDraft>) -> SaleDraft {
        SaleDraft {
            store_id: "store-1".into(),
            cashier_id: "cashier-1".into(),
            customer_id: None,
            items,
            payments,
            discount_cents: 0,
            promotion_id: None,
            payment_status: PaymentStatus::Paid,
        }
    }

    fn line(product_id: &str, quantity: i64) -> SaleItemDraft {
        SaleItemDraft {
            product_id: product_id.into(),
            quantity,
            unit_price_cents: None,
            discount_cents: 0,
        }
    }

    fn cash(amount: i64) -> PaymentDraft {
        PaymentDraft {
            method: PaymentMethod::Cash,
            amount_cents: amount,
            reference: None,
        }
    }

    #[tokio::test]
    async fn test_two_line_cash_sale_totals_and_change() {
        let (db, manager) = setup().await;
        seed_product(&db, "p1", "WIDGET", 1000, 500, 10).await;
        seed_product(&db, "p2", "GADGET", 2500, 500, 10).await;

        // 3 x 10.00 + 1 x 25.00 at 5% tax, 60.00 tendered in cash
        let completed = manager
            .create_sale(draft(
                vec![line("p1", 3), line("p2", 1)],
                vec![cash(6000)],
            ))
            .await
            .unwrap();

        let sale = &completed.sale;
        assert_eq!(sale.subtotal_cents, 5500);
        assert_eq!(sale.tax_cents, 275);
        assert_eq!(sale.total_cents, 5775);
        assert_eq!(sale.change_cents, 225);
        assert!(sale.is_balanced());
        assert!(sale.sale_number.starts_with("POS-"));
        assert!(sale.receipt_number.starts_with("RCP-"));

        // Inventory moved and the ledger agrees with the projection
        let level = db.inventory().get_level("store-1", "p1").await.unwrap().unwrap();
        assert_eq!(level.quantity_on_hand, 7);
        assert_eq!(db.inventory().ledger_sum("store-1", "p1").await.unwrap(), 7);

        // The posting intent landed in the same commit
        let entry = db
            .outbox()
            .get_by_reference(&sale.sale_number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.sale_id.as_deref(), Some(sale.id.as_str()));
    }

    #[tokio::test]
    async fn test_oversell_rolls_back_everything() {
        let (db, manager) = setup().await;
        seed_product(&db, "p1", "WIDGET", 1000, 0, 5).await;

        let err = manager
            .create_sale(draft(vec![line("p1", 8)], vec![cash(8000)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Core(CoreError::InsufficientStock {
                available: 5,
                requested: 8,
                ..
            })
        ));

        // No sale, no ledger movement, no outbox row, number released
        assert_eq!(db.inventory().ledger_sum("store-1", "p1").await.unwrap(), 5);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
        assert_eq!(
            db.sequences().current("POS", Utc::now().date_naive()).await.unwrap(),
            0
        );

        // And the stock is still sellable
        let completed = manager
            .create_sale(draft(vec![line("p1", 5)], vec![cash(5000)]))
            .await
            .unwrap();
        assert!(completed.sale.sale_number.ends_with("-0001"));
    }

    #[tokio::test]
    async fn test_sequential_sales_cannot_both_oversell() {
        let (db, manager) = setup().await;
        seed_product(&db, "p1", "WIDGET", 1000, 0, 5).await;

        // Two sales of 3 against a stock of 5: exactly one succeeds
        let first = manager
            .create_sale(draft(vec![line("p1", 3)], vec![cash(3000)]))
            .await;
        let second = manager
            .create_sale(draft(vec![line("p1", 3)], vec![cash(3000)]))
            .await;

        assert!(first.is_ok());
        assert!(second.is_err());
        let level = db.inventory().get_level("store-1", "p1").await.unwrap().unwrap();
        assert_eq!(level.quantity_on_hand, 2);
    }

    #[tokio::test]
    async fn test_underpayment_is_rejected() {
        let (db, manager) = setup().await;
        seed_product(&db, "p1", "WIDGET", 1000, 0, 5).await;

        let err = manager
            .create_sale(draft(vec![line("p1", 2)], vec![cash(1500)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Core(CoreError::InvalidPaymentAmount { .. })
        ));
    }

    #[tokio::test]
    async fn test_line_discount_reduces_taxable_amount() {
        let (db, manager) = setup().await;
        seed_product(&db, "p1", "WIDGET", 1000, 500, 10).await;

        // 2 x 10.00 with a 5.00 line discount: tax on 15.00 is 0.75
        let mut d = draft(vec![line("p1", 2)], vec![cash(2000)]);
        d.items[0].discount_cents = 500;

        let completed = manager.create_sale(d).await.unwrap();
        assert_eq!(completed.sale.subtotal_cents, 2000);
        assert_eq!(completed.sale.discount_cents, 500);
        assert_eq!(completed.sale.tax_cents, 75);
        assert_eq!(completed.sale.total_cents, 1575);
    }

    #[tokio::test]
    async fn test_sale_numbers_are_dense_per_day() {
        let (db, manager) = setup().await;
        seed_product(&db, "p1", "WIDGET", 1000, 0, 100).await;

        let a = manager
            .create_sale(draft(vec![line("p1", 1)], vec![cash(1000)]))
            .await
            .unwrap();
        let b = manager
            .create_sale(draft(vec![line("p1", 1)], vec![cash(1000)]))
            .await
            .unwrap();

        assert!(a.sale.sale_number.ends_with("-0001"));
        assert!(b.sale.sale_number.ends_with("-0002"));
        assert_ne!(a.sale.receipt_number, b.sale.receipt_number);
    }

    #[tokio::test]
    async fn test_unknown_customer_is_rejected_before_writes() {
        let (db, manager) = setup().await;
        seed_product(&db, "p1", "WIDGET", 1000, 0, 5).await;

        let mut d = draft(vec![line("p1", 1)], vec![cash(1000)]);
        d.customer_id = Some("ghost".into());

        let err = manager.create_sale(d).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Core(CoreError::CustomerNotFound(_))
        ));
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }
}
