//! # Cross-Pool Materials Sync
//!
//! Bridges the retail catalog to the separate operations material pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Two Physical Inventories                           │
//! │                                                                         │
//! │   Retail catalog                      Operations pool                   │
//! │   (inventory_levels,                  (material_pools,                  │
//! │    products.master_stock)              material_movements)              │
//! │         │                                   ▲                           │
//! │         │  company buyer sells a mapped    │                           │
//! │         │  product → pool deducts          │                           │
//! │         └───────────────────────────────────┘                           │
//! │                                                                         │
//! │   A product participates only through an explicit mapping row.         │
//! │   Accepted material returns move stock the other way: the pool         │
//! │   gives up the accepted quantity and the catalog master stock          │
//! │   gains it, so the combined total is conserved.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sale-triggered deduction runs as a post-commit side effect: a depleted
//! pool is logged and skipped, never unwinds the sale.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chrono::Utc;
use meridian_core::{CoreError, MaterialReturn, MaterialReturnStatus, ValidationError};
use meridian_db::Database;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// The fate of one mapped sale line during a pool deduction.
#[derive(Debug, Clone)]
pub enum MaterialSyncOutcome {
    Deducted {
        material_type: String,
        quantity: i64,
        remaining: i64,
    },
    Skipped {
        material_type: String,
        quantity: i64,
        reason: String,
    },
}

/// Orchestrates deductions and returns between the catalog and the
/// operations material pool.
#[derive(Clone)]
pub struct MaterialsSync {
    db: Arc<Database>,
    config: Arc<EngineConfig>,
}

impl MaterialsSync {
    pub fn new(db: Arc<Database>, config: Arc<EngineConfig>) -> Self {
        MaterialsSync { db, config }
    }

    /// Deducts mapped materials for a committed sale, one outcome per
    /// mapped line.
    ///
    /// Gates, in order: the feature toggle, then the buyer (company
    /// customers only), then per-line mapping rows with auto-deduct on.
    /// Lines that fail the gates produce no outcome at all; a mapped line
    /// whose pool cannot cover it is reported as skipped, never as an
    /// error of the sale.
    pub async fn deduct_for_sale(&self, sale_id: &str) -> EngineResult<Vec<MaterialSyncOutcome>> {
        if !self.config.materials.enabled {
            return Ok(Vec::new());
        }

        let sale = self.db.sales().get_by_id(sale_id).await?;

        let Some(customer_id) = sale.customer_id.as_deref() else {
            debug!(sale_id, "Walk-in sale, no materials deduction");
            return Ok(Vec::new());
        };
        let customer = self.db.customers().get_by_id(customer_id).await?;
        if !customer.is_company {
            debug!(sale_id, customer_id, "Individual buyer, no materials deduction");
            return Ok(Vec::new());
        }

        let items = self.db.sales().get_items(sale_id).await?;
        let mut outcomes = Vec::new();

        for item in &items {
            let Some(mapping) = self.db.materials().mapping_for_product(&item.product_id).await?
            else {
                continue;
            };
            if !mapping.auto_deduct_on_sale {
                continue;
            }

            let mut tx = self.db.pool().begin().await?;
            let result = self
                .db
                .materials()
                .adjust_pool(
                    &mut tx,
                    &mapping.material_type,
                    -item.quantity,
                    Some(&sale.sale_number),
                    &sale.cashier_id,
                )
                .await;

            match result {
                Ok(remaining) => {
                    tx.commit().await?;
                    info!(
                        sale_number = %sale.sale_number,
                        material_type = %mapping.material_type,
                        quantity = item.quantity,
                        remaining,
                        "Material pool deducted for sale"
                    );
                    outcomes.push(MaterialSyncOutcome::Deducted {
                        material_type: mapping.material_type,
                        quantity: item.quantity,
                        remaining,
                    });
                }
                Err(e) => {
                    tx.rollback().await?;
                    warn!(
                        sale_number = %sale.sale_number,
                        material_type = %mapping.material_type,
                        quantity = item.quantity,
                        error = %e,
                        "Material pool deduction skipped"
                    );
                    outcomes.push(MaterialSyncOutcome::Skipped {
                        material_type: mapping.material_type,
                        quantity: item.quantity,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(outcomes)
    }

    /// Files a pending material return for supervisor resolution.
    pub async fn request_return(
        &self,
        material_type: &str,
        quantity: i64,
        requested_by: &str,
    ) -> EngineResult<MaterialReturn> {
        if quantity <= 0 {
            return Err(EngineError::Core(CoreError::Validation(
                ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                },
            )));
        }

        // The material must exist as a pool before anything can return to it
        if self.db.materials().get_pool(material_type).await?.is_none() {
            return Err(EngineError::Db(meridian_db::DbError::NotFound {
                entity: "MaterialPool".to_string(),
                id: material_type.to_string(),
            }));
        }

        let ret = MaterialReturn {
            id: Uuid::new_v4().to_string(),
            material_type: material_type.to_string(),
            quantity,
            status: MaterialReturnStatus::Pending,
            actual_quantity: None,
            quality_check: None,
            requested_by: requested_by.to_string(),
            resolved_by: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.db.materials().insert_return(&ret).await?;

        info!(return_id = %ret.id, material_type, quantity, "Material return requested");
        Ok(ret)
    }

    /// Accepts a pending return after inspection. The accepted quantity
    /// (which may differ from the requested one) leaves the operations pool
    /// and re-enters the catalog master stock in the same transaction.
    pub async fn accept_return(
        &self,
        return_id: &str,
        actual_quantity: i64,
        quality_check: Option<&str>,
        resolved_by: &str,
    ) -> EngineResult<MaterialReturn> {
        if actual_quantity <= 0 {
            return Err(EngineError::Core(CoreError::Validation(
                ValidationError::MustBePositive {
                    field: "actual_quantity".to_string(),
                },
            )));
        }

        let ret = self.db.materials().get_return(return_id).await?;
        if ret.status != MaterialReturnStatus::Pending {
            return Err(EngineError::Core(CoreError::MaterialReturnNotFound(
                return_id.to_string(),
            )));
        }

        let mut tx = self.db.pool().begin().await?;

        self.db
            .materials()
            .mark_return_resolved(
                &mut tx,
                return_id,
                MaterialReturnStatus::Accepted,
                Some(actual_quantity),
                quality_check,
                resolved_by,
            )
            .await?;

        self.db
            .materials()
            .adjust_pool(&mut tx, &ret.material_type, -actual_quantity, Some(return_id), resolved_by)
            .await?;

        // Conservation: what the pool gives up, the catalog gains
        if let Some(mapping) = self.db.materials().mapping_for_material(&ret.material_type).await? {
            self.db
                .products()
                .update_master_stock(&mut tx, &mapping.product_id, actual_quantity)
                .await?;
        }

        tx.commit().await?;

        info!(
            return_id,
            material_type = %ret.material_type,
            actual_quantity,
            "Material return accepted"
        );
        self.db.materials().get_return(return_id).await.map_err(Into::into)
    }

    /// Rejects a pending return. No stock moves.
    ///
    /// The quality-check note records why.
    pub async fn reject_return(
        &self,
        return_id: &str,
        quality_check: &str,
        resolved_by: &str,
    ) -> EngineResult<MaterialReturn> {
        let mut tx = self.db.pool().begin().await?;
        self.db
            .materials()
            .mark_return_resolved(
                &mut tx,
                return_id,
                MaterialReturnStatus::Rejected,
                None,
                Some(quality_check),
                resolved_by,
            )
            .await?;
        tx.commit().await?;

        info!(return_id, "Material return rejected");
        self.db.materials().get_return(return_id).await.map_err(Into::into)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{
        Customer, MaterialMapping, MaterialPool, Payment, PaymentMethod, PaymentStatus, Product,
        Sale, SaleLineItem, SaleStatus,
    };
    use meridian_db::DbConfig;

    async fn setup() -> (Arc<Database>, MaterialsSync) {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let config = Arc::new(EngineConfig::default());
        let sync = MaterialsSync::new(db.clone(), config);

        db.products()
            .insert(&Product {
                id: "p1".into(),
                sku: "SAND-F".into(),
                name: "Fine Sand (per bag)".into(),
                price_cents: 800,
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

        db.materials()
            .insert_mapping(&MaterialMapping {
                id: "m1".into(),
                material_type: "sand_fine".into(),
                product_id: "p1".into(),
                auto_deduct_on_sale: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        db.materials()
            .insert_pool(&MaterialPool {
                id: "pool-1".into(),
                material_type: "sand_fine".into(),
                material_name: "Fine Sand".into(),
                quantity_remaining: 100,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        (db, sync)
    }

    async fn insert_customer(db: &Database, id: &str, is_company: bool) {
        db.customers()
            .insert(&Customer {
                id: id.into(),
                name: "Acme Drilling Ltd".into(),
                email: None,
                is_company,
                loyalty_points: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    async fn insert_sale(db: &Database, sale_id: &str, customer_id: Option<&str>, quantity: i64) {
        let mut tx = db.pool().begin().await.unwrap();
        db.sales()
            .insert_sale(
                &mut tx,
                &Sale {
                    id: sale_id.into(),
                    sale_number: format!("POS-20260827-{}", sale_id),
                    receipt_number: format!("RCP-{}", sale_id),
                    store_id: "store-1".into(),
                    cashier_id: "cashier-1".into(),
                    customer_id: customer_id.map(String::from),
                    status: SaleStatus::Completed,
                    payment_status: PaymentStatus::Paid,
                    subtotal_cents: quantity * 800,
                    discount_cents: 0,
                    tax_cents: 0,
                    total_cents: quantity * 800,
                    amount_paid_cents: quantity * 800,
                    change_cents: 0,
                    synced_to_accounting: false,
                    synced_at: None,
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        db.sales()
            .insert_item(
                &mut tx,
                &SaleLineItem {
                    id: format!("{}-line-1", sale_id),
                    sale_id: sale_id.into(),
                    product_id: "p1".into(),
                    sku_snapshot: "SAND-F".into(),
                    name_snapshot: "Fine Sand (per bag)".into(),
                    quantity,
                    unit_price_cents: 800,
                    discount_cents: 0,
                    tax_cents: 0,
                    line_total_cents: quantity * 800,
                    cost_cents: Some(500),
                },
            )
            .await
            .unwrap();
        db.sales()
            .insert_payment(
                &mut tx,
                &Payment {
                    id: format!("{}-pay-1", sale_id),
                    sale_id: sale_id.into(),
                    method: PaymentMethod::Cash,
                    amount_cents: quantity * 800,
                    reference: None,
                    received_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_company_sale_deducts_pool() {
        let (db, sync) = setup().await;
        insert_customer(&db, "c1", true).await;
        insert_sale(&db, "s1", Some("c1"), 30).await;

        let outcomes = sync.deduct_for_sale("s1").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            MaterialSyncOutcome::Deducted { quantity: 30, remaining: 70, .. }
        ));

        let pool = db.materials().get_pool("sand_fine").await.unwrap().unwrap();
        assert_eq!(pool.quantity_remaining, 70);
    }

    #[tokio::test]
    async fn test_individual_buyer_is_gated() {
        let (db, sync) = setup().await;
        insert_customer(&db, "c1", false).await;
        insert_sale(&db, "s1", Some("c1"), 30).await;

        assert!(sync.deduct_for_sale("s1").await.unwrap().is_empty());
        let pool = db.materials().get_pool("sand_fine").await.unwrap().unwrap();
        assert_eq!(pool.quantity_remaining, 100);
    }

    #[tokio::test]
    async fn test_walk_in_sale_is_gated() {
        let (db, sync) = setup().await;
        insert_sale(&db, "s1", None, 30).await;

        assert!(sync.deduct_for_sale("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_depleted_pool_skips_without_failing() {
        let (db, sync) = setup().await;
        insert_customer(&db, "c1", true).await;
        insert_sale(&db, "s1", Some("c1"), 500).await;

        // Pool holds 100, the sale needs 500: the deduction is skipped
        let outcomes = sync.deduct_for_sale("s1").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], MaterialSyncOutcome::Skipped { .. }));
        let pool = db.materials().get_pool("sand_fine").await.unwrap().unwrap();
        assert_eq!(pool.quantity_remaining, 100);
    }

    #[tokio::test]
    async fn test_accepted_return_conserves_total() {
        let (db, sync) = setup().await;

        let ret = sync.request_return("sand_fine", 10, "cashier-1").await.unwrap();
        assert_eq!(ret.status, MaterialReturnStatus::Pending);

        // Inspection finds 8 of the requested 10 usable
        let resolved = sync
            .accept_return(&ret.id, 8, Some("two bags water damaged"), "supervisor-1")
            .await
            .unwrap();
        assert_eq!(resolved.status, MaterialReturnStatus::Accepted);
        assert_eq!(resolved.actual_quantity, Some(8));

        let pool = db.materials().get_pool("sand_fine").await.unwrap().unwrap();
        assert_eq!(pool.quantity_remaining, 92);
        assert_eq!(db.products().get_by_id("p1").await.unwrap().master_stock, 8);
    }

    #[tokio::test]
    async fn test_rejected_return_moves_nothing() {
        let (db, sync) = setup().await;

        let ret = sync.request_return("sand_fine", 10, "cashier-1").await.unwrap();
        let resolved = sync
            .reject_return(&ret.id, "contaminated batch", "supervisor-1")
            .await
            .unwrap();

        assert_eq!(resolved.status, MaterialReturnStatus::Rejected);
        let pool = db.materials().get_pool("sand_fine").await.unwrap().unwrap();
        assert_eq!(pool.quantity_remaining, 100);
        assert_eq!(db.products().get_by_id("p1").await.unwrap().master_stock, 0);
    }
}
