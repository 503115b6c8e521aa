//! # Inventory Repository (Projection + Stock Ledger)
//!
//! The one write path for stock. Every movement goes through [`adjust`],
//! which keeps three things consistent inside the caller's transaction:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     One Stock Adjustment                                │
//! │                                                                         │
//! │  adjust(conn, StockAdjustment { delta, type, reference, ... })         │
//! │       │                                                                 │
//! │       ├── 1. inventory_levels: ensure row, apply delta                 │
//! │       │      (guarded: sale/return_out refuse to go negative           │
//! │       │       unless the product allows backorder)                     │
//! │       │                                                                 │
//! │       ├── 2. average_cost: weighted-moving-average on positive         │
//! │       │      deltas that carry a unit cost; unchanged on deductions    │
//! │       │                                                                 │
//! │       ├── 3. stock_ledger: append the same delta (source of truth)     │
//! │       │                                                                 │
//! │       └── 4. products.master_stock: catalog bridge propagation         │
//! │                                                                         │
//! │  All four in the SAME transaction. A crash between them cannot leave   │
//! │  the projection diverged from the ledger: for any (store, product),    │
//! │  SUM(stock_ledger.quantity_delta) == inventory_levels.quantity_on_hand │
//! │  at every committed state.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`adjust`]: InventoryRepository::adjust

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use meridian_core::{InventoryLevel, StockLedgerEntry, TransactionType};

use crate::error::{DbError, DbResult};
use crate::repository::product::ProductRepository;

// =============================================================================
// Adjustment Request
// =============================================================================

/// One requested stock movement.
#[derive(Debug, Clone)]
pub struct StockAdjustment<'a> {
    pub store_id: &'a str,
    pub product_id: &'a str,
    /// Signed delta: negative for sale deductions, positive for receipts
    /// and return restorations.
    pub quantity_delta: i64,
    pub transaction_type: TransactionType,
    /// Where the movement came from, e.g. ("pos_sale", sale_number).
    pub reference_type: &'a str,
    pub reference_id: &'a str,
    /// Unit cost for positive deltas; feeds the weighted average.
    pub unit_cost_cents: Option<i64>,
    pub remarks: Option<&'a str>,
    pub performed_by: &'a str,
}

// =============================================================================
// Inventory Repository
// =============================================================================

/// Repository for `inventory_levels` and `stock_ledger`.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Applies a stock adjustment inside the caller's transaction and
    /// returns the appended ledger entry id.
    ///
    /// On any error the caller must roll back; a partial adjustment
    /// (projection moved but no ledger row, or vice versa) must never
    /// reach a committed state.
    pub async fn adjust(
        &self,
        conn: &mut SqliteConnection,
        adj: StockAdjustment<'_>,
    ) -> DbResult<String> {
        self.ensure_row(conn, adj.store_id, adj.product_id).await?;

        let level = self.get_level_in_tx(conn, adj.store_id, adj.product_id).await?;

        // Weighted average moves only when stock comes IN at a known cost
        let new_average = match adj.unit_cost_cents {
            Some(unit_cost) if adj.quantity_delta > 0 => {
                level.blended_cost(adj.quantity_delta, unit_cost)
            }
            _ => level.average_cost_cents,
        };

        // Outbound sale/return movements respect the product's backorder
        // opt-in; corrections and transfers may go negative
        let allow_negative = if adj.transaction_type.guards_non_negative() {
            self.product_allows_negative(conn, adj.product_id).await?
        } else {
            true
        };

        let result = sqlx::query(
            r#"
            UPDATE inventory_levels
            SET quantity_on_hand = quantity_on_hand + ?3,
                average_cost_cents = ?4,
                updated_at = ?5
            WHERE store_id = ?1 AND product_id = ?2
              AND (?6 OR quantity_on_hand + ?3 >= 0)
            "#,
        )
        .bind(adj.store_id)
        .bind(adj.product_id)
        .bind(adj.quantity_delta)
        .bind(new_average)
        .bind(Utc::now())
        .bind(allow_negative)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::StockDepleted {
                product_id: adj.product_id.to_string(),
                available: level.quantity_on_hand,
                requested: adj.quantity_delta.abs(),
            });
        }

        let entry_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO stock_ledger (
                id, store_id, product_id, transaction_type,
                reference_type, reference_id, quantity_delta,
                unit_cost_cents, remarks, performed_by, performed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&entry_id)
        .bind(adj.store_id)
        .bind(adj.product_id)
        .bind(adj.transaction_type)
        .bind(adj.reference_type)
        .bind(adj.reference_id)
        .bind(adj.quantity_delta)
        .bind(adj.unit_cost_cents)
        .bind(adj.remarks)
        .bind(adj.performed_by)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        // Catalog bridge: keep the store-agnostic figure aligned
        ProductRepository::new(self.pool.clone())
            .update_master_stock(conn, adj.product_id, adj.quantity_delta)
            .await?;

        debug!(
            store_id = %adj.store_id,
            product_id = %adj.product_id,
            delta = adj.quantity_delta,
            transaction_type = ?adj.transaction_type,
            reference = %adj.reference_id,
            "Stock adjusted"
        );

        Ok(entry_id)
    }

    /// Standalone adjustment in its own transaction, for manual corrections
    /// and procurement receipts that are not part of a larger write.
    pub async fn adjust_standalone(&self, adj: StockAdjustment<'_>) -> DbResult<String> {
        let mut tx = self.pool.begin().await?;
        let entry_id = self.adjust(&mut tx, adj).await?;
        tx.commit().await?;
        Ok(entry_id)
    }

    /// Creates the zero projection row if absent.
    async fn ensure_row(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        product_id: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO inventory_levels (
                id, store_id, product_id, quantity_on_hand,
                average_cost_cents, reorder_level, updated_at
            )
            VALUES (?1, ?2, ?3, 0, 0, 0, ?4)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(store_id)
        .bind(product_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn get_level_in_tx(
        &self,
        conn: &mut SqliteConnection,
        store_id: &str,
        product_id: &str,
    ) -> DbResult<InventoryLevel> {
        sqlx::query_as::<_, InventoryLevel>(
            "SELECT * FROM inventory_levels WHERE store_id = ?1 AND product_id = ?2",
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("InventoryLevel", product_id))
    }

    async fn product_allows_negative(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT allow_negative_stock FROM products WHERE id = ?1",
        )
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Product", product_id))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current projection for (store, product); `None` before any movement.
    pub async fn get_level(
        &self,
        store_id: &str,
        product_id: &str,
    ) -> DbResult<Option<InventoryLevel>> {
        let level = sqlx::query_as::<_, InventoryLevel>(
            "SELECT * FROM inventory_levels WHERE store_id = ?1 AND product_id = ?2",
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(level)
    }

    /// Ledger history for (store, product) in commit order.
    pub async fn ledger_for(
        &self,
        store_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<StockLedgerEntry>> {
        let entries = sqlx::query_as::<_, StockLedgerEntry>(
            r#"
            SELECT * FROM stock_ledger
            WHERE store_id = ?1 AND product_id = ?2
            ORDER BY performed_at ASC, id ASC
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Sum of all ledger deltas for (store, product).
    ///
    /// By the conservation contract this always equals the projection's
    /// quantity_on_hand; exposed so callers (and tests) can verify it.
    /// Every projection row. Used by the reconciliation sweep to audit the
    /// conservation contract across the whole store.
    pub async fn all_levels(&self) -> DbResult<Vec<InventoryLevel>> {
        let levels = sqlx::query_as::<_, InventoryLevel>(
            "SELECT * FROM inventory_levels ORDER BY store_id, product_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(levels)
    }

    pub async fn ledger_sum(&self, store_id: &str, product_id: &str) -> DbResult<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(quantity_delta) FROM stock_ledger
            WHERE store_id = ?1 AND product_id = ?2
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum.unwrap_or(0))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use meridian_core::Product;

    async fn setup(allow_negative: bool) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products()
            .insert(&Product {
                id: "p1".into(),
                sku: "GRAVEL-20".into(),
                name: "Gravel 20mm".into(),
                price_cents: 1000,
                cost_cents: Some(600),
                tax_rate_bps: 500,
                track_inventory: true,
                allow_negative_stock: allow_negative,
                master_stock: 0,
                is_active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        db
    }

    fn purchase(delta: i64, cost: i64) -> StockAdjustment<'static> {
        StockAdjustment {
            store_id: "store-1",
            product_id: "p1",
            quantity_delta: delta,
            transaction_type: TransactionType::Purchase,
            reference_type: "grn",
            reference_id: "GRN-1",
            unit_cost_cents: Some(cost),
            remarks: None,
            performed_by: "tester",
        }
    }

    fn sale(delta: i64) -> StockAdjustment<'static> {
        StockAdjustment {
            store_id: "store-1",
            product_id: "p1",
            quantity_delta: delta,
            transaction_type: TransactionType::Sale,
            reference_type: "pos_sale",
            reference_id: "POS-20260827-0001",
            unit_cost_cents: None,
            remarks: None,
            performed_by: "tester",
        }
    }

    #[tokio::test]
    async fn test_ledger_and_projection_stay_conserved() {
        let db = setup(false).await;
        let repo = db.inventory();

        repo.adjust_standalone(purchase(10, 600)).await.unwrap();
        repo.adjust_standalone(sale(-3)).await.unwrap();
        repo.adjust_standalone(sale(-1)).await.unwrap();

        let level = repo.get_level("store-1", "p1").await.unwrap().unwrap();
        assert_eq!(level.quantity_on_hand, 6);
        assert_eq!(repo.ledger_sum("store-1", "p1").await.unwrap(), 6);

        // Catalog bridge saw every delta too
        assert_eq!(db.products().get_by_id("p1").await.unwrap().master_stock, 6);

        let entries = repo.ledger_for("store-1", "p1").await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].transaction_type, TransactionType::Purchase);
    }

    #[tokio::test]
    async fn test_weighted_average_cost() {
        let db = setup(false).await;
        let repo = db.inventory();

        // 10 @ 6.00, then 10 @ 8.00 → average 7.00
        repo.adjust_standalone(purchase(10, 600)).await.unwrap();
        repo.adjust_standalone(purchase(10, 800)).await.unwrap();

        let level = repo.get_level("store-1", "p1").await.unwrap().unwrap();
        assert_eq!(level.average_cost_cents, 700);

        // Deductions leave the average unchanged
        repo.adjust_standalone(sale(-5)).await.unwrap();
        let level = repo.get_level("store-1", "p1").await.unwrap().unwrap();
        assert_eq!(level.average_cost_cents, 700);
    }

    #[tokio::test]
    async fn test_sale_cannot_oversell() {
        let db = setup(false).await;
        let repo = db.inventory();

        repo.adjust_standalone(purchase(5, 600)).await.unwrap();

        // First deduction of 3 succeeds, second must fail: only 2 remain
        repo.adjust_standalone(sale(-3)).await.unwrap();
        let err = repo.adjust_standalone(sale(-3)).await.unwrap_err();
        assert!(matches!(err, DbError::StockDepleted { available: 2, requested: 3, .. }));

        // The failed adjustment left nothing behind
        assert_eq!(repo.ledger_sum("store-1", "p1").await.unwrap(), 2);
        let level = repo.get_level("store-1", "p1").await.unwrap().unwrap();
        assert_eq!(level.quantity_on_hand, 2);
    }

    #[tokio::test]
    async fn test_backorder_opt_in_allows_negative() {
        let db = setup(true).await;
        let repo = db.inventory();

        repo.adjust_standalone(sale(-2)).await.unwrap();

        let level = repo.get_level("store-1", "p1").await.unwrap().unwrap();
        assert_eq!(level.quantity_on_hand, -2);
        assert_eq!(repo.ledger_sum("store-1", "p1").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_correction_may_go_negative() {
        let db = setup(false).await;
        let repo = db.inventory();

        let correction = StockAdjustment {
            transaction_type: TransactionType::Adjustment,
            reference_type: "manual",
            reference_id: "ADJ-1",
            ..sale(-4)
        };
        repo.adjust_standalone(correction).await.unwrap();

        let level = repo.get_level("store-1", "p1").await.unwrap().unwrap();
        assert_eq!(level.quantity_on_hand, -4);
    }
}
