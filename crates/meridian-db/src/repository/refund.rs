//! # Refund Repository
//!
//! Persistence for refund headers and line items, plus the per-line
//! refunded-quantity sum that caps cumulative refunds at the sold quantity.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use meridian_core::{Refund, RefundLineItem, RefundStatus};

use crate::error::{DbError, DbResult};

/// Repository for the `refunds` and `refund_items` tables.
#[derive(Debug, Clone)]
pub struct RefundRepository {
    pool: SqlitePool,
}

impl RefundRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RefundRepository { pool }
    }

    // =========================================================================
    // Writes (caller's transaction)
    // =========================================================================

    pub async fn insert_refund(
        &self,
        conn: &mut SqliteConnection,
        refund: &Refund,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refunds (
                id, refund_number, sale_id, store_id, refund_type, status,
                total_cents, reason, requires_approval,
                approved_by, approved_at, approval_notes,
                requested_by, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.refund_number)
        .bind(&refund.sale_id)
        .bind(&refund.store_id)
        .bind(refund.refund_type)
        .bind(refund.status)
        .bind(refund.total_cents)
        .bind(&refund.reason)
        .bind(refund.requires_approval)
        .bind(&refund.approved_by)
        .bind(refund.approved_at)
        .bind(&refund.approval_notes)
        .bind(&refund.requested_by)
        .bind(refund.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(
        &self,
        conn: &mut SqliteConnection,
        item: &RefundLineItem,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refund_items (
                id, refund_id, sale_item_id, product_id, quantity,
                unit_price_cents, tax_cents, line_total_cents
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.refund_id)
        .bind(&item.sale_item_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.tax_cents)
        .bind(item.line_total_cents)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves a pending refund to `completed` with an approval record.
    /// Runs in the caller's transaction alongside the inventory restore.
    /// The status guard in the WHERE clause makes a concurrent double
    /// approval a no-op for the loser.
    pub async fn mark_approved(
        &self,
        conn: &mut SqliteConnection,
        refund_id: &str,
        approved_by: &str,
        notes: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = ?2, approved_by = ?3, approved_at = ?4, approval_notes = ?5
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(refund_id)
        .bind(RefundStatus::Completed)
        .bind(approved_by)
        .bind(Utc::now())
        .bind(notes)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PendingRefund", refund_id));
        }

        Ok(())
    }

    /// Moves a pending refund to `cancelled` with the rejection reason.
    pub async fn mark_rejected(
        &self,
        conn: &mut SqliteConnection,
        refund_id: &str,
        rejected_by: &str,
        reason: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = ?2, approved_by = ?3, approved_at = ?4, approval_notes = ?5
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(refund_id)
        .bind(RefundStatus::Cancelled)
        .bind(rejected_by)
        .bind(Utc::now())
        .bind(format!("REJECTED: {}", reason))
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PendingRefund", refund_id));
        }

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Refund> {
        sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Refund", id))
    }

    pub async fn get_items(&self, refund_id: &str) -> DbResult<Vec<RefundLineItem>> {
        let items = sqlx::query_as::<_, RefundLineItem>(
            "SELECT * FROM refund_items WHERE refund_id = ?1 ORDER BY id",
        )
        .bind(refund_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn refunds_for_sale(&self, sale_id: &str) -> DbResult<Vec<Refund>> {
        let refunds = sqlx::query_as::<_, Refund>(
            "SELECT * FROM refunds WHERE sale_id = ?1 ORDER BY created_at ASC",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(refunds)
    }

    /// Cumulative refunded quantity for a sale line, counting pending and
    /// completed refunds. Cancelled refunds release their quantity back.
    pub async fn refunded_quantity(
        &self,
        conn: &mut SqliteConnection,
        sale_item_id: &str,
    ) -> DbResult<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(ri.quantity)
            FROM refund_items ri
            JOIN refunds r ON r.id = ri.refund_id
            WHERE ri.sale_item_id = ?1 AND r.status != 'cancelled'
            "#,
        )
        .bind(sale_item_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(sum.unwrap_or(0))
    }

    /// Quantity actually returned for a sale line: completed refunds only.
    /// Pending refunds hold quantity but have not moved stock yet.
    pub async fn completed_refunded_quantity(
        &self,
        conn: &mut SqliteConnection,
        sale_item_id: &str,
    ) -> DbResult<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(ri.quantity)
            FROM refund_items ri
            JOIN refunds r ON r.id = ri.refund_id
            WHERE ri.sale_item_id = ?1 AND r.status = 'completed'
            "#,
        )
        .bind(sale_item_id)
        .fetch_one(&mut *conn)
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
    use meridian_core::RefundType;
    use uuid::Uuid;

    /// Seeds the product, sale, and sale line the refund fixtures reference,
    /// satisfying the schema's foreign keys.
    async fn seed_sale_fixtures(db: &Database) {
        let now = Utc::now();
        let mut tx = db.pool().begin().await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, price_cents, created_at, updated_at)
            VALUES ('p1', 'SKU-1', 'Widget', 1000, ?1, ?1)
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO sales (
                id, sale_number, receipt_number, store_id, cashier_id,
                subtotal_cents, total_cents, created_at
            )
            VALUES ('s1', 'POS-20260827-0001', 'RCP-0001', 'store-1', 'cashier-1',
                    10000, 10000, ?1)
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, sku_snapshot, name_snapshot,
                quantity, unit_price_cents, line_total_cents
            )
            VALUES ('line-1', 's1', 'p1', 'SKU-1', 'Widget', 10, 1000, 10000)
            "#,
        )
        .execute(&mut *tx)
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    fn sample_refund(id: &str, status: RefundStatus) -> Refund {
        Refund {
            id: id.to_string(),
            refund_number: format!("REF-20260827-{}", id),
            sale_id: "s1".to_string(),
            store_id: "store-1".to_string(),
            refund_type: RefundType::Partial,
            status,
            total_cents: 3000,
            reason: Some("damaged".to_string()),
            requires_approval: status == RefundStatus::Pending,
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            requested_by: "cashier-1".to_string(),
            created_at: Utc::now(),
        }
    }

    fn item_for(refund_id: &str, quantity: i64) -> RefundLineItem {
        RefundLineItem {
            id: Uuid::new_v4().to_string(),
            refund_id: refund_id.to_string(),
            sale_item_id: "line-1".to_string(),
            product_id: "p1".to_string(),
            quantity,
            unit_price_cents: 1000,
            tax_cents: 50,
            line_total_cents: quantity * 1000,
        }
    }

    #[tokio::test]
    async fn test_refunded_quantity_excludes_cancelled() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_sale_fixtures(&db).await;
        let repo = db.refunds();

        let mut tx = db.pool().begin().await.unwrap();
        repo.insert_refund(&mut tx, &sample_refund("r1", RefundStatus::Completed))
            .await
            .unwrap();
        repo.insert_item(&mut tx, &item_for("r1", 2)).await.unwrap();
        repo.insert_refund(&mut tx, &sample_refund("r2", RefundStatus::Pending))
            .await
            .unwrap();
        repo.insert_item(&mut tx, &item_for("r2", 1)).await.unwrap();
        repo.insert_refund(&mut tx, &sample_refund("r3", RefundStatus::Cancelled))
            .await
            .unwrap();
        repo.insert_item(&mut tx, &item_for("r3", 5)).await.unwrap();

        let refunded = repo.refunded_quantity(&mut tx, "line-1").await.unwrap();
        tx.commit().await.unwrap();

        // Completed (2) + pending (1); the cancelled 5 released its hold
        assert_eq!(refunded, 3);
    }

    #[tokio::test]
    async fn test_approve_only_moves_pending() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_sale_fixtures(&db).await;
        let repo = db.refunds();

        let mut tx = db.pool().begin().await.unwrap();
        repo.insert_refund(&mut tx, &sample_refund("r1", RefundStatus::Pending))
            .await
            .unwrap();
        repo.mark_approved(&mut tx, "r1", "manager-1", Some("ok"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let refund = repo.get_by_id("r1").await.unwrap();
        assert_eq!(refund.status, RefundStatus::Completed);
        assert_eq!(refund.approved_by.as_deref(), Some("manager-1"));

        // A second approval hits no pending row
        let mut tx = db.pool().begin().await.unwrap();
        let err = repo.mark_approved(&mut tx, "r1", "manager-2", None).await;
        tx.rollback().await.unwrap();
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_reject_records_reason() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_sale_fixtures(&db).await;
        let repo = db.refunds();

        let mut tx = db.pool().begin().await.unwrap();
        repo.insert_refund(&mut tx, &sample_refund("r1", RefundStatus::Pending))
            .await
            .unwrap();
        repo.mark_rejected(&mut tx, "r1", "manager-1", "outside return window")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let refund = repo.get_by_id("r1").await.unwrap();
        assert_eq!(refund.status, RefundStatus::Cancelled);
        assert_eq!(
            refund.approval_notes.as_deref(),
            Some("REJECTED: outside return window")
        );
    }
}
