//! # Sale Repository
//!
//! Persistence for sale headers, line items and payments. The write methods
//! take the caller's transaction; the sale engine composes them with the
//! inventory and outbox writes so a sale is all-or-nothing.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use meridian_core::{Payment, Sale, SaleLineItem, SaleStatus};

use crate::error::{DbError, DbResult};

/// Repository for the `sales`, `sale_items` and `payments` tables.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Writes (caller's transaction)
    // =========================================================================

    pub async fn insert_sale(&self, conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (
                id, sale_number, receipt_number, store_id, cashier_id, customer_id,
                status, payment_status, subtotal_cents, discount_cents, tax_cents,
                total_cents, amount_paid_cents, change_cents,
                synced_to_accounting, synced_at, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.sale_number)
        .bind(&sale.receipt_number)
        .bind(&sale.store_id)
        .bind(&sale.cashier_id)
        .bind(&sale.customer_id)
        .bind(sale.status)
        .bind(sale.payment_status)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.amount_paid_cents)
        .bind(sale.change_cents)
        .bind(sale.synced_to_accounting)
        .bind(sale.synced_at)
        .bind(sale.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(
        &self,
        conn: &mut SqliteConnection,
        item: &SaleLineItem,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, sku_snapshot, name_snapshot, quantity,
                unit_price_cents, discount_cents, tax_cents, line_total_cents, cost_cents
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.sku_snapshot)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.discount_cents)
        .bind(item.tax_cents)
        .bind(item.line_total_cents)
        .bind(item.cost_cents)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_payment(
        &self,
        conn: &mut SqliteConnection,
        payment: &Payment,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, sale_id, method, amount_cents, reference, received_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.sale_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(&payment.reference)
        .bind(payment.received_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Flips a sale to `refunded`, inside the refund's transaction.
    pub async fn mark_refunded(
        &self,
        conn: &mut SqliteConnection,
        sale_id: &str,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE sales SET status = ?2 WHERE id = ?1")
            .bind(sale_id)
            .bind(SaleStatus::Refunded)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Ok(())
    }

    /// Marks a sale as posted to accounting; set by the outbox worker once
    /// the posting is confirmed.
    pub async fn mark_synced(&self, sale_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sales SET synced_to_accounting = 1, synced_at = ?2 WHERE id = ?1",
        )
        .bind(sale_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Sale> {
        sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }

    pub async fn get_by_number(&self, sale_number: &str) -> DbResult<Sale> {
        sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE sale_number = ?1")
            .bind(sale_number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_number))
    }

    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleLineItem>> {
        let items = sqlx::query_as::<_, SaleLineItem>(
            "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY id",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn get_payments(&self, sale_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE sale_id = ?1 ORDER BY received_at",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Completed, fully paid sales settled by this cashier since `since`.
    /// Used by the drawer count to recompute the expected cash figure.
    pub async fn cash_total_since(
        &self,
        store_id: &str,
        cashier_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(p.amount_cents)
            FROM payments p
            JOIN sales s ON s.id = p.sale_id
            WHERE s.store_id = ?1 AND s.cashier_id = ?2
              AND s.status = 'completed' AND s.payment_status = 'paid'
              AND p.method = 'cash'
              AND s.created_at >= ?3
            "#,
        )
        .bind(store_id)
        .bind(cashier_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }

    /// Non-cash settlement total over the same window; snapshotted into the
    /// drawer session at close.
    pub async fn non_cash_total_since(
        &self,
        store_id: &str,
        cashier_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(p.amount_cents)
            FROM payments p
            JOIN sales s ON s.id = p.sale_id
            WHERE s.store_id = ?1 AND s.cashier_id = ?2
              AND s.status = 'completed' AND s.payment_status = 'paid'
              AND p.method != 'cash'
              AND s.created_at >= ?3
            "#,
        )
        .bind(store_id)
        .bind(cashier_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }

    /// Number of completed, fully paid sales over the window.
    pub async fn transactions_since(
        &self,
        store_id: &str,
        cashier_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM sales
            WHERE store_id = ?1 AND cashier_id = ?2
              AND status = 'completed' AND payment_status = 'paid'
              AND created_at >= ?3
            "#,
        )
        .bind(store_id)
        .bind(cashier_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Completed sales created since `since`, oldest first. Used by the
    /// reconciliation sweep to find sales missing an accounting posting.
    pub async fn completed_since(&self, since: DateTime<Utc>) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT * FROM sales
            WHERE status = 'completed' AND created_at >= ?1
            ORDER BY created_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use meridian_core::{PaymentMethod, PaymentStatus};
    use uuid::Uuid;

    fn sample_sale(id: &str, number: &str, total: i64) -> Sale {
        Sale {
            id: id.to_string(),
            sale_number: number.to_string(),
            receipt_number: format!("RCP-{}", number),
            store_id: "store-1".to_string(),
            cashier_id: "cashier-1".to_string(),
            customer_id: None,
            status: SaleStatus::Completed,
            payment_status: PaymentStatus::Paid,
            subtotal_cents: total,
            discount_cents: 0,
            tax_cents: 0,
            total_cents: total,
            amount_paid_cents: total,
            change_cents: 0,
            synced_to_accounting: false,
            synced_at: None,
            created_at: Utc::now(),
        }
    }

    fn cash_payment(sale_id: &str, amount: i64) -> Payment {
        Payment {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            method: PaymentMethod::Cash,
            amount_cents: amount,
            reference: None,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_sale() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let sale = sample_sale("s1", "POS-20260827-0001", 5775);
        let mut tx = db.pool().begin().await.unwrap();
        repo.insert_sale(&mut tx, &sale).await.unwrap();
        repo.insert_payment(&mut tx, &cash_payment("s1", 5775)).await.unwrap();
        tx.commit().await.unwrap();

        let fetched = repo.get_by_number("POS-20260827-0001").await.unwrap();
        assert_eq!(fetched.id, "s1");
        assert_eq!(fetched.total_cents, 5775);
        assert!(fetched.is_balanced());

        let payments = repo.get_payments("s1").await.unwrap();
        assert_eq!(payments.len(), 1);
        assert!(payments[0].method.is_cash());
    }

    #[tokio::test]
    async fn test_cash_and_non_cash_windows() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();
        let since = Utc::now() - chrono::Duration::minutes(1);

        let mut tx = db.pool().begin().await.unwrap();
        let sale_a = sample_sale("s1", "POS-20260827-0001", 2000);
        repo.insert_sale(&mut tx, &sale_a).await.unwrap();
        repo.insert_payment(&mut tx, &cash_payment("s1", 2000)).await.unwrap();

        let sale_b = sample_sale("s2", "POS-20260827-0002", 5000);
        repo.insert_sale(&mut tx, &sale_b).await.unwrap();
        let card = Payment {
            method: PaymentMethod::Card,
            reference: Some("AUTH-1234".to_string()),
            ..cash_payment("s2", 5000)
        };
        repo.insert_payment(&mut tx, &card).await.unwrap();
        tx.commit().await.unwrap();

        let cash = repo.cash_total_since("store-1", "cashier-1", since).await.unwrap();
        let non_cash = repo.non_cash_total_since("store-1", "cashier-1", since).await.unwrap();
        let count = repo.transactions_since("store-1", "cashier-1", since).await.unwrap();

        assert_eq!(cash, 2000);
        assert_eq!(non_cash, 5000);
        assert_eq!(count, 2);

        // Another cashier's window is empty
        let other = repo.cash_total_since("store-1", "cashier-2", since).await.unwrap();
        assert_eq!(other, 0);
    }

    #[tokio::test]
    async fn test_mark_refunded_and_synced() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let mut tx = db.pool().begin().await.unwrap();
        repo.insert_sale(&mut tx, &sample_sale("s1", "POS-20260827-0001", 1000))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        repo.mark_synced("s1").await.unwrap();
        let sale = repo.get_by_id("s1").await.unwrap();
        assert!(sale.synced_to_accounting);
        assert!(sale.synced_at.is_some());

        let mut tx = db.pool().begin().await.unwrap();
        repo.mark_refunded(&mut tx, "s1").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(repo.get_by_id("s1").await.unwrap().status, SaleStatus::Refunded);
    }
}
