//! # Cash Drawer Repository
//!
//! Session rows for the open → counted → closed drawer lifecycle. The
//! partial unique index on (store_id, cashier_id) over non-closed rows
//! enforces at most one active session per cashier per store at the
//! storage layer; the manager checks first for a friendlier error.

use chrono::Utc;
use sqlx::SqlitePool;

use meridian_core::{CashDrawerSession, DrawerStatus};

use crate::error::{DbError, DbResult};

/// Count figures written when a drawer is counted.
#[derive(Debug, Clone, Copy)]
pub struct DrawerCount {
    pub expected_cents: i64,
    pub counted_cents: i64,
    pub difference_cents: i64,
}

/// End-of-shift snapshot written when a drawer closes.
#[derive(Debug, Clone)]
pub struct DrawerCloseout {
    pub total_cash_sales_cents: i64,
    pub total_non_cash_sales_cents: i64,
    pub total_transactions: i64,
    pub notes: Option<String>,
}

/// Repository for the `drawer_sessions` table.
#[derive(Debug, Clone)]
pub struct DrawerRepository {
    pool: SqlitePool,
}

impl DrawerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DrawerRepository { pool }
    }

    pub async fn insert(&self, session: &CashDrawerSession) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO drawer_sessions (
                id, store_id, cashier_id, status, opening_cents,
                expected_cents, counted_cents, difference_cents,
                total_cash_sales_cents, total_non_cash_sales_cents,
                total_transactions, notes, opened_at, counted_at, closed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&session.id)
        .bind(&session.store_id)
        .bind(&session.cashier_id)
        .bind(session.status)
        .bind(session.opening_cents)
        .bind(session.expected_cents)
        .bind(session.counted_cents)
        .bind(session.difference_cents)
        .bind(session.total_cash_sales_cents)
        .bind(session.total_non_cash_sales_cents)
        .bind(session.total_transactions)
        .bind(&session.notes)
        .bind(session.opened_at)
        .bind(session.counted_at)
        .bind(session.closed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<CashDrawerSession> {
        sqlx::query_as::<_, CashDrawerSession>("SELECT * FROM drawer_sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("DrawerSession", id))
    }

    /// The cashier's non-closed session for this store, if any.
    /// Both `open` and `counted` sessions count as active; a counted
    /// drawer can be re-counted until it is closed.
    pub async fn find_active(
        &self,
        store_id: &str,
        cashier_id: &str,
    ) -> DbResult<Option<CashDrawerSession>> {
        let session = sqlx::query_as::<_, CashDrawerSession>(
            r#"
            SELECT * FROM drawer_sessions
            WHERE store_id = ?1 AND cashier_id = ?2
              AND status IN ('open', 'counted')
            ORDER BY opened_at DESC
            LIMIT 1
            "#,
        )
        .bind(store_id)
        .bind(cashier_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Writes the count figures and moves the session to `counted`.
    pub async fn record_count(&self, session_id: &str, count: DrawerCount) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE drawer_sessions
            SET status = ?2, expected_cents = ?3, counted_cents = ?4,
                difference_cents = ?5, counted_at = ?6
            WHERE id = ?1 AND status IN ('open', 'counted')
            "#,
        )
        .bind(session_id)
        .bind(DrawerStatus::Counted)
        .bind(count.expected_cents)
        .bind(count.counted_cents)
        .bind(count.difference_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ActiveDrawerSession", session_id));
        }

        Ok(())
    }

    /// Writes the end-of-shift snapshot and moves the session to
    /// `closed`. Closing an uncounted session leaves the count columns
    /// null. Closed sessions are frozen.
    pub async fn record_closeout(
        &self,
        session_id: &str,
        closeout: DrawerCloseout,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE drawer_sessions
            SET status = ?2, total_cash_sales_cents = ?3,
                total_non_cash_sales_cents = ?4, total_transactions = ?5,
                notes = ?6, closed_at = ?7
            WHERE id = ?1 AND status IN ('open', 'counted')
            "#,
        )
        .bind(session_id)
        .bind(DrawerStatus::Closed)
        .bind(closeout.total_cash_sales_cents)
        .bind(closeout.total_non_cash_sales_cents)
        .bind(closeout.total_transactions)
        .bind(&closeout.notes)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ActiveDrawerSession", session_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use uuid::Uuid;

    fn open_session(store: &str, cashier: &str, opening: i64) -> CashDrawerSession {
        CashDrawerSession {
            id: Uuid::new_v4().to_string(),
            store_id: store.to_string(),
            cashier_id: cashier.to_string(),
            status: DrawerStatus::Open,
            opening_cents: opening,
            expected_cents: None,
            counted_cents: None,
            difference_cents: None,
            total_cash_sales_cents: None,
            total_non_cash_sales_cents: None,
            total_transactions: None,
            notes: None,
            opened_at: Utc::now(),
            counted_at: None,
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn test_lifecycle_open_count_close() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.drawers();

        let session = open_session("store-1", "cashier-1", 10_000);
        repo.insert(&session).await.unwrap();

        let active = repo.find_active("store-1", "cashier-1").await.unwrap().unwrap();
        assert_eq!(active.id, session.id);
        assert_eq!(active.status, DrawerStatus::Open);

        repo.record_count(
            &session.id,
            DrawerCount {
                expected_cents: 14_500,
                counted_cents: 14_500,
                difference_cents: 0,
            },
        )
        .await
        .unwrap();

        // Counted sessions are still active
        let counted = repo.find_active("store-1", "cashier-1").await.unwrap().unwrap();
        assert_eq!(counted.status, DrawerStatus::Counted);
        assert_eq!(counted.difference_cents, Some(0));

        repo.record_closeout(
            &session.id,
            DrawerCloseout {
                total_cash_sales_cents: 4500,
                total_non_cash_sales_cents: 5000,
                total_transactions: 4,
                notes: Some("balanced".to_string()),
            },
        )
        .await
        .unwrap();

        assert!(repo.find_active("store-1", "cashier-1").await.unwrap().is_none());
        let closed = repo.get_by_id(&session.id).await.unwrap();
        assert_eq!(closed.status, DrawerStatus::Closed);
        assert_eq!(closed.total_transactions, Some(4));

        // Closed sessions are frozen
        let again = repo
            .record_closeout(
                &session.id,
                DrawerCloseout {
                    total_cash_sales_cents: 0,
                    total_non_cash_sales_cents: 0,
                    total_transactions: 0,
                    notes: None,
                },
            )
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_close_without_count_keeps_nulls() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.drawers();

        let session = open_session("store-1", "cashier-1", 5000);
        repo.insert(&session).await.unwrap();

        repo.record_closeout(
            &session.id,
            DrawerCloseout {
                total_cash_sales_cents: 0,
                total_non_cash_sales_cents: 0,
                total_transactions: 0,
                notes: None,
            },
        )
        .await
        .unwrap();

        let closed = repo.get_by_id(&session.id).await.unwrap();
        assert_eq!(closed.status, DrawerStatus::Closed);
        assert_eq!(closed.counted_cents, None);
        assert_eq!(closed.difference_cents, None);
    }
}
