//! # Accounting Outbox Repository
//!
//! The durable hand-off between the sale transaction and the accounting
//! poster:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sale tx:    INSERT sale + items + payments + outbox row  (atomic)     │
//! │                         │                                               │
//! │  worker:     fetch_pending → post → mark_status(synced | error)        │
//! │                                                                         │
//! │  reference_id is UNIQUE: enqueueing the same reference twice returns   │
//! │  the existing row instead of creating a second posting intent.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use meridian_core::{AccountingOutboxEntry, OutboxStatus};

use crate::error::{DbError, DbResult};

/// Repository for the `accounting_outbox` table.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Enqueues a posting intent inside the caller's transaction, returning
    /// the row id. Idempotent on `reference_id`: a duplicate enqueue is a
    /// no-op that returns the existing row's id.
    pub async fn enqueue(
        &self,
        conn: &mut SqliteConnection,
        sale_id: Option<&str>,
        reference_type: &str,
        reference_id: &str,
        payload: &str,
    ) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO accounting_outbox (
                id, sale_id, reference_type, reference_id, payload,
                status, attempts, last_error, created_at, updated_at, synced_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, ?7, NULL)
            ON CONFLICT (reference_id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(sale_id)
        .bind(reference_type)
        .bind(reference_id)
        .bind(payload)
        .bind(OutboxStatus::Pending)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        // Resolve the surviving row, ours or the earlier one
        let existing: String = sqlx::query_scalar(
            "SELECT id FROM accounting_outbox WHERE reference_id = ?1",
        )
        .bind(reference_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(existing)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<AccountingOutboxEntry> {
        sqlx::query_as::<_, AccountingOutboxEntry>(
            "SELECT * FROM accounting_outbox WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("OutboxEntry", id))
    }

    pub async fn get_by_reference(
        &self,
        reference_id: &str,
    ) -> DbResult<Option<AccountingOutboxEntry>> {
        let entry = sqlx::query_as::<_, AccountingOutboxEntry>(
            "SELECT * FROM accounting_outbox WHERE reference_id = ?1",
        )
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Oldest-first batch of entries still needing a posting attempt.
    /// Errored entries come back for retry alongside fresh ones.
    pub async fn fetch_pending(&self, limit: i64) -> DbResult<Vec<AccountingOutboxEntry>> {
        let entries = sqlx::query_as::<_, AccountingOutboxEntry>(
            r#"
            SELECT * FROM accounting_outbox
            WHERE status IN ('pending', 'error')
            ORDER BY created_at ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Records the outcome of one posting attempt. Every call increments
    /// the attempt counter; a synced outcome also stamps `synced_at`.
    pub async fn mark_status(
        &self,
        id: &str,
        status: OutboxStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        let now = Utc::now();
        let synced_at = (status == OutboxStatus::Synced).then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE accounting_outbox
            SET status = ?2, attempts = attempts + 1, last_error = ?3,
                updated_at = ?4, synced_at = COALESCE(?5, synced_at)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .bind(now)
        .bind(synced_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OutboxEntry", id));
        }

        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM accounting_outbox WHERE status IN ('pending', 'error')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_enqueue_is_idempotent_on_reference() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.outbox();

        let mut tx = db.pool().begin().await.unwrap();
        let first = repo
            .enqueue(&mut tx, None, "pos_sale", "POS-20260827-0001", "{}")
            .await
            .unwrap();
        let second = repo
            .enqueue(&mut tx, None, "pos_sale", "POS-20260827-0001", "{}")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_attempt_tracking() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.outbox();

        let mut tx = db.pool().begin().await.unwrap();
        let id = repo
            .enqueue(&mut tx, None, "pos_sale", "POS-20260827-0001", "{}")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        repo.mark_status(&id, OutboxStatus::Error, Some("connection refused"))
            .await
            .unwrap();

        // Errored entries return for retry
        let pending = repo.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("connection refused"));

        repo.mark_status(&id, OutboxStatus::Synced, None).await.unwrap();
        assert!(repo.fetch_pending(10).await.unwrap().is_empty());

        let entry = repo.get_by_id(&id).await.unwrap();
        assert_eq!(entry.status, OutboxStatus::Synced);
        assert_eq!(entry.attempts, 2);
        assert!(entry.synced_at.is_some());
    }
}
