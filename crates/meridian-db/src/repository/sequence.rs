//! # Day-Scoped Sequence Repository
//!
//! Issues the externally visible business numbers: `POS-YYYYMMDD-NNNN` sale
//! numbers, `REF-` refund numbers and `RCP-` receipt numbers.
//!
//! ## Why a sequence table?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Reading the last issued number and incrementing it is a TOCTOU race:  │
//! │                                                                         │
//! │   T1: SELECT max → POS-20260827-0007                                   │
//! │   T2: SELECT max → POS-20260827-0007                                   │
//! │   T1: INSERT POS-20260827-0008                                         │
//! │   T2: INSERT POS-20260827-0008   ← duplicate!                          │
//! │                                                                         │
//! │  Instead, a single UPSERT on (scope, day) increments and returns the   │
//! │  counter atomically. SQLite's write lock serializes concurrent sales,  │
//! │  and the numbers stay dense and monotonic within each day.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Issued numbers appear on printed receipts and as accounting references,
//! so they must never change once a transaction commits. `issue` therefore
//! only ever runs inside the caller's transaction: a rolled-back sale
//! releases its number (the counter rolls back with it).

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;

/// Repository for the `daily_sequences` table.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Atomically issues the next number for `scope` on `day`, formatted as
    /// `{scope}-{YYYYMMDD}-{NNNN}`. Must run inside the caller's transaction
    /// so the number is released if the transaction rolls back.
    pub async fn issue(
        &self,
        conn: &mut SqliteConnection,
        scope: &str,
        day: NaiveDate,
    ) -> DbResult<String> {
        let day_key = day.format("%Y%m%d").to_string();

        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO daily_sequences (scope, day, last_value)
            VALUES (?1, ?2, 1)
            ON CONFLICT (scope, day)
            DO UPDATE SET last_value = last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(scope)
        .bind(&day_key)
        .fetch_one(&mut *conn)
        .await?;

        Ok(format!("{}-{}-{:04}", scope, day_key, value))
    }

    /// Current counter value for diagnostics; 0 when nothing issued yet.
    pub async fn current(&self, scope: &str, day: NaiveDate) -> DbResult<i64> {
        let day_key = day.format("%Y%m%d").to_string();

        let value: Option<i64> = sqlx::query_scalar(
            "SELECT last_value FROM daily_sequences WHERE scope = ?1 AND day = ?2",
        )
        .bind(scope)
        .bind(&day_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.unwrap_or(0))
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
    async fn test_issue_is_dense_and_day_scoped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sequences();

        let day = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let first = repo.issue(&mut tx, "POS", day).await.unwrap();
        let second = repo.issue(&mut tx, "POS", day).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, "POS-20260827-0001");
        assert_eq!(second, "POS-20260827-0002");

        // Separate scope, separate counter
        let mut tx = db.pool().begin().await.unwrap();
        let refund = repo.issue(&mut tx, "REF", day).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(refund, "REF-20260827-0001");

        // Next day starts over
        let next_day = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
        let mut tx = db.pool().begin().await.unwrap();
        let rolled = repo.issue(&mut tx, "POS", next_day).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(rolled, "POS-20260828-0001");
    }

    #[tokio::test]
    async fn test_rollback_releases_number() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sequences();
        let day = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let issued = repo.issue(&mut tx, "POS", day).await.unwrap();
        assert_eq!(issued, "POS-20260827-0001");
        tx.rollback().await.unwrap();

        // The counter rolled back with the transaction
        assert_eq!(repo.current("POS", day).await.unwrap(), 0);
    }
}
