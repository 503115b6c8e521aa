//! # Held Sale Repository
//!
//! Parked carts, scoped to the cashier who held them. A hold is a plain
//! row holding a serialized draft; resuming it is a read plus a delete,
//! and the draft only touches money and inventory once it is rung
//! through as a normal sale.

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use meridian_core::HeldSale;

use crate::error::{DbError, DbResult};

/// How many holds a listing returns, newest first.
const LIST_LIMIT: i64 = 50;

/// Repository for the `held_sales` table.
#[derive(Debug, Clone)]
pub struct HoldRepository {
    pool: SqlitePool,
}

impl HoldRepository {
    pub fn new(pool: SqlitePool) -> Self {
        HoldRepository { pool }
    }

    /// Parks a cart for the cashier. Returns the stored hold.
    pub async fn insert(
        &self,
        store_id: &str,
        cashier_id: &str,
        customer_id: Option<&str>,
        draft_json: &str,
        notes: Option<&str>,
    ) -> DbResult<HeldSale> {
        let hold = HeldSale {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            cashier_id: cashier_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            draft_json: draft_json.to_string(),
            notes: notes.map(str::to_string),
            created_at: chrono::Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO held_sales (
                id, store_id, cashier_id, customer_id, draft_json, notes, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&hold.id)
        .bind(&hold.store_id)
        .bind(&hold.cashier_id)
        .bind(&hold.customer_id)
        .bind(&hold.draft_json)
        .bind(&hold.notes)
        .bind(hold.created_at)
        .execute(&self.pool)
        .await?;

        debug!(hold_id = %hold.id, cashier_id, "Sale held");
        Ok(hold)
    }

    /// The cashier's parked carts on a store, newest first, capped at 50.
    pub async fn list_for_cashier(
        &self,
        store_id: &str,
        cashier_id: &str,
    ) -> DbResult<Vec<HeldSale>> {
        let holds = sqlx::query_as::<_, HeldSale>(
            r#"
            SELECT * FROM held_sales
            WHERE store_id = ?1 AND cashier_id = ?2
            ORDER BY created_at DESC
            LIMIT ?3
            "#,
        )
        .bind(store_id)
        .bind(cashier_id)
        .bind(LIST_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(holds)
    }

    /// Fetches one hold. The cashier filter keeps one terminal from
    /// resuming another cashier's cart.
    pub async fn get_for_cashier(&self, id: &str, cashier_id: &str) -> DbResult<HeldSale> {
        sqlx::query_as::<_, HeldSale>(
            "SELECT * FROM held_sales WHERE id = ?1 AND cashier_id = ?2",
        )
        .bind(id)
        .bind(cashier_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("HeldSale", id))
    }

    /// Removes a hold, on resume or discard.
    pub async fn delete(&self, id: &str, cashier_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM held_sales WHERE id = ?1 AND cashier_id = ?2")
            .bind(id)
            .bind(cashier_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("HeldSale", id));
        }

        debug!(hold_id = %id, cashier_id, "Hold removed");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
