//! # Promotion Usage Repository
//!
//! Records that a promotion was applied to a committed sale. Written from
//! the post-commit side-effect queue, never inside the sale transaction.

use sqlx::SqlitePool;
use uuid::Uuid;

use meridian_core::PromotionUsage;

use crate::error::DbResult;

/// Repository for the `promotion_usages` table.
#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    /// Records one usage of a promotion on a sale.
    pub async fn record_usage(
        &self,
        promotion_id: &str,
        sale_id: &str,
        customer_id: Option<&str>,
        discount_cents: i64,
    ) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO promotion_usages (
                id, promotion_id, sale_id, customer_id, discount_cents, used_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(promotion_id)
        .bind(sale_id)
        .bind(customer_id)
        .bind(discount_cents)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// All usages of a promotion, newest first.
    pub async fn usages_for_promotion(&self, promotion_id: &str) -> DbResult<Vec<PromotionUsage>> {
        let usages = sqlx::query_as::<_, PromotionUsage>(
            "SELECT * FROM promotion_usages WHERE promotion_id = ?1 ORDER BY used_at DESC",
        )
        .bind(promotion_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(usages)
    }
}
