//! # Materials Repository
//!
//! Storage for the operations material pool, its movement log, the
//! mapping rows that link bulk material types to catalog products, and
//! the material return queue. The sync rules live in the engine; this
//! layer only guarantees that a pool adjustment and its movement row
//! land together and that the pool never goes negative.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use meridian_core::{
    MaterialMapping, MaterialMovement, MaterialPool, MaterialReturn, MaterialReturnStatus,
};

use crate::error::{DbError, DbResult};

/// Repository for the `material_*` tables.
#[derive(Debug, Clone)]
pub struct MaterialsRepository {
    pool: SqlitePool,
}

impl MaterialsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MaterialsRepository { pool }
    }

    // =========================================================================
    // Mappings
    // =========================================================================

    pub async fn insert_mapping(&self, mapping: &MaterialMapping) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO material_mappings (
                id, material_type, product_id, auto_deduct_on_sale, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&mapping.id)
        .bind(&mapping.material_type)
        .bind(&mapping.product_id)
        .bind(mapping.auto_deduct_on_sale)
        .bind(mapping.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mapping for a catalog product, if one exists. Products without a
    /// mapping do not participate in materials sync.
    pub async fn mapping_for_product(
        &self,
        product_id: &str,
    ) -> DbResult<Option<MaterialMapping>> {
        let mapping = sqlx::query_as::<_, MaterialMapping>(
            "SELECT * FROM material_mappings WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    pub async fn mapping_for_material(
        &self,
        material_type: &str,
    ) -> DbResult<Option<MaterialMapping>> {
        let mapping = sqlx::query_as::<_, MaterialMapping>(
            "SELECT * FROM material_mappings WHERE material_type = ?1",
        )
        .bind(material_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    // =========================================================================
    // Pool and movements
    // =========================================================================

    pub async fn insert_pool(&self, pool_row: &MaterialPool) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO material_pools (
                id, material_type, material_name, quantity_remaining, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&pool_row.id)
        .bind(&pool_row.material_type)
        .bind(&pool_row.material_name)
        .bind(pool_row.quantity_remaining)
        .bind(pool_row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_pool(&self, material_type: &str) -> DbResult<Option<MaterialPool>> {
        let pool_row = sqlx::query_as::<_, MaterialPool>(
            "SELECT * FROM material_pools WHERE material_type = ?1",
        )
        .bind(material_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(pool_row)
    }

    /// Applies a delta to the operations pool inside the caller's
    /// transaction and logs the movement with before and after figures.
    /// The pool is a physical stockpile; it refuses to go negative.
    pub async fn adjust_pool(
        &self,
        conn: &mut SqliteConnection,
        material_type: &str,
        delta: i64,
        reference: Option<&str>,
        performed_by: &str,
    ) -> DbResult<i64> {
        let before: i64 = sqlx::query_scalar(
            "SELECT quantity_remaining FROM material_pools WHERE material_type = ?1",
        )
        .bind(material_type)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("MaterialPool", material_type))?;

        let result = sqlx::query(
            r#"
            UPDATE material_pools
            SET quantity_remaining = quantity_remaining + ?2, updated_at = ?3
            WHERE material_type = ?1 AND quantity_remaining + ?2 >= 0
            "#,
        )
        .bind(material_type)
        .bind(delta)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::StockDepleted {
                product_id: material_type.to_string(),
                available: before,
                requested: delta.abs(),
            });
        }

        let after = before + delta;
        sqlx::query(
            r#"
            INSERT INTO material_movements (
                id, material_type, quantity_delta, quantity_before,
                quantity_after, reference, performed_by, performed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(material_type)
        .bind(delta)
        .bind(before)
        .bind(after)
        .bind(reference)
        .bind(performed_by)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        debug!(material_type, delta, after, "Material pool adjusted");
        Ok(after)
    }

    pub async fn movements_for(&self, material_type: &str) -> DbResult<Vec<MaterialMovement>> {
        let movements = sqlx::query_as::<_, MaterialMovement>(
            r#"
            SELECT * FROM material_movements
            WHERE material_type = ?1
            ORDER BY performed_at ASC, id ASC
            "#,
        )
        .bind(material_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    // =========================================================================
    // Returns
    // =========================================================================

    pub async fn insert_return(&self, ret: &MaterialReturn) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO material_returns (
                id, material_type, quantity, status, actual_quantity,
                quality_check, requested_by, resolved_by, created_at, resolved_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&ret.id)
        .bind(&ret.material_type)
        .bind(ret.quantity)
        .bind(ret.status)
        .bind(ret.actual_quantity)
        .bind(&ret.quality_check)
        .bind(&ret.requested_by)
        .bind(&ret.resolved_by)
        .bind(ret.created_at)
        .bind(ret.resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_return(&self, id: &str) -> DbResult<MaterialReturn> {
        sqlx::query_as::<_, MaterialReturn>("SELECT * FROM material_returns WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("MaterialReturn", id))
    }

    /// Resolves a pending return, inside the caller's transaction when the
    /// resolution also moves stock. Only pending returns may resolve.
    pub async fn mark_return_resolved(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        status: MaterialReturnStatus,
        actual_quantity: Option<i64>,
        quality_check: Option<&str>,
        resolved_by: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE material_returns
            SET status = ?2, actual_quantity = ?3, quality_check = ?4,
                resolved_by = ?5, resolved_at = ?6
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(actual_quantity)
        .bind(quality_check)
        .bind(resolved_by)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PendingMaterialReturn", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
