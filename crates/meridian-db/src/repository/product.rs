//! # Product Repository (Catalog Bridge)
//!
//! Catalog reads plus the master-stock write that keeps the store-agnostic
//! stock figure aligned with the per-store inventory projections.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use meridian_core::Product;

use crate::error::{DbError, DbResult};

/// Repository for the `products` table.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Fetches a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Fetches a product by SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE sku = ?1")
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", sku))
    }

    /// Inserts a new product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, price_cents, cost_cents, tax_rate_bps,
                track_inventory, allow_negative_stock, master_stock,
                is_active, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.tax_rate_bps)
        .bind(product.track_inventory)
        .bind(product.allow_negative_stock)
        .bind(product.master_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(sku = %product.sku, "Product inserted");
        Ok(())
    }

    /// Applies a delta to the master stock figure, inside the caller's
    /// transaction. Called by the inventory repository on every projection
    /// change so the catalog figure never drifts from the store levels.
    pub async fn update_master_stock(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        delta: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET master_stock = master_stock + ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(product_id)
        .bind(delta)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }

        Ok(())
    }

    /// Soft-deletes a product.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
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

    fn sample_product(id: &str, sku: &str) -> Product {
        Product {
            id: id.to_string(),
            sku: sku.to_string(),
            name: "Gravel 20mm (per ton)".to_string(),
            price_cents: 1000,
            cost_cents: Some(600),
            tax_rate_bps: 500,
            track_inventory: true,
            allow_negative_stock: false,
            master_stock: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.insert(&sample_product("p1", "GRAVEL-20")).await.unwrap();

        let by_id = repo.get_by_id("p1").await.unwrap();
        assert_eq!(by_id.sku, "GRAVEL-20");

        let by_sku = repo.get_by_sku("GRAVEL-20").await.unwrap();
        assert_eq!(by_sku.id, "p1");

        assert!(repo.get_by_id("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_master_stock_delta() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        repo.insert(&sample_product("p1", "GRAVEL-20")).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        repo.update_master_stock(&mut tx, "p1", 10).await.unwrap();
        repo.update_master_stock(&mut tx, "p1", -3).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(repo.get_by_id("p1").await.unwrap().master_stock, 7);
    }
}
