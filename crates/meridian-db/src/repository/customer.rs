//! # Customer Repository
//!
//! Buyer lookups and the loyalty-point earn update used by the post-commit
//! side-effect queue.

use sqlx::SqlitePool;
use tracing::debug;

use meridian_core::Customer;

use crate::error::{DbError, DbResult};

/// Repository for the `customers` table.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Customer> {
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, is_company, loyalty_points, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.is_company)
        .bind(customer.loyalty_points)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds earned loyalty points. Post-commit side effect; the caller logs
    /// failures instead of propagating them.
    pub async fn earn_loyalty_points(&self, id: &str, points: i64) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE customers SET loyalty_points = loyalty_points + ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(points)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        debug!(customer_id = %id, points, "Loyalty points earned");
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
    use chrono::Utc;

    #[tokio::test]
    async fn test_loyalty_earn() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        repo.insert(&Customer {
            id: "c1".into(),
            name: "Acme Drilling Ltd".into(),
            email: Some("ops@acme.example".into()),
            is_company: true,
            loyalty_points: 0,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        repo.earn_loyalty_points("c1", 57).await.unwrap();
        repo.earn_loyalty_points("c1", 10).await.unwrap();

        let customer = repo.get_by_id("c1").await.unwrap();
        assert_eq!(customer.loyalty_points, 67);
        assert!(customer.is_company);

        assert!(repo.earn_loyalty_points("missing", 5).await.is_err());
    }
}
