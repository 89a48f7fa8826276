//! # Product Repository
//!
//! Database operations for the settlement-relevant slice of the catalog.
//!
//! ## Ownership Boundary
//! The full product catalog (CRUD, images, descriptions) belongs to an
//! external collaborator. Order intake needs three things from products:
//! the server-side price, the vendor attribution, and the stock counter.
//! Stock is only ever mutated through the conditional decrement that runs
//! inside the intake transaction (see `OrderRepository::create_order`).

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use souk_core::Product;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, vendor_id, sku, name, description,
                price_cents, stock, is_active,
                created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Inserts a new product.
    ///
    /// The catalog collaborator is the real writer of products; this exists
    /// for seeding and tests.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, vendor_id, sku, name, description,
                price_cents, stock, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.vendor_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adjusts product stock by a delta (positive = restock).
    ///
    /// ## Note
    /// This is the *unconditional* delta update used for restocks and
    /// corrections. Order intake never calls this; it uses the guarded
    /// decrement inside its transaction so stock can never go negative.
    pub async fn adjust_stock(&self, id: &str, delta: i64) -> DbResult<()> {
        debug!(id = %id, delta = %delta, "Adjusting stock");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn product(vendor: &str, price_cents: i64, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: generate_product_id(),
            vendor_id: vendor.to_string(),
            sku: "MUG-001".to_string(),
            name: "Hand-thrown mug".to_string(),
            description: None,
            price_cents,
            stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let p = product("vendor-1", 1250, 10);
        repo.insert(&p).await.unwrap();

        let fetched = repo.get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(fetched.vendor_id, "vendor-1");
        assert_eq!(fetched.price_cents, 1250);
        assert_eq!(fetched.stock, 10);
        assert!(fetched.is_active);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let missing = db.products().get_by_id("no-such-id").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_adjust_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let p = product("vendor-1", 1250, 10);
        repo.insert(&p).await.unwrap();

        repo.adjust_stock(&p.id, 5).await.unwrap();
        assert_eq!(repo.get_by_id(&p.id).await.unwrap().unwrap().stock, 15);

        repo.adjust_stock(&p.id, -3).await.unwrap();
        assert_eq!(repo.get_by_id(&p.id).await.unwrap().unwrap().stock, 12);
    }

    #[tokio::test]
    async fn test_adjust_stock_missing_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.products().adjust_stock("no-such-id", 1).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
