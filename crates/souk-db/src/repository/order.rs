//! # Order Repository
//!
//! Database operations for orders and order items.
//!
//! ## The Intake Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  create_order: ONE TRANSACTION                          │
//! │                                                                         │
//! │  1. INSERT INTO orders (status = 'pending', totals, addresses)         │
//! │                                                                         │
//! │  2. For each line:                                                     │
//! │     a. INSERT INTO order_items (vendor/name/price snapshots)           │
//! │     b. UPDATE products                                                 │
//! │        SET stock = stock - qty                                         │
//! │        WHERE id = ? AND stock >= qty      ← atomic conditional rule    │
//! │        (0 rows affected ⇒ StockExhausted ⇒ whole transaction aborts)   │
//! │                                                                         │
//! │  3. COMMIT                                                             │
//! │                                                                         │
//! │  GUARANTEES:                                                           │
//! │  • No orphan order without items survives any failure                  │
//! │  • Stock never goes negative, even under concurrent intake             │
//! │  • Already-applied decrements are undone when a later line fails       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use souk_core::{Address, Order, OrderItem, OrderStatus, PaymentStatus};

/// Row mapping for the orders table.
///
/// Addresses are stored as JSON text; the row struct keeps them raw and the
/// repository parses them back into validated `Address` records.
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    customer_id: String,
    status: OrderStatus,
    payment_status: PaymentStatus,
    subtotal_cents: i64,
    tax_cents: i64,
    shipping_cents: i64,
    total_cents: i64,
    shipping_address: String,
    billing_address: Option<String>,
    payment_method: Option<String>,
    notes: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl OrderRow {
    fn into_order(self) -> DbResult<Order> {
        let shipping_address: Address =
            serde_json::from_str(&self.shipping_address).map_err(|e| DbError::CorruptRecord {
                entity: "Order".to_string(),
                id: self.id.clone(),
                reason: format!("shipping_address: {e}"),
            })?;

        let billing_address = match &self.billing_address {
            Some(raw) => {
                Some(serde_json::from_str(raw).map_err(|e| DbError::CorruptRecord {
                    entity: "Order".to_string(),
                    id: self.id.clone(),
                    reason: format!("billing_address: {e}"),
                })?)
            }
            None => None,
        };

        Ok(Order {
            id: self.id,
            customer_id: self.customer_id,
            status: self.status,
            payment_status: self.payment_status,
            subtotal_cents: self.subtotal_cents,
            tax_cents: self.tax_cents,
            shipping_cents: self.shipping_cents,
            total_cents: self.total_cents,
            shipping_address,
            billing_address,
            payment_method: self.payment_method,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str = r#"
    id, customer_id, status, payment_status,
    subtotal_cents, tax_cents, shipping_cents, total_cents,
    shipping_address, billing_address, payment_method, notes,
    created_at, updated_at
"#;

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Creates an order with its items and applies the stock decrements,
    /// all in one transaction.
    ///
    /// ## Errors
    /// * `DbError::StockExhausted` - a line's guarded decrement matched no
    ///   row; the transaction is rolled back and nothing persists
    /// * `DbError::ForeignKeyViolation` - a line references an unknown product
    ///
    /// A failure while rolling back is logged separately as a potential
    /// data-integrity incident and surfaces as `DbError::Internal`.
    pub async fn create_order(&self, order: &Order, items: &[OrderItem]) -> DbResult<()> {
        debug!(order_id = %order.id, lines = items.len(), "Creating order");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        match Self::apply_intake(&mut tx, order, items).await {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    // Distinct from the triggering error: the store may now
                    // hold partial intake writes and needs manual
                    // reconciliation.
                    error!(
                        order_id = %order.id,
                        rollback_error = %rollback_err,
                        triggering_error = %err,
                        "Intake rollback failed; possible data-integrity incident"
                    );
                    return Err(DbError::Internal(format!(
                        "rollback failed: {rollback_err}"
                    )));
                }
                Err(err)
            }
        }
    }

    /// The intake writes, executed against an open transaction.
    async fn apply_intake(
        tx: &mut Transaction<'_, Sqlite>,
        order: &Order,
        items: &[OrderItem],
    ) -> DbResult<()> {
        let shipping_json = serde_json::to_string(&order.shipping_address)
            .map_err(|e| DbError::Internal(e.to_string()))?;
        let billing_json = order
            .billing_address
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, status, payment_status,
                subtotal_cents, tax_cents, shipping_cents, total_cents,
                shipping_address, billing_address, payment_method, notes,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.subtotal_cents)
        .bind(order.tax_cents)
        .bind(order.shipping_cents)
        .bind(order.total_cents)
        .bind(&shipping_json)
        .bind(&billing_json)
        .bind(&order.payment_method)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, vendor_id, product_name,
                    quantity, unit_price_cents, total_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&item.id)
            .bind(&item.order_id)
            .bind(&item.product_id)
            .bind(&item.vendor_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.total_cents)
            .bind(item.created_at)
            .execute(&mut **tx)
            .await?;

            // The atomic conditional decrement. Never read-then-write: the
            // guard runs inside the UPDATE itself, so concurrent intakes on
            // the same product cannot both pass.
            let result = sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - ?2, updated_at = ?3
                WHERE id = ?1 AND stock >= ?2
                "#,
            )
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(order.created_at)
            .execute(&mut **tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::StockExhausted {
                    product_id: item.product_id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRow::into_order).transpose()
    }

    /// Gets all items for an order, oldest first.
    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT
                id, order_id, product_id, vendor_id, product_name,
                quantity, unit_price_cents, total_cents, created_at
            FROM order_items
            WHERE order_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Lists a customer's orders, most recent first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRow::into_order).collect()
    }

    /// All of a vendor's order items, oldest first.
    ///
    /// This is the vendor's full revenue history; the *unsettled* subset
    /// lives in `PayoutRepository::unsettled_items`.
    pub async fn items_for_vendor(&self, vendor_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT
                id, order_id, product_id, vendor_id, product_name,
                quantity, unit_price_cents, total_cents, created_at
            FROM order_items
            WHERE vendor_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}

/// Generates a new order ID.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new order item ID.
pub fn generate_order_item_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::generate_product_id;
    use chrono::Utc;
    use souk_core::Product;

    fn address() -> Address {
        Address {
            name: "A. Customer".to_string(),
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            region: "IL".to_string(),
            postal_code: "62701".to_string(),
            country: "US".to_string(),
        }
    }

    fn product(vendor: &str, price_cents: i64, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: generate_product_id(),
            vendor_id: vendor.to_string(),
            sku: format!("SKU-{}", &generate_product_id()[..8]),
            name: "Widget".to_string(),
            description: None,
            price_cents,
            stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn order_for(customer: &str, total_cents: i64) -> Order {
        let now = Utc::now();
        Order {
            id: generate_order_id(),
            customer_id: customer.to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal_cents: total_cents,
            tax_cents: 0,
            shipping_cents: 0,
            total_cents,
            shipping_address: address(),
            billing_address: None,
            payment_method: Some("card".to_string()),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn item_for(order: &Order, product: &Product, qty: i64) -> OrderItem {
        OrderItem {
            id: generate_order_item_id(),
            order_id: order.id.clone(),
            product_id: product.id.clone(),
            vendor_id: product.vendor_id.clone(),
            product_name: product.name.clone(),
            quantity: qty,
            unit_price_cents: product.price_cents,
            total_cents: product.price_cents * qty,
            created_at: order.created_at,
        }
    }

    #[tokio::test]
    async fn test_create_order_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let p = product("vendor-1", 1000, 10);
        db.products().insert(&p).await.unwrap();

        let order = order_for("customer-1", 2000);
        let items = vec![item_for(&order, &p, 2)];
        db.orders().create_order(&order, &items).await.unwrap();

        let fetched = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(fetched.customer_id, "customer-1");
        assert_eq!(fetched.status, OrderStatus::Pending);
        assert_eq!(fetched.shipping_address, address());

        let fetched_items = db.orders().get_items(&order.id).await.unwrap();
        assert_eq!(fetched_items.len(), 1);
        assert_eq!(fetched_items[0].vendor_id, "vendor-1");
        assert_eq!(fetched_items[0].total_cents, 2000);

        // Stock decremented by the transaction
        let p_after = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(p_after.stock, 8);
    }

    #[tokio::test]
    async fn test_stock_exhausted_rolls_back_everything() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let plenty = product("vendor-1", 1000, 10);
        let scarce = product("vendor-2", 500, 1);
        db.products().insert(&plenty).await.unwrap();
        db.products().insert(&scarce).await.unwrap();

        let order = order_for("customer-1", 3000);
        let items = vec![item_for(&order, &plenty, 2), item_for(&order, &scarce, 5)];

        let err = db.orders().create_order(&order, &items).await.unwrap_err();
        assert!(matches!(err, DbError::StockExhausted { ref product_id } if *product_id == scarce.id));

        // No orphan order, no items, and the first line's decrement undone
        assert!(db.orders().get_by_id(&order.id).await.unwrap().is_none());
        assert!(db.orders().get_items(&order.id).await.unwrap().is_empty());
        let plenty_after = db.products().get_by_id(&plenty.id).await.unwrap().unwrap();
        assert_eq!(plenty_after.stock, 10);
    }

    #[tokio::test]
    async fn test_decrement_guard_is_exact_at_boundary() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let p = product("vendor-1", 1000, 3);
        db.products().insert(&p).await.unwrap();

        // Taking exactly the remaining stock succeeds
        let order = order_for("customer-1", 3000);
        db.orders()
            .create_order(&order, &[item_for(&order, &p, 3)])
            .await
            .unwrap();
        assert_eq!(db.products().get_by_id(&p.id).await.unwrap().unwrap().stock, 0);

        // The next unit is refused
        let second = order_for("customer-2", 1000);
        let err = db
            .orders()
            .create_order(&second, &[item_for(&second, &p, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StockExhausted { .. }));
    }

    #[tokio::test]
    async fn test_unknown_product_is_foreign_key_violation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let order = order_for("customer-1", 1000);
        let ghost = product("vendor-1", 1000, 5); // never inserted
        let err = db
            .orders()
            .create_order(&order, &[item_for(&order, &ghost, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
        assert!(db.orders().get_by_id(&order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_for_customer_and_vendor_items() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let p = product("vendor-1", 1000, 100);
        db.products().insert(&p).await.unwrap();

        for _ in 0..3 {
            let order = order_for("customer-1", 1000);
            db.orders()
                .create_order(&order, &[item_for(&order, &p, 1)])
                .await
                .unwrap();
        }

        let orders = db.orders().list_for_customer("customer-1").await.unwrap();
        assert_eq!(orders.len(), 3);

        let vendor_items = db.orders().items_for_vendor("vendor-1").await.unwrap();
        assert_eq!(vendor_items.len(), 3);
        // Oldest first
        assert!(vendor_items.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
}
