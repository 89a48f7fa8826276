//! # Order Intake Service
//!
//! Validates a cart, prices it server-side, and persists the order with its
//! inventory effects as one unit.
//!
//! ## Intake Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       place_order                                       │
//! │                                                                         │
//! │  1. Auth: caller must be a customer                                    │
//! │  2. Validate lines, quantities, shipping address  (before any write)   │
//! │  3. Load products; must exist and be active                            │
//! │     Unit prices come from the product records — client prices are      │
//! │     never consulted, which closes price tampering                      │
//! │  4. Pre-check stock, naming the short product                          │
//! │  5. Price: subtotal / tax / shipping / total (souk-core::pricing)      │
//! │  6. ONE TRANSACTION: order + items + guarded stock decrements          │
//! │     (souk-db OrderRepository::create_order)                            │
//! │  7. After commit: one notification per distinct vendor                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use souk_core::pricing::{price_order, LineAmount};
use souk_core::validation::{
    validate_address, validate_line_count, validate_quantity, validate_uuid,
};
use souk_core::{Address, CoreError, Order, OrderItem, OrderStatus, PaymentStatus, Product};
use souk_db::{Database, DbError};

use crate::auth::{require_any_role, require_role, Caller, Role};
use crate::config::SettlementConfig;
use crate::error::ApiError;
use crate::notify::{
    dispatch, Notification, NotificationCategory, NotificationPriority, NotificationSink,
};

// =============================================================================
// Requests & Responses
// =============================================================================

/// One cart line as submitted by the customer: a product and a quantity.
/// Deliberately *no* price field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// A request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub lines: Vec<OrderLineRequest>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

/// The placed order with its nested items.
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Service
// =============================================================================

/// The Order Intake Service.
#[derive(Clone)]
pub struct OrderIntakeService {
    db: Database,
    config: SettlementConfig,
    notifier: Arc<dyn NotificationSink>,
}

impl OrderIntakeService {
    /// Creates a new intake service.
    pub fn new(db: Database, config: SettlementConfig, notifier: Arc<dyn NotificationSink>) -> Self {
        OrderIntakeService {
            db,
            config,
            notifier,
        }
    }

    /// Places an order for the calling customer.
    ///
    /// Everything up to step 6 of the flow is read-only; validation failures
    /// never leave partial state behind. The write itself is a single
    /// transaction, so neither does a conflict inside it.
    pub async fn place_order(
        &self,
        caller: Option<&Caller>,
        request: PlaceOrderRequest,
    ) -> Result<PlacedOrder, ApiError> {
        let caller = require_role(caller, Role::Customer)?;

        debug!(customer_id = %caller.id, lines = request.lines.len(), "place_order");

        validate_line_count(request.lines.len())?;
        validate_address(&request.shipping_address)?;
        if let Some(billing) = &request.billing_address {
            validate_address(billing)?;
        }

        // Merge duplicate product lines; quantities add up.
        let mut quantities: BTreeMap<String, i64> = BTreeMap::new();
        for line in &request.lines {
            validate_uuid("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
            *quantities.entry(line.product_id.clone()).or_insert(0) += line.quantity;
        }

        // Load and validate products; prices are read here, server-side.
        let mut products: Vec<(Product, i64)> = Vec::with_capacity(quantities.len());
        for (product_id, qty) in quantities {
            validate_quantity(qty)?;

            let product = self
                .db
                .products()
                .get_by_id(&product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| ApiError::from(CoreError::ProductNotFound(product_id.clone())))?;

            if product.stock < qty {
                return Err(CoreError::OutOfStock {
                    product: product.name.clone(),
                    available: product.stock,
                    requested: qty,
                }
                .into());
            }

            products.push((product, qty));
        }

        let amounts: Vec<LineAmount> = products
            .iter()
            .map(|(p, qty)| LineAmount {
                unit_price: p.price(),
                quantity: *qty,
            })
            .collect();
        let totals = price_order(&amounts, &self.config.pricing());

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            customer_id: caller.id.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            shipping_cents: totals.shipping.cents(),
            total_cents: totals.total.cents(),
            shipping_address: request.shipping_address,
            billing_address: request.billing_address,
            payment_method: request.payment_method,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };

        let items: Vec<OrderItem> = products
            .iter()
            .map(|(p, qty)| OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                product_id: p.id.clone(),
                vendor_id: p.vendor_id.clone(),
                product_name: p.name.clone(),
                quantity: *qty,
                unit_price_cents: p.price_cents,
                total_cents: p.price_cents * qty,
                created_at: now,
            })
            .collect();

        match self.db.orders().create_order(&order, &items).await {
            Ok(()) => {}
            // The guard lost a race after the pre-check passed; report it
            // with the product's current numbers, like the pre-check would.
            Err(DbError::StockExhausted { product_id }) => {
                let (name, available) = match self.db.products().get_by_id(&product_id).await {
                    Ok(Some(p)) => (p.name, p.stock),
                    _ => (product_id.clone(), 0),
                };
                let requested = products
                    .iter()
                    .find(|(p, _)| p.id == product_id)
                    .map(|(_, qty)| *qty)
                    .unwrap_or(0);
                return Err(CoreError::OutOfStock {
                    product: name,
                    available,
                    requested,
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            order_id = %order.id,
            customer_id = %caller.id,
            total = order.total_cents,
            lines = items.len(),
            "Order placed"
        );

        // After commit: one notification per distinct vendor in the order.
        let mut vendors: Vec<&str> = items.iter().map(|i| i.vendor_id.as_str()).collect();
        vendors.sort_unstable();
        vendors.dedup();
        for vendor_id in vendors {
            let line_count = items.iter().filter(|i| i.vendor_id == vendor_id).count();
            dispatch(
                self.notifier.as_ref(),
                Notification {
                    recipient_id: vendor_id.to_string(),
                    title: "New order received".to_string(),
                    message: format!("You have {} new item(s) to fulfil", line_count),
                    category: NotificationCategory::Order,
                    priority: NotificationPriority::Normal,
                    metadata: serde_json::json!({
                        "order_id": order.id,
                        "line_count": line_count,
                    }),
                    link: Some(format!("/vendor/orders/{}", order.id)),
                },
            )
            .await;
        }

        Ok(PlacedOrder { order, items })
    }

    /// Fetches an order with its items.
    ///
    /// Customers see their own orders; admins see all.
    pub async fn get_order(
        &self,
        caller: Option<&Caller>,
        order_id: &str,
    ) -> Result<PlacedOrder, ApiError> {
        let caller = require_any_role(caller, &[Role::Customer, Role::Admin])?;

        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| ApiError::from(CoreError::OrderNotFound(order_id.to_string())))?;

        if caller.role == Role::Customer && order.customer_id != caller.id {
            return Err(ApiError::forbidden("order belongs to another customer"));
        }

        let items = self.db.orders().get_items(order_id).await?;

        Ok(PlacedOrder { order, items })
    }

    /// Lists the calling customer's orders, most recent first.
    pub async fn list_orders(&self, caller: Option<&Caller>) -> Result<Vec<Order>, ApiError> {
        let caller = require_role(caller, Role::Customer)?;

        Ok(self.db.orders().list_for_customer(&caller.id).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::notify::testing::RecordingSink;
    use souk_db::DbConfig;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

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

    fn request(lines: Vec<OrderLineRequest>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            lines,
            shipping_address: address(),
            billing_address: None,
            payment_method: Some("card".to_string()),
            notes: None,
        }
    }

    async fn seed_product(db: &Database, vendor: &str, price_cents: i64, stock: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            vendor_id: vendor.to_string(),
            sku: format!("SKU-{}", &Uuid::new_v4().to_string()[..8]),
            name: "Hand-thrown mug".to_string(),
            description: None,
            price_cents,
            stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();
        product
    }

    async fn service() -> (OrderIntakeService, Database, Arc<RecordingSink>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sink = Arc::new(RecordingSink::new());
        let service = OrderIntakeService::new(db.clone(), SettlementConfig::default(), sink.clone());
        (service, db, sink)
    }

    #[tokio::test]
    async fn test_place_order_prices_server_side() {
        init_tracing();
        let (service, db, sink) = service().await;
        let p = seed_product(&db, "vendor-1", 1000, 10).await;
        let caller = Caller::customer("customer-1");

        let placed = service
            .place_order(
                Some(&caller),
                request(vec![OrderLineRequest {
                    product_id: p.id.clone(),
                    quantity: 2,
                }]),
            )
            .await
            .unwrap();

        // subtotal $20.00, tax 8.25% = $1.65, shipping $7.99
        assert_eq!(placed.order.subtotal_cents, 2000);
        assert_eq!(placed.order.tax_cents, 165);
        assert_eq!(placed.order.shipping_cents, 799);
        assert_eq!(placed.order.total_cents, 2000 + 165 + 799);
        assert_eq!(
            placed.order.total_cents,
            placed.order.subtotal_cents + placed.order.tax_cents + placed.order.shipping_cents
        );

        assert_eq!(placed.items.len(), 1);
        assert_eq!(placed.items[0].vendor_id, "vendor-1");
        assert_eq!(placed.items[0].unit_price_cents, 1000);

        // Stock decremented
        assert_eq!(db.products().get_by_id(&p.id).await.unwrap().unwrap().stock, 8);

        // One vendor, one notification
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.recipients(), vec!["vendor-1"]);
    }

    #[tokio::test]
    async fn test_place_order_waives_shipping_over_threshold() {
        let (service, db, _) = service().await;
        let p = seed_product(&db, "vendor-1", 5000, 10).await;
        let caller = Caller::customer("customer-1");

        let placed = service
            .place_order(
                Some(&caller),
                request(vec![OrderLineRequest {
                    product_id: p.id,
                    quantity: 2,
                }]),
            )
            .await
            .unwrap();

        assert_eq!(placed.order.subtotal_cents, 10_000);
        assert_eq!(placed.order.shipping_cents, 0);
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_merged() {
        let (service, db, _) = service().await;
        let p = seed_product(&db, "vendor-1", 1000, 10).await;
        let caller = Caller::customer("customer-1");

        let placed = service
            .place_order(
                Some(&caller),
                request(vec![
                    OrderLineRequest {
                        product_id: p.id.clone(),
                        quantity: 1,
                    },
                    OrderLineRequest {
                        product_id: p.id.clone(),
                        quantity: 2,
                    },
                ]),
            )
            .await
            .unwrap();

        assert_eq!(placed.items.len(), 1);
        assert_eq!(placed.items[0].quantity, 3);
        assert_eq!(db.products().get_by_id(&p.id).await.unwrap().unwrap().stock, 7);
    }

    #[tokio::test]
    async fn test_one_notification_per_distinct_vendor() {
        let (service, db, sink) = service().await;
        let p1 = seed_product(&db, "vendor-1", 1000, 10).await;
        let p2 = seed_product(&db, "vendor-1", 2000, 10).await;
        let p3 = seed_product(&db, "vendor-2", 3000, 10).await;
        let caller = Caller::customer("customer-1");

        service
            .place_order(
                Some(&caller),
                request(vec![
                    OrderLineRequest { product_id: p1.id, quantity: 1 },
                    OrderLineRequest { product_id: p2.id, quantity: 1 },
                    OrderLineRequest { product_id: p3.id, quantity: 1 },
                ]),
            )
            .await
            .unwrap();

        let mut recipients = sink.recipients();
        recipients.sort();
        assert_eq!(recipients, vec!["vendor-1", "vendor-2"]);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sink = Arc::new(RecordingSink::failing());
        let service = OrderIntakeService::new(db.clone(), SettlementConfig::default(), sink);

        let p = seed_product(&db, "vendor-1", 1000, 10).await;
        let caller = Caller::customer("customer-1");

        let placed = service
            .place_order(
                Some(&caller),
                request(vec![OrderLineRequest { product_id: p.id, quantity: 1 }]),
            )
            .await
            .unwrap();

        assert!(!placed.order.id.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let (service, db, _) = service().await;
        let p = seed_product(&db, "vendor-1", 1000, 10).await;
        let caller = Caller::customer("customer-1");

        // Empty cart
        let err = service
            .place_order(Some(&caller), request(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        // Zero quantity
        let err = service
            .place_order(
                Some(&caller),
                request(vec![OrderLineRequest {
                    product_id: p.id.clone(),
                    quantity: 0,
                }]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        // Blank shipping address
        let mut bad_address = request(vec![OrderLineRequest {
            product_id: p.id.clone(),
            quantity: 1,
        }]);
        bad_address.shipping_address.city = "".to_string();
        let err = service
            .place_order(Some(&caller), bad_address)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_products_are_not_found() {
        let (service, db, _) = service().await;
        let caller = Caller::customer("customer-1");

        let err = service
            .place_order(
                Some(&caller),
                request(vec![OrderLineRequest {
                    product_id: Uuid::new_v4().to_string(),
                    quantity: 1,
                }]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let mut inactive = seed_product(&db, "vendor-1", 1000, 10).await;
        inactive.is_active = false;
        // Re-seed as inactive under a fresh id
        inactive.id = Uuid::new_v4().to_string();
        db.products().insert(&inactive).await.unwrap();

        let err = service
            .place_order(
                Some(&caller),
                request(vec![OrderLineRequest {
                    product_id: inactive.id,
                    quantity: 1,
                }]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_out_of_stock_names_the_product() {
        let (service, db, sink) = service().await;
        let p = seed_product(&db, "vendor-1", 1000, 1).await;
        let caller = Caller::customer("customer-1");

        let err = service
            .place_order(
                Some(&caller),
                request(vec![OrderLineRequest { product_id: p.id, quantity: 2 }]),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::OutOfStock);
        assert!(err.message.contains("Hand-thrown mug"));
        // Nothing committed, nobody notified
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_intake_on_last_unit() {
        // Stock 1, two concurrent orders for qty 1: exactly one succeeds
        let (service, db, _) = service().await;
        let p = seed_product(&db, "vendor-1", 1000, 1).await;

        let a = Caller::customer("customer-a");
        let b = Caller::customer("customer-b");

        let req = |pid: &str| {
            request(vec![OrderLineRequest {
                product_id: pid.to_string(),
                quantity: 1,
            }])
        };

        let (first, second) = tokio::join!(
            service.place_order(Some(&a), req(&p.id)),
            service.place_order(Some(&b), req(&p.id)),
        );

        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let failure = if first.is_err() { first } else { second };
        assert_eq!(failure.unwrap_err().code, ErrorCode::OutOfStock);

        // Stock floor holds
        assert_eq!(db.products().get_by_id(&p.id).await.unwrap().unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_auth_required() {
        let (service, db, _) = service().await;
        let p = seed_product(&db, "vendor-1", 1000, 10).await;

        let err = service
            .place_order(None, request(vec![OrderLineRequest { product_id: p.id.clone(), quantity: 1 }]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);

        let vendor = Caller::vendor("vendor-1");
        let err = service
            .place_order(Some(&vendor), request(vec![OrderLineRequest { product_id: p.id, quantity: 1 }]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_get_order_ownership() {
        let (service, db, _) = service().await;
        let p = seed_product(&db, "vendor-1", 1000, 10).await;
        let owner = Caller::customer("customer-1");

        let placed = service
            .place_order(
                Some(&owner),
                request(vec![OrderLineRequest { product_id: p.id, quantity: 1 }]),
            )
            .await
            .unwrap();

        // Owner and admin can read it
        let fetched = service.get_order(Some(&owner), &placed.order.id).await.unwrap();
        assert_eq!(fetched.items.len(), 1);
        let admin = Caller::admin("admin-1");
        assert!(service.get_order(Some(&admin), &placed.order.id).await.is_ok());

        // Another customer cannot
        let stranger = Caller::customer("customer-2");
        let err = service
            .get_order(Some(&stranger), &placed.order.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_list_orders() {
        let (service, db, _) = service().await;
        let p = seed_product(&db, "vendor-1", 1000, 10).await;
        let caller = Caller::customer("customer-1");

        for _ in 0..2 {
            service
                .place_order(
                    Some(&caller),
                    request(vec![OrderLineRequest {
                        product_id: p.id.clone(),
                        quantity: 1,
                    }]),
                )
                .await
                .unwrap();
        }

        let orders = service.list_orders(Some(&caller)).await.unwrap();
        assert_eq!(orders.len(), 2);

        let other = Caller::customer("customer-2");
        assert!(service.list_orders(Some(&other)).await.unwrap().is_empty());
    }
}
