//! # Domain Types
//!
//! Core domain types for the Souk settlement ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │     Order       │   │  VendorPayout   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  vendor_id      │   │  customer_id    │   │  vendor_id      │       │
//! │  │  price_cents    │   │  total_cents    │   │  amount_cents   │       │
//! │  │  stock          │   │  status         │   │  status         │       │
//! │  └─────────────────┘   └────────┬────────┘   └────────┬────────┘       │
//! │                                 │ owns               │ references      │
//! │                        ┌────────▼────────┐           │ (weak set)      │
//! │                        │   OrderItem     │◄──────────┘                 │
//! │                        │  ─────────────  │                             │
//! │                        │  vendor_id      │  ← copied at order time     │
//! │                        │  unit_price     │  ← price snapshot           │
//! │                        │  created_at     │  ← FIFO ordering key        │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! An OrderItem freezes the product's vendor, name and unit price at order
//! time. Later catalog edits never rewrite settled history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 825 bps = 8.25%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Address
// =============================================================================

/// A postal address attached to an order.
///
/// ## Boundary Validation
/// `deny_unknown_fields` rejects payloads with stray keys instead of silently
/// dropping them; persisted records stay exactly this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Address {
    /// Recipient name.
    pub name: String,

    /// Street address, first line.
    pub line1: String,

    /// Street address, second line.
    pub line2: Option<String>,

    pub city: String,

    /// State / province / governorate.
    pub region: String,

    pub postal_code: String,

    /// ISO country code or full name; opaque to the settlement core.
    pub country: String,
}

// =============================================================================
// Order Status
// =============================================================================

/// Fulfillment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order accepted, payment not yet confirmed.
    Pending,
    /// Payment confirmed.
    Confirmed,
    /// Being prepared by the vendor(s).
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// Payment status of an order, owned by the external payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

// =============================================================================
// Payout Status & Method
// =============================================================================

/// The status of a vendor payout.
///
/// ## State Machine
/// ```text
/// pending ──► processing ──► completed
///    │             │
///    │             └───────► failed
///    │
///    └─► (vendor cancel: record deleted, no stored state)
/// ```
///
/// The table is strict: terminal states are final. The legacy behavior of
/// accepting any status from any status is deliberately tightened here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Requested by the vendor, not yet picked up by an admin.
    Pending,
    /// An admin is executing the transfer. Included items are now settled.
    Processing,
    /// Transfer confirmed. Terminal.
    Completed,
    /// Transfer failed. Terminal; the money question moves to support.
    Failed,
}

impl PayoutStatus {
    /// Whether the transition table allows `self → next`.
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }

    /// Terminal states stamp `processed_at` and accept no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Failed)
    }

    /// States whose included items count as settled (excluded from the
    /// unsettled pool).
    pub const fn settles_items(self) -> bool {
        matches!(self, PayoutStatus::Processing | PayoutStatus::Completed)
    }
}

impl Default for PayoutStatus {
    fn default() -> Self {
        PayoutStatus::Pending
    }
}

/// How a payout is disbursed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    BankTransfer,
    Paypal,
    Check,
}

// =============================================================================
// Product
// =============================================================================

/// A product listed by a vendor.
///
/// ## Ownership Note
/// The catalog (creation, pricing, descriptions) is owned by an external
/// collaborator. The settlement core reads products for server-side pricing
/// and mutates exactly one field: the stock counter, via the atomic
/// conditional decrement in order intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Vendor that owns this product; copied onto order items at order time.
    pub vendor_id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name, snapshotted onto order items.
    pub name: String,

    pub description: Option<String>,

    /// Price in cents. Always read server-side; client prices are ignored.
    pub price_cents: i64,

    /// Current stock level. Mutated only by the conditional decrement.
    pub stock: i64,

    /// Whether the product can be ordered (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A customer order.
///
/// Immutable after creation except `status` / `payment_status`.
/// Monetary invariant: `total = subtotal + tax + shipping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    /// Opaque token from the external payment collaborator.
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Order Item
// =============================================================================

/// A line item in an order.
/// Uses the snapshot pattern to freeze product data at order time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,

    /// Owning order (exactly one).
    pub order_id: String,

    pub product_id: String,

    /// Vendor at time of order (frozen; never re-derived from the product).
    pub vendor_id: String,

    /// Product name at time of order (frozen).
    pub product_name: String,

    /// Quantity ordered (> 0).
    pub quantity: i64,

    /// Unit price in cents at time of order (frozen).
    pub unit_price_cents: i64,

    /// Line total: `quantity × unit_price_cents`.
    pub total_cents: i64,

    /// Creation timestamp; the FIFO ordering key for payout selection.
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Returns the line total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Vendor Payout
// =============================================================================

/// A vendor's request to convert unsettled revenue into a payout.
///
/// `included_item_ids` is a **weak reference set**: the payout points at order
/// items, it does not own them. At most one payout in a settling status
/// (processing/completed) may reference a given item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPayout {
    pub id: String,
    pub vendor_id: String,

    /// The amount the vendor asked for.
    pub amount_cents: i64,

    /// Audit: the actual sum of included items. May exceed `amount_cents`
    /// because items are never split.
    pub committed_total_cents: i64,

    pub status: PayoutStatus,
    pub payout_method: PayoutMethod,

    /// Timestamp of the earliest included item.
    pub period_start: DateTime<Utc>,

    /// Timestamp of the latest included item.
    pub period_end: DateTime<Utc>,

    /// Order item ids claimed by this payout (weak reference set).
    pub included_item_ids: Vec<String>,

    pub admin_notes: Option<String>,

    /// External transfer reference set by the admin.
    pub payment_reference: Option<String>,

    /// Set only on transition into completed or failed.
    pub processed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl VendorPayout {
    /// Returns the requested amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Returns the committed (included-sum) amount as Money.
    #[inline]
    pub fn committed_total(&self) -> Money {
        Money::from_cents(self.committed_total_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(825);
        assert_eq!(rate.bps(), 825);
        assert!((rate.percentage() - 8.25).abs() < 0.001);
    }

    #[test]
    fn test_payout_transition_table() {
        use PayoutStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        // Everything else is denied
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_payout_status_flags() {
        assert!(PayoutStatus::Completed.is_terminal());
        assert!(PayoutStatus::Failed.is_terminal());
        assert!(!PayoutStatus::Pending.is_terminal());

        assert!(PayoutStatus::Processing.settles_items());
        assert!(PayoutStatus::Completed.settles_items());
        assert!(!PayoutStatus::Pending.settles_items());
        assert!(!PayoutStatus::Failed.settles_items());
    }

    #[test]
    fn test_address_rejects_unknown_fields() {
        let json = r#"{
            "name": "A. Customer",
            "line1": "1 Main St",
            "line2": null,
            "city": "Springfield",
            "region": "IL",
            "postal_code": "62701",
            "country": "US",
            "loyalty_tier": "gold"
        }"#;
        assert!(serde_json::from_str::<Address>(json).is_err());
    }

    #[test]
    fn test_status_serde_wire_format() {
        assert_eq!(
            serde_json::to_string(&PayoutStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&PayoutMethod::BankTransfer).unwrap(),
            "\"bank_transfer\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Pending).unwrap(),
            "\"pending\""
        );
    }
}
