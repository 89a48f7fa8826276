//! # Order Pricing
//!
//! Server-side computation of order totals.
//!
//! ## Pricing Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Totals                                      │
//! │                                                                         │
//! │  subtotal = Σ (unit_price × quantity)        ← prices read server-side  │
//! │  tax      = subtotal × tax rate (bps)                                   │
//! │  shipping = flat fee                                                    │
//! │             waived when subtotal ≥ free-shipping threshold              │
//! │  total    = subtotal + tax + shipping        ← stored invariant         │
//! │                                                                         │
//! │  Client-supplied prices are never consulted. The cart sends            │
//! │  (product_id, quantity) pairs only; unit prices come from the          │
//! │  product records at intake time.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::money::Money;
use crate::types::TaxRate;

// =============================================================================
// Pricing Configuration
// =============================================================================

/// The tenant's pricing knobs.
#[derive(Debug, Clone, Copy)]
pub struct PricingConfig {
    /// Sales tax rate applied to the subtotal.
    pub tax_rate: TaxRate,

    /// Flat shipping fee per order.
    pub shipping_flat: Money,

    /// Orders with subtotal at or above this threshold ship free.
    pub free_shipping_threshold: Money,
}

// =============================================================================
// Line Amounts & Totals
// =============================================================================

/// One priced order line: the server-side unit price and the quantity.
#[derive(Debug, Clone, Copy)]
pub struct LineAmount {
    pub unit_price: Money,
    pub quantity: i64,
}

impl LineAmount {
    /// Line total: `unit_price × quantity`.
    #[inline]
    pub fn total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// The computed monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
}

/// Computes order totals from priced lines.
///
/// ## Example
/// ```rust
/// use souk_core::money::Money;
/// use souk_core::pricing::{price_order, LineAmount, PricingConfig};
/// use souk_core::types::TaxRate;
///
/// let config = PricingConfig {
///     tax_rate: TaxRate::from_bps(1000),                   // 10%
///     shipping_flat: Money::from_cents(500),               // $5.00
///     free_shipping_threshold: Money::from_cents(5000),    // $50.00
/// };
///
/// let totals = price_order(
///     &[LineAmount { unit_price: Money::from_cents(1000), quantity: 2 }],
///     &config,
/// );
///
/// assert_eq!(totals.subtotal.cents(), 2000);
/// assert_eq!(totals.tax.cents(), 200);
/// assert_eq!(totals.shipping.cents(), 500); // below threshold
/// assert_eq!(totals.total.cents(), 2700);
/// ```
pub fn price_order(lines: &[LineAmount], config: &PricingConfig) -> OrderTotals {
    let subtotal: Money = lines.iter().map(LineAmount::total).sum();

    let tax = subtotal.calculate_tax(config.tax_rate);

    let shipping = if subtotal >= config.free_shipping_threshold {
        Money::zero()
    } else {
        config.shipping_flat
    };

    OrderTotals {
        subtotal,
        tax,
        shipping,
        total: subtotal + tax + shipping,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
