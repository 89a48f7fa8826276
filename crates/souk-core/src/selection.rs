//! # Payout Selection
//!
//! Deterministic FIFO greedy selection of unsettled order items for a payout.
//!
//! ## The Core Business Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 FIFO Greedy Selection                                   │
//! │                                                                         │
//! │  Unsettled items, oldest first:                                         │
//! │                                                                         │
//! │    t1: $10.00   t2: $10.00   t3: $10.00                                │
//! │                                                                         │
//! │  Vendor requests $15.00:                                                │
//! │                                                                         │
//! │    take t1 ($10.00)  → running sum $10.00  < $15.00, keep going        │
//! │    take t2 ($10.00)  → running sum $20.00  ≥ $15.00, stop              │
//! │                                                                         │
//! │  Included: {t1, t2}, committed total $20.00                            │
//! │  Items are never split, so the committed total may overshoot the       │
//! │  requested amount. The payout stores both numbers.                      │
//! │                                                                         │
//! │  Determinism: sort by (created_at, id). Same pool + same request       │
//! │  ⇒ same selection, every time.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::money::Money;
use crate::types::OrderItem;

// =============================================================================
// Selection Result
// =============================================================================

/// The outcome of a successful selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Ids of the included order items, in selection (FIFO) order.
    pub item_ids: Vec<String>,

    /// Sum of the included items' totals. ≥ the requested amount.
    pub committed_total: Money,

    /// Timestamp of the earliest included item.
    pub period_start: DateTime<Utc>,

    /// Timestamp of the latest included item.
    pub period_end: DateTime<Utc>,
}

/// Greedily selects unsettled items to cover `requested`.
///
/// Items are sorted ascending by creation time, ties broken by id, then
/// accumulated until the running sum reaches the requested amount. Items are
/// never split.
///
/// Returns `None` when the pool is empty or cannot cover the request; callers
/// check the balance precondition first, so `None` here means the pool changed
/// underneath them.
pub fn select_for_amount(items: &[OrderItem], requested: Money) -> Option<Selection> {
    if items.is_empty() || !requested.is_positive() {
        return None;
    }

    let mut ordered: Vec<&OrderItem> = items.iter().collect();
    ordered.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut item_ids = Vec::new();
    let mut running = Money::zero();
    let mut period_start: Option<DateTime<Utc>> = None;
    let mut period_end: Option<DateTime<Utc>> = None;

    for item in ordered {
        item_ids.push(item.id.clone());
        running += item.total();
        period_start.get_or_insert(item.created_at);
        period_end = Some(item.created_at);

        if running >= requested {
            return Some(Selection {
                item_ids,
                committed_total: running,
                period_start: period_start?,
                period_end: period_end?,
            });
        }
    }

    // Pool exhausted without covering the request.
    None
}

// =============================================================================
// Unit Tests
// =============================================================================
