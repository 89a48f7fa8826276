//! # Ledger Query Engine
//!
//! Computes a vendor's unsettled balance from order items not claimed by a
//! settling payout.
//!
//! ## Live Recomputation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  available_balance(v)                                                   │
//! │      = Σ total over v's order items                                     │
//! │      − Σ total over the subset claimed by any payout of v with         │
//! │        status ∈ {processing, completed}                                 │
//! │                                                                         │
//! │  Recomputed on every call — no cache, no settled flag — so a          │
//! │  cancelled payout's items reappear immediately and a freshly           │
//! │  processing payout's items vanish immediately.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use souk_core::{Money, OrderItem};
use souk_db::Database;

use crate::auth::{require_role, Caller, Role};
use crate::error::ApiError;

// =============================================================================
// Summary
// =============================================================================

/// The conservation identity, made queryable:
/// `available + settled == lifetime_revenue`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorLedgerSummary {
    /// Σ total over all of the vendor's order items, ever.
    pub lifetime_revenue_cents: i64,

    /// Σ committed totals over the vendor's processing/completed payouts.
    pub settled_cents: i64,

    /// What the vendor could request right now.
    pub available_cents: i64,
}

// =============================================================================
// Service
// =============================================================================

/// The Ledger Query Engine.
#[derive(Clone)]
pub struct LedgerService {
    db: Database,
}

impl LedgerService {
    /// Creates a new ledger service.
    pub fn new(db: Database) -> Self {
        LedgerService { db }
    }

    /// The calling vendor's available (unsettled) balance.
    pub async fn balance(&self, caller: Option<&Caller>) -> Result<Money, ApiError> {
        let caller = require_role(caller, Role::Vendor)?;
        self.available_balance(&caller.id).await
    }

    /// The calling vendor's unsettled items, oldest first.
    pub async fn unsettled(&self, caller: Option<&Caller>) -> Result<Vec<OrderItem>, ApiError> {
        let caller = require_role(caller, Role::Vendor)?;
        Ok(self.db.payouts().unsettled_items(&caller.id).await?)
    }

    /// The calling vendor's full item history (settled and unsettled),
    /// oldest first.
    pub async fn history(&self, caller: Option<&Caller>) -> Result<Vec<OrderItem>, ApiError> {
        let caller = require_role(caller, Role::Vendor)?;
        Ok(self.db.orders().items_for_vendor(&caller.id).await?)
    }

    /// The calling vendor's ledger summary.
    pub async fn summary(&self, caller: Option<&Caller>) -> Result<VendorLedgerSummary, ApiError> {
        let caller = require_role(caller, Role::Vendor)?;

        let lifetime: Money = self
            .db
            .orders()
            .items_for_vendor(&caller.id)
            .await?
            .iter()
            .map(OrderItem::total)
            .sum();
        let settled = self.db.payouts().settled_committed_total(&caller.id).await?;
        let available = self.available_balance(&caller.id).await?;

        Ok(VendorLedgerSummary {
            lifetime_revenue_cents: lifetime.cents(),
            settled_cents: settled,
            available_cents: available.cents(),
        })
    }

    /// Balance by raw vendor id; the payout builder calls this inside its
    /// per-vendor critical section, after doing its own auth.
    pub(crate) async fn available_balance(&self, vendor_id: &str) -> Result<Money, ApiError> {
        let total: Money = self
            .db
            .payouts()
            .unsettled_items(vendor_id)
            .await?
            .iter()
            .map(OrderItem::total)
            .sum();

        Ok(total)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
// The interesting ledger behavior (exclusion rules, conservation under
// settlement) needs payout lifecycle writes, so it is exercised end-to-end in
// payout.rs's tests. Here: auth surface and the trivial empty case.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use souk_db::DbConfig;

    #[tokio::test]
    async fn test_balance_requires_vendor() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = LedgerService::new(db);

        let err = service.balance(None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);

        let customer = Caller::customer("customer-1");
        let err = service.balance(Some(&customer)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_fresh_vendor_has_zero_balance() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = LedgerService::new(db);
        let vendor = Caller::vendor("vendor-1");

        assert_eq!(service.balance(Some(&vendor)).await.unwrap(), Money::zero());
        assert!(service.unsettled(Some(&vendor)).await.unwrap().is_empty());

        let summary = service.summary(Some(&vendor)).await.unwrap();
        assert_eq!(summary.lifetime_revenue_cents, 0);
        assert_eq!(summary.settled_cents, 0);
        assert_eq!(summary.available_cents, 0);
    }
}
