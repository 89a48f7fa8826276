//! # Payout Request Builder & Lifecycle Manager
//!
//! Converts a vendor's payout request into a deterministic selection of
//! unsettled items, then administers the payout's life until the revenue is
//! permanently settled.
//!
//! ## The Double-Spend Defence, in Two Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1 — creation (this file):                                        │
//! │     a per-vendor async mutex is held across                             │
//! │     read pool → check balance → select items → insert payout,          │
//! │     so two concurrent requests for the same vendor serialize.          │
//! │                                                                         │
//! │  Layer 2 — settlement (PayoutRepository::transition):                   │
//! │     entering 'processing' re-verifies, inside the transaction, that    │
//! │     no included item is already claimed by another settling payout.    │
//! │     Pending payouts don't lock their items, so two serialized          │
//! │     requests may overlap; the second one dies here, not at the bank.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use souk_core::selection::select_for_amount;
use souk_core::validation::{validate_payout_amount, validate_uuid};
use souk_core::{CoreError, Money, PayoutMethod, PayoutStatus, VendorPayout};
use souk_db::{Database, TransitionOutcome};

use crate::auth::{require_any_role, require_role, Caller, Role};
use crate::error::ApiError;
use crate::ledger::LedgerService;
use crate::notify::{
    dispatch, Notification, NotificationCategory, NotificationPriority, NotificationSink,
    ADMIN_RECIPIENT,
};

// =============================================================================
// Requests
// =============================================================================

/// A vendor's payout request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    /// Requested amount in cents. Must be positive and within the vendor's
    /// unsettled balance.
    pub amount_cents: i64,
    pub method: PayoutMethod,
}

// =============================================================================
// Service
// =============================================================================

/// The Payout Request Builder and Lifecycle Manager.
#[derive(Clone)]
pub struct PayoutService {
    db: Database,
    ledger: LedgerService,
    notifier: Arc<dyn NotificationSink>,
    /// One async mutex per vendor; guards the read-decide-insert sequence of
    /// payout creation. The map itself is touched only briefly.
    vendor_locks: Arc<StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PayoutService {
    /// Creates a new payout service.
    pub fn new(db: Database, notifier: Arc<dyn NotificationSink>) -> Self {
        PayoutService {
            ledger: LedgerService::new(db.clone()),
            db,
            notifier,
            vendor_locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    fn vendor_lock(&self, vendor_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.vendor_locks.lock().expect("vendor lock map poisoned");
        locks
            .entry(vendor_id.to_string())
            .or_default()
            .clone()
    }

    /// Builds a new pending payout for the calling vendor.
    ///
    /// ## Selection
    /// Unsettled items, oldest first (ties by id), greedily accumulated until
    /// the running sum covers the request. Items are never split, so the
    /// committed sum may overshoot; the payout stores the requested amount
    /// and keeps the committed sum for audit.
    pub async fn request_payout(
        &self,
        caller: Option<&Caller>,
        request: PayoutRequest,
    ) -> Result<VendorPayout, ApiError> {
        let caller = require_role(caller, Role::Vendor)?;

        // Rejected before any ledger read; no record is ever created.
        validate_payout_amount(request.amount_cents)?;
        let requested = Money::from_cents(request.amount_cents);

        debug!(vendor_id = %caller.id, amount = request.amount_cents, "request_payout");

        // Critical section: any other payout creation for this vendor waits
        // here until our insert is committed.
        let lock = self.vendor_lock(&caller.id);
        let _guard = lock.lock().await;

        let items = self.db.payouts().unsettled_items(&caller.id).await?;
        if items.is_empty() {
            return Err(CoreError::NoUnpaidItems.into());
        }

        let balance: Money = items.iter().map(|i| i.total()).sum();
        if requested > balance {
            return Err(CoreError::InsufficientBalance {
                available_cents: balance.cents(),
                requested_cents: requested.cents(),
            }
            .into());
        }

        // Balance covers the request, so selection cannot come up short.
        let selection = select_for_amount(&items, requested)
            .ok_or_else(|| ApiError::internal("payout selection failed on a covered balance"))?;

        let payout = VendorPayout {
            id: Uuid::new_v4().to_string(),
            vendor_id: caller.id.clone(),
            amount_cents: requested.cents(),
            committed_total_cents: selection.committed_total.cents(),
            status: PayoutStatus::Pending,
            payout_method: request.method,
            period_start: selection.period_start,
            period_end: selection.period_end,
            included_item_ids: selection.item_ids,
            admin_notes: None,
            payment_reference: None,
            processed_at: None,
            created_at: Utc::now(),
        };

        self.db.payouts().create_payout(&payout).await?;
        drop(_guard);

        info!(
            payout_id = %payout.id,
            vendor_id = %payout.vendor_id,
            amount = payout.amount_cents,
            committed = payout.committed_total_cents,
            items = payout.included_item_ids.len(),
            "Payout requested"
        );

        dispatch(
            self.notifier.as_ref(),
            Notification {
                recipient_id: ADMIN_RECIPIENT.to_string(),
                title: "New payout request".to_string(),
                message: format!("A vendor requested a payout of {}", payout.amount()),
                category: NotificationCategory::Payout,
                priority: NotificationPriority::High,
                metadata: serde_json::json!({
                    "payout_id": payout.id,
                    "amount_cents": payout.amount_cents,
                }),
                link: Some(format!("/admin/payouts/{}", payout.id)),
            },
        )
        .await;

        Ok(payout)
    }

    /// Admin-only: moves a payout through its lifecycle.
    ///
    /// The requested transition is validated against the transition table on
    /// the value we read, then conditioned on the *stored* status at commit
    /// time, so a concurrent cancel or competing admin is detected rather
    /// than overwritten.
    pub async fn transition(
        &self,
        caller: Option<&Caller>,
        payout_id: &str,
        next: PayoutStatus,
        admin_notes: Option<String>,
        payment_reference: Option<String>,
    ) -> Result<VendorPayout, ApiError> {
        require_role(caller, Role::Admin)?;
        validate_uuid("payout_id", payout_id)?;

        let payout = self
            .db
            .payouts()
            .get_by_id(payout_id)
            .await?
            .ok_or_else(|| ApiError::from(CoreError::PayoutNotFound(payout_id.to_string())))?;

        if !payout.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: payout.status,
                to: next,
            }
            .into());
        }

        let processed_at = next.is_terminal().then(Utc::now);

        let outcome = self
            .db
            .payouts()
            .transition(
                payout_id,
                payout.status,
                next,
                admin_notes.as_deref(),
                payment_reference.as_deref(),
                processed_at,
            )
            .await?;

        match outcome {
            TransitionOutcome::Applied => {}
            TransitionOutcome::StaleStatus => {
                return Err(ApiError::conflict(
                    "payout changed concurrently; re-read and retry",
                ));
            }
            TransitionOutcome::ItemsAlreadySettled => {
                return Err(ApiError::conflict(
                    "one or more included items were already settled by another payout",
                ));
            }
        }

        let updated = self
            .db
            .payouts()
            .get_by_id(payout_id)
            .await?
            .ok_or_else(|| ApiError::from(CoreError::PayoutNotFound(payout_id.to_string())))?;

        info!(
            payout_id = %payout_id,
            from = ?payout.status,
            to = ?next,
            "Payout transitioned"
        );

        self.notify_vendor_status(&updated).await;

        Ok(updated)
    }

    /// Vendor-only: cancels the caller's own pending payout, deleting it.
    ///
    /// The pending check happens inside the conditional DELETE; losing the
    /// race to an admin transition yields Conflict, never a deleted
    /// processing payout. Items return to the unsettled pool implicitly.
    pub async fn cancel(&self, caller: Option<&Caller>, payout_id: &str) -> Result<(), ApiError> {
        let caller = require_role(caller, Role::Vendor)?;
        validate_uuid("payout_id", payout_id)?;

        let payout = self
            .db
            .payouts()
            .get_by_id(payout_id)
            .await?
            .ok_or_else(|| ApiError::from(CoreError::PayoutNotFound(payout_id.to_string())))?;

        if payout.vendor_id != caller.id {
            return Err(ApiError::forbidden("payout belongs to another vendor"));
        }

        if !self.db.payouts().delete_pending(payout_id).await? {
            return Err(ApiError::conflict(
                "payout is no longer pending and cannot be cancelled",
            ));
        }

        info!(payout_id = %payout_id, vendor_id = %caller.id, "Payout cancelled");

        dispatch(
            self.notifier.as_ref(),
            Notification {
                recipient_id: caller.id.clone(),
                title: "Payout request cancelled".to_string(),
                message: "Your payout request was cancelled; its items are available again"
                    .to_string(),
                category: NotificationCategory::Payout,
                priority: NotificationPriority::Normal,
                metadata: serde_json::json!({ "payout_id": payout_id }),
                link: None,
            },
        )
        .await;

        Ok(())
    }

    /// Fetches a payout. Admins see all; vendors see their own.
    pub async fn get(
        &self,
        caller: Option<&Caller>,
        payout_id: &str,
    ) -> Result<VendorPayout, ApiError> {
        let caller = require_any_role(caller, &[Role::Vendor, Role::Admin])?;

        let payout = self
            .db
            .payouts()
            .get_by_id(payout_id)
            .await?
            .ok_or_else(|| ApiError::from(CoreError::PayoutNotFound(payout_id.to_string())))?;

        if caller.role == Role::Vendor && payout.vendor_id != caller.id {
            return Err(ApiError::forbidden("payout belongs to another vendor"));
        }

        Ok(payout)
    }

    /// Lists the calling vendor's payouts, newest first.
    pub async fn list_mine(&self, caller: Option<&Caller>) -> Result<Vec<VendorPayout>, ApiError> {
        let caller = require_role(caller, Role::Vendor)?;
        Ok(self.db.payouts().list_for_vendor(&caller.id).await?)
    }

    /// Admin work queue: payouts in a given status, oldest first.
    pub async fn admin_queue(
        &self,
        caller: Option<&Caller>,
        status: PayoutStatus,
    ) -> Result<Vec<VendorPayout>, ApiError> {
        require_role(caller, Role::Admin)?;
        Ok(self.db.payouts().list_by_status(status).await?)
    }

    /// The ledger view this service shares its database with.
    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    async fn notify_vendor_status(&self, payout: &VendorPayout) {
        dispatch(
            self.notifier.as_ref(),
            Notification {
                recipient_id: payout.vendor_id.clone(),
                title: "Payout status update".to_string(),
                message: format!("Your payout of {} is now {:?}", payout.amount(), payout.status),
                category: NotificationCategory::Payout,
                priority: NotificationPriority::Normal,
                metadata: serde_json::json!({
                    "payout_id": payout.id,
                    "status": payout.status,
                }),
                link: None,
            },
        )
        .await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
