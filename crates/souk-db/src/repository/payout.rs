//! # Payout Repository
//!
//! Database operations for vendor payouts and the unsettled-item pool.
//!
//! ## The Settlement Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  An order item is settled by AT MOST ONE payout in a settling status    │
//! │  (processing or completed), at any point in time.                       │
//! │                                                                         │
//! │  unsettled pool (vendor v):                                             │
//! │      items of v  −  items claimed by any processing/completed payout    │
//! │                                                                         │
//! │  Pending payouts do NOT remove items from the pool. Two pending         │
//! │  payouts may therefore claim overlapping items; the overlap is          │
//! │  rejected when the second one tries to enter 'processing':              │
//! │                                                                         │
//! │  transition(pending → processing), in ONE transaction:                  │
//! │      1. any included item already claimed by another                    │
//! │         processing/completed payout?  → ItemsAlreadySettled             │
//! │      2. UPDATE ... WHERE id = ? AND status = 'pending'                  │
//! │         (0 rows ⇒ StaleStatus: a cancel or another admin won the race)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use souk_core::{OrderItem, PayoutMethod, PayoutStatus, VendorPayout};

/// Row mapping for the vendor_payouts table.
///
/// The included-item set lives in the payout_items join table and is loaded
/// with a second query.
#[derive(sqlx::FromRow)]
struct PayoutRow {
    id: String,
    vendor_id: String,
    amount_cents: i64,
    committed_total_cents: i64,
    status: PayoutStatus,
    payout_method: PayoutMethod,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    admin_notes: Option<String>,
    payment_reference: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl PayoutRow {
    fn into_payout(self, included_item_ids: Vec<String>) -> VendorPayout {
        VendorPayout {
            id: self.id,
            vendor_id: self.vendor_id,
            amount_cents: self.amount_cents,
            committed_total_cents: self.committed_total_cents,
            status: self.status,
            payout_method: self.payout_method,
            period_start: self.period_start,
            period_end: self.period_end,
            included_item_ids,
            admin_notes: self.admin_notes,
            payment_reference: self.payment_reference,
            processed_at: self.processed_at,
            created_at: self.created_at,
        }
    }
}

const PAYOUT_COLUMNS: &str = r#"
    id, vendor_id, amount_cents, committed_total_cents,
    status, payout_method, period_start, period_end,
    admin_notes, payment_reference, processed_at, created_at
"#;

/// Outcome of an optimistic lifecycle write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The conditional write matched and the payout moved.
    Applied,
    /// The payout's stored status no longer matched the expected one; a
    /// concurrent cancel or transition won the race.
    StaleStatus,
    /// Entering 'processing' was refused because an included item is already
    /// claimed by another processing/completed payout.
    ItemsAlreadySettled,
}

/// Repository for payout database operations.
#[derive(Debug, Clone)]
pub struct PayoutRepository {
    pool: SqlitePool,
}

impl PayoutRepository {
    /// Creates a new PayoutRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PayoutRepository { pool }
    }

    /// Inserts a payout and its included-item set in one transaction.
    pub async fn create_payout(&self, payout: &VendorPayout) -> DbResult<()> {
        debug!(
            payout_id = %payout.id,
            vendor_id = %payout.vendor_id,
            amount = payout.amount_cents,
            items = payout.included_item_ids.len(),
            "Creating payout"
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO vendor_payouts (
                id, vendor_id, amount_cents, committed_total_cents,
                status, payout_method, period_start, period_end,
                admin_notes, payment_reference, processed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&payout.id)
        .bind(&payout.vendor_id)
        .bind(payout.amount_cents)
        .bind(payout.committed_total_cents)
        .bind(payout.status)
        .bind(payout.payout_method)
        .bind(payout.period_start)
        .bind(payout.period_end)
        .bind(&payout.admin_notes)
        .bind(&payout.payment_reference)
        .bind(payout.processed_at)
        .bind(payout.created_at)
        .execute(&mut *tx)
        .await?;

        for item_id in &payout.included_item_ids {
            sqlx::query("INSERT INTO payout_items (payout_id, order_item_id) VALUES (?1, ?2)")
                .bind(&payout.id)
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    /// Gets a payout by ID, including its item set.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<VendorPayout>> {
        let row = sqlx::query_as::<_, PayoutRow>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM vendor_payouts WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let item_ids = self.included_item_ids(id).await?;
                Ok(Some(row.into_payout(item_ids)))
            }
            None => Ok(None),
        }
    }

    /// Ids of the order items a payout claims, in FIFO (creation) order.
    pub async fn included_item_ids(&self, payout_id: &str) -> DbResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT pi.order_item_id
            FROM payout_items pi
            JOIN order_items oi ON oi.id = pi.order_item_id
            WHERE pi.payout_id = ?1
            ORDER BY oi.created_at, oi.id
            "#,
        )
        .bind(payout_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// The vendor's unsettled order items, sorted by (created_at, id).
    ///
    /// ## The Exclusion Rule
    /// An item is settled once it is claimed by any payout in a settling
    /// status (processing/completed). Pending and failed payouts leave their
    /// items in the pool. Recomputed live on every call; no cache.
    pub async fn unsettled_items(&self, vendor_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT
                oi.id, oi.order_id, oi.product_id, oi.vendor_id, oi.product_name,
                oi.quantity, oi.unit_price_cents, oi.total_cents, oi.created_at
            FROM order_items oi
            WHERE oi.vendor_id = ?1
              AND oi.id NOT IN (
                  SELECT pi.order_item_id
                  FROM payout_items pi
                  JOIN vendor_payouts p ON p.id = pi.payout_id
                  WHERE p.status IN ('processing', 'completed')
              )
            ORDER BY oi.created_at, oi.id
            "#,
        )
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Sum of committed totals over the vendor's settling payouts
    /// (processing/completed). The other half of the conservation identity:
    /// settled + unsettled = lifetime revenue.
    pub async fn settled_committed_total(&self, vendor_id: &str) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(committed_total_cents)
            FROM vendor_payouts
            WHERE vendor_id = ?1 AND status IN ('processing', 'completed')
            "#,
        )
        .bind(vendor_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }

    /// Optimistically transitions a payout from `expected` to `next`.
    ///
    /// The status check happens inside the conditional UPDATE itself, so a
    /// cancel or competing transition that committed after our read is
    /// detected as `StaleStatus` rather than silently overwritten.
    ///
    /// Entering 'processing' additionally verifies, in the same transaction,
    /// that no included item is claimed by another settling payout.
    pub async fn transition(
        &self,
        payout_id: &str,
        expected: PayoutStatus,
        next: PayoutStatus,
        admin_notes: Option<&str>,
        payment_reference: Option<&str>,
        processed_at: Option<DateTime<Utc>>,
    ) -> DbResult<TransitionOutcome> {
        debug!(payout_id = %payout_id, ?expected, ?next, "Transitioning payout");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        if next == PayoutStatus::Processing {
            if Self::has_settled_overlap(&mut tx, payout_id).await? {
                tx.rollback()
                    .await
                    .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
                return Ok(TransitionOutcome::ItemsAlreadySettled);
            }
        }

        let result = sqlx::query(
            r#"
            UPDATE vendor_payouts
            SET status = ?3,
                admin_notes = COALESCE(?4, admin_notes),
                payment_reference = COALESCE(?5, payment_reference),
                processed_at = COALESCE(?6, processed_at)
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(payout_id)
        .bind(expected)
        .bind(next)
        .bind(admin_notes)
        .bind(payment_reference)
        .bind(processed_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
            return Ok(TransitionOutcome::StaleStatus);
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(TransitionOutcome::Applied)
    }

    /// Whether any item of this payout is claimed by another settling payout.
    async fn has_settled_overlap(
        tx: &mut Transaction<'_, Sqlite>,
        payout_id: &str,
    ) -> DbResult<bool> {
        let overlap: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM payout_items pi
            JOIN vendor_payouts p ON p.id = pi.payout_id
            WHERE p.id != ?1
              AND p.status IN ('processing', 'completed')
              AND pi.order_item_id IN (
                  SELECT order_item_id FROM payout_items WHERE payout_id = ?1
              )
            "#,
        )
        .bind(payout_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(overlap > 0)
    }

    /// Deletes a payout if (and only if) it is still pending.
    ///
    /// Returns `false` when the payout advanced concurrently; the caller
    /// surfaces that as a conflict. The payout_items rows cascade.
    pub async fn delete_pending(&self, payout_id: &str) -> DbResult<bool> {
        debug!(payout_id = %payout_id, "Cancelling pending payout");

        let result =
            sqlx::query("DELETE FROM vendor_payouts WHERE id = ?1 AND status = 'pending'")
                .bind(payout_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists a vendor's payouts, newest first.
    pub async fn list_for_vendor(&self, vendor_id: &str) -> DbResult<Vec<VendorPayout>> {
        let rows = sqlx::query_as::<_, PayoutRow>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM vendor_payouts WHERE vendor_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await?;

        let mut payouts = Vec::with_capacity(rows.len());
        for row in rows {
            let item_ids = self.included_item_ids(&row.id).await?;
            payouts.push(row.into_payout(item_ids));
        }

        Ok(payouts)
    }

    /// Lists payouts in a given status, oldest first (the admin work queue).
    pub async fn list_by_status(&self, status: PayoutStatus) -> DbResult<Vec<VendorPayout>> {
        let rows = sqlx::query_as::<_, PayoutRow>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM vendor_payouts WHERE status = ?1 ORDER BY created_at"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        let mut payouts = Vec::with_capacity(rows.len());
        for row in rows {
            let item_ids = self.included_item_ids(&row.id).await?;
            payouts.push(row.into_payout(item_ids));
        }

        Ok(payouts)
    }
}

/// Generates a new payout ID.
pub fn generate_payout_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
