//! # souk-settlement: Settlement Services for Souk
//!
//! The service layer of the Souk marketplace back office. Each service is a
//! stateless request/response orchestrator over the repositories in
//! [`souk_db`] and the pure rules in [`souk_core`]:
//!
//! - [`intake`] - Order Intake: validate a cart, price it server-side,
//!   persist order + items, decrement inventory, notify vendors
//! - [`ledger`] - Ledger Query: a vendor's unsettled balance, computed live
//! - [`payout`] - Payout Request Builder + Lifecycle Manager: deterministic
//!   FIFO settlement without double-paying the same revenue
//!
//! External collaborators stay behind seams:
//!
//! - [`auth`] - the identity provider resolves callers *before* these
//!   services run; operations receive a `Caller { id, role }`
//! - [`notify`] - the notification transport implements [`notify::NotificationSink`];
//!   deliveries are fire-and-forget and never fail the primary operation
//!
//! ## Example
//! ```rust,ignore
//! let db = Database::new(DbConfig::new("souk.db")).await?;
//! let config = SettlementConfig::load()?;
//! let sink: Arc<dyn NotificationSink> = Arc::new(NullSink);
//!
//! let intake = OrderIntakeService::new(db.clone(), config.clone(), sink.clone());
//! let payouts = PayoutService::new(db.clone(), sink.clone());
//!
//! let placed = intake.place_order(Some(&caller), request).await?;
//! let payout = payouts.request_payout(Some(&vendor), payout_request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod notify;
pub mod payout;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{Caller, Role};
pub use config::SettlementConfig;
pub use error::{ApiError, ErrorCode};
pub use intake::{OrderIntakeService, OrderLineRequest, PlaceOrderRequest, PlacedOrder};
pub use ledger::{LedgerService, VendorLedgerSummary};
pub use notify::{NotificationSink, NullSink};
pub use payout::{PayoutRequest, PayoutService};
