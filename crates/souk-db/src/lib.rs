//! # souk-db: Database Layer for Souk
//!
//! This crate provides database access for the Souk settlement core.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Souk Data Flow                                 │
//! │                                                                         │
//! │  Settlement service (place_order, request_payout, ...)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     souk-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (product.rs)  │    │  (embedded)  │  │   │
//! │  │   │               │    │ (order.rs)    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ (payout.rs)   │    │ 001_init.sql │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │                        SQLite Database (WAL)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (product, order, payout)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use souk_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/souk.db")).await?;
//!
//! let order = db.orders().get_by_id("...").await?;
//! let balance = db.payouts().unsettled_items("vendor-id").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::DbError;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::order::OrderRepository;
pub use repository::payout::{PayoutRepository, TransitionOutcome};
pub use repository::product::ProductRepository;
