//! # Error Types
//!
//! Domain-specific error types for souk-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  souk-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  souk-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  souk-settlement errors                                                │
//! │  └── ApiError         - The response taxonomy callers see              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Caller       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product name, amounts, ids)
//! 3. Errors are enum variants, never String
//! 4. Never include another vendor's or customer's identifiers in a message

use thiserror::Error;

use crate::types::PayoutStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found or is inactive.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Requested quantity exceeds current stock.
    ///
    /// ## When This Occurs
    /// - The pre-check sees fewer units than requested, or
    /// - the conditional decrement's guard (`stock >= qty`) affects zero rows
    ///   during intake because a concurrent order got there first
    #[error("Out of stock for {product}: available {available}, requested {requested}")]
    OutOfStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Requested payout amount exceeds the vendor's unsettled balance.
    #[error("Insufficient balance: available {available_cents}, requested {requested_cents}")]
    InsufficientBalance {
        available_cents: i64,
        requested_cents: i64,
    },

    /// The vendor has no unsettled order items at all.
    #[error("No unpaid order items to settle")]
    NoUnpaidItems,

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Payout not found.
    #[error("Payout not found: {0}")]
    PayoutNotFound(String),

    /// Requested status change is not in the transition table.
    #[error("Payout is {from:?}, cannot move to {to:?}")]
    InvalidTransition { from: PayoutStatus, to: PayoutStatus },

    /// Order has too many lines.
    #[error("Order cannot have more than {max} lines")]
    TooManyLines { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Detected before business logic runs and before any write.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
