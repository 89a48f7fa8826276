//! # API Error Type
//!
//! Unified error type for the settlement services.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Error Flow in Souk                                 │
//! │                                                                         │
//! │  Service operation                                                      │
//! │  Result<T, ApiError>                                                    │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Database error? ── DbError ───────────────┐                           │
//! │         │                                  │                            │
//! │         ▼                                  ▼                            │
//! │  Business rule?  ── CoreError ─────────► ApiError { code, message }    │
//! │         │                                  ▲                            │
//! │         ▼                                  │                            │
//! │  Auth failure?   ── unauthenticated/forbidden                          │
//! │                                                                         │
//! │  Internal failures are logged with detail and surfaced generically;    │
//! │  domain failures keep their specifics (which product, which amounts)   │
//! │  without ever naming another vendor's or customer's records.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use souk_core::{CoreError, ValidationError};
use souk_db::DbError;

/// API error returned from settlement operations.
///
/// ## Serialization
/// ```json
/// {
///   "code": "OUT_OF_STOCK",
///   "message": "Out of stock for Hand-thrown mug: available 3, requested 5"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for settlement responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No resolved caller identity
    Unauthenticated,

    /// Caller identity resolved, but role or ownership does not permit this
    Forbidden,

    /// Resource not found
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Requested quantity exceeds a product's stock
    OutOfStock,

    /// Requested payout exceeds the vendor's unsettled balance
    InsufficientBalance,

    /// The vendor has no unsettled items at all
    NoUnpaidItems,

    /// Invalid state transition or lost optimistic race
    Conflict,

    /// Internal error; details are in the logs, not the message
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates an unauthenticated error.
    pub fn unauthenticated() -> Self {
        ApiError::new(ErrorCode::Unauthenticated, "Authentication required")
    }

    /// Creates a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Forbidden, message)
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Conflict, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::StockExhausted { product_id } => ApiError::new(
                ErrorCode::OutOfStock,
                format!("Out of stock for product {}", product_id),
            ),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::Conflict,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::CorruptRecord { entity, id, reason } => {
                tracing::error!(entity = %entity, id = %id, reason = %reason, "Corrupt record");
                ApiError::internal("Stored record failed validation")
            }
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                ApiError::internal("Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Database migration failed: {}", e);
                ApiError::internal("Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::internal("Database operation failed")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ApiError::internal("Database transaction failed")
            }
            DbError::PoolExhausted => ApiError::internal("Database pool exhausted"),
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::internal("Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => ApiError::not_found("Product", &id),
            CoreError::OrderNotFound(id) => ApiError::not_found("Order", &id),
            CoreError::PayoutNotFound(id) => ApiError::not_found("Payout", &id),
            CoreError::OutOfStock { .. } => ApiError::new(ErrorCode::OutOfStock, err.to_string()),
            CoreError::InsufficientBalance { .. } => {
                ApiError::new(ErrorCode::InsufficientBalance, err.to_string())
            }
            CoreError::NoUnpaidItems => ApiError::new(ErrorCode::NoUnpaidItems, err.to_string()),
            CoreError::InvalidTransition { .. } => ApiError::conflict(err.to_string()),
            CoreError::TooManyLines { .. } => ApiError::validation(err.to_string()),
            CoreError::Validation(e) => ApiError::validation(e.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
