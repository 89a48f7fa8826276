//! Caller identity and role checks.
//!
//! Identity resolution (tokens, sessions, password hashing) is owned by an
//! external collaborator. By the time a settlement operation runs, the caller
//! has either been resolved to a [`Caller`] or hasn't — services receive
//! `Option<&Caller>` and surface `UNAUTHENTICATED` / `FORBIDDEN` themselves,
//! so every operation's response distinguishes the two.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// The role the identity provider resolved for a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Vendor,
    Admin,
}

/// A resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Subject id: customer id, vendor id, or admin id depending on role.
    pub id: String,
    pub role: Role,
}

impl Caller {
    /// Creates a customer caller (mostly for tests and wiring code).
    pub fn customer(id: impl Into<String>) -> Self {
        Caller {
            id: id.into(),
            role: Role::Customer,
        }
    }

    /// Creates a vendor caller.
    pub fn vendor(id: impl Into<String>) -> Self {
        Caller {
            id: id.into(),
            role: Role::Vendor,
        }
    }

    /// Creates an admin caller.
    pub fn admin(id: impl Into<String>) -> Self {
        Caller {
            id: id.into(),
            role: Role::Admin,
        }
    }
}

/// Requires an authenticated caller with the given role.
///
/// ## Errors
/// * `UNAUTHENTICATED` - no resolved identity at all
/// * `FORBIDDEN` - identity resolved, wrong role
pub fn require_role<'a>(caller: Option<&'a Caller>, role: Role) -> Result<&'a Caller, ApiError> {
    let caller = caller.ok_or_else(ApiError::unauthenticated)?;

    if caller.role != role {
        return Err(ApiError::forbidden(format!(
            "operation requires the {:?} role",
            role
        )));
    }

    Ok(caller)
}

/// Requires an authenticated caller with any of the given roles.
pub fn require_any_role<'a>(
    caller: Option<&'a Caller>,
    roles: &[Role],
) -> Result<&'a Caller, ApiError> {
    let caller = caller.ok_or_else(ApiError::unauthenticated)?;

    if !roles.contains(&caller.role) {
        return Err(ApiError::forbidden("operation not permitted for this role"));
    }

    Ok(caller)
}
