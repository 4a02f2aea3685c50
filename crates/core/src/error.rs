//! Core error taxonomy.
//!
//! Every expected failure in the identity/session/authorization core is one of
//! these variants; callers at the HTTP boundary map them to status codes.
//! Panics are reserved for invariant violations (e.g. a dependent-table scan
//! finding leftover rows after a cascade delete reported success).

use thiserror::Error;

/// Result type used across the core.
pub type CoreResult<T> = Result<T, CoreError>;

/// Typed outcome of every fallible core operation.
///
/// `Authentication` deliberately carries no detail: bad password, unknown
/// username, expired token, and wrong token kind are indistinguishable to the
/// caller. `Internal` detail goes to logs only, never into a response body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Bad credentials or a missing/expired/malformed/wrong-kind token.
    #[error("authentication failed")]
    Authentication,

    /// Role insufficient, scope restricted, or a non-owner mutation.
    #[error("forbidden: {0}")]
    Authorization(String),

    /// Duplicate username/email at account creation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operating on a missing account or resource id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unexpected signing/decoding/database failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
