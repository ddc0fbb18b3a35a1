//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only. A command rejected with one of these
/// never produced an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed command input (non-positive amount, negative overdraft limit, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The balance would drop below `-overdraft_limit`.
    #[error(
        "insufficient funds: requested {requested}, balance {balance}, overdraft limit {overdraft_limit}"
    )]
    InsufficientFunds {
        requested: i64,
        balance: i64,
        overdraft_limit: i64,
    },

    /// A domain invariant was violated (e.g. command routed to the wrong aggregate).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The aggregate has no creation event yet.
    #[error("not found")]
    NotFound,

    /// A conflict occurred (already exists, stale version).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
