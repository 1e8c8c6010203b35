//! Domain error model.

use thiserror::Error;

/// Result type used across the marketplace domain.
pub type MarketResult<T> = Result<T, MarketError>;

/// Marketplace ledger error.
///
/// Keep this focused on deterministic, caller-visible ledger failures
/// (validation, missing records, exhausted stock, empty balances).
/// Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// A listing field failed validation (length bounds, empty name, overflow).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced item id has no record.
    #[error("item not found")]
    ItemNotFound,

    /// Item is inactive, or the requested quantity cannot be served.
    #[error("item unavailable")]
    ItemUnavailable,

    /// Withdrawal attempted against a zero balance.
    #[error("no earnings to withdraw")]
    NoEarnings,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl MarketError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Numeric ledger code for caller-visible precondition failures.
    ///
    /// Code 103 is unassigned: insufficient stock reports the same code as an
    /// inactive item. `Conflict`/`InvalidId` carry no ledger code.
    pub fn ledger_code(&self) -> Option<u32> {
        match self {
            MarketError::Validation(_) => Some(100),
            MarketError::ItemNotFound => Some(101),
            MarketError::ItemUnavailable => Some(102),
            MarketError::NoEarnings => Some(104),
            MarketError::Conflict(_) | MarketError::InvalidId(_) => None,
        }
    }
}
