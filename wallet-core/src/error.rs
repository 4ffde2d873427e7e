//! Error types for the transaction engine

use crate::types::AccountStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (amount, currency, idempotency key)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Debit would drive the balance below zero
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Balance at the time of the attempt
        available: Decimal,
        /// Amount the caller tried to debit
        requested: Decimal,
    },

    /// Account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account exists but cannot accept postings
    #[error("Account {id} is not active (status: {status})")]
    AccountNotActive {
        /// Account that rejected the posting
        id: String,
        /// Its current status
        status: AccountStatus,
    },

    /// Lock acquisition timed out; safe to retry with the same key
    #[error("Account {0} is busy")]
    Busy(String),

    /// Ledger entry not found
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wire code for the error taxonomy consumed by routing layers.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "FIN_VALIDATION",
            Error::InsufficientBalance { .. } => "FIN_INSUFFICIENT_BALANCE",
            Error::AccountNotFound(_) => "FIN_ACCOUNT_NOT_FOUND",
            Error::AccountNotActive { .. } => "FIN_ACCOUNT_FROZEN",
            Error::Busy(_) => "FIN_BUSY",
            Error::EntryNotFound(_) => "FIN_ENTRY_NOT_FOUND",
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::Metrics(_)
            | Error::Config(_)
            | Error::Io(_) => "FIN_INTERNAL",
        }
    }

    /// Whether the caller may retry the same request (same idempotency key)
    /// and expect it to eventually succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Busy(_) | Error::Storage(_) | Error::Io(_)
        )
    }

    /// Business-rule rejections: expected, typed, no partial state.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBalance { .. }
                | Error::AccountNotFound(_)
                | Error::AccountNotActive { .. }
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
