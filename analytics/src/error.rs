//! Error types for the analytics engine

use thiserror::Error;

/// Result type for analytics operations
pub type Result<T> = std::result::Result<T, Error>;

/// Analytics errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger store error
    #[error("Ledger error: {0}")]
    Ledger(#[from] wallet_core::Error),

    /// Malformed reporting range
    #[error("Invalid range: {0}")]
    InvalidRange(String),
}
