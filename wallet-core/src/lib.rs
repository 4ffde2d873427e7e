//! PesaCore Wallet Engine
//!
//! Ledger-backed balance engine for customer wallets and agent cash
//! floats.
//!
//! # Architecture
//!
//! - **Append-only ledger**: every balance change is an immutable entry
//!   with balance-before/after and a per-account sequence number
//! - **Per-account locking**: an exclusive lock per account, bounded
//!   acquisition; operations on different accounts run concurrently
//! - **Atomic postings**: the account update, the ledger entry, and the
//!   stats rollups commit in one WriteBatch
//! - **Idempotency**: caller-supplied UUIDv4 keys deduplicate retries;
//!   replays return the stored result
//!
//! # Invariants
//!
//! - `balance == Σcredits − Σdebits`, replayable from sequence 1
//! - Balances never go negative; violating debits are rejected whole
//! - One ledger entry per idempotency key, ever
//! - Entries are never modified or deleted

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod locks;
pub mod metrics;
pub mod processor;
pub mod query;
pub mod stats;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use query::{Page, SearchFilter, SearchHit};
pub use stats::OwnerStats;
pub use storage::Storage;
pub use types::{
    Account, AccountId, AccountKind, AccountStatus, Category, Currency, Direction, LedgerEntry,
    OwnerId, PostingReceipt, PostingRequest, PostingStatus, TransferReceipt, TransferRequest,
};
