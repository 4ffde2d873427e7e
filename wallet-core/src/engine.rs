//! Main engine orchestration layer
//!
//! Ties together storage, the lock registry, the transaction processor,
//! stats, and metrics into a high-level API for wallet and agent-float
//! operations.
//!
//! # Example
//!
//! ```no_run
//! use wallet_core::{Config, Engine};
//!
//! fn main() -> wallet_core::Result<()> {
//!     let config = Config::default();
//!     let engine = Engine::open(config)?;
//!
//!     // Open accounts, post credits/debits, run transfers...
//!
//!     Ok(())
//! }
//! ```

use crate::config::Config;
use crate::locks::LockTable;
use crate::metrics::Metrics;
use crate::processor::Processor;
use crate::query::{self, Page, SearchFilter, SearchHit};
use crate::stats::{self, OwnerStats};
use crate::storage::Storage;
use crate::types::{
    now_millis, Account, AccountId, AccountKind, Category, Currency, LedgerEntry, OwnerId,
    PostingReceipt, PostingRequest, TransferReceipt, TransferRequest, MONEY_SCALE,
};
use crate::{Error, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;
use uuid::Uuid;

/// Main engine interface
pub struct Engine {
    /// Direct storage access (reads)
    storage: Arc<Storage>,

    /// Posting protocol
    processor: Processor,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Engine {
    /// Open the engine with the given configuration.
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new().map_err(|e| Error::Metrics(e.to_string()))?;
        let locks = LockTable::new(Duration::from_millis(config.locking.acquire_timeout_ms));
        let processor = Processor::new(
            storage.clone(),
            locks,
            metrics.clone(),
            config.commission.rate,
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "Engine opened"
        );

        Ok(Self {
            storage,
            processor,
            metrics,
            config,
        })
    }

    // Account lifecycle. Accounts are created once at registration and
    // never deleted; status transitions are the only lifecycle changes.

    /// Open a customer wallet. An owner has at most one wallet.
    pub fn open_wallet(&self, owner: OwnerId, currency: Currency) -> Result<Account> {
        let existing = self.storage.accounts_for_owner(owner)?;
        if existing.iter().any(|a| a.kind == AccountKind::Wallet) {
            return Err(Error::Validation(format!(
                "owner {} already has a wallet",
                owner
            )));
        }

        let account = Account::open(owner, AccountKind::Wallet, currency);
        self.storage.create_account(&account)?;
        self.metrics.record_account_opened();
        Ok(account)
    }

    /// Open an agent cash float. An agent has at most one float; opening
    /// it again returns the existing account.
    pub fn open_float(&self, owner: OwnerId, currency: Currency) -> Result<Account> {
        let existing = self.storage.accounts_for_owner(owner)?;
        if let Some(float) = existing.iter().find(|a| a.kind == AccountKind::AgentFloat) {
            return Ok(float.clone());
        }

        let account = Account::open(owner, AccountKind::AgentFloat, currency);
        self.storage.create_account(&account)?;
        self.metrics.record_account_opened();
        Ok(account)
    }

    /// Get an account by ID.
    pub fn account(&self, id: AccountId) -> Result<Account> {
        self.storage.get_account(id)
    }

    /// All accounts belonging to an owner.
    pub fn accounts_for_owner(&self, owner: OwnerId) -> Result<Vec<Account>> {
        self.storage.accounts_for_owner(owner)
    }

    /// Freeze an account; postings fail until it is unfrozen.
    pub async fn freeze(&self, id: AccountId) -> Result<Account> {
        self.processor.freeze(id).await
    }

    /// Unfreeze a frozen account.
    pub async fn unfreeze(&self, id: AccountId) -> Result<Account> {
        self.processor.unfreeze(id).await
    }

    /// Close an account. Requires a zero balance; the record and its
    /// ledger history remain readable forever.
    pub async fn close(&self, id: AccountId) -> Result<Account> {
        self.processor.close(id).await
    }

    // Posting operations

    /// Post a single credit or debit.
    pub async fn post(&self, request: PostingRequest) -> Result<PostingReceipt> {
        self.processor.post(request).await
    }

    /// Move money between two accounts atomically.
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        self.processor.transfer(request).await
    }

    /// Agent cash-in: debit the agent float, credit the customer wallet,
    /// one atomic commit. Commission accrues to the agent's rollups.
    pub async fn cash_in(
        &self,
        float_id: AccountId,
        wallet_id: AccountId,
        amount: Decimal,
        idempotency_key: Uuid,
        description: Option<String>,
    ) -> Result<TransferReceipt> {
        let currency = self.storage.get_account(float_id)?.currency;
        self.transfer(TransferRequest {
            debit_account_id: float_id,
            credit_account_id: wallet_id,
            amount,
            currency,
            category: Category::CashIn,
            idempotency_key,
            description,
            metadata: HashMap::new(),
        })
        .await
    }

    /// Agent cash-out: debit the customer wallet, credit the agent
    /// float, one atomic commit.
    pub async fn cash_out(
        &self,
        wallet_id: AccountId,
        float_id: AccountId,
        amount: Decimal,
        idempotency_key: Uuid,
        description: Option<String>,
    ) -> Result<TransferReceipt> {
        let currency = self.storage.get_account(wallet_id)?.currency;
        self.transfer(TransferRequest {
            debit_account_id: wallet_id,
            credit_account_id: float_id,
            amount,
            currency,
            category: Category::CashOut,
            idempotency_key,
            description,
            metadata: HashMap::new(),
        })
        .await
    }

    /// Record a customer registered by an agent (stats only; no balance
    /// effect).
    pub async fn register_customer(&self, agent: OwnerId) -> Result<()> {
        self.processor.register_customer(agent).await
    }

    // Read paths. These never touch the account locks.

    /// An account's ledger history in sequence order, paginated.
    pub fn history(&self, id: AccountId, page: usize, limit: usize) -> Result<Page<LedgerEntry>> {
        // Surface a typed not-found instead of an empty page
        self.storage.get_account(id)?;
        let entries = self.storage.entries_for_account(id, 0, 0)?;
        Ok(query::paginate(entries, page, limit))
    }

    /// Get one ledger entry by ID.
    pub fn entry(&self, id: Uuid) -> Result<LedgerEntry> {
        self.storage.get_entry(id)
    }

    /// Search the ledger, newest first.
    pub fn search(&self, filter: &SearchFilter) -> Result<Page<SearchHit>> {
        query::search(&self.storage, filter)
    }

    /// An owner's rollup statistics for the current day/week/month.
    pub fn owner_stats(&self, owner: OwnerId) -> Result<OwnerStats> {
        stats::owner_stats(&self.storage, owner, now_millis())
    }

    /// Replay an account's full entry history in sequence order and
    /// return the reconstructed balance.
    pub fn replay_balance(&self, id: AccountId) -> Result<Decimal> {
        self.storage.get_account(id)?;
        let entries = self.storage.entries_for_account(id, 0, 0)?;

        let mut balance = Decimal::ZERO;
        balance.rescale(MONEY_SCALE);
        for entry in &entries {
            balance += entry.signed_amount();
        }
        Ok(balance)
    }

    /// Verify an account: the replayed balance must equal the stored
    /// balance, every entry's arithmetic must hold, and the sequence
    /// numbers must be dense from 1.
    pub fn verify_account(&self, id: AccountId) -> Result<bool> {
        let account = self.storage.get_account(id)?;
        let entries = self.storage.entries_for_account(id, 0, 0)?;

        let mut running = Decimal::ZERO;
        running.rescale(MONEY_SCALE);
        for (i, entry) in entries.iter().enumerate() {
            if entry.sequence_number != (i as u64) + 1 {
                return Ok(false);
            }
            if entry.balance_before != running || !entry.arithmetic_holds() {
                return Ok(false);
            }
            running = entry.balance_after;
        }

        Ok(running == account.balance && account.sequence == entries.len() as u64)
    }

    /// Metrics collector (exposed for scraping).
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shared storage handle (read-only consumers such as analytics).
    pub fn storage(&self) -> Arc<Storage> {
        self.storage.clone()
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
