//! Transaction processor
//!
//! The core posting protocol. Every operation runs as one atomic unit of
//! work:
//!
//! 1. Acquire the exclusive lock for the target account (bounded; a
//!    timeout is a retryable busy error).
//! 2. Read the current balance and status.
//! 3. Validate: account active, currency match, and for a debit a
//!    sufficient balance. Failures abort with no writes.
//! 4. Commit the updated account and the new ledger entry (next sequence
//!    number) in one WriteBatch, together with any stats buckets.
//! 5. Release the lock. The committed entry is the caller's proof.
//!
//! Transfers run the same protocol over two accounts: both locks are
//! taken in ascending account-id order and both legs commit in a single
//! WriteBatch, so no partial transfer can ever be observed.

use crate::idempotency::Guard;
use crate::locks::{AccountGuard, LockTable};
use crate::metrics::Metrics;
use crate::stats::{self, CashDelta, CashKind};
use crate::storage::{CounterKind, Storage};
use crate::types::{
    now_millis, Account, AccountId, AccountKind, Category, Currency, Direction, LedgerEntry,
    OwnerId, PostingReceipt, PostingRequest, TransferReceipt, TransferRequest,
};
use crate::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Key used for the transfer leg entries' metadata.
const META_TRANSFER_ID: &str = "transfer_id";

// Leg keys are derived from the caller's UUIDv4 key by rewriting the
// version nibble (4 -> A for the debit leg, 4 -> B for the credit leg).
// Derived keys can therefore never collide with any caller-supplied v4
// key, and the mapping stays bijective per leg.
const LEG_DEBIT_TWEAK: u128 = 0xE << 76;
const LEG_CREDIT_TWEAK: u128 = 0xF << 76;

fn leg_key(key: Uuid, tweak: u128) -> Uuid {
    Uuid::from_u128(key.as_u128() ^ tweak)
}

/// The transaction processor
pub struct Processor {
    storage: Arc<Storage>,
    locks: LockTable,
    guard: Guard,
    metrics: Metrics,
    commission_rate: Decimal,
}

impl Processor {
    /// Create a processor over the given storage handle.
    pub fn new(
        storage: Arc<Storage>,
        locks: LockTable,
        metrics: Metrics,
        commission_rate: Decimal,
    ) -> Self {
        let guard = Guard::new(storage.clone());
        Self {
            storage,
            locks,
            guard,
            metrics,
            commission_rate,
        }
    }

    /// Post a single credit or debit.
    pub async fn post(&self, request: PostingRequest) -> Result<PostingReceipt> {
        let amount = request.validate()?;

        // Fast path: serve a replay without touching the lock.
        if let Some(entry) = self.guard.find_replay(request.idempotency_key)? {
            self.metrics.record_replay();
            return Ok(PostingReceipt::replayed(&entry));
        }

        let started = Instant::now();
        let _guard = self.acquire(request.account_id).await?;
        self.metrics.record_lock_wait(started.elapsed().as_secs_f64());

        // Authoritative check: a racing request with the same key may
        // have committed while we waited for the lock.
        if let Some(entry) = self.guard.find_replay(request.idempotency_key)? {
            self.metrics.record_replay();
            return Ok(PostingReceipt::replayed(&entry));
        }

        let outcome = self.post_locked(&request, amount);
        match &outcome {
            Ok(receipt) => {
                self.note_posted(1);
                self.metrics.record_posting(started.elapsed().as_secs_f64());
                tracing::info!(
                    transaction_id = %receipt.transaction_id,
                    account_id = %receipt.account_id,
                    sequence = receipt.sequence_number,
                    "Posting committed"
                );
            }
            Err(e) if e.is_business_rejection() => self.note_rejection(),
            Err(_) => {}
        }
        outcome
    }

    fn post_locked(&self, request: &PostingRequest, amount: Decimal) -> Result<PostingReceipt> {
        let account = self.storage.get_account(request.account_id)?;
        validate_account(&account, request.currency)?;

        let (balance_before, balance_after) = apply(&account, request.direction, amount)?;

        let created_at = now_millis();
        let entry = LedgerEntry {
            id: Uuid::now_v7(),
            account_id: account.id,
            direction: request.direction,
            category: request.category,
            amount,
            currency: account.currency,
            balance_before,
            balance_after,
            idempotency_key: request.idempotency_key,
            sequence_number: account.sequence + 1,
            created_at,
            description: request.description.clone(),
            metadata: request.metadata.clone(),
        };

        let mut updated = account;
        updated.balance = balance_after;
        updated.sequence = entry.sequence_number;
        updated.updated_at = created_at;

        self.storage.commit_posting(&[&updated], &[&entry], &[])?;

        Ok(PostingReceipt::posted(&entry))
    }

    /// Move money between two accounts atomically.
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let amount = request.validate()?;
        let debit_key = leg_key(request.idempotency_key, LEG_DEBIT_TWEAK);
        let credit_key = leg_key(request.idempotency_key, LEG_CREDIT_TWEAK);

        if let Some(receipt) = self.replay_transfer(debit_key, credit_key)? {
            return Ok(receipt);
        }

        let started = Instant::now();
        let _guards = self
            .acquire_pair(request.debit_account_id, request.credit_account_id)
            .await?;
        self.metrics.record_lock_wait(started.elapsed().as_secs_f64());

        if let Some(receipt) = self.replay_transfer(debit_key, credit_key)? {
            return Ok(receipt);
        }

        let outcome = self.transfer_locked(&request, amount, debit_key, credit_key);
        match &outcome {
            Ok(receipt) => {
                self.note_posted(1);
                self.metrics.record_transfer(started.elapsed().as_secs_f64());
                tracing::info!(
                    transfer_id = %receipt.transfer_id,
                    debit_account = %request.debit_account_id,
                    credit_account = %request.credit_account_id,
                    amount = %amount,
                    category = %request.category,
                    "Transfer committed"
                );
            }
            Err(e) if e.is_business_rejection() => self.note_rejection(),
            Err(_) => {}
        }
        outcome
    }

    fn transfer_locked(
        &self,
        request: &TransferRequest,
        amount: Decimal,
        debit_key: Uuid,
        credit_key: Uuid,
    ) -> Result<TransferReceipt> {
        let debit_account = self.storage.get_account(request.debit_account_id)?;
        let credit_account = self.storage.get_account(request.credit_account_id)?;
        validate_account(&debit_account, request.currency)?;
        validate_account(&credit_account, request.currency)?;
        validate_cash_legs(&debit_account, &credit_account, request.category)?;

        let (debit_before, debit_after) = apply(&debit_account, Direction::Debit, amount)?;
        let (credit_before, credit_after) = apply(&credit_account, Direction::Credit, amount)?;

        let created_at = now_millis();
        let transfer_id = Uuid::now_v7();
        let mut metadata = request.metadata.clone();
        metadata.insert(META_TRANSFER_ID.to_string(), transfer_id.to_string());

        let debit_entry = LedgerEntry {
            id: Uuid::now_v7(),
            account_id: debit_account.id,
            direction: Direction::Debit,
            category: request.category,
            amount,
            currency: debit_account.currency,
            balance_before: debit_before,
            balance_after: debit_after,
            idempotency_key: debit_key,
            sequence_number: debit_account.sequence + 1,
            created_at,
            description: request.description.clone(),
            metadata: metadata.clone(),
        };
        let credit_entry = LedgerEntry {
            id: Uuid::now_v7(),
            account_id: credit_account.id,
            direction: Direction::Credit,
            category: request.category,
            amount,
            currency: credit_account.currency,
            balance_before: credit_before,
            balance_after: credit_after,
            idempotency_key: credit_key,
            sequence_number: credit_account.sequence + 1,
            created_at,
            description: request.description.clone(),
            metadata,
        };

        let mut debit_updated = debit_account.clone();
        debit_updated.balance = debit_after;
        debit_updated.sequence = debit_entry.sequence_number;
        debit_updated.updated_at = created_at;

        let mut credit_updated = credit_account.clone();
        credit_updated.balance = credit_after;
        credit_updated.sequence = credit_entry.sequence_number;
        credit_updated.updated_at = created_at;

        let stat_rows = self.cash_stat_rows(&debit_account, &credit_account, request.category, amount, created_at)?;

        self.storage.commit_posting(
            &[&debit_updated, &credit_updated],
            &[&debit_entry, &credit_entry],
            &stat_rows,
        )?;

        Ok(TransferReceipt {
            transfer_id,
            debit: PostingReceipt::posted(&debit_entry),
            credit: PostingReceipt::posted(&credit_entry),
            idempotent: false,
        })
    }

    /// Stats buckets a cash transfer folds into its commit. The agent is
    /// the float account's owner; commission accrues to the rollup only,
    /// it never moves money.
    fn cash_stat_rows(
        &self,
        debit_account: &Account,
        credit_account: &Account,
        category: Category,
        amount: Decimal,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<(Vec<u8>, stats::StatBucket)>> {
        let (kind, float_account) = match category {
            Category::CashIn => (CashKind::CashIn, debit_account),
            Category::CashOut => (CashKind::CashOut, credit_account),
            _ => return Ok(Vec::new()),
        };

        let mut commission = (amount * self.commission_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        commission.rescale(2);

        let delta = CashDelta {
            kind,
            amount,
            commission,
            at,
        };
        stats::cash_rows(&self.storage, float_account.owner_id, &delta)
    }

    fn replay_transfer(
        &self,
        debit_key: Uuid,
        credit_key: Uuid,
    ) -> Result<Option<TransferReceipt>> {
        let debit_entry = self.storage.find_by_idempotency_key(debit_key)?;
        let credit_entry = self.storage.find_by_idempotency_key(credit_key)?;

        match (debit_entry, credit_entry) {
            (Some(debit), Some(credit)) => {
                let transfer_id = debit
                    .metadata
                    .get(META_TRANSFER_ID)
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .unwrap_or(debit.id);
                self.metrics.record_replay();
                Ok(Some(TransferReceipt {
                    transfer_id,
                    debit: PostingReceipt::replayed(&debit),
                    credit: PostingReceipt::replayed(&credit),
                    idempotent: true,
                }))
            }
            (None, None) => Ok(None),
            // Both legs commit in one batch; seeing only one means the
            // store is corrupt.
            _ => Err(Error::Storage(
                "transfer legs out of sync in idempotency index".to_string(),
            )),
        }
    }

    /// Record a registered customer against the agent's rollups.
    pub async fn register_customer(&self, agent: OwnerId) -> Result<()> {
        let _guard = self.acquire_raw(agent.as_uuid()).await?;
        let row = stats::registration_row(&self.storage, agent, now_millis())?;
        self.storage.put_stats(&[row])?;
        tracing::info!(agent_id = %agent, "Customer registration recorded");
        Ok(())
    }

    // Status transitions run under the account lock so they cannot race
    // an in-flight posting.

    /// Freeze an active account. Idempotent for already-frozen accounts.
    pub async fn freeze(&self, id: AccountId) -> Result<Account> {
        let _guard = self.acquire(id).await?;
        let mut account = self.storage.get_account(id)?;
        match account.status {
            crate::types::AccountStatus::Active => {
                account.status = crate::types::AccountStatus::Frozen;
                account.updated_at = now_millis();
                self.storage.put_account(&account)?;
                tracing::info!(account_id = %id, "Account frozen");
            }
            crate::types::AccountStatus::Frozen => {}
            crate::types::AccountStatus::Closed => {
                return Err(Error::AccountNotActive {
                    id: id.to_string(),
                    status: account.status,
                })
            }
        }
        Ok(account)
    }

    /// Unfreeze a frozen account. Idempotent for active accounts.
    pub async fn unfreeze(&self, id: AccountId) -> Result<Account> {
        let _guard = self.acquire(id).await?;
        let mut account = self.storage.get_account(id)?;
        match account.status {
            crate::types::AccountStatus::Frozen => {
                account.status = crate::types::AccountStatus::Active;
                account.updated_at = now_millis();
                self.storage.put_account(&account)?;
                tracing::info!(account_id = %id, "Account unfrozen");
            }
            crate::types::AccountStatus::Active => {}
            crate::types::AccountStatus::Closed => {
                return Err(Error::AccountNotActive {
                    id: id.to_string(),
                    status: account.status,
                })
            }
        }
        Ok(account)
    }

    /// Close an account. Requires a zero balance; terminal and
    /// idempotent. The account record and its entries are never deleted.
    pub async fn close(&self, id: AccountId) -> Result<Account> {
        let _guard = self.acquire(id).await?;
        let mut account = self.storage.get_account(id)?;
        if account.status == crate::types::AccountStatus::Closed {
            return Ok(account);
        }
        if !account.balance.is_zero() {
            return Err(Error::Validation(format!(
                "account {} balance must be zero to close (balance: {})",
                id, account.balance
            )));
        }
        account.status = crate::types::AccountStatus::Closed;
        account.updated_at = now_millis();
        self.storage.put_account(&account)?;
        tracing::info!(account_id = %id, "Account closed");
        Ok(account)
    }

    // Lock helpers with busy-timeout accounting

    async fn acquire(&self, id: AccountId) -> Result<AccountGuard> {
        self.acquire_raw(id.as_uuid()).await
    }

    async fn acquire_raw(&self, id: Uuid) -> Result<AccountGuard> {
        match self.locks.acquire(id).await {
            Err(e @ Error::Busy(_)) => {
                self.metrics.record_busy_timeout();
                Err(e)
            }
            other => other,
        }
    }

    async fn acquire_pair(
        &self,
        a: AccountId,
        b: AccountId,
    ) -> Result<(AccountGuard, AccountGuard)> {
        match self.locks.acquire_pair(a.as_uuid(), b.as_uuid()).await {
            Err(e @ Error::Busy(_)) => {
                self.metrics.record_busy_timeout();
                Err(e)
            }
            other => other,
        }
    }

    // Operation counters feeding the analytics success rate. These are
    // observability data, not audit data; a failure to bump them never
    // fails the operation.

    fn note_posted(&self, n: u64) {
        let day = now_millis().date_naive();
        for _ in 0..n {
            if let Err(e) = self.storage.bump_counter(CounterKind::Posted, day) {
                tracing::warn!("Failed to bump posted counter: {}", e);
            }
        }
    }

    fn note_rejection(&self) {
        self.metrics.record_rejection();
        let day = now_millis().date_naive();
        if let Err(e) = self.storage.bump_counter(CounterKind::Rejected, day) {
            tracing::warn!("Failed to bump rejected counter: {}", e);
        }
    }
}

fn validate_account(account: &Account, currency: Currency) -> Result<()> {
    if !account.is_active() {
        return Err(Error::AccountNotActive {
            id: account.id.to_string(),
            status: account.status,
        });
    }
    if account.currency != currency {
        return Err(Error::Validation(format!(
            "currency {} does not match account currency {}",
            currency, account.currency
        )));
    }
    Ok(())
}

/// Compute (balance_before, balance_after), rejecting debits that would
/// drive the balance below zero.
fn apply(account: &Account, direction: Direction, amount: Decimal) -> Result<(Decimal, Decimal)> {
    let before = account.balance;
    let after = match direction {
        Direction::Credit => before + amount,
        Direction::Debit => {
            if before < amount {
                return Err(Error::InsufficientBalance {
                    available: before,
                    requested: amount,
                });
            }
            before - amount
        }
    };
    Ok((before, after))
}

/// Cash categories pin the leg kinds: cash-in debits the agent float and
/// credits the wallet; cash-out is the mirror image.
fn validate_cash_legs(debit: &Account, credit: &Account, category: Category) -> Result<()> {
    let expected = match category {
        Category::CashIn => Some((AccountKind::AgentFloat, AccountKind::Wallet)),
        Category::CashOut => Some((AccountKind::Wallet, AccountKind::AgentFloat)),
        _ => None,
    };
    if let Some((debit_kind, credit_kind)) = expected {
        if debit.kind != debit_kind || credit.kind != credit_kind {
            return Err(Error::Validation(format!(
                "{} requires a {:?} debit leg and a {:?} credit leg",
                category, debit_kind, credit_kind
            )));
        }
    }
    Ok(())
}
