//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money, always at two fractional digits)
//! - Millisecond-precision audit timestamps

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Money values carry exactly two fractional digits.
pub const MONEY_SCALE: u32 = 2;

/// Account identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Wrap an existing UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh, time-ordered ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Key bytes for storage
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner identifier (customer or agent, as issued by the identity service)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Wrap an existing UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Key bytes for storage
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Kenyan Shilling
    KES,
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// Tanzanian Shilling
    TZS,
    /// Ugandan Shilling
    UGX,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::KES => "KES",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::TZS => "TZS",
            Currency::UGX => "UGX",
        }
    }

    /// Parse from an ISO 4217 code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "KES" => Some(Currency::KES),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "TZS" => Some(Currency::TZS),
            "UGX" => Some(Currency::UGX),
            _ => None,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::KES
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Kind of balance-holding account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    /// Customer wallet
    Wallet,
    /// Agent cash float
    AgentFloat,
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Accepts postings
    Active,
    /// Temporarily blocked; can be unfrozen
    Frozen,
    /// Terminal; accounts are never deleted, only closed
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Frozen => "FROZEN",
            AccountStatus::Closed => "CLOSED",
        };
        write!(f, "{}", s)
    }
}

/// A balance-holding account (customer wallet or agent float)
///
/// The balance is mutated only by the transaction processor, inside the
/// same atomic commit as the ledger entry that explains the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub id: AccountId,

    /// Owning customer or agent
    pub owner_id: OwnerId,

    /// Wallet or agent float
    pub kind: AccountKind,

    /// Current balance, always at two fractional digits, never negative
    pub balance: Decimal,

    /// Account currency; postings in any other currency are rejected
    pub currency: Currency,

    /// Lifecycle status
    pub status: AccountStatus,

    /// Last issued ledger sequence number (0 before the first posting)
    pub sequence: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account with a zero balance.
    pub fn open(owner_id: OwnerId, kind: AccountKind, currency: Currency) -> Self {
        let now = now_millis();
        let mut zero = Decimal::ZERO;
        zero.rescale(MONEY_SCALE);
        Self {
            id: AccountId::generate(),
            owner_id,
            kind,
            balance: zero,
            currency,
            status: AccountStatus::Active,
            sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the account accepts postings
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Balance increases
    Credit,
    /// Balance decreases
    Debit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Credit => "CREDIT",
            Direction::Debit => "DEBIT",
        };
        write!(f, "{}", s)
    }
}

/// Business category of a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Wallet top-up from an external rail
    Topup,
    /// Merchant or P2P payment
    Payment,
    /// Withdrawal to an external rail
    Withdrawal,
    /// Generic account-to-account transfer
    Transfer,
    /// Reversing credit for a failed downstream action
    Refund,
    /// Platform fee
    Fee,
    /// Agent commission
    Commission,
    /// Agent cash-in (float to wallet)
    CashIn,
    /// Agent cash-out (wallet to float)
    CashOut,
    /// Manual correction entry
    Reversal,
}

impl Category {
    /// Stable lower-case name, as stored and reported
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Topup => "topup",
            Category::Payment => "payment",
            Category::Withdrawal => "withdrawal",
            Category::Transfer => "transfer",
            Category::Refund => "refund",
            Category::Fee => "fee",
            Category::Commission => "commission",
            Category::CashIn => "cash_in",
            Category::CashOut => "cash_out",
            Category::Reversal => "reversal",
        }
    }

    /// Categories whose amounts count as platform fees in reporting
    pub fn is_fee(&self) -> bool {
        matches!(self, Category::Fee | Category::Commission)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable posting record: one balance change on one account
///
/// Entries are write-once. For every account the sequence numbers are
/// dense and monotonically increasing, and replaying the entries in
/// sequence order reconstructs the stored balance exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Account whose balance changed
    pub account_id: AccountId,

    /// Credit or debit
    pub direction: Direction,

    /// Business category
    pub category: Category,

    /// Posted amount (always positive, two fractional digits)
    pub amount: Decimal,

    /// Currency (matches the account)
    pub currency: Currency,

    /// Balance before the posting
    pub balance_before: Decimal,

    /// Balance after the posting
    pub balance_after: Decimal,

    /// Caller-supplied deduplication key; unique across the whole store
    pub idempotency_key: Uuid,

    /// Per-account monotonic sequence number, starting at 1
    pub sequence_number: u64,

    /// Posting timestamp (millisecond precision)
    pub created_at: DateTime<Utc>,

    /// Free-form caller note
    pub description: Option<String>,

    /// Additional caller metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl LedgerEntry {
    /// Signed amount: positive for credits, negative for debits.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }

    /// Check the arithmetic invariant
    /// `balance_after == balance_before ± amount`.
    pub fn arithmetic_holds(&self) -> bool {
        self.balance_before + self.signed_amount() == self.balance_after
    }
}

/// A request to post a single credit or debit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingRequest {
    /// Target account
    pub account_id: AccountId,

    /// Credit or debit
    pub direction: Direction,

    /// Amount, positive, at most two fractional digits
    pub amount: Decimal,

    /// Currency; must match the account
    pub currency: Currency,

    /// Business category
    pub category: Category,

    /// Deduplication key; must be a UUID version 4
    pub idempotency_key: Uuid,

    /// Free-form caller note
    pub description: Option<String>,

    /// Additional caller metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PostingRequest {
    /// Validate the request and return the amount normalized to two
    /// fractional digits. Runs before any lock is taken; a failure here
    /// has zero side effects.
    pub fn validate(&self) -> crate::Result<Decimal> {
        crate::idempotency::validate_key(&self.idempotency_key)?;
        normalize_amount(self.amount)
    }
}

/// A request to move money between two accounts atomically
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Account debited
    pub debit_account_id: AccountId,

    /// Account credited
    pub credit_account_id: AccountId,

    /// Amount, positive, at most two fractional digits
    pub amount: Decimal,

    /// Currency; must match both accounts
    pub currency: Currency,

    /// Business category, applied to both legs
    pub category: Category,

    /// Deduplication key for the whole transfer; must be a UUID version 4
    pub idempotency_key: Uuid,

    /// Free-form caller note
    pub description: Option<String>,

    /// Additional caller metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl TransferRequest {
    /// Validate the request and return the normalized amount.
    pub fn validate(&self) -> crate::Result<Decimal> {
        crate::idempotency::validate_key(&self.idempotency_key)?;
        if self.debit_account_id == self.credit_account_id {
            return Err(crate::Error::Validation(
                "transfer requires two distinct accounts".to_string(),
            ));
        }
        normalize_amount(self.amount)
    }
}

/// Terminal outcome of a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingStatus {
    /// Committed; the ledger entry is the proof
    Completed,
    /// Rejected before any write
    Rejected,
}

/// Result returned to the caller for one posted entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingReceipt {
    /// ID of the committed ledger entry
    pub transaction_id: Uuid,

    /// Account the entry was posted to
    pub account_id: AccountId,

    /// Sequence number assigned to the entry
    pub sequence_number: u64,

    /// Balance after the posting
    pub balance_after: Decimal,

    /// Terminal status
    pub status: PostingStatus,

    /// True when this receipt was replayed from an earlier commit
    pub idempotent: bool,
}

impl PostingReceipt {
    /// Receipt for a freshly committed entry.
    pub fn posted(entry: &LedgerEntry) -> Self {
        Self::from_entry(entry, false)
    }

    /// Receipt replayed from a previously committed entry.
    pub fn replayed(entry: &LedgerEntry) -> Self {
        Self::from_entry(entry, true)
    }

    fn from_entry(entry: &LedgerEntry, idempotent: bool) -> Self {
        Self {
            transaction_id: entry.id,
            account_id: entry.account_id,
            sequence_number: entry.sequence_number,
            balance_after: entry.balance_after,
            status: PostingStatus::Completed,
            idempotent,
        }
    }
}

/// Result returned to the caller for an atomic two-leg transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Transfer ID shared by both legs (also in each leg's metadata)
    pub transfer_id: Uuid,

    /// Receipt for the debited account
    pub debit: PostingReceipt,

    /// Receipt for the credited account
    pub credit: PostingReceipt,

    /// True when both legs were replayed from an earlier commit
    pub idempotent: bool,
}

/// Normalize a money amount: positive, at most two fractional digits,
/// rescaled so the stored representation is byte-exact.
pub fn normalize_amount(amount: Decimal) -> crate::Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(crate::Error::Validation(
            "amount must be greater than zero".to_string(),
        ));
    }
    if amount.scale() > MONEY_SCALE {
        return Err(crate::Error::Validation(format!(
            "amount {} has more than {} fractional digits",
            amount, MONEY_SCALE
        )));
    }
    let mut normalized = amount;
    normalized.rescale(MONEY_SCALE);
    Ok(normalized)
}

/// Current time truncated to millisecond precision, the resolution the
/// audit trail stores and reports.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_millis_opt(now.timestamp_millis())
        .single()
        .unwrap_or(now)
}
