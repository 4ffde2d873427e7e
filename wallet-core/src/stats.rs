//! Per-owner statistics rollups
//!
//! Agent activity (customer registrations, cash-in/cash-out counts,
//! volumes, commission) is rolled up into day/week/month/lifetime
//! buckets. Cash deltas ride the posting's atomic commit, so the rollups
//! can never drift from the ledger; registrations carry no posting and
//! commit on their own.

use crate::storage::Storage;
use crate::types::{OwnerId, MONEY_SCALE};
use crate::Result;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bucket tags, stored as the byte between owner ID and bucket key.
const TAG_LIFETIME: u8 = b'L';
const TAG_DAY: u8 = b'D';
const TAG_WEEK: u8 = b'W';
const TAG_MONTH: u8 = b'M';
const TAG_REGISTRATIONS: u8 = b'R';

/// One rollup bucket (a single row in the stats column family)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatBucket {
    /// Cash-in postings in this bucket
    pub cash_in_count: u64,

    /// Cash-out postings in this bucket
    pub cash_out_count: u64,

    /// Cash volume moved in this bucket
    pub volume: Decimal,

    /// Commission accrued in this bucket
    pub commission: Decimal,

    /// Customer registrations in this bucket (registration rows only)
    pub registrations: u64,

    /// Last activity folded into this bucket
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Which cash leg a delta describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashKind {
    /// Float debited, wallet credited
    CashIn,
    /// Wallet debited, float credited
    CashOut,
}

/// A rollup delta produced by one cash transfer
#[derive(Debug, Clone)]
pub struct CashDelta {
    /// Cash-in or cash-out
    pub kind: CashKind,

    /// Cash amount moved
    pub amount: Decimal,

    /// Commission accrued to the agent
    pub commission: Decimal,

    /// When the transfer posted
    pub at: DateTime<Utc>,
}

/// Assembled view over an owner's current buckets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerStats {
    /// Owner the stats describe
    pub owner_id: OwnerId,

    /// Customers registered by this owner, lifetime
    pub customers_registered: u64,

    /// Cash-in postings, lifetime
    pub cash_in_count: u64,

    /// Cash-out postings, lifetime
    pub cash_out_count: u64,

    /// Cash volume, lifetime
    pub total_volume: Decimal,

    /// Cash volume, current day
    pub today_volume: Decimal,

    /// Cash volume, current ISO week
    pub week_volume: Decimal,

    /// Cash volume, current month
    pub month_volume: Decimal,

    /// Commission accrued, lifetime
    pub total_commission: Decimal,

    /// Most recent activity of any kind
    pub last_activity_at: Option<DateTime<Utc>>,
}

fn stat_key(owner: OwnerId, tag: u8, bucket: &str) -> Vec<u8> {
    let mut key = owner.as_bytes().to_vec();
    key.push(tag);
    key.extend_from_slice(bucket.as_bytes());
    key
}

fn day_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn week_bucket(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

fn month_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

fn zero_money() -> Decimal {
    let mut zero = Decimal::ZERO;
    zero.rescale(MONEY_SCALE);
    zero
}

impl StatBucket {
    fn fold_cash(&mut self, delta: &CashDelta) {
        match delta.kind {
            CashKind::CashIn => self.cash_in_count += 1,
            CashKind::CashOut => self.cash_out_count += 1,
        }
        self.volume += delta.amount;
        self.commission += delta.commission;
        self.last_activity_at = Some(delta.at);
    }
}

/// Compute the stats rows a cash transfer must write, folding the delta
/// into the owner's lifetime, day, week, and month buckets.
///
/// The caller holds the float account's lock, which serializes all cash
/// mutations for this owner; the returned rows go into the same
/// WriteBatch as the postings themselves.
pub fn cash_rows(
    storage: &Storage,
    owner: OwnerId,
    delta: &CashDelta,
) -> Result<Vec<(Vec<u8>, StatBucket)>> {
    let keys = [
        stat_key(owner, TAG_LIFETIME, ""),
        stat_key(owner, TAG_DAY, &day_bucket(delta.at)),
        stat_key(owner, TAG_WEEK, &week_bucket(delta.at)),
        stat_key(owner, TAG_MONTH, &month_bucket(delta.at)),
    ];

    let mut rows = Vec::with_capacity(keys.len());
    for key in keys {
        let mut bucket = storage.get_stat(&key)?.unwrap_or_default();
        bucket.fold_cash(delta);
        rows.push((key, bucket));
    }
    Ok(rows)
}

/// Compute the registration row for one registered customer.
///
/// Registrations live in their own row so they never contend with the
/// cash buckets written under the float lock.
pub fn registration_row(
    storage: &Storage,
    owner: OwnerId,
    at: DateTime<Utc>,
) -> Result<(Vec<u8>, StatBucket)> {
    let key = stat_key(owner, TAG_REGISTRATIONS, "");
    let mut bucket = storage.get_stat(&key)?.unwrap_or_default();
    bucket.registrations += 1;
    bucket.last_activity_at = Some(at);
    Ok((key, bucket))
}

/// Assemble an owner's stats from the lifetime row, the registration
/// row, and the buckets for the current day/week/month.
pub fn owner_stats(storage: &Storage, owner: OwnerId, now: DateTime<Utc>) -> Result<OwnerStats> {
    let lifetime = storage
        .get_stat(&stat_key(owner, TAG_LIFETIME, ""))?
        .unwrap_or_default();
    let registrations = storage
        .get_stat(&stat_key(owner, TAG_REGISTRATIONS, ""))?
        .unwrap_or_default();
    let day = storage
        .get_stat(&stat_key(owner, TAG_DAY, &day_bucket(now)))?
        .unwrap_or_default();
    let week = storage
        .get_stat(&stat_key(owner, TAG_WEEK, &week_bucket(now)))?
        .unwrap_or_default();
    let month = storage
        .get_stat(&stat_key(owner, TAG_MONTH, &month_bucket(now)))?
        .unwrap_or_default();

    let last_activity_at = match (lifetime.last_activity_at, registrations.last_activity_at) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    let money = |v: Decimal| if v.is_zero() { zero_money() } else { v };

    Ok(OwnerStats {
        owner_id: owner,
        customers_registered: registrations.registrations,
        cash_in_count: lifetime.cash_in_count,
        cash_out_count: lifetime.cash_out_count,
        total_volume: money(lifetime.volume),
        today_volume: money(day.volume),
        week_volume: money(week.volume),
        month_volume: money(month.volume),
        total_commission: money(lifetime.commission),
        last_activity_at,
    })
}
