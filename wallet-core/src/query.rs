//! Ledger search
//!
//! Read-only filtering over the entry store: date range, amount range,
//! account, direction, category; paginated. Results render timestamps
//! both as UTC ISO-8601 with milliseconds and in a caller-specified
//! fixed-offset timezone (an unparseable offset falls back to UTC).
//! This path never touches the account locks.

use crate::storage::Storage;
use crate::types::{AccountId, Category, Currency, Direction, LedgerEntry};
use crate::Result;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default page size, matching the history endpoints.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Search filter; unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Entries posted at or after this instant
    pub start: Option<DateTime<Utc>>,

    /// Entries posted at or before this instant
    pub end: Option<DateTime<Utc>>,

    /// Minimum amount (inclusive)
    pub min_amount: Option<Decimal>,

    /// Maximum amount (inclusive)
    pub max_amount: Option<Decimal>,

    /// Restrict to one account
    pub account_id: Option<AccountId>,

    /// Restrict to credits or debits
    pub direction: Option<Direction>,

    /// Restrict to one category
    pub category: Option<Category>,

    /// Restrict to one currency
    pub currency: Option<Currency>,

    /// 1-based page number (0 is treated as 1)
    pub page: usize,

    /// Page size (0 is treated as the default)
    pub limit: usize,

    /// Caller timezone as a fixed offset, e.g. "+03:00"
    pub timezone: Option<String>,
}

impl SearchFilter {
    /// Whether an entry passes every set filter.
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(start) = self.start {
            if entry.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.created_at > end {
                return false;
            }
        }
        if let Some(min) = self.min_amount {
            if entry.amount < min {
                return false;
            }
        }
        if let Some(max) = self.max_amount {
            if entry.amount > max {
                return false;
            }
        }
        if let Some(account_id) = self.account_id {
            if entry.account_id != account_id {
                return false;
            }
        }
        if let Some(direction) = self.direction {
            if entry.direction != direction {
                return false;
            }
        }
        if let Some(category) = self.category {
            if entry.category != category {
                return false;
            }
        }
        if let Some(currency) = self.currency {
            if entry.currency != currency {
                return false;
            }
        }
        true
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,

    /// 1-based page number
    pub page: usize,

    /// Page size
    pub limit: usize,

    /// Total matching items across all pages
    pub total: u64,

    /// Total page count
    pub total_pages: u64,
}

/// A search result with both timestamp renderings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matching entry
    pub entry: LedgerEntry,

    /// Posting time as UTC ISO-8601 with milliseconds
    pub created_at_utc: String,

    /// Posting time rendered in the caller's timezone
    pub created_at_local: String,
}

/// Render a timestamp as UTC ISO-8601 with milliseconds.
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render a timestamp in the caller's fixed-offset timezone. An absent
/// or unparseable offset falls back to the UTC rendering.
pub fn format_local(ts: DateTime<Utc>, timezone: Option<&str>) -> String {
    match timezone.and_then(|s| s.parse::<FixedOffset>().ok()) {
        Some(offset) => ts
            .with_timezone(&offset)
            .to_rfc3339_opts(SecondsFormat::Millis, false),
        None => format_utc(ts),
    }
}

/// Slice items into one page.
pub fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> Page<T> {
    let page = page.max(1);
    let limit = if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit };
    let total = items.len() as u64;
    let total_pages = total.div_ceil(limit as u64);

    let offset = (page - 1).saturating_mul(limit);
    let items = items.into_iter().skip(offset).take(limit).collect();

    Page {
        items,
        page,
        limit,
        total,
        total_pages,
    }
}

/// Run a search over the entry store, newest first.
pub fn search(storage: &Storage, filter: &SearchFilter) -> Result<Page<SearchHit>> {
    let mut entries = match filter.account_id {
        // Account-scoped searches use the clustered key range
        Some(account_id) => storage.entries_for_account(account_id, 0, 0)?,
        None => storage.all_entries()?,
    };

    entries.retain(|e| filter.matches(e));
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.sequence_number.cmp(&a.sequence_number))
    });

    let timezone = filter.timezone.as_deref();
    let hits: Vec<SearchHit> = entries
        .into_iter()
        .map(|entry| SearchHit {
            created_at_utc: format_utc(entry.created_at),
            created_at_local: format_local(entry.created_at, timezone),
            entry,
        })
        .collect();

    Ok(paginate(hits, filter.page, filter.limit))
}
