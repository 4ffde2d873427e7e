//! Reporting types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wallet_core::Category;

/// Reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    /// The calendar day of the reference instant
    Day,
    /// The trailing seven days
    Week,
    /// The calendar month so far
    Month,
    /// The calendar year so far
    Year,
    /// An explicit inclusive range
    Range {
        /// Range start
        start: DateTime<Utc>,
        /// Range end
        end: DateTime<Utc>,
    },
}

/// Time bucket for grouped series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupBy {
    /// Hourly buckets
    Hour,
    /// Daily buckets
    Day,
    /// Weekly buckets (Monday start)
    Week,
    /// Monthly buckets
    Month,
}

/// Aggregated metrics over one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// Ledger entries in the period
    pub transaction_count: u64,

    /// Sum of posted amounts
    pub total_volume: Decimal,

    /// Sum of fee and commission amounts
    pub total_fees: Decimal,

    /// Mean posted amount (zero when the period is empty)
    pub average_value: Decimal,

    /// Committed operations as a percentage of attempted operations
    pub success_rate: f64,
}

/// Percentage deltas against the preceding period of equal length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Volume change, percent
    pub volume_change: f64,

    /// Fees change, percent
    pub fees_change: f64,

    /// Transaction count change, percent
    pub count_change: f64,
}

/// Period summary with its preceding-period comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Period start (inclusive)
    pub start: DateTime<Utc>,

    /// Period end (inclusive)
    pub end: DateTime<Utc>,

    /// Metrics for the requested period
    pub summary: PeriodSummary,

    /// Metrics for the immediately preceding period of equal length
    pub previous: PeriodSummary,

    /// Percentage deltas current vs previous
    pub comparison: Comparison,
}

/// One bucket of a grouped time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    /// Bucket start
    pub bucket: DateTime<Utc>,

    /// Entries in the bucket
    pub transaction_count: u64,

    /// Volume in the bucket
    pub total_volume: Decimal,

    /// Fees in the bucket
    pub total_fees: Decimal,
}

/// Count and volume for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    /// Category
    pub category: Category,

    /// Entries with this category
    pub count: u64,

    /// Volume with this category
    pub total_volume: Decimal,
}
