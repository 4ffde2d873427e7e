//! Analytics query engine
//!
//! Read-only reporting over the ledger store. Queries scan committed,
//! immutable entries and the day-bucketed operation counters; they never
//! touch the account locks and cannot block the transaction processor.

use crate::types::{
    CategoryBreakdown, Comparison, GroupBy, Period, PeriodSummary, SummaryReport, TimePoint,
};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use wallet_core::{Category, Storage};

/// Read-only reporting engine over a shared ledger store
pub struct AnalyticsEngine {
    storage: Arc<Storage>,
}

impl AnalyticsEngine {
    /// Create an engine over the given store.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Summary for a period, with the immediately preceding period of
    /// equal length and percentage deltas.
    pub fn summary(&self, period: Period, as_of: DateTime<Utc>) -> Result<SummaryReport> {
        let (start, end, prev_start, prev_end) = resolve_range(period, as_of)?;

        let summary = self.period_summary(start, end)?;
        let previous = self.period_summary(prev_start, prev_end)?;

        let comparison = Comparison {
            volume_change: percentage_change(
                summary.total_volume.to_f64().unwrap_or(0.0),
                previous.total_volume.to_f64().unwrap_or(0.0),
            ),
            fees_change: percentage_change(
                summary.total_fees.to_f64().unwrap_or(0.0),
                previous.total_fees.to_f64().unwrap_or(0.0),
            ),
            count_change: percentage_change(
                summary.transaction_count as f64,
                previous.transaction_count as f64,
            ),
        };

        tracing::debug!(
            %start,
            %end,
            count = summary.transaction_count,
            "Summary computed"
        );

        Ok(SummaryReport {
            start,
            end,
            summary,
            previous,
            comparison,
        })
    }

    /// Metrics grouped by time bucket over an inclusive range, sorted
    /// ascending by bucket start.
    pub fn time_series(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> Result<Vec<TimePoint>> {
        check_range(start, end)?;
        let entries = self.storage.entries_in_range(start, end)?;

        let mut buckets: BTreeMap<DateTime<Utc>, TimePoint> = BTreeMap::new();
        for entry in entries {
            let bucket = truncate(entry.created_at, group_by)?;
            let point = buckets.entry(bucket).or_insert_with(|| TimePoint {
                bucket,
                transaction_count: 0,
                total_volume: zero_money(),
                total_fees: zero_money(),
            });
            point.transaction_count += 1;
            point.total_volume += entry.amount;
            if entry.category.is_fee() {
                point.total_fees += entry.amount;
            }
        }

        Ok(buckets.into_values().collect())
    }

    /// Count and volume per category over an inclusive range, largest
    /// volume first.
    pub fn breakdown(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CategoryBreakdown>> {
        check_range(start, end)?;
        let entries = self.storage.entries_in_range(start, end)?;

        let mut by_category: HashMap<Category, (u64, Decimal)> = HashMap::new();
        for entry in entries {
            let slot = by_category
                .entry(entry.category)
                .or_insert((0, zero_money()));
            slot.0 += 1;
            slot.1 += entry.amount;
        }

        let mut breakdown: Vec<CategoryBreakdown> = by_category
            .into_iter()
            .map(|(category, (count, total_volume))| CategoryBreakdown {
                category,
                count,
                total_volume,
            })
            .collect();
        breakdown.sort_by(|a, b| {
            b.total_volume
                .cmp(&a.total_volume)
                .then_with(|| a.category.as_str().cmp(b.category.as_str()))
        });
        Ok(breakdown)
    }

    fn period_summary(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<PeriodSummary> {
        let entries = self.storage.entries_in_range(start, end)?;

        let transaction_count = entries.len() as u64;
        let mut total_volume = zero_money();
        let mut total_fees = zero_money();
        for entry in &entries {
            total_volume += entry.amount;
            if entry.category.is_fee() {
                total_fees += entry.amount;
            }
        }

        let average_value = if transaction_count == 0 {
            zero_money()
        } else {
            let mut avg = (total_volume / Decimal::from(transaction_count))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            avg.rescale(2);
            avg
        };

        let (posted, rejected) = self
            .storage
            .counters_in_range(start.date_naive(), end.date_naive())?;
        let attempted = posted + rejected;
        let success_rate = if attempted == 0 {
            0.0
        } else {
            posted as f64 / attempted as f64 * 100.0
        };

        Ok(PeriodSummary {
            transaction_count,
            total_volume,
            total_fees,
            average_value,
            success_rate,
        })
    }
}

fn zero_money() -> Decimal {
    let mut zero = Decimal::ZERO;
    zero.rescale(2);
    zero
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end < start {
        return Err(Error::InvalidRange(format!(
            "end {} precedes start {}",
            end, start
        )));
    }
    Ok(())
}

fn day_start(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| Error::InvalidRange(format!("invalid date {}", date)))
}

fn day_end(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| Error::InvalidRange(format!("invalid date {}", date)))
}

/// Resolve a period to (start, end, previous_start, previous_end). The
/// previous period always has the same length and ends just before the
/// current one starts.
fn resolve_range(
    period: Period,
    as_of: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>, DateTime<Utc>, DateTime<Utc>)> {
    match period {
        Period::Day => {
            let start = day_start(as_of.date_naive())?;
            let end = day_end(as_of.date_naive())?;
            Ok((
                start,
                end,
                start - Duration::days(1),
                end - Duration::days(1),
            ))
        }
        Period::Week => {
            let start = as_of - Duration::days(7);
            Ok((
                start,
                as_of,
                start - Duration::days(7),
                as_of - Duration::days(7),
            ))
        }
        Period::Month => {
            let first = as_of
                .date_naive()
                .with_day(1)
                .ok_or_else(|| Error::InvalidRange("month start".to_string()))?;
            let start = day_start(first)?;

            let (prev_year, prev_month) = if first.month() == 1 {
                (first.year() - 1, 12)
            } else {
                (first.year(), first.month() - 1)
            };
            let prev_first = NaiveDate::from_ymd_opt(prev_year, prev_month, 1)
                .ok_or_else(|| Error::InvalidRange("previous month start".to_string()))?;

            Ok((
                start,
                as_of,
                day_start(prev_first)?,
                start - Duration::milliseconds(1),
            ))
        }
        Period::Year => {
            let first = NaiveDate::from_ymd_opt(as_of.year(), 1, 1)
                .ok_or_else(|| Error::InvalidRange("year start".to_string()))?;
            let prev_first = NaiveDate::from_ymd_opt(as_of.year() - 1, 1, 1)
                .ok_or_else(|| Error::InvalidRange("previous year start".to_string()))?;
            let start = day_start(first)?;
            Ok((
                start,
                as_of,
                day_start(prev_first)?,
                start - Duration::milliseconds(1),
            ))
        }
        Period::Range { start, end } => {
            check_range(start, end)?;
            let duration = end - start;
            let prev_end = start - Duration::milliseconds(1);
            Ok((start, end, prev_end - duration, prev_end))
        }
    }
}

/// Percentage change vs the previous value; a zero baseline reports 100%
/// for any growth and 0% otherwise.
fn percentage_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

/// Truncate a timestamp to its bucket start.
fn truncate(ts: DateTime<Utc>, group_by: GroupBy) -> Result<DateTime<Utc>> {
    let date = ts.date_naive();
    match group_by {
        GroupBy::Hour => Ok(day_start(date)? + Duration::hours(ts.hour() as i64)),
        GroupBy::Day => day_start(date),
        GroupBy::Week => {
            let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
            day_start(monday)
        }
        GroupBy::Month => {
            let first = date
                .with_day(1)
                .ok_or_else(|| Error::InvalidRange("month start".to_string()))?;
            day_start(first)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use uuid::Uuid;
    use wallet_core::{
        AccountId, Config, Currency, Direction, Engine, OwnerId, PostingRequest,
    };

    fn test_engines() -> (Engine, AnalyticsEngine, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let engine = Engine::open(config).unwrap();
        let analytics = AnalyticsEngine::new(engine.storage());
        (engine, analytics, temp_dir)
    }

    fn request(
        account_id: AccountId,
        direction: Direction,
        amount: i64,
        category: Category,
    ) -> PostingRequest {
        PostingRequest {
            account_id,
            direction,
            amount: Decimal::new(amount, 2),
            currency: Currency::KES,
            category,
            idempotency_key: Uuid::new_v4(),
            description: None,
            metadata: StdHashMap::new(),
        }
    }

    #[test]
    fn test_percentage_change() {
        assert_eq!(percentage_change(150.0, 100.0), 50.0);
        assert_eq!(percentage_change(50.0, 100.0), -50.0);
        assert_eq!(percentage_change(10.0, 0.0), 100.0);
        assert_eq!(percentage_change(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_resolve_range_day() {
        let as_of = Utc.with_ymd_and_hms(2026, 8, 6, 14, 0, 0).unwrap();
        let (start, end, prev_start, prev_end) =
            resolve_range(Period::Day, as_of).unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 6, 0, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2026, 8, 6, 23, 59, 59).unwrap()
                + Duration::milliseconds(999)
        );
        assert_eq!(prev_start, start - Duration::days(1));
        assert_eq!(prev_end, end - Duration::days(1));
    }

    #[test]
    fn test_resolve_range_month_january() {
        let as_of = Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).unwrap();
        let (start, _, prev_start, prev_end) =
            resolve_range(Period::Month, as_of).unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(
            prev_start,
            Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(prev_end, start - Duration::milliseconds(1));
    }

    #[test]
    fn test_resolve_range_explicit() {
        let start = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap();
        let (_, _, prev_start, prev_end) =
            resolve_range(Period::Range { start, end }, start).unwrap();

        assert_eq!(prev_end, start - Duration::milliseconds(1));
        assert_eq!(prev_end - prev_start, end - start);

        assert!(resolve_range(Period::Range { start: end, end: start }, start).is_err());
    }

    #[test]
    fn test_truncate_buckets() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 6, 14, 35, 12).unwrap();
        assert_eq!(
            truncate(ts, GroupBy::Hour).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 6, 14, 0, 0).unwrap()
        );
        assert_eq!(
            truncate(ts, GroupBy::Day).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 6, 0, 0, 0).unwrap()
        );
        // 2026-08-06 is a Thursday; the week bucket starts Monday 08-03
        assert_eq!(
            truncate(ts, GroupBy::Week).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(
            truncate(ts, GroupBy::Month).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_summary_end_to_end() {
        let (engine, analytics, _temp) = test_engines();
        let owner = OwnerId::new(Uuid::new_v4());
        let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

        engine
            .post(request(wallet.id, Direction::Credit, 100000, Category::Topup))
            .await
            .unwrap();
        engine
            .post(request(wallet.id, Direction::Debit, 30000, Category::Payment))
            .await
            .unwrap();
        engine
            .post(request(wallet.id, Direction::Debit, 500, Category::Fee))
            .await
            .unwrap();

        let as_of = wallet_core::types::now_millis();
        let report = analytics.summary(Period::Day, as_of).unwrap();

        assert_eq!(report.summary.transaction_count, 3);
        assert_eq!(report.summary.total_volume, Decimal::new(130500, 2));
        assert_eq!(report.summary.total_fees, Decimal::new(500, 2));
        assert_eq!(report.summary.average_value, Decimal::new(43500, 2));
        assert_eq!(report.summary.success_rate, 100.0);

        // Yesterday was empty: volume growth reports as 100%
        assert_eq!(report.previous.transaction_count, 0);
        assert_eq!(report.comparison.volume_change, 100.0);
    }

    #[tokio::test]
    async fn test_success_rate_counts_rejections() {
        let (engine, analytics, _temp) = test_engines();
        let owner = OwnerId::new(Uuid::new_v4());
        let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

        engine
            .post(request(wallet.id, Direction::Credit, 10000, Category::Topup))
            .await
            .unwrap();

        // Overdraft: rejected, no ledger row, but counted as attempted
        let result = engine
            .post(request(wallet.id, Direction::Debit, 99999, Category::Payment))
            .await;
        assert!(result.is_err());

        let as_of = wallet_core::types::now_millis();
        let report = analytics.summary(Period::Day, as_of).unwrap();

        assert_eq!(report.summary.transaction_count, 1);
        assert_eq!(report.summary.success_rate, 50.0);
    }

    #[tokio::test]
    async fn test_time_series_and_breakdown() {
        let (engine, analytics, _temp) = test_engines();
        let owner = OwnerId::new(Uuid::new_v4());
        let wallet = engine.open_wallet(owner, Currency::KES).unwrap();

        engine
            .post(request(wallet.id, Direction::Credit, 60000, Category::Topup))
            .await
            .unwrap();
        engine
            .post(request(wallet.id, Direction::Debit, 25000, Category::Payment))
            .await
            .unwrap();
        engine
            .post(request(wallet.id, Direction::Debit, 15000, Category::Payment))
            .await
            .unwrap();

        let as_of = wallet_core::types::now_millis();
        let start = as_of - Duration::hours(1);

        let series = analytics
            .time_series(start, as_of, GroupBy::Day)
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].transaction_count, 3);
        assert_eq!(series[0].total_volume, Decimal::new(100000, 2));

        let breakdown = analytics.breakdown(start, as_of).unwrap();
        assert_eq!(breakdown.len(), 2);
        // Largest volume first
        assert_eq!(breakdown[0].category, Category::Topup);
        assert_eq!(breakdown[0].total_volume, Decimal::new(60000, 2));
        assert_eq!(breakdown[1].category, Category::Payment);
        assert_eq!(breakdown[1].count, 2);
        assert_eq!(breakdown[1].total_volume, Decimal::new(40000, 2));
    }
}
