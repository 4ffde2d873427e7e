//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `wallet_postings_total` - Committed postings
//! - `wallet_rejections_total` - Business-rule rejections
//! - `wallet_replays_total` - Idempotent replays served
//! - `wallet_busy_timeouts_total` - Lock acquisitions that timed out
//! - `wallet_posting_duration_seconds` - Posting latency
//! - `wallet_lock_wait_seconds` - Time spent waiting on account locks
//! - `wallet_accounts_total` - Accounts ever opened

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed postings
    pub postings_total: IntCounter,

    /// Business-rule rejections
    pub rejections_total: IntCounter,

    /// Idempotent replays served
    pub replays_total: IntCounter,

    /// Lock acquisitions that timed out
    pub busy_timeouts_total: IntCounter,

    /// Posting latency histogram
    pub posting_duration: Histogram,

    /// Lock wait histogram
    pub lock_wait: Histogram,

    /// Accounts ever opened
    pub accounts_total: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a collector with its own registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let postings_total = IntCounter::with_opts(Opts::new(
            "wallet_postings_total",
            "Committed postings",
        ))?;
        registry.register(Box::new(postings_total.clone()))?;

        let rejections_total = IntCounter::with_opts(Opts::new(
            "wallet_rejections_total",
            "Business-rule rejections",
        ))?;
        registry.register(Box::new(rejections_total.clone()))?;

        let replays_total = IntCounter::with_opts(Opts::new(
            "wallet_replays_total",
            "Idempotent replays served",
        ))?;
        registry.register(Box::new(replays_total.clone()))?;

        let busy_timeouts_total = IntCounter::with_opts(Opts::new(
            "wallet_busy_timeouts_total",
            "Lock acquisitions that timed out",
        ))?;
        registry.register(Box::new(busy_timeouts_total.clone()))?;

        let posting_duration = Histogram::with_opts(
            HistogramOpts::new("wallet_posting_duration_seconds", "Posting latency").buckets(
                vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0],
            ),
        )?;
        registry.register(Box::new(posting_duration.clone()))?;

        let lock_wait = Histogram::with_opts(
            HistogramOpts::new("wallet_lock_wait_seconds", "Account lock wait").buckets(vec![
                0.0001, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0,
            ]),
        )?;
        registry.register(Box::new(lock_wait.clone()))?;

        let accounts_total =
            IntGauge::with_opts(Opts::new("wallet_accounts_total", "Accounts ever opened"))?;
        registry.register(Box::new(accounts_total.clone()))?;

        Ok(Self {
            postings_total,
            rejections_total,
            replays_total,
            busy_timeouts_total,
            posting_duration,
            lock_wait,
            accounts_total,
            registry,
        })
    }

    /// Record a committed posting (one per ledger entry).
    pub fn record_posting(&self, duration_seconds: f64) {
        self.postings_total.inc();
        self.posting_duration.observe(duration_seconds);
    }

    /// Record a committed two-leg transfer.
    pub fn record_transfer(&self, duration_seconds: f64) {
        self.postings_total.inc_by(2);
        self.posting_duration.observe(duration_seconds);
    }

    /// Record a business-rule rejection.
    pub fn record_rejection(&self) {
        self.rejections_total.inc();
    }

    /// Record an idempotent replay.
    pub fn record_replay(&self) {
        self.replays_total.inc();
    }

    /// Record a lock acquisition timeout.
    pub fn record_busy_timeout(&self) {
        self.busy_timeouts_total.inc();
    }

    /// Record time spent waiting on an account lock.
    pub fn record_lock_wait(&self, duration_seconds: f64) {
        self.lock_wait.observe(duration_seconds);
    }

    /// Record a newly opened account.
    pub fn record_account_opened(&self) {
        self.accounts_total.inc();
    }

    /// Get the metrics registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
