//! Financial Analytics
//!
//! Read-only reporting over the wallet ledger store: period summaries
//! with preceding-period comparisons, grouped time series, and category
//! breakdowns.
//!
//! # Architecture
//!
//! The engine reads committed, immutable ledger entries and the
//! day-bucketed operation counters through a shared storage handle. It
//! never takes account locks, so reporting cannot block the transaction
//! processor.
//!
//! # Example
//!
//! ```no_run
//! use analytics::{AnalyticsEngine, Period};
//! use wallet_core::{Config, Engine};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::open(Config::default())?;
//!     let analytics = AnalyticsEngine::new(engine.storage());
//!
//!     let report = analytics.summary(Period::Day, chrono::Utc::now())?;
//!     println!("{} transactions today", report.summary.transaction_count);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod engine;
pub mod error;
pub mod types;

// Re-exports
pub use engine::AnalyticsEngine;
pub use error::{Error, Result};
pub use types::{
    CategoryBreakdown, Comparison, GroupBy, Period, PeriodSummary, SummaryReport, TimePoint,
};
