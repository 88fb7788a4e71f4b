#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/marlow-rs/marlow/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod benchmark;
pub mod covariance;
pub mod engine;
pub mod error;
pub mod holdings;
pub mod metrics;
pub mod period;
pub mod prices;
pub mod source;
pub mod weights;

// Re-export main types
pub use benchmark::{BenchmarkReturnFetcher, ComparisonRow, PeriodComparison, benchmark_period_returns};
pub use covariance::{CovarianceEstimator, SampleCovariance};
pub use engine::{EngineConfig, MetricsEngine};
pub use error::{MetricError, MetricResult};
pub use holdings::{Holdings, HoldingsError};
pub use metrics::{PeriodReturn, PeriodReturns, PortfolioMetrics};
pub use period::{LookbackPeriod, resolve_period};
pub use prices::{PriceSeries, PriceTable, PriceTableError};
pub use source::{MarketDataSource, ValuationRatios};
pub use weights::WeightVector;
