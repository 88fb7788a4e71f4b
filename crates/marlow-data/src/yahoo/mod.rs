//! Yahoo Finance data providers.

pub mod fundamentals;
pub mod quotes;

pub use fundamentals::{FundamentalData, YahooFundamentalsProvider, parse_quote_summary};
pub use quotes::{YahooQuoteProvider, calendar_window, last_completed_session};
