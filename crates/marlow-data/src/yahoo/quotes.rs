//! Daily close history from Yahoo Finance.

use crate::error::{DataError, Result};
use crate::frame::close_frame;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Timelike, Utc, Weekday};
use futures::stream::{self, StreamExt};
use polars::prelude::DataFrame;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use yahoo_finance_api as yahoo;

/// Default number of symbols fetched concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default pause after each request.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(250);

/// Calendar window that covers `trading_days` sessions with a margin for holidays.
///
/// `ceil(trading_days * 365 / 252) + 7` calendar days ending at `end`.
pub fn calendar_window(trading_days: usize, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let calendar_days = (trading_days * 365).div_ceil(252) + 7;
    (end - ChronoDuration::days(calendar_days as i64), end)
}

/// Hour (UTC) after which the US session of that day is treated as closed.
///
/// 16:00 New York is 20:00 UTC in summer and 21:00 UTC in winter.
pub const SESSION_CLOSE_UTC_HOUR: u32 = 21;

/// Date of the most recent weekday session that had closed by `now`.
///
/// Holidays are not known here; a holiday just yields a date with no bar.
pub fn last_completed_session(now: DateTime<Utc>) -> NaiveDate {
    let mut day = now.date_naive();
    if now.hour() < SESSION_CLOSE_UTC_HOUR {
        day = day.pred_opt().unwrap_or(day);
    }
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day = day.pred_opt().unwrap_or(day);
    }
    day
}

/// Yahoo Finance quote provider with rate limiting and bounded concurrency.
pub struct YahooQuoteProvider {
    provider: yahoo::YahooConnector,
    rate_limit_delay: Duration,
    concurrency: usize,
}

impl std::fmt::Debug for YahooQuoteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooQuoteProvider")
            .field("rate_limit_delay", &self.rate_limit_delay)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl YahooQuoteProvider {
    /// Create a provider with default rate limiting and concurrency.
    ///
    /// # Errors
    /// Fails if the underlying HTTP connector cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_rate_limit(DEFAULT_RATE_LIMIT)
    }

    /// Create a provider with custom rate limiting.
    ///
    /// # Errors
    /// Fails if the underlying HTTP connector cannot be built.
    pub fn with_rate_limit(rate_limit_delay: Duration) -> Result<Self> {
        Ok(Self {
            provider: yahoo::YahooConnector::new()?,
            rate_limit_delay,
            concurrency: DEFAULT_CONCURRENCY,
        })
    }

    /// Set how many symbols are fetched at once (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetch daily closes for a single symbol.
    ///
    /// # Arguments
    /// * `symbol` - The ticker symbol (e.g., "AAPL")
    /// * `start` - Start of the window
    /// * `end` - End of the window
    ///
    /// # Returns
    /// A Polars DataFrame with columns: symbol, date, close
    pub async fn fetch_quotes(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DataFrame> {
        if start > end {
            return Err(DataError::InvalidDateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }

        if symbol.trim().is_empty() {
            return Err(DataError::InvalidSymbol("Empty symbol".to_string()));
        }

        let start_time = time::OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| DataError::TimeConversion(e.to_string()))?;
        let end_time = time::OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| DataError::TimeConversion(e.to_string()))?;

        debug!("Requesting {} quotes from {} to {}", symbol, start, end);
        let response = self
            .provider
            .get_quote_history(symbol, start_time, end_time)
            .await;

        // Pace requests whether or not they succeeded.
        sleep(self.rate_limit_delay).await;

        let quotes = response
            .and_then(|r| r.quotes())
            .map_err(|e| classify_yahoo_error(symbol, e))?;

        if quotes.is_empty() {
            return Err(DataError::MissingData {
                symbol: symbol.to_string(),
                reason: "No data returned from Yahoo Finance".to_string(),
            });
        }

        quotes_frame(symbol, quotes.iter().map(|q| (q.timestamp, q.close)))
    }

    /// Fetch several symbols concurrently, returning one result per symbol.
    ///
    /// Order of the results follows completion, not input.
    pub async fn fetch_quotes_each(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(String, Result<DataFrame>)> {
        stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let result = self.fetch_quotes(&symbol, start, end).await;
                (symbol, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

/// Separate "Yahoo has no such data" from failures to reach or use Yahoo.
///
/// Empty results and the chart API's `Not Found` error become
/// [`DataError::MissingData`]; everything else keeps its transport or API error.
pub(crate) fn classify_yahoo_error(symbol: &str, err: yahoo::YahooError) -> DataError {
    let reason = match &err {
        yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult => err.to_string(),
        yahoo::YahooError::ApiError(msg)
            if msg
                .code
                .as_deref()
                .is_some_and(|code| code.eq_ignore_ascii_case("Not Found")) =>
        {
            msg.description
                .clone()
                .unwrap_or_else(|| "Not Found".to_string())
        }
        _ => return DataError::from(err),
    };
    DataError::MissingData {
        symbol: symbol.to_string(),
        reason,
    }
}

/// Build the quotes frame from `(unix seconds, close)` rows.
///
/// Yahoo stamps daily bars with the session open, so the UTC date is the trading day.
pub(crate) fn quotes_frame<I>(symbol: &str, rows: I) -> Result<DataFrame>
where
    I: IntoIterator<Item = (i64, f64)>,
{
    let mut dates = Vec::new();
    let mut closes = Vec::new();
    for (ts, close) in rows {
        let date = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| DataError::TimeConversion(format!("timestamp {ts} out of range")))?
            .date_naive();
        dates.push(date.to_string());
        closes.push(close);
    }

    close_frame(symbol, dates, closes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use polars::prelude::DataType;
    use rstest::rstest;

    #[test]
    fn test_quotes_frame_rejects_bad_timestamp() {
        let result = quotes_frame("AAPL", [(i64::MAX, 1.0)]);
        assert!(matches!(result, Err(DataError::TimeConversion(_))));
    }

    #[test]
    fn test_classify_yahoo_error() {
        assert!(classify_yahoo_error("NOPE", yahoo::YahooError::NoQuotes).is_missing_data());
        assert!(classify_yahoo_error("NOPE", yahoo::YahooError::NoResult).is_missing_data());

        let inconsistent = classify_yahoo_error("AAPL", yahoo::YahooError::DataInconsistency);
        assert!(!inconsistent.is_missing_data());
        let failed =
            classify_yahoo_error("AAPL", yahoo::YahooError::FetchFailed("502".to_string()));
        assert!(matches!(failed, DataError::YahooApi(_)));
    }

    #[test]
    fn test_classify_unknown_symbol_api_error() {
        let body = r#"{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}"#;
        let chart: yahoo::YChart = serde_json::from_str(body).unwrap();
        let err = yahoo::YahooError::ApiError(chart.error.unwrap());

        match classify_yahoo_error("NOPE", err) {
            DataError::MissingData { symbol, reason } => {
                assert_eq!(symbol, "NOPE");
                assert_eq!(reason, "No data found, symbol may be delisted");
            }
            other => panic!("expected missing data, got {other:?}"),
        }
    }

    #[rstest]
    // Friday after the close
    #[case((2024, 6, 28, 22), (2024, 6, 28))]
    // Friday mid-session
    #[case((2024, 6, 28, 15), (2024, 6, 27))]
    #[case((2024, 6, 29, 12), (2024, 6, 28))]
    #[case((2024, 6, 30, 23), (2024, 6, 28))]
    // Monday before the open
    #[case((2024, 7, 1, 9), (2024, 6, 28))]
    fn test_last_completed_session(
        #[case] now: (i32, u32, u32, u32),
        #[case] expected: (i32, u32, u32),
    ) {
        let now = Utc.with_ymd_and_hms(now.0, now.1, now.2, now.3, 0, 0).unwrap();
        let expected = NaiveDate::from_ymd_opt(expected.0, expected.1, expected.2).unwrap();
        assert_eq!(last_completed_session(now), expected);
    }

    #[rstest]
    #[case(252, 372)]
    #[case(21, 38)]
    // ceil(1825 / 252) = 8
    #[case(5, 15)]
    #[case(2520, 3657)]
    fn test_calendar_window(#[case] trading_days: usize, #[case] calendar_days: i64) {
        let end = Utc.with_ymd_and_hms(2024, 6, 28, 0, 0, 0).unwrap();

        let (start, window_end) = calendar_window(trading_days, end);
        assert_eq!(window_end, end);
        assert_eq!((end - start).num_days(), calendar_days);
    }

    #[test]
    fn test_quotes_frame_columns() {
        // 2024-01-02 and 2024-01-03, 14:30 UTC
        let df = quotes_frame("aapl", [(1_704_205_800, 185.6), (1_704_292_200, 184.2)]).unwrap();

        assert_eq!(df.get_column_names(), vec!["symbol", "date", "close"]);
        assert_eq!(df.height(), 2);

        let dates = df.column("date").unwrap().cast(&DataType::String).unwrap();
        assert_eq!(dates.str().unwrap().get(0), Some("2024-01-02"));
        assert_eq!(df.column("symbol").unwrap().str().unwrap().get(1), Some("AAPL"));

        let closes = df.column("close").unwrap().f64().unwrap();
        assert_relative_eq!(closes.get(0).unwrap(), 185.6);
        assert_relative_eq!(closes.get(1).unwrap(), 184.2);
    }

    #[tokio::test]
    async fn test_invalid_date_range() {
        let provider = YahooQuoteProvider::new().unwrap();
        let start = Utc::now();
        let end = start - ChronoDuration::days(30);

        let result = provider.fetch_quotes("AAPL", start, end).await;
        assert!(matches!(result, Err(DataError::InvalidDateRange { .. })));
    }

    #[tokio::test]
    async fn test_invalid_symbol() {
        let provider = YahooQuoteProvider::new().unwrap();
        let end = Utc::now();
        let start = end - ChronoDuration::days(30);

        let result = provider.fetch_quotes("  ", start, end).await;
        assert!(matches!(result, Err(DataError::InvalidSymbol(_))));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_fetch_quotes_live() {
        let provider = YahooQuoteProvider::new().unwrap();
        let (start, end) = calendar_window(21, Utc::now());

        let df = provider.fetch_quotes("AAPL", start, end).await.unwrap();
        assert!(df.height() > 10);
    }
}
