//! Valuation data from the Yahoo Finance `quoteSummary` endpoint.
//!
//! The endpoint requires a session cookie and a matching "crumb" token. Both are
//! obtained lazily on first use and reused; a 401 clears the crumb so the next request
//! fetches a fresh one.

use crate::error::{DataError, Result};
use marlow_risk::ValuationRatios;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query2.finance.yahoo.com/v1/test/getcrumb";
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SUMMARY_MODULES: &str = "summaryDetail,defaultKeyStatistics";

/// Valuation snapshot of one company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalData {
    /// Stock symbol
    pub symbol: String,
    /// Market capitalization
    pub market_cap: Option<f64>,
    /// Trailing P/E ratio
    pub trailing_pe: Option<f64>,
    /// Forward P/E ratio
    pub forward_pe: Option<f64>,
    /// Price to book ratio
    pub price_to_book: Option<f64>,
    /// Dividend yield
    pub dividend_yield: Option<f64>,
    /// Beta
    pub beta: Option<f64>,
    /// 52-week high
    pub fifty_two_week_high: Option<f64>,
    /// 52-week low
    pub fifty_two_week_low: Option<f64>,
}

impl From<&FundamentalData> for ValuationRatios {
    fn from(data: &FundamentalData) -> Self {
        Self::new(data.forward_pe, data.trailing_pe)
    }
}

/// Yahoo Finance fundamentals provider.
#[derive(Debug)]
pub struct YahooFundamentalsProvider {
    client: reqwest::Client,
    crumb: Mutex<Option<String>>,
    rate_limit_delay: Duration,
}

impl YahooFundamentalsProvider {
    /// Create a provider with a 250ms pause after each request.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_rate_limit(Duration::from_millis(250))
    }

    /// Create a provider with custom rate limiting.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn with_rate_limit(rate_limit_delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            crumb: Mutex::new(None),
            rate_limit_delay,
        })
    }

    /// Fetch valuation data for a single symbol.
    ///
    /// # Errors
    /// [`DataError::MissingData`] if Yahoo does not know the symbol; network and
    /// HTTP errors otherwise.
    pub async fn fetch_fundamentals(&self, symbol: &str) -> Result<FundamentalData> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(DataError::InvalidSymbol("Empty symbol".to_string()));
        }

        let crumb = self.crumb().await?;
        let url = format!("{SUMMARY_URL}/{symbol}");
        debug!("Requesting quoteSummary for {}", symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("modules", SUMMARY_MODULES), ("crumb", crumb.as_str())])
            .send()
            .await;
        sleep(self.rate_limit_delay).await;
        let response = response?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(DataError::MissingData {
                    symbol,
                    reason: "Quote not found".to_string(),
                });
            }
            StatusCode::UNAUTHORIZED => {
                *self.crumb.lock().await = None;
                return Err(DataError::Http(
                    "quoteSummary rejected the session crumb".to_string(),
                ));
            }
            status if !status.is_success() => {
                return Err(DataError::Http(format!("quoteSummary returned {status}")));
            }
            _ => {}
        }

        let body: Value = response.json().await?;
        parse_quote_summary(&symbol, &body)
    }

    async fn crumb(&self) -> Result<String> {
        let mut guard = self.crumb.lock().await;
        if let Some(crumb) = guard.as_ref() {
            return Ok(crumb.clone());
        }

        // Sets the session cookie; the response itself is usually an error page.
        match self.client.get(COOKIE_URL).send().await {
            Ok(response) => debug!("Cookie request returned {}", response.status()),
            Err(e) => debug!("Cookie request failed: {}", e),
        }

        let response = self.client.get(CRUMB_URL).send().await?;
        if !response.status().is_success() {
            return Err(DataError::Http(format!(
                "crumb request returned {}",
                response.status()
            )));
        }

        let crumb = response.text().await?.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(DataError::Parse("invalid crumb response".to_string()));
        }

        *guard = Some(crumb.clone());
        Ok(crumb)
    }
}

/// Parse a `quoteSummary` response body.
///
/// Numeric fields come either as `{"raw": 28.1, "fmt": "28.10"}` or as bare numbers;
/// empty objects mean the value is unknown.
pub fn parse_quote_summary(symbol: &str, body: &Value) -> Result<FundamentalData> {
    let summary = body
        .get("quoteSummary")
        .ok_or_else(|| DataError::Parse("missing quoteSummary".to_string()))?;

    if let Some(error) = summary.get("error").filter(|e| !e.is_null()) {
        let reason = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(DataError::MissingData {
            symbol: symbol.to_string(),
            reason,
        });
    }

    let result = summary
        .get("result")
        .and_then(|r| r.get(0))
        .ok_or_else(|| DataError::MissingData {
            symbol: symbol.to_string(),
            reason: "empty quoteSummary result".to_string(),
        })?;

    let detail = result.get("summaryDetail");
    let stats = result.get("defaultKeyStatistics");
    let field = |module: Option<&Value>, name: &str| module.and_then(|m| raw_number(m.get(name)?));

    Ok(FundamentalData {
        symbol: symbol.to_string(),
        market_cap: field(detail, "marketCap"),
        trailing_pe: field(detail, "trailingPE"),
        forward_pe: field(detail, "forwardPE").or_else(|| field(stats, "forwardPE")),
        price_to_book: field(stats, "priceToBook"),
        dividend_yield: field(detail, "dividendYield"),
        beta: field(detail, "beta").or_else(|| field(stats, "beta")),
        fifty_two_week_high: field(detail, "fiftyTwoWeekHigh"),
        fifty_two_week_low: field(detail, "fiftyTwoWeekLow"),
    })
}

fn raw_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map.get("raw").and_then(Value::as_f64),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}
