//! Text reports for portfolio metrics and period returns.

use chrono::{DateTime, Utc};
use marlow_risk::{
    Holdings, MetricResult, PeriodComparison, PeriodReturns, PortfolioMetrics, WeightVector,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report has no holdings.
    #[error("Report has no holdings")]
    NoHoldings,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One position of the analyzed portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRow {
    /// Ticker symbol.
    pub ticker: String,

    /// Dollar amount held.
    pub amount: f64,

    /// Share of the total.
    pub weight: f64,
}

/// Metrics, period returns and holdings of one portfolio analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    /// Report generation timestamp.
    pub timestamp: DateTime<Utc>,

    /// Positions in input order.
    pub holdings: Vec<HoldingRow>,

    /// Sum of all amounts.
    pub total_value: f64,

    /// Annual risk-free rate used for the Sharpe ratio.
    pub risk_free_rate: f64,

    /// History window of the headline metrics.
    pub history: String,

    /// Headline metrics, if computed.
    pub metrics: Option<PortfolioMetrics>,

    /// Portfolio returns per period, if computed without a benchmark.
    pub period_returns: Option<PeriodReturns>,

    /// Portfolio against benchmark per period, if computed.
    pub comparison: Option<PeriodComparison>,
}

impl PortfolioReport {
    /// Convert report to JSON string.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render as a fixed-width text table.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str(&"=".repeat(72));
        output.push('\n');
        output.push_str("Portfolio Metrics\n");
        output.push_str(&format!(
            "Generated: {}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&format!("Total Value: ${:.2}\n", self.total_value));
        output.push_str(&"=".repeat(72));
        output.push_str("\n\n");

        output.push_str(&format!("{:<12} {:>16} {:>12}\n", "Ticker", "Amount", "Weight"));
        output.push_str(&"-".repeat(42));
        output.push('\n');
        for row in &self.holdings {
            output.push_str(&format!(
                "{:<12} {:>16.2} {:>12}\n",
                row.ticker,
                row.amount,
                percent(row.weight)
            ));
        }

        if let Some(metrics) = &self.metrics {
            output.push('\n');
            output.push_str(&format!("Metrics over {}\n", self.history));
            output.push_str(&"-".repeat(42));
            output.push('\n');
            for (name, value) in metric_lines(metrics, self.risk_free_rate) {
                output.push_str(&format!("{name:<28} {value:>13}\n"));
            }
        }

        if let Some(comparison) = &self.comparison {
            output.push('\n');
            output.push_str(&format!(
                "{:<8} {:>6} {:>14} {:>14} {:>14}\n",
                "Period",
                "Days",
                "Portfolio",
                comparison.benchmark,
                "Excess"
            ));
            output.push_str(&"-".repeat(60));
            output.push('\n');
            for row in &comparison.rows {
                output.push_str(&format!(
                    "{:<8} {:>6} {:>14} {:>14} {:>14}\n",
                    row.label,
                    row.days,
                    format_percent(&row.portfolio),
                    format_percent(&row.benchmark),
                    row.excess_return().map_or_else(|| "-".to_string(), percent)
                ));
            }
        } else if let Some(returns) = &self.period_returns {
            output.push('\n');
            output.push_str(&format!("{:<8} {:>6} {:>14}\n", "Period", "Days", "Return"));
            output.push_str(&"-".repeat(30));
            output.push('\n');
            for entry in returns.iter() {
                output.push_str(&format!(
                    "{:<8} {:>6} {:>14}\n",
                    entry.label,
                    entry.days,
                    format_percent(&entry.result)
                ));
            }
        }

        output
    }

    /// Render as Markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Portfolio Metrics\n\n");
        md.push_str(&format!(
            "**Generated:** {}\n\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        md.push_str(&format!("**Total Value:** ${:.2}\n\n", self.total_value));

        md.push_str("## Holdings\n\n");
        md.push_str("| Ticker | Amount | Weight |\n");
        md.push_str("|--------|-------:|-------:|\n");
        for row in &self.holdings {
            md.push_str(&format!(
                "| {} | {:.2} | {} |\n",
                row.ticker,
                row.amount,
                percent(row.weight)
            ));
        }

        if let Some(metrics) = &self.metrics {
            md.push_str(&format!("\n## Metrics ({})\n\n", self.history));
            md.push_str("| Metric | Value |\n");
            md.push_str("|--------|------:|\n");
            for (name, value) in metric_lines(metrics, self.risk_free_rate) {
                md.push_str(&format!("| {name} | {value} |\n"));
            }
        }

        if let Some(comparison) = &self.comparison {
            md.push_str(&format!("\n## Returns vs {}\n\n", comparison.benchmark));
            md.push_str("| Period | Days | Portfolio | Benchmark | Excess |\n");
            md.push_str("|--------|-----:|----------:|----------:|-------:|\n");
            for row in &comparison.rows {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    row.label,
                    row.days,
                    format_percent(&row.portfolio),
                    format_percent(&row.benchmark),
                    row.excess_return().map_or_else(|| "-".to_string(), percent)
                ));
            }
        } else if let Some(returns) = &self.period_returns {
            md.push_str("\n## Returns\n\n");
            md.push_str("| Period | Days | Return |\n");
            md.push_str("|--------|-----:|-------:|\n");
            for entry in returns.iter() {
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    entry.label,
                    entry.days,
                    format_percent(&entry.result)
                ));
            }
        }

        md
    }
}

impl fmt::Display for PortfolioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ascii_table())
    }
}

/// Builder for [`PortfolioReport`].
#[derive(Debug, Default)]
pub struct ReportBuilder {
    holdings: Option<Holdings>,
    risk_free_rate: Option<f64>,
    history: Option<String>,
    metrics: Option<PortfolioMetrics>,
    period_returns: Option<PeriodReturns>,
    comparison: Option<PeriodComparison>,
}

impl ReportBuilder {
    /// Create a new report builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the holdings.
    pub fn holdings(mut self, holdings: &Holdings) -> Self {
        self.holdings = Some(holdings.clone());
        self
    }

    /// Set the risk-free rate shown next to the Sharpe ratio.
    pub const fn risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = Some(rate);
        self
    }

    /// Set the label of the history window.
    pub fn history(mut self, label: &str) -> Self {
        self.history = Some(label.to_string());
        self
    }

    /// Set the headline metrics.
    pub fn metrics(mut self, metrics: PortfolioMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set portfolio-only period returns.
    pub fn period_returns(mut self, returns: PeriodReturns) -> Self {
        self.period_returns = Some(returns);
        self
    }

    /// Set the benchmark comparison.
    pub fn comparison(mut self, comparison: PeriodComparison) -> Self {
        self.comparison = Some(comparison);
        self
    }

    /// Build the report.
    ///
    /// # Errors
    /// [`ReportError::NoHoldings`] if no holdings were set or they are empty.
    pub fn build(self) -> Result<PortfolioReport, ReportError> {
        let holdings = self
            .holdings
            .filter(|h| !h.is_empty())
            .ok_or(ReportError::NoHoldings)?;
        let weights = WeightVector::build(&holdings).map_err(|_| ReportError::NoHoldings)?;

        let rows = holdings
            .iter()
            .map(|(ticker, amount)| HoldingRow {
                ticker: ticker.to_string(),
                amount,
                weight: weights.weight_of(ticker).unwrap_or_default(),
            })
            .collect();

        Ok(PortfolioReport {
            timestamp: Utc::now(),
            holdings: rows,
            total_value: holdings.total_value(),
            risk_free_rate: self
                .risk_free_rate
                .unwrap_or(marlow_risk::metrics::DEFAULT_RISK_FREE_RATE),
            history: self.history.unwrap_or_else(|| "1y".to_string()),
            metrics: self.metrics,
            period_returns: self.period_returns,
            comparison: self.comparison,
        })
    }
}

/// Format a fraction as a percentage with two decimals.
pub fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Format a return or volatility as a percentage, or the failure kind.
pub fn format_percent(result: &MetricResult) -> String {
    match result {
        Ok(value) => percent(*value),
        Err(e) => format!("n/a ({})", e.kind()),
    }
}

/// Format a plain ratio with two decimals, or the failure kind.
pub fn format_ratio(result: &MetricResult) -> String {
    match result {
        Ok(value) => format!("{value:.2}"),
        Err(e) => format!("n/a ({})", e.kind()),
    }
}

fn metric_lines(metrics: &PortfolioMetrics, risk_free_rate: f64) -> [(String, String); 4] {
    [
        (
            "Volatility (annualized)".to_string(),
            format_percent(&metrics.volatility),
        ),
        ("P/E ratio".to_string(), format_ratio(&metrics.pe_ratio)),
        ("Return".to_string(), format_percent(&metrics.trailing_return)),
        (
            format!("Sharpe ratio (rf {})", percent(risk_free_rate)),
            format_ratio(&metrics.sharpe_ratio),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use marlow_risk::MetricError;
    use marlow_risk::metrics::PeriodReturn;

    fn holdings() -> Holdings {
        Holdings::from_pairs([("AAPL", 6000.0), ("MSFT", 4000.0)]).unwrap()
    }

    fn metrics() -> PortfolioMetrics {
        PortfolioMetrics {
            volatility: Ok(0.2134),
            pe_ratio: Ok(16.0),
            trailing_return: Ok(0.0825),
            sharpe_ratio: Err(MetricError::UndefinedSharpe),
        }
    }

    #[test]
    fn test_builder_computes_weights() {
        let report = ReportBuilder::new().holdings(&holdings()).build().unwrap();

        assert_eq!(report.total_value, 10000.0);
        assert_eq!(report.holdings.len(), 2);
        assert_eq!(report.holdings[0].ticker, "AAPL");
        assert!((report.holdings[0].weight - 0.6).abs() < 1e-12);
        assert_eq!(report.history, "1y");
        assert_eq!(report.risk_free_rate, 0.01);
    }

    #[test]
    fn test_builder_requires_holdings() {
        let result = ReportBuilder::new().metrics(metrics()).build();
        assert!(matches!(result, Err(ReportError::NoHoldings)));
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(percent(0.0825), "8.25%");
        assert_eq!(format_percent(&Ok(-0.1)), "-10.00%");
        assert_eq!(
            format_ratio(&Err(MetricError::NoValidRatios)),
            "n/a (no_valid_ratios)"
        );
    }

    #[test]
    fn test_ascii_table_shows_failures_by_kind() {
        let report = ReportBuilder::new()
            .holdings(&holdings())
            .metrics(metrics())
            .build()
            .unwrap();
        let ascii = report.to_ascii_table();

        assert!(ascii.contains("Portfolio Metrics"));
        assert!(ascii.contains("AAPL"));
        assert!(ascii.contains("60.00%"));
        assert!(ascii.contains("21.34%"));
        assert!(ascii.contains("16.00"));
        assert!(ascii.contains("n/a (undefined_sharpe)"));
    }

    #[test]
    fn test_markdown_period_returns() {
        let returns = PeriodReturns {
            entries: vec![
                PeriodReturn {
                    label: "1mo".to_string(),
                    days: 21,
                    result: Ok(0.031),
                },
                PeriodReturn {
                    label: "10y".to_string(),
                    days: 2520,
                    result: Err(MetricError::InsufficientData {
                        required: 2520,
                        actual: 300,
                    }),
                },
            ],
        };

        let md = ReportBuilder::new()
            .holdings(&holdings())
            .period_returns(returns)
            .build()
            .unwrap()
            .to_markdown();

        assert!(md.contains("# Portfolio Metrics"));
        assert!(md.contains("| 1mo | 21 | 3.10% |"));
        assert!(md.contains("| 10y | 2520 | n/a (insufficient_data) |"));
    }

    #[test]
    fn test_json_keeps_error_kinds() {
        let report = ReportBuilder::new()
            .holdings(&holdings())
            .metrics(metrics())
            .build()
            .unwrap();

        let json = report.to_json().unwrap();
        let back: PortfolioReport = serde_json::from_str(&json).unwrap();
        let metrics = back.metrics.unwrap();
        assert_eq!(metrics.sharpe_ratio, Err(MetricError::UndefinedSharpe));
        assert_eq!(back.holdings[1].ticker, "MSFT");
        assert!(json.contains("\"kind\": \"undefined_sharpe\""));
    }
}
