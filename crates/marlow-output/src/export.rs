//! CSV and JSON export of reports and period comparisons.
//!
//! CSV output is flat: one record per holding, metric or period, with the failure
//! kind in the `error` column when a value is unavailable.

use crate::report::PortfolioReport;
use marlow_risk::{MetricResult, PeriodComparison, PeriodReturns};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "pretty-json" | "pretty_json" | "prettyjson" => Ok(Self::PrettyJson),
            other => Err(ExportError::InvalidFormat(other.to_string())),
        }
    }
}

/// One flat CSV record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Record group: `holding`, `metric`, `period` or `benchmark`.
    pub section: String,

    /// Ticker, metric name or period label.
    pub name: String,

    /// Trading days for period records.
    pub days: Option<usize>,

    /// Value, if available.
    pub value: Option<f64>,

    /// Failure kind, if the value is unavailable.
    pub error: Option<String>,
}

impl MetricRecord {
    fn from_result(section: &str, name: &str, days: Option<usize>, result: &MetricResult) -> Self {
        Self {
            section: section.to_string(),
            name: name.to_string(),
            days,
            value: result.as_ref().ok().copied(),
            error: result.as_ref().err().map(|e| e.kind().to_string()),
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn write_csv<'a, I>(records: I) -> Result<String, ExportError>
where
    I: IntoIterator<Item = &'a MetricRecord>,
{
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| ExportError::InvalidFormat(e.to_string()))
}

fn period_records(returns: &PeriodReturns, section: &str) -> Vec<MetricRecord> {
    returns
        .iter()
        .map(|entry| MetricRecord::from_result(section, &entry.label, Some(entry.days), &entry.result))
        .collect()
}

fn comparison_records(comparison: &PeriodComparison) -> Vec<MetricRecord> {
    let mut records = Vec::with_capacity(comparison.rows.len() * 2);
    for row in &comparison.rows {
        records.push(MetricRecord::from_result(
            "period",
            &row.label,
            Some(row.days),
            &row.portfolio,
        ));
    }
    for row in &comparison.rows {
        records.push(MetricRecord::from_result(
            "benchmark",
            &row.label,
            Some(row.days),
            &row.benchmark,
        ));
    }
    records
}

impl PortfolioReport {
    /// Flatten the report into CSV records.
    pub fn to_records(&self) -> Vec<MetricRecord> {
        let mut records: Vec<MetricRecord> = self
            .holdings
            .iter()
            .map(|row| MetricRecord {
                section: "holding".to_string(),
                name: row.ticker.clone(),
                days: None,
                value: Some(row.weight),
                error: None,
            })
            .collect();

        if let Some(metrics) = &self.metrics {
            for (name, result) in [
                ("volatility", &metrics.volatility),
                ("pe_ratio", &metrics.pe_ratio),
                ("trailing_return", &metrics.trailing_return),
                ("sharpe_ratio", &metrics.sharpe_ratio),
            ] {
                records.push(MetricRecord::from_result("metric", name, None, result));
            }
        }

        if let Some(comparison) = &self.comparison {
            records.extend(comparison_records(comparison));
        } else if let Some(returns) = &self.period_returns {
            records.extend(period_records(returns, "period"));
        }

        records
    }
}

impl Exporter for PortfolioReport {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => write_csv(&self.to_records()),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl Exporter for PeriodReturns {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => write_csv(&period_records(self, "period")),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl Exporter for PeriodComparison {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut output = format!("# Benchmark: {}\n", self.benchmark);
                output.push_str(&write_csv(&comparison_records(self))?);
                Ok(output)
            }
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportBuilder;
    use marlow_risk::metrics::PeriodReturn;
    use marlow_risk::{Holdings, MetricError, PortfolioMetrics};
    use rstest::rstest;

    fn returns(values: &[(&str, usize, MetricResult)]) -> PeriodReturns {
        PeriodReturns {
            entries: values
                .iter()
                .map(|(label, days, result)| PeriodReturn {
                    label: (*label).to_string(),
                    days: *days,
                    result: result.clone(),
                })
                .collect(),
        }
    }

    fn report() -> PortfolioReport {
        ReportBuilder::new()
            .holdings(&Holdings::from_pairs([("AAPL", 5000.0), ("MSFT", 5000.0)]).unwrap())
            .metrics(PortfolioMetrics {
                volatility: Ok(0.25),
                pe_ratio: Err(MetricError::NoValidRatios),
                trailing_return: Ok(0.5),
                sharpe_ratio: Ok(1.96),
            })
            .period_returns(returns(&[
                ("1mo", 21, Ok(0.125)),
                ("bogus", 0, Err(MetricError::UnresolvedPeriod("bogus".to_string()))),
            ]))
            .build()
            .unwrap()
    }

    #[rstest]
    #[case("csv", ExportFormat::Csv)]
    #[case("JSON", ExportFormat::Json)]
    #[case("pretty-json", ExportFormat::PrettyJson)]
    fn test_parse_format(#[case] input: &str, #[case] expected: ExportFormat) {
        assert_eq!(input.parse::<ExportFormat>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_format() {
        assert!(matches!(
            "xlsx".parse::<ExportFormat>(),
            Err(ExportError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_export_format_extension() {
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert_eq!(ExportFormat::Json.extension(), "json");
        assert_eq!(ExportFormat::PrettyJson.extension(), "json");
        assert_eq!(
            ExportFormat::from_path(Path::new("out/report.csv")),
            Some(ExportFormat::Csv)
        );
        assert_eq!(ExportFormat::from_path(Path::new("report")), None);
    }

    #[test]
    fn test_report_csv() {
        let csv = report().export_to_string(ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "section,name,days,value,error");
        assert_eq!(lines[1], "holding,AAPL,,0.5,");
        assert!(lines.contains(&"metric,volatility,,0.25,"));
        assert!(lines.contains(&"metric,pe_ratio,,,no_valid_ratios"));
        assert!(lines.contains(&"period,1mo,21,0.125,"));
        assert!(lines.contains(&"period,bogus,0,,unresolved_period"));
        assert_eq!(lines.len(), 1 + 2 + 4 + 2);
    }

    #[test]
    fn test_report_json() {
        let json = report().export_to_string(ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["holdings"][0]["ticker"], "AAPL");
        assert_eq!(value["metrics"]["volatility"]["Ok"], 0.25);
        assert_eq!(value["metrics"]["pe_ratio"]["Err"]["kind"], "no_valid_ratios");
    }

    #[test]
    fn test_comparison_csv() {
        let portfolio = returns(&[("1y", 252, Ok(0.1)), ("1wk", 5, Ok(-0.02))]);
        let benchmark = returns(&[("1y", 252, Ok(0.08))]);
        let comparison = PeriodComparison::new("voo", &portfolio, &benchmark);

        let csv = comparison.export_to_string(ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "# Benchmark: VOO");
        assert_eq!(lines[1], "section,name,days,value,error");
        assert!(lines.contains(&"period,1wk,5,-0.02,"));
        assert!(lines.contains(&"benchmark,1y,252,0.08,"));
        assert!(lines.contains(&"benchmark,1wk,5,,data_unavailable"));
    }

    #[test]
    fn test_export_to_file() {
        let dir = std::env::temp_dir().join(format!("marlow-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("returns.json");

        let periods = returns(&[("3mo", 63, Ok(0.04))]);
        periods.export_to_file(&path, ExportFormat::PrettyJson).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"3mo\""));

        std::fs::remove_dir_all(dir).ok();
    }
}
