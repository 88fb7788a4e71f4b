//! Conversion of quote frames into price series.

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use marlow_risk::{PriceSeries, PriceTable};
use polars::prelude::*;

/// Build a quotes frame with columns `symbol`, `date` (Date) and `close` from
/// ISO dates and closes.
pub fn close_frame(symbol: &str, dates: Vec<String>, closes: Vec<f64>) -> Result<DataFrame> {
    let symbols = vec![symbol.trim().to_uppercase(); dates.len()];
    let df = DataFrame::new(vec![
        Series::new("symbol".into(), symbols).into(),
        Series::new("date".into(), dates).into(),
        Series::new("close".into(), closes).into(),
    ])?;

    Ok(df
        .lazy()
        .with_column(col("date").cast(DataType::Date))
        .collect()?)
}

/// Rows of a quotes frame dated on or before `last`.
pub fn through_date(df: &DataFrame, last: NaiveDate) -> Result<DataFrame> {
    Ok(df
        .clone()
        .lazy()
        .filter(col("date").lt_eq(lit(last)))
        .collect()?)
}

/// Split a quotes frame (`symbol`, `date`, `close`) into one close series per symbol,
/// in order of first appearance. Rows with a null close are skipped.
pub fn frame_to_series(df: &DataFrame) -> Result<Vec<PriceSeries>> {
    let symbols = df.column("symbol")?.str()?;
    let dates = df.column("date")?.cast(&DataType::String)?;
    let dates = dates.str()?;
    let closes = df.column("close")?.f64()?;

    let mut grouped: Vec<(String, Vec<(NaiveDate, f64)>)> = Vec::new();

    for i in 0..df.height() {
        let (Some(symbol), Some(date)) = (symbols.get(i), dates.get(i)) else {
            return Err(DataError::Parse(format!("Missing symbol or date in row {i}")));
        };
        let Some(close) = closes.get(i) else {
            continue;
        };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| DataError::Parse(format!("Invalid date {date}: {e}")))?;

        match grouped.iter_mut().find(|(s, _)| s.as_str() == symbol) {
            Some((_, points)) => points.push((date, close)),
            None => grouped.push((symbol.to_string(), vec![(date, close)])),
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(symbol, points)| PriceSeries::new(&symbol, points))
        .collect())
}

/// Align several quote frames into a price table with columns in `tickers` order.
///
/// Tickers without any quotes are left out; the table keeps at most the last `days`
/// rows.
pub fn frames_to_table(frames: &[DataFrame], tickers: &[String], days: usize) -> Result<PriceTable> {
    let mut series = Vec::new();
    for df in frames {
        series.extend(frame_to_series(df)?);
    }

    let table = PriceTable::from_series(&series);
    let present: Vec<String> = tickers
        .iter()
        .map(|t| t.to_uppercase())
        .filter(|t| table.has_data(t))
        .collect();

    Ok(table.select(&present).drop_empty_rows().tail(days))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(symbol: &str, rows: &[(&str, Option<f64>)]) -> DataFrame {
        let df = DataFrame::new(vec![
            Series::new("symbol".into(), vec![symbol; rows.len()]).into(),
            Series::new(
                "date".into(),
                rows.iter().map(|(d, _)| *d).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "close".into(),
                rows.iter().map(|(_, c)| *c).collect::<Vec<_>>(),
            )
            .into(),
        ])
        .unwrap();

        df.lazy()
            .with_column(col("date").cast(DataType::Date))
            .collect()
            .unwrap()
    }

    #[test]
    fn test_frame_to_series_skips_null_closes() {
        let df = frame(
            "AAPL",
            &[
                ("2024-01-02", Some(185.6)),
                ("2024-01-03", None),
                ("2024-01-04", Some(181.9)),
            ],
        );
        let series = frame_to_series(&df).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].ticker(), "AAPL");
        assert_eq!(series[0].len(), 2);
        assert_eq!(
            series[0].points()[1].0,
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
        );
    }

    #[test]
    fn test_through_date_drops_unfinished_session() {
        let df = frame(
            "AAPL",
            &[
                ("2024-06-27", Some(214.1)),
                ("2024-06-28", Some(210.6)),
                ("2024-07-01", Some(216.8)),
            ],
        );
        let trimmed = through_date(&df, NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()).unwrap();

        assert_eq!(trimmed.height(), 2);
        assert_eq!(trimmed.column("close").unwrap().f64().unwrap().get(1), Some(210.6));
    }

    #[test]
    fn test_frames_to_table_orders_and_trims() {
        let msft = frame(
            "MSFT",
            &[
                ("2024-01-02", Some(370.9)),
                ("2024-01-03", Some(370.6)),
                ("2024-01-04", Some(367.9)),
            ],
        );
        let aapl = frame(
            "AAPL",
            &[("2024-01-03", Some(184.3)), ("2024-01-04", Some(181.9))],
        );

        let tickers = vec!["aapl".to_string(), "NOPE".to_string(), "MSFT".to_string()];
        let table = frames_to_table(&[msft, aapl], &tickers, 2).unwrap();

        assert_eq!(table.tickers(), ["AAPL", "MSFT"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.closes()[[0, 0]], 184.3);
        assert_eq!(table.closes()[[1, 1]], 367.9);
    }
}
