//! Closing price series and date-aligned price tables.

use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1, Axis, s};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised when constructing a price table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceTableError {
    /// The closes matrix does not match the date and ticker counts.
    #[error("Shape mismatch: expected {rows}x{cols} closes, got {actual_rows}x{actual_cols}")]
    ShapeMismatch {
        /// Number of dates
        rows: usize,
        /// Number of tickers
        cols: usize,
        /// Rows in the closes matrix
        actual_rows: usize,
        /// Columns in the closes matrix
        actual_cols: usize,
    },

    /// Dates are not strictly ascending.
    #[error("Dates must be strictly ascending (violation at {0})")]
    UnsortedDates(NaiveDate),

    /// A ticker appears twice.
    #[error("Duplicate ticker: {0}")]
    DuplicateTicker(String),
}

/// Closing prices of one instrument, ascending by date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    ticker: String,
    points: Vec<(NaiveDate, f64)>,
}

impl PriceSeries {
    /// Create a series. Points are sorted by date; non-finite closes are dropped and
    /// a later duplicate date replaces an earlier one.
    pub fn new(ticker: &str, mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.retain(|(_, close)| close.is_finite());
        points.sort_by_key(|(date, _)| *date);
        points.reverse();
        points.dedup_by_key(|(date, _)| *date);
        points.reverse();

        Self {
            ticker: ticker.to_uppercase(),
            points,
        }
    }

    /// Ticker symbol.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// `(date, close)` points, ascending.
    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no observations.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Series restricted to its last `n` observations.
    pub fn tail(&self, n: usize) -> Self {
        let start = self.points.len().saturating_sub(n);
        Self {
            ticker: self.ticker.clone(),
            points: self.points[start..].to_vec(),
        }
    }

    /// Fractional change between the first and last close.
    ///
    /// `None` if the series is empty or the first close is not positive.
    pub fn simple_return(&self) -> Option<f64> {
        let (_, first) = self.points.first()?;
        let (_, last) = self.points.last()?;
        simple_return(*first, *last)
    }
}

/// `(last - first) / first`, `None` when `first` is not a positive finite number.
pub(crate) fn simple_return(first: f64, last: f64) -> Option<f64> {
    if !first.is_finite() || !last.is_finite() || first <= 0.0 {
        return None;
    }
    Some((last - first) / first)
}

/// Date-aligned closes: rows are ascending dates, columns are tickers.
///
/// Missing observations are stored as NaN. A ticker with no column, or a column that is
/// entirely NaN, has no data.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    closes: Array2<f64>,
}

impl PriceTable {
    /// Create a table from its parts.
    ///
    /// # Errors
    /// Fails on a shape mismatch, unsorted dates or duplicate tickers.
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        closes: Array2<f64>,
    ) -> Result<Self, PriceTableError> {
        let (actual_rows, actual_cols) = closes.dim();
        if actual_rows != dates.len() || actual_cols != tickers.len() {
            return Err(PriceTableError::ShapeMismatch {
                rows: dates.len(),
                cols: tickers.len(),
                actual_rows,
                actual_cols,
            });
        }

        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PriceTableError::UnsortedDates(w[1]));
        }

        let tickers: Vec<String> = tickers.iter().map(|t| t.to_uppercase()).collect();
        let mut seen = BTreeSet::new();
        if let Some(dup) = tickers.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(PriceTableError::DuplicateTicker(dup.clone()));
        }

        Ok(Self {
            dates,
            tickers,
            closes,
        })
    }

    /// Table with the given tickers and no rows.
    pub fn empty(tickers: &[String]) -> Self {
        Self {
            dates: Vec::new(),
            tickers: tickers.iter().map(|t| t.to_uppercase()).collect(),
            closes: Array2::zeros((0, tickers.len())),
        }
    }

    /// Outer-join several series on date. Rows are the union of all dates; a later
    /// series with an already seen ticker is ignored.
    pub fn from_series(series: &[PriceSeries]) -> Self {
        let mut unique: Vec<&PriceSeries> = Vec::with_capacity(series.len());
        for s in series {
            if !unique.iter().any(|u| u.ticker == s.ticker) {
                unique.push(s);
            }
        }

        let dates: Vec<NaiveDate> = unique
            .iter()
            .flat_map(|s| s.points.iter().map(|(d, _)| *d))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut closes = Array2::from_elem((dates.len(), unique.len()), f64::NAN);
        for (col, s) in unique.iter().enumerate() {
            for (date, close) in &s.points {
                if let Ok(row) = dates.binary_search(date) {
                    closes[[row, col]] = *close;
                }
            }
        }

        Self {
            dates,
            tickers: unique.iter().map(|s| s.ticker.clone()).collect(),
            closes,
        }
    }

    /// Row dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Column tickers.
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Closes matrix (rows x tickers).
    pub const fn closes(&self) -> &Array2<f64> {
        &self.closes
    }

    /// Number of rows (dates).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Closes of one ticker, NaN where missing.
    pub fn column(&self, ticker: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.column_index(ticker)?;
        Some(self.closes.column(idx))
    }

    /// Present closes of one ticker as a series. Empty if the ticker is absent.
    pub fn series(&self, ticker: &str) -> PriceSeries {
        let points = self
            .column(ticker)
            .map(|col| {
                self.dates
                    .iter()
                    .zip(col.iter())
                    .filter(|(_, close)| close.is_finite())
                    .map(|(date, close)| (*date, *close))
                    .collect()
            })
            .unwrap_or_default();

        PriceSeries {
            ticker: ticker.to_uppercase(),
            points,
        }
    }

    /// Table restricted to its last `rows` rows (all rows if shorter).
    pub fn tail(&self, rows: usize) -> Self {
        let start = self.len().saturating_sub(rows);
        Self {
            dates: self.dates[start..].to_vec(),
            tickers: self.tickers.clone(),
            closes: self.closes.slice(s![start.., ..]).to_owned(),
        }
    }

    /// Table with exactly the given columns, in the given order. Tickers not in this
    /// table become all-NaN columns.
    pub fn select(&self, tickers: &[String]) -> Self {
        let mut closes = Array2::from_elem((self.len(), tickers.len()), f64::NAN);
        for (col, ticker) in tickers.iter().enumerate() {
            if let Some(src) = self.column(ticker) {
                closes.column_mut(col).assign(&src);
            }
        }

        Self {
            dates: self.dates.clone(),
            tickers: tickers.iter().map(|t| t.to_uppercase()).collect(),
            closes,
        }
    }

    /// Drop rows where every close is missing.
    pub fn drop_empty_rows(&self) -> Self {
        let keep: Vec<usize> = self
            .closes
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().any(|c| c.is_finite()))
            .map(|(idx, _)| idx)
            .collect();

        Self {
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            tickers: self.tickers.clone(),
            closes: self.closes.select(Axis(0), &keep),
        }
    }

    /// Daily fractional returns, `(len - 1) x tickers`. A return is NaN unless both
    /// consecutive closes are present.
    pub fn daily_returns(&self) -> Array2<f64> {
        let rows = self.len().saturating_sub(1);
        let mut returns = Array2::from_elem((rows, self.tickers.len()), f64::NAN);

        for t in 0..rows {
            for j in 0..self.tickers.len() {
                let prev = self.closes[[t, j]];
                let cur = self.closes[[t + 1, j]];
                if prev.is_finite() && cur.is_finite() && prev != 0.0 {
                    returns[[t, j]] = cur / prev - 1.0;
                }
            }
        }

        returns
    }

    /// Whether a ticker has at least one present close.
    pub fn has_data(&self, ticker: &str) -> bool {
        self.column(ticker)
            .is_some_and(|col| col.iter().any(|c| c.is_finite()))
    }

    fn column_index(&self, ticker: &str) -> Option<usize> {
        self.tickers
            .iter()
            .position(|t| t.eq_ignore_ascii_case(ticker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_series_sorts_and_dedups() {
        let series = PriceSeries::new(
            "aapl",
            vec![(day(3), 12.0), (day(1), 10.0), (day(2), f64::NAN), (day(3), 13.0)],
        );
        assert_eq!(series.ticker(), "AAPL");
        assert_eq!(series.points(), &[(day(1), 10.0), (day(3), 13.0)]);
        assert_abs_diff_eq!(series.simple_return().unwrap(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_series_return_requires_positive_first_close() {
        let series = PriceSeries::new("X", vec![(day(1), 0.0), (day(2), 5.0)]);
        assert!(series.simple_return().is_none());
        assert!(PriceSeries::new("X", vec![]).simple_return().is_none());
    }

    #[test]
    fn test_new_validates_shape_and_order() {
        let result = PriceTable::new(vec![day(1)], vec!["A".into()], Array2::zeros((2, 1)));
        assert!(matches!(result, Err(PriceTableError::ShapeMismatch { .. })));

        let result = PriceTable::new(
            vec![day(2), day(1)],
            vec!["A".into()],
            Array2::zeros((2, 1)),
        );
        assert_eq!(result, Err(PriceTableError::UnsortedDates(day(1))));

        let result = PriceTable::new(
            vec![day(1)],
            vec!["A".into(), "a".into()],
            Array2::zeros((1, 2)),
        );
        assert!(matches!(result, Err(PriceTableError::DuplicateTicker(_))));
    }

    #[test]
    fn test_from_series_outer_joins() {
        let a = PriceSeries::new("A", vec![(day(1), 1.0), (day(2), 2.0)]);
        let b = PriceSeries::new("B", vec![(day(2), 20.0), (day(3), 30.0)]);
        let table = PriceTable::from_series(&[a, b]);

        assert_eq!(table.dates(), &[day(1), day(2), day(3)]);
        assert_eq!(table.tickers(), ["A", "B"]);
        assert!(table.closes()[[0, 1]].is_nan());
        assert!(table.closes()[[2, 0]].is_nan());
        assert_eq!(table.closes()[[1, 1]], 20.0);
    }

    #[test]
    fn test_select_aligns_and_fills_missing() {
        let table = PriceTable::new(
            vec![day(1), day(2)],
            vec!["A".into(), "B".into()],
            array![[1.0, 10.0], [2.0, 20.0]],
        )
        .unwrap();

        let selected = table.select(&["B".to_string(), "Z".to_string(), "A".to_string()]);
        assert_eq!(selected.tickers(), ["B", "Z", "A"]);
        assert_eq!(selected.closes()[[1, 0]], 20.0);
        assert!(selected.closes()[[0, 1]].is_nan());
        assert_eq!(selected.closes()[[1, 2]], 2.0);
        assert!(!selected.has_data("Z"));
    }

    #[test]
    fn test_tail_and_daily_returns() {
        let table = PriceTable::new(
            vec![day(1), day(2), day(3), day(4)],
            vec!["A".into(), "B".into()],
            array![
                [100.0, 50.0],
                [110.0, f64::NAN],
                [99.0, 55.0],
                [99.0, 60.5]
            ],
        )
        .unwrap();

        let returns = table.daily_returns();
        assert_eq!(returns.dim(), (3, 2));
        assert_abs_diff_eq!(returns[[0, 0]], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(returns[[1, 0]], -0.1, epsilon = 1e-12);
        assert!(returns[[0, 1]].is_nan());
        assert!(returns[[1, 1]].is_nan());
        assert_abs_diff_eq!(returns[[2, 1]], 0.1, epsilon = 1e-12);

        let tail = table.tail(2);
        assert_eq!(tail.dates(), &[day(3), day(4)]);
        assert_eq!(table.tail(10).len(), 4);
        assert_eq!(table.tail(0).len(), 0);
    }

    #[test]
    fn test_series_from_table_skips_missing() {
        let table = PriceTable::new(
            vec![day(1), day(2), day(3)],
            vec!["A".into()],
            array![[f64::NAN], [5.0], [6.0]],
        )
        .unwrap();

        let series = table.series("a");
        assert_eq!(series.points(), &[(day(2), 5.0), (day(3), 6.0)]);
        assert!(table.series("missing").is_empty());
    }

    #[test]
    fn test_drop_empty_rows() {
        let table = PriceTable::new(
            vec![day(1), day(2)],
            vec!["A".into(), "B".into()],
            array![[f64::NAN, f64::NAN], [1.0, f64::NAN]],
        )
        .unwrap();

        let trimmed = table.drop_empty_rows();
        assert_eq!(trimmed.dates(), &[day(2)]);
        assert_eq!(trimmed.closes().dim(), (1, 2));
    }
}
