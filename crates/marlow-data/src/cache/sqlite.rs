//! SQLite caching layer for market data.

use crate::error::{DataError, Result};
use crate::frame::close_frame;
use crate::yahoo::FundamentalData;
use chrono::{NaiveDate, Utc};
use polars::prelude::*;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

/// Share of the expected trading days that must be cached for a range to count as
/// covered.
const COVERAGE: f64 = 0.9;

/// Default cache database location.
///
/// Uses platform-specific cache directories:
/// - Linux: `~/.cache/marlow/marlow.db`
/// - macOS: `~/Library/Caches/marlow/marlow.db`
/// - Windows: `%LOCALAPPDATA%\marlow\marlow.db`
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marlow")
        .join("marlow.db")
}

/// SQLite cache for daily quotes and valuation snapshots.
#[derive(Debug)]
pub struct SqliteCache {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteCache {
    /// Open (or create) a cache database.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let cache = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Open the cache at [`default_cache_path`], creating the directory if needed.
    pub fn open_default() -> Result<Self> {
        Self::new(default_cache_path())
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn, path: None };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Database file, `None` for an in-memory cache.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS quotes (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                close REAL NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (symbol, date)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_quotes_symbol_date ON quotes(symbol, date)",
            [],
        )?;

        // Last completed session each symbol was fetched through, so that sessions
        // without a bar (holidays) do not force a refetch.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS quote_coverage (
                symbol TEXT PRIMARY KEY,
                through TEXT NOT NULL
            )",
            [],
        )?;

        // One valuation snapshot per symbol per day
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS fundamentals (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                data TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (symbol, date)
            )",
            [],
        )?;

        Ok(())
    }

    /// Check if quotes for a symbol cover `start` through the completed session
    /// `through`.
    ///
    /// The symbol must have been fetched through that session, and at least 90% of
    /// the range's expected trading days must be cached.
    pub fn has_quotes(&self, symbol: &str, start: NaiveDate, through: NaiveDate) -> Result<bool> {
        if start > through {
            return Ok(false);
        }

        match self.fetched_through(symbol)? {
            Some(fetched) if fetched >= through => {}
            _ => return Ok(false),
        }

        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM quotes
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3",
            params![symbol, start.to_string(), through.to_string()],
            |row| row.get(0),
        )?;

        let calendar_days = (through - start).num_days() as f64;
        let expected = calendar_days * 252.0 / 365.0 * COVERAGE;
        Ok(count as f64 >= expected.floor())
    }

    /// Last completed session the symbol's quotes were fetched through.
    pub fn fetched_through(&self, symbol: &str) -> Result<Option<NaiveDate>> {
        let through: Option<String> = self
            .conn
            .query_row(
                "SELECT through FROM quote_coverage WHERE symbol = ?1",
                params![symbol],
                |row| row.get(0),
            )
            .optional()?;

        through
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .map_err(|e| DataError::Parse(format!("Invalid cached date {d}: {e}")))
            })
            .transpose()
    }

    /// Cached closes for a symbol and date range, as a quotes frame
    /// (`symbol`, `date`, `close`).
    pub fn get_quotes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<DataFrame> {
        let mut stmt = self.conn.prepare(
            "SELECT date, close FROM quotes
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;

        let (dates, closes): (Vec<String>, Vec<f64>) = stmt
            .query_map(params![symbol, start.to_string(), end.to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .unzip();

        if dates.is_empty() {
            return Err(DataError::MissingData {
                symbol: symbol.to_string(),
                reason: "No cached data found".to_string(),
            });
        }

        close_frame(symbol, dates, closes)
    }

    /// Store a quotes frame fetched through the completed session `through`.
    ///
    /// Existing rows for the same symbol and date are replaced. Rows with a null close
    /// or dated after `through` (an unfinished session) are skipped.
    pub fn put_quotes(&self, df: &DataFrame, through: NaiveDate) -> Result<()> {
        let cached_at = Utc::now().to_rfc3339();

        let symbols = df.column("symbol")?.str()?;
        let dates = df.column("date")?.cast(&DataType::String)?;
        let dates = dates.str()?;
        let closes = df.column("close")?.f64()?;
        let cutoff = through.to_string();

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO quotes (symbol, date, close, cached_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut cover = tx.prepare(
                "INSERT INTO quote_coverage (symbol, through) VALUES (?1, ?2)
                 ON CONFLICT(symbol) DO UPDATE SET through = MAX(through, excluded.through)",
            )?;

            for i in 0..df.height() {
                let (Some(symbol), Some(date)) = (symbols.get(i), dates.get(i)) else {
                    return Err(DataError::Parse(format!("Missing symbol or date in row {i}")));
                };
                if i == 0 || symbols.get(i - 1) != Some(symbol) {
                    cover.execute(params![symbol, cutoff])?;
                }
                let Some(close) = closes.get(i) else {
                    continue;
                };
                // ISO dates order as strings
                if date > cutoff.as_str() {
                    continue;
                }
                insert.execute(params![symbol, date, close, cached_at])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Store a valuation snapshot (as JSON) for a symbol on a date.
    pub fn put_fundamentals(&self, data: &FundamentalData, date: NaiveDate) -> Result<()> {
        let cached_at = Utc::now().to_rfc3339();
        let json = serde_json::to_string(data)?;

        self.conn.execute(
            "INSERT OR REPLACE INTO fundamentals (symbol, date, data, cached_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![data.symbol, date.to_string(), json, cached_at],
        )?;

        Ok(())
    }

    /// Get the valuation snapshot for a symbol on a date.
    pub fn get_fundamentals(&self, symbol: &str, date: NaiveDate) -> Result<Option<FundamentalData>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM fundamentals WHERE symbol = ?1 AND date = ?2",
                params![symbol, date.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(DataError::from)
    }

    /// Clear all cached data.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM quotes", [])?;
        self.conn.execute("DELETE FROM quote_coverage", [])?;
        self.conn.execute("DELETE FROM fundamentals", [])?;
        Ok(())
    }

    /// Clear cached data for a specific symbol.
    pub fn clear_symbol(&self, symbol: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM quotes WHERE symbol = ?1", params![symbol])?;
        self.conn.execute(
            "DELETE FROM quote_coverage WHERE symbol = ?1",
            params![symbol],
        )?;
        self.conn.execute(
            "DELETE FROM fundamentals WHERE symbol = ?1",
            params![symbol],
        )?;
        Ok(())
    }

    /// Get cache statistics.
    pub fn get_stats(&self) -> Result<CacheStats> {
        let (quotes_count, symbols_count, oldest, newest): (
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT symbol), MIN(date), MAX(date) FROM quotes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let fundamentals_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM fundamentals", [], |row| row.get(0))?;

        let parse = |d: Option<String>| d.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());

        Ok(CacheStats {
            total_quotes: quotes_count as usize,
            unique_symbols: symbols_count as usize,
            fundamentals: fundamentals_count as usize,
            oldest_quote: parse(oldest),
            newest_quote: parse(newest),
        })
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of quote records
    pub total_quotes: usize,
    /// Number of unique symbols
    pub unique_symbols: usize,
    /// Number of valuation snapshots
    pub fundamentals: usize,
    /// Earliest cached quote date
    pub oldest_quote: Option<NaiveDate>,
    /// Latest cached quote date
    pub newest_quote: Option<NaiveDate>,
}
