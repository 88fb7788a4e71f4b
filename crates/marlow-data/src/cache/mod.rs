//! Caching layer for market data.

pub mod sqlite;

pub use sqlite::{CacheStats, SqliteCache, default_cache_path};
