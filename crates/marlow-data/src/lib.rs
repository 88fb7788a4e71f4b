#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/marlow-rs/marlow/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod frame;
pub mod provider;
pub mod yahoo;

pub use error::{DataError, Result};
pub use provider::{FetchConfig, YahooMarketData};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
