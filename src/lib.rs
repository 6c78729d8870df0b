//! IOL t0/t1 tenor-spread (desarbitraje) alert bot.
//!
//! Polls the InvertirOnline quote API for a configured set of BCBA tickers,
//! compares each symbol's current-session (t0) and next-session (t1)
//! settlement prices, and raises a deduplicated Telegram alert whenever the
//! spread crosses the configured threshold with t0 priced above t1.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`auth`]: Bearer-token lifecycle with single-flight refresh
//! - [`quote`]: Per-symbol t0/t1 price retrieval
//! - [`alert`]: Spread evaluation and alert deduplication
//! - [`engine`]: The polling-and-alerting control loop
//! - [`notify`]: Telegram delivery
//! - [`shutdown`]: Graceful shutdown signal

pub mod alert;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod quote;
pub mod shutdown;

pub use config::Config;
pub use error::{BotError, Result};
