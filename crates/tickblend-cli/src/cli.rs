//! CLI argument definitions for tickblend.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `record` | Blended record for one symbol, with source fallback |
//! | `batch` | Records for several symbols concurrently |
//! | `search` | Symbol search across every source |
//! | `market` | Market-wide snapshot |
//! | `health` | Source, cache and rate budget health |
//! | `quality` | Quality summary for one symbol |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--offline` | `false` | Serve deterministic offline data |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--no-cache` | `false` | Disable the record cache |
//!
//! # Examples
//!
//! ```bash
//! tickblend record AAPL --pretty
//! tickblend batch AAPL MSFT NVDA --concurrency 2
//! tickblend --offline quality MSFT
//! ```

use std::num::NonZeroUsize;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tickblend_core::ProviderId;

/// Multi-source market data with fallback, caching and quality scores.
#[derive(Debug, Parser)]
#[command(name = "tickblend", author, version, about)]
pub struct Cli {
    /// Use offline adapters with deterministic data instead of the network.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Skip the record cache entirely.
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceSelector {
    Yahoo,
    Alphavantage,
}

impl From<SourceSelector> for ProviderId {
    fn from(value: SourceSelector) -> Self {
        match value {
            SourceSelector::Yahoo => Self::Yahoo,
            SourceSelector::Alphavantage => Self::Alphavantage,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the blended record for a symbol.
    ///
    ///   tickblend record AAPL
    ///   tickblend record MSFT --source alphavantage --refresh
    Record(RecordArgs),

    /// Fetch records for several symbols concurrently.
    ///
    ///   tickblend batch AAPL MSFT NVDA --concurrency 2
    Batch(BatchArgs),

    /// Search symbols by ticker or company name.
    Search(SearchArgs),

    /// Market-wide indicators (risk-free rate, S&P 500 move, VIX).
    Market,

    /// Health of every source and the cache, with rate budgets and counters.
    Health,

    /// Quality grade, level and recommendations for a symbol.
    Quality(QualityArgs),
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    pub symbol: String,

    /// Ignore the cached record.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Only query this source.
    #[arg(long, value_enum)]
    pub source: Option<SourceSelector>,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    #[arg(required = true)]
    pub symbols: Vec<String>,

    /// Maximum lookups in flight.
    #[arg(long)]
    pub concurrency: Option<NonZeroUsize>,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    pub query: String,
}

#[derive(Debug, Args)]
pub struct QualityArgs {
    pub symbol: String,

    /// Ignore the cached record.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,
}
