//! # Domain Models
//!
//! Entities shared by adapters, the cache, the quality assessor and the
//! orchestrator.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Normalized uppercase ticker |
//! | [`PricePoint`] | Daily OHLC observation |
//! | [`CompanyProfile`] | Descriptive and valuation data |
//! | [`FinancialStatementPeriod`] | Income, balance and cash flow for one period |
//! | [`StockRecord`] | Blended record per symbol, the cached unit |
//! | [`QualityReport`] | Scores and issues for a record |
//! | [`MarketSnapshot`] | Market-wide indicators |
//! | [`TradingDate`] / [`UtcDateTime`] | Calendar date and UTC timestamp |

mod models;
mod quality;
mod range;
mod symbol;
mod timestamp;

pub use models::{
    BalanceSheet, CashFlowStatement, CompanyProfile, FinancialStatementPeriod, IncomeStatement,
    MarketIndicators, MarketSnapshot, PeriodType, PricePoint, StockRecord, SymbolMatch,
    DEFAULT_MARKET_RISK_PREMIUM,
};
pub use quality::{DataType, QualityReport};
pub use range::HistoryRange;
pub use symbol::Symbol;
pub use timestamp::{TradingDate, UtcDateTime};
