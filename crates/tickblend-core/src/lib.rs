//! # Tickblend Core
//!
//! Multi-source market data orchestration.
//!
//! ## Overview
//!
//! - **Provider adapters** behind one fetch contract, with offline fixtures
//! - **Rate budgets** per source, checked before every upstream call
//! - **Cache-aside storage** with namespaced keys, compression and statistics
//! - **Quality scoring** over completeness, freshness, accuracy and consistency
//! - **Orchestrator** that falls back across sources and sizes cache lifetimes
//!   by quality
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo-style and Alpha-Vantage-style providers |
//! | [`cache`] | Cache store, backends and payload codec |
//! | [`circuit_breaker`] | Consecutive-failure breaker for upstream calls |
//! | [`config`] | Orchestrator settings and quality-adjusted TTLs |
//! | [`data_source`] | Adapter trait and structured adapter errors |
//! | [`domain`] | Records, prices, statements, quality reports |
//! | [`error`] | Validation, cache and quality errors |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`metrics`] | Orchestrator counters |
//! | [`orchestrator`] | [`MarketDataService`] and its builder |
//! | [`provider_policy`] | Hard quotas and retry policy per provider |
//! | [`quality`] | Quality assessor and grading |
//! | [`rate_limit`] | Per-source request budgets |
//! | [`retry`] | Bounded exponential backoff |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Provider-side quota gate |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickblend_core::{MarketDataServiceBuilder, RecordOptions, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = MarketDataServiceBuilder::new().with_mock_mode().build();
//!     let symbol = Symbol::parse("AAPL")?;
//!
//!     if let Some(record) = service.get_record(&symbol, RecordOptions::default()).await {
//!         let score = record.quality.map(|report| report.quality_score);
//!         println!("{symbol}: quality {score:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Absence is not an error: an unknown symbol, an exhausted rate budget and a
//! failing source all end in `None`. [`MarketDataService::lookup`] reports
//! which of those happened per source:
//!
//! ```rust,ignore
//! use tickblend_core::SkipReason;
//!
//! let outcome = service.lookup(&symbol, RecordOptions::default()).await;
//! for skip in &outcome.skipped {
//!     match &skip.reason {
//!         SkipReason::RateLimited => { /* try later */ }
//!         SkipReason::Failed(message) => eprintln!("{}: {message}", skip.source),
//!         SkipReason::NoData | SkipReason::NotRegistered => {}
//!     }
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod metrics;
pub mod orchestrator;
pub mod provider_policy;
pub mod quality;
pub mod rate_limit;
pub mod retry;
pub mod source;
pub mod throttling;

// Adapter implementations
pub use adapters::{AlphaVantageAdapter, YahooAdapter, YahooAuthManager};

// Caching
pub use cache::{
    CacheBackend, CacheConfig, CacheNamespace, CacheStats, CacheStore, MemoryBackend,
};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Configuration
pub use config::{cache_ttl_for_score, ServiceConfig};

// Data source trait and errors
pub use data_source::{MarketDataSource, SourceError, SourceErrorKind, SourceFuture};

// Domain models
pub use domain::{
    BalanceSheet, CashFlowStatement, CompanyProfile, DataType, FinancialStatementPeriod,
    HistoryRange, IncomeStatement, MarketIndicators, MarketSnapshot, PeriodType, PricePoint,
    QualityReport, StockRecord, Symbol, SymbolMatch, TradingDate, UtcDateTime,
    DEFAULT_MARKET_RISK_PREMIUM,
};

// Error types
pub use error::{CacheError, CoreError, QualityError, ValidationError};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};

// Metrics
pub use metrics::MetricsSnapshot;

// Orchestrator
pub use orchestrator::{
    HealthReport, LookupOutcome, MarketDataService, MarketDataServiceBuilder, OverallStatus,
    RecordOptions, ServiceHealth, ServiceStatus, SkipReason, SourceSkip,
};

// Provider policies
pub use provider_policy::ProviderPolicy;

// Quality
pub use quality::{QualityAssessor, QualityGrade, QualitySummary, QualityWeights};

// Rate budgets
pub use rate_limit::{RateBudgetConfig, RateBudgetSnapshot, RateLimiter};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Source identifiers
pub use source::ProviderId;

// Throttling
pub use throttling::RequestQuota;
