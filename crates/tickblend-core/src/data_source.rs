//! Provider adapter contract.
//!
//! Every upstream provider is wrapped in a [`MarketDataSource`]. Adapters own
//! their protocol quirks and translate payloads into the shared domain model.
//!
//! | Method | Returns | Absence |
//! |--------|---------|---------|
//! | [`fetch_profile`](MarketDataSource::fetch_profile) | [`CompanyProfile`] | `Ok(None)` |
//! | [`fetch_historical_prices`](MarketDataSource::fetch_historical_prices) | `Vec<PricePoint>` | empty |
//! | [`fetch_current_price`](MarketDataSource::fetch_current_price) | [`PricePoint`] | `Ok(None)` |
//! | [`fetch_financial_statements`](MarketDataSource::fetch_financial_statements) | `Vec<FinancialStatementPeriod>` | empty |
//! | [`search_symbols`](MarketDataSource::search_symbols) | `Vec<SymbolMatch>` | empty |
//! | [`fetch_market_indicators`](MarketDataSource::fetch_market_indicators) | [`MarketIndicators`] | unsupported |
//! | [`health_check`](MarketDataSource::health_check) | `bool` | - |
//!
//! A symbol the provider does not know is reported as absence, never as an
//! error. `Err` is reserved for transport failures that survived the retry
//! budget, quota exhaustion and internal faults.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::retry::Retryable;
use crate::{
    CompanyProfile, FinancialStatementPeriod, HistoryRange, MarketIndicators, PricePoint,
    ProviderId, StockRecord, Symbol, SymbolMatch, UtcDateTime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unsupported,
    Unavailable,
    RateLimited,
    NotFound,
    InvalidRequest,
    Internal,
}

/// Structured adapter error used by the orchestrator's fallback loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unsupported(operation: &str) -> Self {
        Self {
            kind: SourceErrorKind::Unsupported,
            message: format!("operation '{operation}' is not supported by this source"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, SourceErrorKind::NotFound)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unsupported => "source.unsupported",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Uniform fetch interface implemented by each provider adapter.
///
/// Implementations must be `Send + Sync`; the orchestrator shares them across
/// concurrent lookups.
pub trait MarketDataSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn fetch_profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Option<CompanyProfile>>;

    /// Daily history, newest first.
    fn fetch_historical_prices<'a>(
        &'a self,
        symbol: &'a Symbol,
        range: HistoryRange,
    ) -> SourceFuture<'a, Vec<PricePoint>>;

    fn fetch_current_price<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Option<PricePoint>>;

    /// Statement periods, newest first.
    fn fetch_financial_statements<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> SourceFuture<'a, Vec<FinancialStatementPeriod>>;

    fn search_symbols<'a>(&'a self, query: &'a str) -> SourceFuture<'a, Vec<SymbolMatch>>;

    fn fetch_market_indicators<'a>(&'a self) -> SourceFuture<'a, MarketIndicators> {
        Box::pin(async { Err(SourceError::unsupported("market_indicators")) })
    }

    /// `Ok(false)` means the upstream answered but not with usable data.
    fn health_check<'a>(&'a self) -> SourceFuture<'a, bool>;

    /// Builds a full record for `symbol`.
    ///
    /// The default runs every sub-fetch concurrently. A failed section is left
    /// empty; the call only fails when every section failed.
    fn fetch_record<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, StockRecord> {
        Box::pin(assemble_record(self, symbol))
    }
}

/// Concurrent sub-fetch composition behind [`MarketDataSource::fetch_record`].
pub async fn assemble_record<S>(source: &S, symbol: &Symbol) -> Result<StockRecord, SourceError>
where
    S: MarketDataSource + ?Sized,
{
    let (profile, history, current, statements) = tokio::join!(
        source.fetch_profile(symbol),
        source.fetch_historical_prices(symbol, HistoryRange::OneYear),
        source.fetch_current_price(symbol),
        source.fetch_financial_statements(symbol),
    );

    let mut sections = SectionOutcome::new(source.id(), symbol);
    let mut record = StockRecord::new(symbol.clone()).with_source(source.id());
    record.profile = sections.take("profile", profile).flatten();
    record.historical_prices = sections.take("history", history).unwrap_or_default();
    record.current_price = sections.take("current_price", current).flatten();
    record.financial_statements = sections.take("statements", statements).unwrap_or_default();
    sections.finish()?;

    record.last_updated = UtcDateTime::now();
    Ok(record.normalize_order())
}

/// Tracks per-section failures while a record is being assembled.
pub(crate) struct SectionOutcome<'s> {
    source: ProviderId,
    symbol: &'s Symbol,
    attempted: usize,
    last_failure: Option<SourceError>,
    failures: usize,
}

impl<'s> SectionOutcome<'s> {
    pub(crate) fn new(source: ProviderId, symbol: &'s Symbol) -> Self {
        Self {
            source,
            symbol,
            attempted: 0,
            last_failure: None,
            failures: 0,
        }
    }

    /// Unwraps a section result, logging and counting failures.
    pub(crate) fn take<T>(&mut self, section: &str, result: Result<T, SourceError>) -> Option<T> {
        self.attempted += 1;
        match result {
            Ok(value) => Some(value),
            Err(error) if error.is_not_found() => {
                debug!(source = %self.source, symbol = %self.symbol, section, "section not found upstream");
                None
            }
            Err(error) => {
                warn!(source = %self.source, symbol = %self.symbol, section, %error, "section fetch failed");
                self.failures += 1;
                self.last_failure = Some(error);
                None
            }
        }
    }

    /// Fails only when every attempted section failed.
    pub(crate) fn finish(self) -> Result<(), SourceError> {
        match self.last_failure {
            Some(error) if self.failures == self.attempted => Err(error),
            _ => Ok(()),
        }
    }
}
