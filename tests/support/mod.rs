//! Scripted collaborators shared by the behaviour tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tickblend_core::cache::{BackendError, BackendFuture, CacheBackend, MemoryBackend};
use tickblend_core::data_source::{MarketDataSource, SourceError, SourceFuture};
use tickblend_core::{
    BalanceSheet, CashFlowStatement, CompanyProfile, FinancialStatementPeriod, HistoryRange,
    IncomeStatement, MarketIndicators, PeriodType, PricePoint, ProviderId, StockRecord, Symbol,
    SymbolMatch, TradingDate, UtcDateTime,
};

pub fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("valid symbol")
}

/// Weekdays ending today, newest first.
fn recent_weekdays(count: usize) -> Vec<TradingDate> {
    let mut dates = Vec::with_capacity(count);
    let mut day = TradingDate::today();
    while dates.len() < count {
        if !day.is_weekend() {
            dates.push(day);
        }
        day = day.minus_days(1);
    }
    dates
}

/// Fresh, fully populated record.
pub fn rich_record(symbol: &Symbol, source: ProviderId) -> StockRecord {
    let history = recent_weekdays(60)
        .into_iter()
        .enumerate()
        .map(|(offset, date)| {
            let close = 100.0 + (offset % 5) as f64 * 0.5;
            PricePoint::new(symbol.clone(), date, close)
                .with_ohlc(Some(close - 0.2), Some(close + 1.0), Some(close - 1.0))
                .with_adjusted_close(Some(close))
                .with_volume(Some(1_000_000))
        })
        .collect::<Vec<_>>();

    let this_year = TradingDate::today().into_inner().year();
    let statements = (1..=4)
        .map(|years_back| {
            let period_end = TradingDate::from_calendar(this_year - years_back, 12, 31)
                .expect("valid date");
            let mut period =
                FinancialStatementPeriod::new(symbol.clone(), period_end, PeriodType::Annual, source);
            period.income_statement = Some(IncomeStatement {
                revenue: Some(1_000.0),
                net_income: Some(150.0),
                ..IncomeStatement::default()
            });
            period.balance_sheet = Some(BalanceSheet {
                total_assets: Some(2_000.0),
                total_liabilities: Some(1_200.0),
                shareholders_equity: Some(800.0),
                ..BalanceSheet::default()
            });
            period.cash_flow = Some(
                CashFlowStatement {
                    operating_cash_flow: Some(300.0),
                    capital_expenditures: Some(-50.0),
                    investing_cash_flow: Some(-80.0),
                    financing_cash_flow: Some(-100.0),
                    ..CashFlowStatement::default()
                }
                .with_derived_totals(),
            );
            period
        })
        .collect();

    let mut record = StockRecord::new(symbol.clone()).with_source(source);
    record.profile = Some(CompanyProfile {
        name: Some(format!("{symbol} Holdings")),
        sector: Some(String::from("Technology")),
        industry: Some(String::from("Software")),
        market_cap: Some(1.0e11),
        trailing_pe: Some(25.0),
        beta: Some(1.1),
        description: Some(String::from("Makes software.")),
        ..CompanyProfile::new(symbol.clone())
    });
    record.current_price = history.first().cloned();
    record.historical_prices = history;
    record.financial_statements = statements;
    record.last_updated = UtcDateTime::now();
    record
}

/// Only a company name; scores well below every TTL band but the lowest.
pub fn thin_record(symbol: &Symbol, source: ProviderId) -> StockRecord {
    let mut record = StockRecord::new(symbol.clone()).with_source(source);
    record.profile = Some(CompanyProfile {
        name: Some(format!("{symbol} Holdings")),
        ..CompanyProfile::new(symbol.clone())
    });
    record
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Rich,
    Thin,
}

/// In-memory source with scripted answers and call accounting.
pub struct ScriptedSource {
    id: ProviderId,
    known: HashSet<String>,
    failing: HashSet<String>,
    slow: HashSet<String>,
    shape: Shape,
    delay: Duration,
    slow_delay: Duration,
    search_results: Vec<&'static str>,
    indicators: MarketIndicators,
    healthy: bool,
    pub record_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            known: HashSet::new(),
            failing: HashSet::new(),
            slow: HashSet::new(),
            shape: Shape::Rich,
            delay: Duration::ZERO,
            slow_delay: Duration::from_secs(5),
            search_results: Vec::new(),
            indicators: MarketIndicators::default(),
            healthy: true,
            record_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn knowing(mut self, symbols: &[&str]) -> Self {
        self.known.extend(symbols.iter().map(|raw| raw.to_string()));
        self
    }

    /// These symbols fail with a transport error.
    pub fn failing_on(mut self, symbols: &[&str]) -> Self {
        self.failing.extend(symbols.iter().map(|raw| raw.to_string()));
        self
    }

    /// These symbols take `slow_delay` to answer.
    pub fn slow_on(mut self, symbols: &[&str], slow_delay: Duration) -> Self {
        self.slow.extend(symbols.iter().map(|raw| raw.to_string()));
        self.slow_delay = slow_delay;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_search_results(mut self, symbols: &[&'static str]) -> Self {
        self.search_results = symbols.to_vec();
        self
    }

    pub fn with_indicators(mut self, indicators: MarketIndicators) -> Self {
        self.indicators = indicators;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }

    fn record_for(&self, symbol: &Symbol) -> StockRecord {
        match self.shape {
            Shape::Rich => rich_record(symbol, self.id),
            Shape::Thin => thin_record(symbol, self.id),
        }
    }
}

impl MarketDataSource for ScriptedSource {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn fetch_profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Option<CompanyProfile>> {
        Box::pin(async move {
            Ok(self
                .known
                .contains(symbol.as_str())
                .then(|| self.record_for(symbol).profile)
                .flatten())
        })
    }

    fn fetch_historical_prices<'a>(
        &'a self,
        symbol: &'a Symbol,
        _range: HistoryRange,
    ) -> SourceFuture<'a, Vec<PricePoint>> {
        Box::pin(async move {
            if !self.known.contains(symbol.as_str()) {
                return Ok(Vec::new());
            }
            Ok(self.record_for(symbol).historical_prices)
        })
    }

    fn fetch_current_price<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Option<PricePoint>> {
        Box::pin(async move {
            if !self.known.contains(symbol.as_str()) {
                return Ok(None);
            }
            Ok(self.record_for(symbol).current_price)
        })
    }

    fn fetch_financial_statements<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> SourceFuture<'a, Vec<FinancialStatementPeriod>> {
        Box::pin(async move {
            if !self.known.contains(symbol.as_str()) {
                return Ok(Vec::new());
            }
            Ok(self.record_for(symbol).financial_statements)
        })
    }

    fn search_symbols<'a>(&'a self, _query: &'a str) -> SourceFuture<'a, Vec<SymbolMatch>> {
        Box::pin(async move {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .search_results
                .iter()
                .map(|found| SymbolMatch {
                    symbol: found.to_string(),
                    name: Some(format!("{found} ({})", self.id)),
                    instrument_type: Some(String::from("Equity")),
                    exchange: None,
                    region: None,
                    currency: Some(String::from("USD")),
                    match_score: None,
                    source: self.id,
                })
                .collect())
        })
    }

    fn fetch_market_indicators<'a>(&'a self) -> SourceFuture<'a, MarketIndicators> {
        Box::pin(async move { Ok(self.indicators.clone()) })
    }

    fn health_check<'a>(&'a self) -> SourceFuture<'a, bool> {
        Box::pin(async move { Ok(self.healthy) })
    }

    fn fetch_record<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, StockRecord> {
        Box::pin(async move {
            self.record_calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);

            let delay = if self.slow.contains(symbol.as_str()) {
                self.slow_delay
            } else {
                self.delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(symbol.as_str()) {
                return Err(SourceError::unavailable("scripted outage"));
            }
            if !self.known.contains(symbol.as_str()) {
                return Ok(StockRecord::new(symbol.clone()));
            }
            Ok(self.record_for(symbol))
        })
    }
}

/// Backend that refuses connections while `down` is set.
#[derive(Default)]
pub struct SwitchableBackend {
    inner: MemoryBackend,
    down: AtomicBool,
    pub connects: AtomicUsize,
}

impl SwitchableBackend {
    pub fn down() -> Self {
        let backend = Self::default();
        backend.set_down(true);
        backend
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.down.load(Ordering::SeqCst) {
            Err(BackendError::connection("connection refused"))
        } else {
            Ok(())
        }
    }
}

impl CacheBackend for SwitchableBackend {
    fn connect<'a>(&'a self) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.check()
        })
    }

    fn get<'a>(&'a self, key: String) -> BackendFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            self.check()?;
            self.inner.get(key).await
        })
    }

    fn set<'a>(&'a self, key: String, value: Vec<u8>, ttl: Duration) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.inner.set(key, value, ttl).await
        })
    }

    fn delete<'a>(&'a self, key: String) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            self.check()?;
            self.inner.delete(key).await
        })
    }

    fn exists<'a>(&'a self, key: String) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            self.check()?;
            self.inner.exists(key).await
        })
    }

    fn ttl<'a>(&'a self, key: String) -> BackendFuture<'a, Option<Duration>> {
        Box::pin(async move {
            self.check()?;
            self.inner.ttl(key).await
        })
    }

    fn expire<'a>(&'a self, key: String, ttl: Duration) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            self.check()?;
            self.inner.expire(key, ttl).await
        })
    }

    fn keys<'a>(&'a self, pattern: String) -> BackendFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.check()?;
            self.inner.keys(pattern).await
        })
    }

    fn ping<'a>(&'a self) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.check() })
    }
}
