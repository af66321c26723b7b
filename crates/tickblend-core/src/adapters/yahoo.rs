use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::convert::{self, FieldTable, Payload, StatementBook};
use super::{absent_on_not_found, fixtures, transport_error};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::data_source::{MarketDataSource, SectionOutcome, SourceError, SourceFuture};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, NoopHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::retry::retry_with_backoff;
use crate::{
    BalanceSheet, CashFlowStatement, CompanyProfile, FinancialStatementPeriod, HistoryRange,
    IncomeStatement, MarketIndicators, PeriodType, PricePoint, ProviderId, StockRecord, Symbol,
    SymbolMatch, TradingDate, UtcDateTime,
};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_ENDPOINTS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const REFERER: &str = "https://finance.yahoo.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SUMMARY_MODULES: &str = "assetProfile,price,summaryDetail,defaultKeyStatistics,\
incomeStatementHistory,balanceSheetHistory,cashflowStatementHistory";
const SEARCH_LIMIT: &str = "10";
const HEALTH_SYMBOL: &str = "AAPL";

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone)]
struct CachedCrumb {
    value: String,
    fetched_at: Instant,
}

/// Cookie and crumb session for Yahoo's unofficial endpoints.
///
/// Yahoo wants a session cookie from `fc.yahoo.com`, which the transport's
/// cookie jar keeps, plus a crumb token passed as a query parameter. The crumb
/// is cached for an hour and dropped whenever upstream rejects it. Only one
/// task refreshes at a time; the others wait and reuse its result.
#[derive(Debug)]
pub struct YahooAuthManager {
    crumb: Mutex<Option<CachedCrumb>>,
    refresh: tokio::sync::Mutex<()>,
    ttl: Duration,
    cookie_override: Option<String>,
}

impl Default for YahooAuthManager {
    fn default() -> Self {
        Self {
            crumb: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
            ttl: Duration::from_secs(60 * 60),
            cookie_override: std::env::var("TICKBLEND_YAHOO_COOKIE")
                .ok()
                .filter(|cookie| !cookie.trim().is_empty()),
        }
    }
}

impl YahooAuthManager {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    /// Sends a fixed cookie with every call instead of relying on the jar.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie_override = Some(cookie.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, Option<CachedCrumb>> {
        self.crumb
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached(&self) -> Option<String> {
        self.lock()
            .as_ref()
            .filter(|crumb| crumb.fetched_at.elapsed() < self.ttl)
            .map(|crumb| crumb.value.clone())
    }

    pub fn auth(&self) -> HttpAuth {
        self.cookie_override
            .clone()
            .map_or(HttpAuth::None, HttpAuth::Cookie)
    }

    /// Returns the cached crumb, fetching a new one when absent or expired.
    pub async fn crumb(&self, http_client: &dyn HttpClient) -> Result<String, SourceError> {
        if let Some(crumb) = self.cached() {
            return Ok(crumb);
        }

        let _refresh = self.refresh.lock().await;
        if let Some(crumb) = self.cached() {
            return Ok(crumb);
        }

        let value = self.fetch_crumb(http_client).await?;
        debug!("refreshed yahoo crumb");
        *self.lock() = Some(CachedCrumb {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    async fn fetch_crumb(&self, http_client: &dyn HttpClient) -> Result<String, SourceError> {
        let auth = self.auth();
        let cookie_request = HttpRequest::get(COOKIE_URL)
            .with_header("referer", REFERER)
            .with_auth(&auth)
            .with_timeout(REQUEST_TIMEOUT);
        http_client
            .execute(cookie_request)
            .await
            .map_err(|error| transport_error("yahoo session", &error))?;

        for endpoint in CRUMB_ENDPOINTS {
            let request = HttpRequest::get(endpoint)
                .with_header("referer", REFERER)
                .with_auth(&auth)
                .with_timeout(REQUEST_TIMEOUT);
            let Ok(response) = http_client.execute(request).await else {
                continue;
            };
            if response.status == 429 {
                return Err(SourceError::rate_limited(
                    "yahoo rate limited while fetching crumb",
                ));
            }
            let body = response.body.trim();
            if !response.is_success() || body.is_empty() || body.contains('<') {
                continue;
            }
            if body.to_ascii_lowercase().contains("too many requests") {
                return Err(SourceError::rate_limited(
                    "yahoo rate limited while fetching crumb",
                ));
            }
            if body.len() < 100 && !body.contains(char::is_whitespace) {
                return Ok(body.to_owned());
            }
        }

        Err(SourceError::unavailable(
            "failed to fetch yahoo crumb from all endpoints",
        ))
    }

    /// Drops the cached crumb; the next call refreshes it.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Yahoo Finance adapter: chart history, quote summary modules and search.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    policy: ProviderPolicy,
    circuit_breaker: Arc<CircuitBreaker>,
    auth_manager: Arc<YahooAuthManager>,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::new(Arc::new(NoopHttpClient))
    }
}

impl YahooAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            policy: ProviderPolicy::yahoo_default(),
            circuit_breaker: Arc::new(CircuitBreaker::new(
                ProviderId::Yahoo,
                CircuitBreakerConfig::default(),
            )),
            auth_manager: Arc::new(YahooAuthManager::default()),
        }
    }

    /// Serves deterministic fixtures without touching the network.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_auth_manager(mut self, auth_manager: Arc<YahooAuthManager>) -> Self {
        self.auth_manager = auth_manager;
        self
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    fn is_offline(&self) -> bool {
        self.http_client.is_mock()
    }

    /// Issues `request` under the retry policy and the circuit breaker.
    async fn get_json<T: DeserializeOwned>(
        &self,
        label: &'static str,
        request: HttpRequest,
    ) -> Result<T, SourceError> {
        self.circuit_breaker.guard()?;

        let result =
            retry_with_backoff(&self.policy.retry, label, |_| self.send_once(request.clone())).await;
        self.circuit_breaker.observe(&result);

        let body = result?;
        serde_json::from_str(&body).map_err(|error| {
            SourceError::internal(format!("failed to parse yahoo {label} response: {error}"))
        })
    }

    async fn send_once(&self, request: HttpRequest) -> Result<String, SourceError> {
        let crumb = self.auth_manager.crumb(self.http_client.as_ref()).await?;
        let request = request
            .with_query("crumb", &crumb)
            .with_header("referer", REFERER)
            .with_auth(&self.auth_manager.auth())
            .with_timeout(REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| transport_error("yahoo", &error))?;

        match response.status {
            _ if response.is_success() => Ok(response.body),
            401 | 403 => {
                self.auth_manager.invalidate();
                Err(SourceError::unavailable(format!(
                    "yahoo rejected session (status {})",
                    response.status
                )))
            }
            404 => Err(SourceError::not_found("yahoo returned status 404")),
            429 => Err(SourceError::rate_limited("yahoo returned status 429")),
            status if self.policy.retry.should_retry_status(status) => Err(
                SourceError::unavailable(format!("yahoo returned status {status}")),
            ),
            status => Err(SourceError::internal(format!(
                "yahoo returned status {status}"
            ))),
        }
    }

    async fn fetch_chart(&self, symbol: &Symbol, range: &str) -> Result<Vec<PricePoint>, SourceError> {
        let request = HttpRequest::get(format!(
            "{CHART_URL}/{}",
            urlencoding::encode(symbol.as_str())
        ))
        .with_query("range", range)
        .with_query("interval", "1d");
        let envelope: ChartEnvelope = self.get_json("chart", request).await?;
        chart_points(symbol, envelope)
    }

    async fn fetch_summary(&self, symbol: &Symbol) -> Result<Option<Payload>, SourceError> {
        let request = HttpRequest::get(format!(
            "{SUMMARY_URL}/{}",
            urlencoding::encode(symbol.as_str())
        ))
        .with_query("modules", SUMMARY_MODULES);
        let envelope: SummaryEnvelope = self.get_json("quote summary", request).await?;
        if let Some(error) = envelope.quote_summary.error {
            return Err(error.into_source_error(symbol));
        }
        Ok(envelope
            .quote_summary
            .result
            .and_then(|results| results.into_iter().next()))
    }

    async fn history(&self, symbol: &Symbol, range: HistoryRange) -> Result<Vec<PricePoint>, SourceError> {
        if self.is_offline() {
            return Ok(fixtures::history(symbol, range, TradingDate::today()));
        }
        absent_on_not_found(self.fetch_chart(symbol, range.as_str()).await)
    }

    async fn current_price(&self, symbol: &Symbol) -> Result<Option<PricePoint>, SourceError> {
        if self.is_offline() {
            return Ok(fixtures::current_price(symbol, TradingDate::today()));
        }
        let points = absent_on_not_found(self.fetch_chart(symbol, "5d").await)?;
        Ok(points.into_iter().next())
    }

    async fn summary(&self, symbol: &Symbol) -> Result<Option<Payload>, SourceError> {
        absent_on_not_found(self.fetch_summary(symbol).await)
    }

    async fn market_indicators(&self) -> Result<MarketIndicators, SourceError> {
        if self.is_offline() {
            return Ok(fixtures::market_indicators(TradingDate::today()));
        }
        let index = |value: &str| Symbol::parse(value).map_err(|error| SourceError::internal(error.to_string()));
        let (sp500, vix, treasury) = (index("^GSPC")?, index("^VIX")?, index("^TNX")?);

        let (sp500, vix, treasury) = tokio::join!(
            self.current_price(&sp500),
            self.current_price(&vix),
            self.current_price(&treasury),
        );
        if let (Err(error), Err(_), Err(_)) = (&sp500, &vix, &treasury) {
            return Err(error.clone());
        }

        let sp500_change_percent = sp500.ok().flatten().and_then(|point| {
            let open = point.open.filter(|open| *open != 0.0)?;
            Some((point.close - open) / open * 100.0)
        });
        Ok(MarketIndicators {
            sp500_change_percent,
            vix: vix.ok().flatten().map(|point| point.close),
            treasury_yield: treasury.ok().flatten().map(|point| point.close),
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, SourceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SourceError::invalid_request(
                "yahoo search query must not be empty",
            ));
        }
        if self.is_offline() {
            return Ok(fixtures::search(query, ProviderId::Yahoo));
        }

        let request = HttpRequest::get(SEARCH_URL)
            .with_query("q", query)
            .with_query("quotesCount", SEARCH_LIMIT)
            .with_query("newsCount", "0");
        let envelope: SearchEnvelope = absent_on_not_found(self.get_json("search", request).await)?;
        Ok(envelope
            .quotes
            .into_iter()
            .map(|quote| SymbolMatch {
                symbol: quote.symbol,
                name: quote.longname.or(quote.shortname),
                instrument_type: quote.quote_type,
                exchange: quote.exchange,
                region: None,
                currency: None,
                match_score: quote.score,
                source: ProviderId::Yahoo,
            })
            .collect())
    }

    async fn record(&self, symbol: &Symbol) -> Result<StockRecord, SourceError> {
        if self.is_offline() {
            let today = TradingDate::today();
            let mut record = StockRecord::new(symbol.clone()).with_source(ProviderId::Yahoo);
            record.profile = fixtures::profile(symbol);
            record.current_price = fixtures::current_price(symbol, today);
            record.historical_prices = fixtures::history(symbol, HistoryRange::OneYear, today);
            record.financial_statements = fixtures::statements(symbol, ProviderId::Yahoo, today);
            return Ok(record);
        }

        // One summary call feeds both the profile and the statements.
        let (history, current, summary) = tokio::join!(
            self.history(symbol, HistoryRange::OneYear),
            self.current_price(symbol),
            self.summary(symbol),
        );

        let mut sections = SectionOutcome::new(ProviderId::Yahoo, symbol);
        let mut record = StockRecord::new(symbol.clone()).with_source(ProviderId::Yahoo);
        record.historical_prices = sections.take("history", history).unwrap_or_default();
        record.current_price = sections.take("current_price", current).flatten();
        if let Some(summary) = sections.take("summary", summary).flatten() {
            record.profile = profile_from_summary(symbol, &summary);
            record.financial_statements = statements_from_summary(symbol, &summary);
        }
        sections.finish()?;

        record.last_updated = UtcDateTime::now();
        Ok(record.normalize_order())
    }
}

impl MarketDataSource for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn fetch_profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Option<CompanyProfile>> {
        Box::pin(async move {
            if self.is_offline() {
                return Ok(fixtures::profile(symbol));
            }
            let summary = self.summary(symbol).await?;
            Ok(summary.and_then(|summary| profile_from_summary(symbol, &summary)))
        })
    }

    fn fetch_historical_prices<'a>(
        &'a self,
        symbol: &'a Symbol,
        range: HistoryRange,
    ) -> SourceFuture<'a, Vec<PricePoint>> {
        Box::pin(self.history(symbol, range))
    }

    fn fetch_current_price<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Option<PricePoint>> {
        Box::pin(self.current_price(symbol))
    }

    fn fetch_financial_statements<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> SourceFuture<'a, Vec<FinancialStatementPeriod>> {
        Box::pin(async move {
            if self.is_offline() {
                return Ok(fixtures::statements(symbol, ProviderId::Yahoo, TradingDate::today()));
            }
            let summary = self.summary(symbol).await?;
            Ok(summary
                .map(|summary| statements_from_summary(symbol, &summary))
                .unwrap_or_default())
        })
    }

    fn search_symbols<'a>(&'a self, query: &'a str) -> SourceFuture<'a, Vec<SymbolMatch>> {
        Box::pin(self.search(query))
    }

    fn fetch_market_indicators<'a>(&'a self) -> SourceFuture<'a, MarketIndicators> {
        Box::pin(self.market_indicators())
    }

    fn health_check<'a>(&'a self) -> SourceFuture<'a, bool> {
        Box::pin(async move {
            if self.is_offline() {
                return Ok(true);
            }
            let symbol = Symbol::parse(HEALTH_SYMBOL)
                .map_err(|error| SourceError::internal(error.to_string()))?;
            Ok(self.current_price(&symbol).await?.is_some())
        })
    }

    fn fetch_record<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, StockRecord> {
        Box::pin(self.record(symbol))
    }
}

// ============================================================================
// Payload mapping
// ============================================================================

const PRICE_FIELDS: &FieldTable<CompanyProfile> = &[(
    "marketCap",
    |profile: &mut CompanyProfile, value| profile.market_cap = profile.market_cap.or(value),
)];

const SUMMARY_DETAIL_FIELDS: &FieldTable<CompanyProfile> = &[
    ("marketCap", |profile: &mut CompanyProfile, value| {
        profile.market_cap = profile.market_cap.or(value)
    }),
    ("trailingPE", |profile: &mut CompanyProfile, value| {
        profile.trailing_pe = profile.trailing_pe.or(value)
    }),
    ("forwardPE", |profile: &mut CompanyProfile, value| {
        profile.forward_pe = profile.forward_pe.or(value)
    }),
    ("beta", |profile: &mut CompanyProfile, value| {
        profile.beta = profile.beta.or(value)
    }),
    ("dividendYield", |profile: &mut CompanyProfile, value| {
        profile.dividend_yield = profile.dividend_yield.or(value)
    }),
    ("priceToSalesTrailing12Months", |profile: &mut CompanyProfile, value| {
        profile.price_to_sales = profile.price_to_sales.or(value)
    }),
];

const KEY_STATISTICS_FIELDS: &FieldTable<CompanyProfile> = &[
    ("enterpriseValue", |profile: &mut CompanyProfile, value| {
        profile.enterprise_value = profile.enterprise_value.or(value)
    }),
    ("pegRatio", |profile: &mut CompanyProfile, value| {
        profile.peg_ratio = profile.peg_ratio.or(value)
    }),
    ("priceToBook", |profile: &mut CompanyProfile, value| {
        profile.price_to_book = profile.price_to_book.or(value)
    }),
    ("forwardPE", |profile: &mut CompanyProfile, value| {
        profile.forward_pe = profile.forward_pe.or(value)
    }),
    ("beta", |profile: &mut CompanyProfile, value| {
        profile.beta = profile.beta.or(value)
    }),
];

const INCOME_FIELDS: &FieldTable<IncomeStatement> = &[
    ("totalRevenue", |target: &mut IncomeStatement, value| target.revenue = value),
    ("costOfRevenue", |target: &mut IncomeStatement, value| target.cost_of_revenue = value),
    ("grossProfit", |target: &mut IncomeStatement, value| target.gross_profit = value),
    ("totalOperatingExpenses", |target: &mut IncomeStatement, value| {
        target.operating_expenses = value
    }),
    ("operatingIncome", |target: &mut IncomeStatement, value| target.operating_income = value),
    ("interestExpense", |target: &mut IncomeStatement, value| target.interest_expense = value),
    ("incomeBeforeTax", |target: &mut IncomeStatement, value| target.income_before_tax = value),
    ("incomeTaxExpense", |target: &mut IncomeStatement, value| {
        target.income_tax_expense = value
    }),
    ("netIncome", |target: &mut IncomeStatement, value| target.net_income = value),
];

const BALANCE_FIELDS: &FieldTable<BalanceSheet> = &[
    ("totalAssets", |target: &mut BalanceSheet, value| target.total_assets = value),
    ("totalCurrentAssets", |target: &mut BalanceSheet, value| target.current_assets = value),
    ("cash", |target: &mut BalanceSheet, value| target.cash_and_equivalents = value),
    ("inventory", |target: &mut BalanceSheet, value| target.inventory = value),
    ("totalLiab", |target: &mut BalanceSheet, value| target.total_liabilities = value),
    ("totalCurrentLiabilities", |target: &mut BalanceSheet, value| {
        target.current_liabilities = value
    }),
    ("longTermDebt", |target: &mut BalanceSheet, value| target.long_term_debt = value),
    ("totalStockholderEquity", |target: &mut BalanceSheet, value| {
        target.shareholders_equity = value
    }),
    ("retainedEarnings", |target: &mut BalanceSheet, value| target.retained_earnings = value),
];

const CASH_FLOW_FIELDS: &FieldTable<CashFlowStatement> = &[
    ("totalCashFromOperatingActivities", |target: &mut CashFlowStatement, value| {
        target.operating_cash_flow = value
    }),
    ("totalCashflowsFromInvestingActivities", |target: &mut CashFlowStatement, value| {
        target.investing_cash_flow = value
    }),
    ("totalCashFromFinancingActivities", |target: &mut CashFlowStatement, value| {
        target.financing_cash_flow = value
    }),
    ("capitalExpenditures", |target: &mut CashFlowStatement, value| {
        target.capital_expenditures = value
    }),
    ("depreciation", |target: &mut CashFlowStatement, value| target.depreciation = value),
];

fn module<'p>(summary: &'p Payload, name: &str) -> Option<&'p Payload> {
    summary.get(name).and_then(|value| value.as_object())
}

fn profile_from_summary(symbol: &Symbol, summary: &Payload) -> Option<CompanyProfile> {
    let mut profile = CompanyProfile::new(symbol.clone());
    let mut populated = 0;

    if let Some(asset) = module(summary, "assetProfile") {
        profile.sector = convert::parse_text(asset.get("sector"));
        profile.industry = convert::parse_text(asset.get("industry"));
        profile.description = convert::parse_text(asset.get("longBusinessSummary"));
        profile.website = convert::parse_text(asset.get("website"));
        profile.employees = convert::parse_i64(asset.get("fullTimeEmployees"));
    }
    if let Some(price) = module(summary, "price") {
        profile.name = convert::parse_text(price.get("longName"))
            .or_else(|| convert::parse_text(price.get("shortName")));
        populated += convert::fill(&mut profile, price, PRICE_FIELDS);
    }
    if let Some(detail) = module(summary, "summaryDetail") {
        populated += convert::fill(&mut profile, detail, SUMMARY_DETAIL_FIELDS);
    }
    if let Some(statistics) = module(summary, "defaultKeyStatistics") {
        populated += convert::fill(&mut profile, statistics, KEY_STATISTICS_FIELDS);
    }

    let described = profile.name.is_some()
        || profile.sector.is_some()
        || profile.industry.is_some()
        || profile.description.is_some()
        || profile.website.is_some()
        || profile.employees.is_some();
    (described || populated > 0).then(|| profile.sanitize())
}

fn statement_rows<'p>(
    summary: &'p Payload,
    module_name: &str,
    list: &str,
) -> impl Iterator<Item = (TradingDate, &'p Payload)> {
    module(summary, module_name)
        .and_then(|history| history.get(list))
        .and_then(|rows| rows.as_array())
        .into_iter()
        .flatten()
        .filter_map(|row| {
            let row = row.as_object()?;
            Some((convert::parse_date(row.get("endDate"))?, row))
        })
}

fn statements_from_summary(symbol: &Symbol, summary: &Payload) -> Vec<FinancialStatementPeriod> {
    let mut book = StatementBook::new(symbol, ProviderId::Yahoo, PeriodType::Annual);
    for (period_end, row) in
        statement_rows(summary, "incomeStatementHistory", "incomeStatementHistory")
    {
        if let Some(statement) = convert::extract(row, INCOME_FIELDS) {
            book.add_income(period_end, statement);
        }
    }
    for (period_end, row) in statement_rows(summary, "balanceSheetHistory", "balanceSheetStatements")
    {
        if let Some(sheet) = convert::extract(row, BALANCE_FIELDS) {
            book.add_balance_sheet(period_end, sheet);
        }
    }
    for (period_end, row) in
        statement_rows(summary, "cashflowStatementHistory", "cashflowStatements")
    {
        if let Some(statement) = convert::extract(row, CASH_FLOW_FIELDS) {
            book.add_cash_flow(period_end, statement);
        }
    }
    book.into_newest_first()
}

fn value_at(series: &[Value], index: usize) -> Option<f64> {
    convert::parse_f64(series.get(index))
}

/// Daily points newest first; rows without a close are skipped and the latest
/// intraday row wins when a session appears twice.
fn chart_points(symbol: &Symbol, envelope: ChartEnvelope) -> Result<Vec<PricePoint>, SourceError> {
    if let Some(error) = envelope.chart.error {
        return Err(error.into_source_error(symbol));
    }
    let Some(result) = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
    else {
        return Ok(Vec::new());
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjusted = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|series| series.adjclose)
        .unwrap_or_default();

    let mut rows = Vec::with_capacity(result.timestamp.len());
    for (index, raw_timestamp) in result.timestamp.iter().enumerate() {
        let Some(timestamp) = convert::parse_i64(Some(raw_timestamp)) else {
            continue;
        };
        let Some(date) = TradingDate::from_unix_timestamp(timestamp) else {
            continue;
        };
        let Some(close) = value_at(&quote.close, index) else {
            continue;
        };
        let point = PricePoint::new(symbol.clone(), date, close)
            .with_ohlc(
                value_at(&quote.open, index),
                value_at(&quote.high, index),
                value_at(&quote.low, index),
            )
            .with_adjusted_close(value_at(&adjusted, index))
            .with_volume(convert::parse_i64(quote.volume.get(index)));
        rows.push((timestamp, point));
    }

    rows.sort_by(|left, right| right.0.cmp(&left.0));
    let mut points = rows.into_iter().map(|(_, point)| point).collect::<Vec<_>>();
    points.dedup_by_key(|point| point.date);
    Ok(points)
}

// ============================================================================
// Response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct YahooApiError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

impl YahooApiError {
    fn into_source_error(self, symbol: &Symbol) -> SourceError {
        let detail = self.description.unwrap_or_default();
        if self.code.eq_ignore_ascii_case("not found") {
            SourceError::not_found(format!("yahoo has no data for {symbol}: {detail}"))
        } else if self.code.eq_ignore_ascii_case("bad request") {
            SourceError::invalid_request(format!("yahoo rejected request for {symbol}: {detail}"))
        } else {
            SourceError::unavailable(format!("yahoo error {}: {detail}", self.code))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<Value>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Vec<ChartAdjustedClose>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Value>,
    #[serde(default)]
    high: Vec<Value>,
    #[serde(default)]
    low: Vec<Value>,
    #[serde(default)]
    close: Vec<Value>,
    #[serde(default)]
    volume: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjustedClose {
    #[serde(default)]
    adjclose: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    #[serde(default)]
    result: Option<Vec<Payload>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
struct SearchQuote {
    symbol: String,
    #[serde(default)]
    shortname: Option<String>,
    #[serde(default)]
    longname: Option<String>,
    #[serde(rename = "quoteType", default)]
    quote_type: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{HttpError, HttpErrorKind, HttpFuture, HttpResponse};
    use crate::retry::RetryConfig;

    /// Answers by URL fragment; the last scripted response for a route repeats.
    #[derive(Default)]
    struct ScriptedHttpClient {
        routes: Mutex<Vec<(&'static str, VecDeque<HttpResponse>)>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttpClient {
        fn route(self, fragment: &'static str, responses: Vec<HttpResponse>) -> Self {
            self.routes
                .lock()
                .expect("routes lock")
                .push((fragment, responses.into()));
            self
        }

        fn with_session(self) -> Self {
            self.route("fc.yahoo.com", vec![HttpResponse::ok_json("")])
                .route("getcrumb", vec![HttpResponse::ok_json("crumb-1")])
        }

        fn calls_to(&self, fragment: &str) -> usize {
            self.requests
                .lock()
                .expect("requests lock")
                .iter()
                .filter(|request| request.url().contains(fragment))
                .count()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            let response = {
                let mut routes = self.routes.lock().expect("routes lock");
                routes
                    .iter_mut()
                    .find(|(fragment, _)| request.url().contains(fragment))
                    .and_then(|(_, responses)| {
                        if responses.len() > 1 {
                            responses.pop_front()
                        } else {
                            responses.front().cloned()
                        }
                    })
            };
            self.requests.lock().expect("requests lock").push(request);
            let result = response.ok_or_else(|| HttpError::new(HttpErrorKind::InvalidRequest, "no scripted route"));
            Box::pin(async move { result })
        }
    }

    fn status(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            body: String::new(),
        }
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    fn fast_policy() -> ProviderPolicy {
        ProviderPolicy::yahoo_default().with_retry(RetryConfig::fixed(Duration::from_millis(1), 3))
    }

    fn adapter(client: &Arc<ScriptedHttpClient>) -> YahooAdapter {
        let transport: Arc<dyn HttpClient> = client.clone();
        YahooAdapter::new(transport)
            .with_policy(fast_policy())
            .with_auth_manager(Arc::new(YahooAuthManager::default().with_cookie("B=test")))
    }

    const CHART: &str = r#"{"chart":{"result":[{"meta":{"symbol":"AAPL"},
        "timestamp":[1719408600,1719495000,1719581400],
        "indicators":{"quote":[{"open":[209.1,214.0,215.5],"high":[211.4,215.0,216.1],
        "low":[208.0,212.0,210.3],"close":[210.2,213.2,null],"volume":[90,100,200]}],
        "adjclose":[{"adjclose":[210.0,213.0,null]}]}}],"error":null}}"#;

    const SUMMARY: &str = r#"{"quoteSummary":{"result":[{
        "assetProfile":{"sector":"Technology","industry":"Consumer Electronics",
            "website":"https://www.apple.com","fullTimeEmployees":161000},
        "price":{"longName":"Apple Inc.","marketCap":{"raw":3.1e12,"fmt":"3.1T"}},
        "summaryDetail":{"trailingPE":{"raw":32.1},"beta":{"raw":1.25},"dividendYield":{}},
        "defaultKeyStatistics":{"priceToBook":{"raw":47.0},"pegRatio":{"raw":2.9}},
        "incomeStatementHistory":{"incomeStatementHistory":[
            {"endDate":{"raw":1695945600,"fmt":"2023-09-29"},"totalRevenue":{"raw":383285000000},"netIncome":{"raw":96995000000}},
            {"endDate":{"raw":1664409600,"fmt":"2022-09-29"},"totalRevenue":{"raw":394328000000}}]},
        "balanceSheetHistory":{"balanceSheetStatements":[
            {"endDate":{"raw":1695945600},"totalAssets":{"raw":352583000000},"totalLiab":{"raw":290437000000},"totalStockholderEquity":{"raw":62146000000}}]},
        "cashflowStatementHistory":{"cashflowStatements":[
            {"endDate":{"raw":1695945600},"totalCashFromOperatingActivities":{"raw":110543000000},"capitalExpenditures":{"raw":-10959000000}}]}
        }],"error":null}}"#;

    #[tokio::test]
    async fn chart_rows_become_newest_first_points() {
        let client = Arc::new(
            ScriptedHttpClient::default()
                .with_session()
                .route("/v8/finance/chart", vec![HttpResponse::ok_json(CHART)]),
        );

        let points = adapter(&client)
            .fetch_historical_prices(&symbol("AAPL"), HistoryRange::OneMonth)
            .await
            .expect("history");

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].close, 213.2);
        assert_eq!(points[0].adjusted_close, Some(213.0));
        assert_eq!(points[0].volume, Some(100));
        assert!(points[0].date > points[1].date);
        let requests = client.requests.lock().expect("requests lock");
        let chart = requests
            .iter()
            .find(|request| request.url().contains("/v8/finance/chart"))
            .expect("chart request");
        assert!(chart.url().contains("range=1mo"));
        assert!(chart.url().contains("crumb=crumb-1"));
        assert_eq!(chart.headers.get("cookie").map(String::as_str), Some("B=test"));
    }

    #[tokio::test]
    async fn malformed_chart_cells_only_blank_their_own_fields() {
        let chart = r#"{"chart":{"result":[{
            "timestamp":[1719408600,"1719495000",1719581400,"soon"],
            "indicators":{"quote":[{"open":[209.1,"NaN",215.5,1.0],"high":[211.4,215.0,"-",1.0],
            "low":[208.0,212.0,210.3,1.0],"close":[210.2,"213.2",214.8,1.0],
            "volume":[90,1500000.0,"n/a",1]}],
            "adjclose":[{"adjclose":[210.0,{"raw":213.0},null,1.0]}]}}],"error":null}}"#;
        let client = Arc::new(
            ScriptedHttpClient::default()
                .with_session()
                .route("/v8/finance/chart", vec![HttpResponse::ok_json(chart)]),
        );

        let points = adapter(&client)
            .fetch_historical_prices(&symbol("AAPL"), HistoryRange::OneMonth)
            .await
            .expect("history");

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].close, 214.8);
        assert_eq!(points[0].high, None);
        assert_eq!(points[0].volume, None);
        assert_eq!(points[1].close, 213.2);
        assert_eq!(points[1].open, None);
        assert_eq!(points[1].volume, Some(1_500_000));
        assert_eq!(points[1].adjusted_close, Some(213.0));
        assert_eq!(points[2].volume, Some(90));
    }

    #[tokio::test]
    async fn unknown_symbol_is_absence_and_keeps_circuit_closed() {
        let not_found = HttpResponse {
            status: 404,
            body: String::from(
                r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#,
            ),
        };
        let client = Arc::new(
            ScriptedHttpClient::default()
                .with_session()
                .route("/v8/finance/chart", vec![not_found]),
        );
        let adapter = adapter(&client);

        let current = adapter
            .fetch_current_price(&symbol("BADSYMBOL"))
            .await
            .expect("absence is not an error");

        assert_eq!(current, None);
        assert_eq!(client.calls_to("/v8/finance/chart"), 1);
        assert_eq!(adapter.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn rejected_session_refreshes_crumb_and_retries() {
        let client = Arc::new(
            ScriptedHttpClient::default().with_session().route(
                "/v8/finance/chart",
                vec![status(401), HttpResponse::ok_json(CHART)],
            ),
        );

        let points = adapter(&client)
            .fetch_historical_prices(&symbol("AAPL"), HistoryRange::OneMonth)
            .await
            .expect("history after refresh");

        assert_eq!(points.len(), 2);
        assert_eq!(client.calls_to("getcrumb"), 2);
        assert_eq!(client.calls_to("/v8/finance/chart"), 2);
    }

    #[tokio::test]
    async fn transient_failures_retry_then_open_the_circuit() {
        let client = Arc::new(
            ScriptedHttpClient::default()
                .with_session()
                .route("/v8/finance/chart", vec![status(503)]),
        );
        let breaker = Arc::new(CircuitBreaker::new(
            ProviderId::Yahoo,
            CircuitBreakerConfig {
                failure_threshold: 1,
                cool_down: Duration::from_secs(60),
            },
        ));
        let adapter = adapter(&client).with_circuit_breaker(breaker);

        let first = adapter
            .fetch_current_price(&symbol("AAPL"))
            .await
            .expect_err("upstream down");
        assert_eq!(first.kind(), SourceErrorKind::Unavailable);
        assert_eq!(client.calls_to("/v8/finance/chart"), 3);
        assert_eq!(adapter.circuit_state(), CircuitState::Open);

        let second = adapter
            .fetch_current_price(&symbol("AAPL"))
            .await
            .expect_err("circuit open");
        assert!(second.message().starts_with("yahoo circuit breaker is open"));
        assert_eq!(client.calls_to("/v8/finance/chart"), 3);
    }

    #[tokio::test]
    async fn quote_summary_feeds_profile_and_statements() {
        let client = Arc::new(
            ScriptedHttpClient::default()
                .with_session()
                .route("/v10/finance/quoteSummary", vec![HttpResponse::ok_json(SUMMARY)]),
        );
        let adapter = adapter(&client);

        let profile = adapter
            .fetch_profile(&symbol("AAPL"))
            .await
            .expect("profile")
            .expect("profile present");
        assert_eq!(profile.name.as_deref(), Some("Apple Inc."));
        assert_eq!(profile.market_cap, Some(3.1e12));
        assert_eq!(profile.trailing_pe, Some(32.1));
        assert_eq!(profile.dividend_yield, None);
        assert_eq!(profile.employees, Some(161_000));

        let periods = adapter
            .fetch_financial_statements(&symbol("AAPL"))
            .await
            .expect("statements");
        assert_eq!(periods.len(), 2);
        assert!(periods[0].period_end > periods[1].period_end);
        assert!(periods[0].balance_sheet.is_some());
        assert_eq!(
            periods[0].cash_flow.as_ref().and_then(|flow| flow.free_cash_flow),
            Some(99_584_000_000.0)
        );
        assert!(periods[1].balance_sheet.is_none());
    }

    #[tokio::test]
    async fn record_shares_one_summary_call() {
        let client = Arc::new(
            ScriptedHttpClient::default()
                .with_session()
                .route("/v8/finance/chart", vec![HttpResponse::ok_json(CHART)])
                .route("/v10/finance/quoteSummary", vec![HttpResponse::ok_json(SUMMARY)]),
        );

        let record = adapter(&client)
            .fetch_record(&symbol("AAPL"))
            .await
            .expect("record");

        assert_eq!(record.source, Some(ProviderId::Yahoo));
        assert!(record.profile.is_some());
        assert_eq!(record.financial_statements.len(), 2);
        assert_eq!(client.calls_to("/v10/finance/quoteSummary"), 1);
    }

    #[tokio::test]
    async fn offline_adapter_serves_fixtures() {
        let adapter = YahooAdapter::offline();

        let record = adapter.fetch_record(&symbol("MSFT")).await.expect("fixture record");
        assert!(record.profile.is_some());
        assert!(record.current_price.is_some());
        assert_eq!(record.historical_prices.len(), 252);
        assert_eq!(record.financial_statements.len(), 4);

        assert_eq!(
            adapter.fetch_profile(&symbol("BADSYMBOL")).await.expect("profile"),
            None
        );
        assert!(adapter.health_check().await.expect("health"));
        let indicators = adapter.fetch_market_indicators().await.expect("indicators");
        assert!(indicators.vix.is_some());
    }

    #[tokio::test]
    async fn blank_search_is_rejected() {
        let error = YahooAdapter::offline()
            .search_symbols("  ")
            .await
            .expect_err("blank query");
        assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
    }
}
