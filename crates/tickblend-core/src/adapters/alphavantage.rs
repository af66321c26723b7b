use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::convert::{self, FieldTable, Payload, StatementBook};
use super::{absent_on_not_found, fixtures, transport_error};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::data_source::{MarketDataSource, SectionOutcome, SourceError, SourceFuture};
use crate::http_client::{HttpClient, HttpRequest, NoopHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::retry::retry_with_backoff;
use crate::throttling::RequestQuota;
use crate::{
    BalanceSheet, CashFlowStatement, CompanyProfile, FinancialStatementPeriod, HistoryRange,
    IncomeStatement, MarketIndicators, PeriodType, PricePoint, ProviderId, StockRecord, Symbol,
    SymbolMatch, TradingDate, UtcDateTime,
};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DAILY_SERIES_KEY: &str = "Time Series (Daily)";
/// Points returned by `outputsize=compact`.
const COMPACT_POINTS: usize = 100;
const HEALTH_SYMBOL: &str = "AAPL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementKind {
    Income,
    Balance,
    CashFlow,
}

impl StatementKind {
    const ALL: [Self; 3] = [Self::Income, Self::Balance, Self::CashFlow];

    const fn function(self) -> &'static str {
        match self {
            Self::Income => "INCOME_STATEMENT",
            Self::Balance => "BALANCE_SHEET",
            Self::CashFlow => "CASH_FLOW",
        }
    }
}

/// Alpha Vantage adapter.
///
/// Every call waits on the free-tier quota (see
/// [`ProviderPolicy::alphavantage_default`]) before it is sent, so bursts are
/// delayed rather than refused upstream.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    policy: ProviderPolicy,
    quota: RequestQuota,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl Default for AlphaVantageAdapter {
    fn default() -> Self {
        Self::new(Arc::new(NoopHttpClient), "demo")
    }
}

impl AlphaVantageAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        let policy = ProviderPolicy::alphavantage_default();
        Self {
            http_client,
            api_key: api_key.into(),
            quota: RequestQuota::from_policy(&policy),
            policy,
            circuit_breaker: Arc::new(CircuitBreaker::new(
                ProviderId::Alphavantage,
                CircuitBreakerConfig::default(),
            )),
        }
    }

    /// Serves deterministic fixtures without touching the network.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.quota = RequestQuota::from_policy(&policy);
        self.policy = policy;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    fn is_offline(&self) -> bool {
        self.http_client.is_mock()
    }

    async fn query(
        &self,
        function: &'static str,
        params: &[(&str, &str)],
    ) -> Result<Payload, SourceError> {
        self.circuit_breaker.guard()?;

        let result =
            retry_with_backoff(&self.policy.retry, function, |_| self.send_once(function, params))
                .await;
        self.circuit_breaker.observe(&result);
        result
    }

    async fn send_once(
        &self,
        function: &'static str,
        params: &[(&str, &str)],
    ) -> Result<Payload, SourceError> {
        self.quota.acquire().await;

        let request = params
            .iter()
            .fold(
                HttpRequest::get(BASE_URL).with_query("function", function),
                |request, (name, value)| request.with_query(name, value),
            )
            .with_query("apikey", &self.api_key)
            .with_timeout(REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| transport_error("alphavantage", &error))?;

        match response.status {
            _ if response.is_success() => {}
            429 => return Err(SourceError::rate_limited("alphavantage returned status 429")),
            status if self.policy.retry.should_retry_status(status) => {
                return Err(SourceError::unavailable(format!(
                    "alphavantage returned status {status}"
                )));
            }
            status => {
                return Err(SourceError::internal(format!(
                    "alphavantage returned status {status}"
                )));
            }
        }

        let payload: Payload = serde_json::from_str(&response.body).map_err(|error| {
            SourceError::internal(format!(
                "failed to parse alphavantage {function} response: {error}"
            ))
        })?;

        // Alpha Vantage reports errors and throttling in a 200 body.
        if let Some(message) = convert::parse_text(payload.get("Error Message")) {
            return Err(SourceError::not_found(format!("alphavantage {function}: {message}")));
        }
        if let Some(message) = convert::parse_text(payload.get("Note"))
            .or_else(|| convert::parse_text(payload.get("Information")))
        {
            return Err(SourceError::rate_limited(format!(
                "alphavantage {function}: {message}"
            )));
        }
        Ok(payload)
    }

    async fn profile(&self, symbol: &Symbol) -> Result<Option<CompanyProfile>, SourceError> {
        if self.is_offline() {
            return Ok(fixtures::profile(symbol));
        }
        let payload =
            absent_on_not_found(self.query("OVERVIEW", &[("symbol", symbol.as_str())]).await.map(Some))?;
        Ok(payload.and_then(|payload| profile_from_overview(symbol, &payload)))
    }

    async fn daily_series(
        &self,
        symbol: &Symbol,
        outputsize: &str,
    ) -> Result<Vec<PricePoint>, SourceError> {
        let payload = absent_on_not_found(
            self.query(
                "TIME_SERIES_DAILY_ADJUSTED",
                &[("symbol", symbol.as_str()), ("outputsize", outputsize)],
            )
            .await
            .map(Some),
        )?;
        Ok(payload
            .map(|payload| daily_points(symbol, &payload))
            .unwrap_or_default())
    }

    async fn history(
        &self,
        symbol: &Symbol,
        range: HistoryRange,
    ) -> Result<Vec<PricePoint>, SourceError> {
        if self.is_offline() {
            return Ok(fixtures::history(symbol, range, TradingDate::today()));
        }
        let sessions = range.trading_days();
        let outputsize = match sessions {
            Some(sessions) if sessions <= COMPACT_POINTS => "compact",
            _ => "full",
        };
        let mut points = self.daily_series(symbol, outputsize).await?;
        if let Some(sessions) = sessions {
            points.truncate(sessions);
        }
        Ok(points)
    }

    async fn current_price(&self, symbol: &Symbol) -> Result<Option<PricePoint>, SourceError> {
        if self.is_offline() {
            return Ok(fixtures::current_price(symbol, TradingDate::today()));
        }
        let payload = absent_on_not_found(
            self.query("GLOBAL_QUOTE", &[("symbol", symbol.as_str())])
                .await
                .map(Some),
        )?;
        Ok(payload.and_then(|payload| quote_point(symbol, &payload)))
    }

    /// Fetches the three statement documents and joins them per fiscal year.
    ///
    /// A failed document is skipped; the call fails only when all three did.
    async fn statements(&self, symbol: &Symbol) -> Result<Vec<FinancialStatementPeriod>, SourceError> {
        if self.is_offline() {
            return Ok(fixtures::statements(
                symbol,
                ProviderId::Alphavantage,
                TradingDate::today(),
            ));
        }

        let mut book = StatementBook::new(symbol, ProviderId::Alphavantage, PeriodType::Annual);
        let mut last_failure = None;
        let mut failures = 0;
        for kind in StatementKind::ALL {
            let result = self
                .query(kind.function(), &[("symbol", symbol.as_str())])
                .await
                .map(Some);
            match absent_on_not_found(result) {
                Ok(Some(payload)) => add_reports(&mut book, kind, &payload),
                Ok(None) => {}
                Err(error) => {
                    warn!(symbol = %symbol, function = kind.function(), %error, "statement fetch failed");
                    failures += 1;
                    last_failure = Some(error);
                }
            }
        }

        match last_failure {
            Some(error) if failures == StatementKind::ALL.len() => Err(error),
            _ => Ok(book.into_newest_first()),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, SourceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SourceError::invalid_request(
                "alphavantage search keywords must not be empty",
            ));
        }
        if self.is_offline() {
            return Ok(fixtures::search(query, ProviderId::Alphavantage));
        }

        let payload = absent_on_not_found(
            self.query("SYMBOL_SEARCH", &[("keywords", query)])
                .await
                .map(Some),
        )?;
        Ok(payload
            .as_ref()
            .and_then(|payload| payload.get("bestMatches"))
            .and_then(|matches| matches.as_array())
            .into_iter()
            .flatten()
            .filter_map(|row| row.as_object())
            .filter_map(symbol_match)
            .collect())
    }

    async fn market_indicators(&self) -> Result<MarketIndicators, SourceError> {
        if self.is_offline() {
            return Ok(MarketIndicators {
                treasury_yield: fixtures::market_indicators(TradingDate::today()).treasury_yield,
                ..MarketIndicators::default()
            });
        }

        let payload = self
            .query("TREASURY_YIELD", &[("interval", "daily"), ("maturity", "10year")])
            .await?;
        let treasury_yield = payload
            .get("data")
            .and_then(|data| data.as_array())
            .and_then(|rows| rows.first())
            .and_then(|row| convert::parse_f64(row.get("value")));
        Ok(MarketIndicators {
            treasury_yield,
            ..MarketIndicators::default()
        })
    }

    async fn health(&self) -> Result<bool, SourceError> {
        if self.is_offline() {
            return Ok(true);
        }
        match self.query("OVERVIEW", &[("symbol", HEALTH_SYMBOL)]).await {
            Ok(payload) => Ok(payload.contains_key("Symbol")),
            Err(error) if error.is_not_found() => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Sequential composition; the free-tier quota makes concurrent sub-fetches pointless.
    async fn record(&self, symbol: &Symbol) -> Result<StockRecord, SourceError> {
        let mut record = StockRecord::new(symbol.clone()).with_source(ProviderId::Alphavantage);

        if self.is_offline() {
            let today = TradingDate::today();
            let mut history = fixtures::history(symbol, HistoryRange::OneYear, today);
            history.truncate(COMPACT_POINTS);
            record.profile = fixtures::profile(symbol);
            record.current_price = history.first().cloned();
            record.historical_prices = history;
            record.financial_statements =
                fixtures::statements(symbol, ProviderId::Alphavantage, today);
            return Ok(record);
        }

        let mut sections = SectionOutcome::new(ProviderId::Alphavantage, symbol);
        record.profile = sections.take("profile", self.profile(symbol).await).flatten();
        record.financial_statements = sections
            .take("statements", self.statements(symbol).await)
            .unwrap_or_default();
        record.historical_prices = sections
            .take("history", self.daily_series(symbol, "compact").await)
            .unwrap_or_default();
        sections.finish()?;

        record.current_price = record.historical_prices.first().cloned();
        record.last_updated = UtcDateTime::now();
        Ok(record.normalize_order())
    }
}

impl MarketDataSource for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn fetch_profile<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Option<CompanyProfile>> {
        Box::pin(self.profile(symbol))
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
        Box::pin(self.statements(symbol))
    }

    fn search_symbols<'a>(&'a self, query: &'a str) -> SourceFuture<'a, Vec<SymbolMatch>> {
        Box::pin(self.search(query))
    }

    fn fetch_market_indicators<'a>(&'a self) -> SourceFuture<'a, MarketIndicators> {
        Box::pin(self.market_indicators())
    }

    fn health_check<'a>(&'a self) -> SourceFuture<'a, bool> {
        Box::pin(self.health())
    }

    fn fetch_record<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, StockRecord> {
        Box::pin(self.record(symbol))
    }
}

// ============================================================================
// Payload mapping
// ============================================================================

const OVERVIEW_FIELDS: &FieldTable<CompanyProfile> = &[
    ("MarketCapitalization", |profile: &mut CompanyProfile, value| profile.market_cap = value),
    ("TrailingPE", |profile: &mut CompanyProfile, value| profile.trailing_pe = value),
    ("PERatio", |profile: &mut CompanyProfile, value| {
        profile.trailing_pe = profile.trailing_pe.or(value)
    }),
    ("ForwardPE", |profile: &mut CompanyProfile, value| profile.forward_pe = value),
    ("PEGRatio", |profile: &mut CompanyProfile, value| profile.peg_ratio = value),
    ("PriceToBookRatio", |profile: &mut CompanyProfile, value| profile.price_to_book = value),
    ("PriceToSalesRatioTTM", |profile: &mut CompanyProfile, value| {
        profile.price_to_sales = value
    }),
    ("Beta", |profile: &mut CompanyProfile, value| profile.beta = value),
    ("DividendYield", |profile: &mut CompanyProfile, value| profile.dividend_yield = value),
];

const INCOME_FIELDS: &FieldTable<IncomeStatement> = &[
    ("totalRevenue", |target: &mut IncomeStatement, value| target.revenue = value),
    ("costOfRevenue", |target: &mut IncomeStatement, value| target.cost_of_revenue = value),
    ("grossProfit", |target: &mut IncomeStatement, value| target.gross_profit = value),
    ("operatingExpenses", |target: &mut IncomeStatement, value| {
        target.operating_expenses = value
    }),
    ("totalOperatingExpense", |target: &mut IncomeStatement, value| {
        target.operating_expenses = target.operating_expenses.or(value)
    }),
    ("operatingIncome", |target: &mut IncomeStatement, value| target.operating_income = value),
    ("interestExpense", |target: &mut IncomeStatement, value| target.interest_expense = value),
    ("incomeBeforeTax", |target: &mut IncomeStatement, value| target.income_before_tax = value),
    ("incomeTaxExpense", |target: &mut IncomeStatement, value| {
        target.income_tax_expense = value
    }),
    ("netIncome", |target: &mut IncomeStatement, value| target.net_income = value),
    ("reportedEPS", |target: &mut IncomeStatement, value| target.eps = value),
];

const BALANCE_FIELDS: &FieldTable<BalanceSheet> = &[
    ("totalAssets", |target: &mut BalanceSheet, value| target.total_assets = value),
    ("totalCurrentAssets", |target: &mut BalanceSheet, value| target.current_assets = value),
    ("cashAndCashEquivalentsAtCarryingValue", |target: &mut BalanceSheet, value| {
        target.cash_and_equivalents = value
    }),
    ("inventory", |target: &mut BalanceSheet, value| target.inventory = value),
    ("totalLiabilities", |target: &mut BalanceSheet, value| target.total_liabilities = value),
    ("totalCurrentLiabilities", |target: &mut BalanceSheet, value| {
        target.current_liabilities = value
    }),
    ("longTermDebt", |target: &mut BalanceSheet, value| target.long_term_debt = value),
    ("totalShareholderEquity", |target: &mut BalanceSheet, value| {
        target.shareholders_equity = value
    }),
    ("retainedEarnings", |target: &mut BalanceSheet, value| target.retained_earnings = value),
];

const CASH_FLOW_FIELDS: &FieldTable<CashFlowStatement> = &[
    ("operatingCashflow", |target: &mut CashFlowStatement, value| {
        target.operating_cash_flow = value
    }),
    ("cashflowFromInvestment", |target: &mut CashFlowStatement, value| {
        target.investing_cash_flow = value
    }),
    ("cashflowFromFinancing", |target: &mut CashFlowStatement, value| {
        target.financing_cash_flow = value
    }),
    ("capitalExpenditures", |target: &mut CashFlowStatement, value| {
        target.capital_expenditures = value
    }),
    ("depreciationDepletionAndAmortization", |target: &mut CashFlowStatement, value| {
        target.depreciation = value
    }),
];

/// `OVERVIEW` answers `{}` for symbols it does not cover.
fn profile_from_overview(symbol: &Symbol, payload: &Payload) -> Option<CompanyProfile> {
    convert::parse_text(payload.get("Symbol"))?;

    let mut profile = CompanyProfile::new(symbol.clone());
    convert::fill(&mut profile, payload, OVERVIEW_FIELDS);
    profile.name = convert::parse_text(payload.get("Name"));
    profile.sector = convert::parse_text(payload.get("Sector"));
    profile.industry = convert::parse_text(payload.get("Industry"));
    profile.description = convert::parse_text(payload.get("Description"));
    profile.website = convert::parse_text(payload.get("OfficialSite"));
    profile.employees = convert::parse_i64(payload.get("FullTimeEmployees"));
    Some(profile.sanitize())
}

fn add_reports(book: &mut StatementBook, kind: StatementKind, payload: &Payload) {
    let rows = payload
        .get("annualReports")
        .and_then(|reports| reports.as_array())
        .into_iter()
        .flatten()
        .filter_map(|row| row.as_object())
        .filter_map(|row| Some((convert::parse_date(row.get("fiscalDateEnding"))?, row)));

    for (period_end, row) in rows {
        match kind {
            StatementKind::Income => {
                if let Some(statement) = convert::extract(row, INCOME_FIELDS) {
                    book.add_income(period_end, statement);
                }
            }
            StatementKind::Balance => {
                if let Some(sheet) = convert::extract(row, BALANCE_FIELDS) {
                    book.add_balance_sheet(period_end, sheet);
                }
            }
            StatementKind::CashFlow => {
                if let Some(statement) = convert::extract(row, CASH_FLOW_FIELDS) {
                    book.add_cash_flow(period_end, statement);
                }
            }
        }
    }
}

/// Daily points newest first. Rows with an unreadable date or close are skipped.
fn daily_points(symbol: &Symbol, payload: &Payload) -> Vec<PricePoint> {
    let Some(series) = payload
        .get(DAILY_SERIES_KEY)
        .and_then(|series| series.as_object())
    else {
        return Vec::new();
    };

    let mut points = series
        .iter()
        .filter_map(|(date, row)| {
            let date = TradingDate::parse(date).ok()?;
            let row = row.as_object()?;
            let close = convert::parse_f64(row.get("4. close"))?;
            Some(
                PricePoint::new(symbol.clone(), date, close)
                    .with_ohlc(
                        convert::parse_f64(row.get("1. open")),
                        convert::parse_f64(row.get("2. high")),
                        convert::parse_f64(row.get("3. low")),
                    )
                    .with_adjusted_close(convert::parse_f64(row.get("5. adjusted close")))
                    .with_volume(convert::parse_i64(row.get("6. volume"))),
            )
        })
        .collect::<Vec<_>>();
    points.sort_by(|left, right| right.date.cmp(&left.date));
    points
}

/// `GLOBAL_QUOTE` answers an empty quote object for symbols it does not cover.
fn quote_point(symbol: &Symbol, payload: &Payload) -> Option<PricePoint> {
    let quote = payload.get("Global Quote")?.as_object()?;
    let date = TradingDate::parse(&convert::parse_text(quote.get("07. latest trading day"))?).ok()?;
    let close = convert::parse_f64(quote.get("05. price"))?;
    Some(
        PricePoint::new(symbol.clone(), date, close)
            .with_ohlc(
                convert::parse_f64(quote.get("02. open")),
                convert::parse_f64(quote.get("03. high")),
                convert::parse_f64(quote.get("04. low")),
            )
            .with_volume(convert::parse_i64(quote.get("06. volume"))),
    )
}

fn symbol_match(row: &Payload) -> Option<SymbolMatch> {
    Some(SymbolMatch {
        symbol: convert::parse_text(row.get("1. symbol"))?,
        name: convert::parse_text(row.get("2. name")),
        instrument_type: convert::parse_text(row.get("3. type")),
        exchange: None,
        region: convert::parse_text(row.get("4. region")),
        currency: convert::parse_text(row.get("8. currency")),
        match_score: convert::parse_f64(row.get("9. matchScore")),
        source: ProviderId::Alphavantage,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{HttpFuture, HttpResponse};
    use crate::retry::RetryConfig;

    /// Answers by the `function` query parameter and records every URL.
    #[derive(Default)]
    struct FunctionHttpClient {
        bodies: Vec<(&'static str, &'static str)>,
        urls: Mutex<Vec<String>>,
    }

    impl FunctionHttpClient {
        fn with(mut self, function: &'static str, body: &'static str) -> Self {
            self.bodies.push((function, body));
            self
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().expect("urls lock").clone()
        }
    }

    impl HttpClient for FunctionHttpClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            let body = self
                .bodies
                .iter()
                .find(|(function, _)| request.url().contains(&format!("function={function}&")))
                .map_or("{}", |(_, body)| *body);
            self.urls.lock().expect("urls lock").push(request.url());
            Box::pin(async move { Ok(HttpResponse::ok_json(body)) })
        }
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    fn adapter(client: &Arc<FunctionHttpClient>) -> AlphaVantageAdapter {
        let transport: Arc<dyn HttpClient> = client.clone();
        AlphaVantageAdapter::new(transport, "test-key").with_policy(
            ProviderPolicy::alphavantage_default()
                .with_quotas(Vec::new())
                .with_retry(RetryConfig::fixed(Duration::from_millis(1), 3)),
        )
    }

    const OVERVIEW: &str = r#"{"Symbol":"IBM","Name":"International Business Machines",
        "Sector":"TECHNOLOGY","Industry":"COMPUTER & OFFICE EQUIPMENT",
        "MarketCapitalization":"157000000000","PERatio":"22.5","ForwardPE":"16.1",
        "PEGRatio":"None","Beta":"0.71","DividendYield":"0.0387","FullTimeEmployees":"288300"}"#;

    const DAILY: &str = r#"{"Meta Data":{"2. Symbol":"IBM"},"Time Series (Daily)":{
        "2024-06-27":{"1. open":"170.0","2. high":"172.0","3. low":"169.5","4. close":"171.2","5. adjusted close":"171.2","6. volume":"3100000"},
        "2024-06-28":{"1. open":"171.3","2. high":"174.1","3. low":"170.9","4. close":"172.9","5. adjusted close":"172.9","6. volume":"4200000"},
        "2024-06-26":{"1. open":"168.0","2. high":"170.0","3. low":"167.0","4. close":"-","6. volume":"1"}}}"#;

    const INCOME: &str = r#"{"symbol":"IBM","annualReports":[
        {"fiscalDateEnding":"2023-12-31","totalRevenue":"61860000000","netIncome":"7502000000","reportedEPS":"None"},
        {"fiscalDateEnding":"2022-12-31","totalRevenue":"60530000000"}]}"#;

    const CASH_FLOW: &str = r#"{"symbol":"IBM","annualReports":[
        {"fiscalDateEnding":"2023-12-31","operatingCashflow":"13931000000","capitalExpenditures":"1246000000"}]}"#;

    const SEARCH: &str = r#"{"bestMatches":[
        {"1. symbol":"IBM","2. name":"International Business Machines Corp","3. type":"Equity",
         "4. region":"United States","8. currency":"USD","9. matchScore":"1.0000"},
        {"1. symbol":"IBMN","2. name":"iShares iBonds","3. type":"ETF","4. region":"United States",
         "8. currency":"USD","9. matchScore":"0.8000"}]}"#;

    #[tokio::test]
    async fn overview_maps_strings_and_placeholders() {
        let client = Arc::new(FunctionHttpClient::default().with("OVERVIEW", OVERVIEW));

        let profile = adapter(&client)
            .fetch_profile(&symbol("IBM"))
            .await
            .expect("profile")
            .expect("covered symbol");

        assert_eq!(profile.name.as_deref(), Some("International Business Machines"));
        assert_eq!(profile.market_cap, Some(157_000_000_000.0));
        assert_eq!(profile.trailing_pe, Some(22.5));
        assert_eq!(profile.peg_ratio, None);
        assert_eq!(profile.employees, Some(288_300));
        assert!(client.urls()[0].contains("apikey=test-key"));
    }

    #[tokio::test]
    async fn empty_overview_means_unknown_symbol() {
        let client = Arc::new(FunctionHttpClient::default());
        let profile = adapter(&client)
            .fetch_profile(&symbol("BADSYMBOL"))
            .await
            .expect("absence");
        assert_eq!(profile, None);
    }

    #[tokio::test]
    async fn error_message_is_absence_not_failure() {
        let client = Arc::new(FunctionHttpClient::default().with(
            "TIME_SERIES_DAILY_ADJUSTED",
            r#"{"Error Message":"Invalid API call."}"#,
        ));
        let adapter = adapter(&client);

        let points = adapter
            .fetch_historical_prices(&symbol("BADSYMBOL"), HistoryRange::OneMonth)
            .await
            .expect("absence");

        assert!(points.is_empty());
        assert_eq!(client.urls().len(), 1);
        assert_eq!(adapter.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn throttling_note_is_retried_as_rate_limited() {
        let client = Arc::new(FunctionHttpClient::default().with(
            "GLOBAL_QUOTE",
            r#"{"Note":"Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#,
        ));

        let error = adapter(&client)
            .fetch_current_price(&symbol("IBM"))
            .await
            .expect_err("throttled");

        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert_eq!(client.urls().len(), 3);
    }

    #[tokio::test]
    async fn global_quote_becomes_current_price() {
        let client = Arc::new(FunctionHttpClient::default().with(
            "GLOBAL_QUOTE",
            r#"{"Global Quote":{"01. symbol":"IBM","02. open":"171.3","03. high":"174.1",
                "04. low":"170.9","05. price":"172.9","06. volume":"4200000",
                "07. latest trading day":"2024-06-28"}}"#,
        ));
        let quote = adapter(&client)
            .fetch_current_price(&symbol("IBM"))
            .await
            .expect("quote")
            .expect("covered symbol");
        assert_eq!(quote.close, 172.9);
        assert_eq!(quote.high, Some(174.1));
        assert_eq!(
            quote.date,
            TradingDate::from_calendar(2024, 6, 28).expect("valid date")
        );

        let unknown = Arc::new(
            FunctionHttpClient::default().with("GLOBAL_QUOTE", r#"{"Global Quote":{}}"#),
        );
        assert_eq!(
            adapter(&unknown)
                .fetch_current_price(&symbol("BADSYMBOL"))
                .await,
            Ok(None)
        );
    }

    #[tokio::test]
    async fn daily_series_is_sorted_and_truncated() {
        let client = Arc::new(
            FunctionHttpClient::default().with("TIME_SERIES_DAILY_ADJUSTED", DAILY),
        );
        let adapter = adapter(&client);

        let points = adapter
            .fetch_historical_prices(&symbol("IBM"), HistoryRange::OneMonth)
            .await
            .expect("history");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].close, 172.9);
        assert_eq!(points[0].volume, Some(4_200_000));
        assert!(client.urls()[0].contains("outputsize=compact"));

        adapter
            .fetch_historical_prices(&symbol("IBM"), HistoryRange::OneYear)
            .await
            .expect("history");
        assert!(client.urls()[1].contains("outputsize=full"));
    }

    #[tokio::test]
    async fn statements_join_documents_and_tolerate_gaps() {
        let client = Arc::new(
            FunctionHttpClient::default()
                .with("INCOME_STATEMENT", INCOME)
                .with("CASH_FLOW", CASH_FLOW),
        );

        let periods = adapter(&client)
            .fetch_financial_statements(&symbol("IBM"))
            .await
            .expect("statements");

        assert_eq!(periods.len(), 2);
        let latest = &periods[0];
        assert_eq!(
            latest.period_end,
            TradingDate::from_calendar(2023, 12, 31).expect("valid date")
        );
        assert_eq!(latest.period_type, PeriodType::Annual);
        assert!(latest.balance_sheet.is_none());
        assert_eq!(
            latest.income_statement.as_ref().and_then(|income| income.eps),
            None
        );
        assert_eq!(
            latest.cash_flow.as_ref().and_then(|flow| flow.free_cash_flow),
            Some(12_685_000_000.0)
        );
    }

    #[tokio::test]
    async fn record_takes_current_price_from_newest_session() {
        let client = Arc::new(
            FunctionHttpClient::default()
                .with("OVERVIEW", OVERVIEW)
                .with("INCOME_STATEMENT", INCOME)
                .with("TIME_SERIES_DAILY_ADJUSTED", DAILY),
        );

        let record = adapter(&client)
            .fetch_record(&symbol("IBM"))
            .await
            .expect("record");

        assert_eq!(record.source, Some(ProviderId::Alphavantage));
        assert_eq!(record.current_price.as_ref().map(|point| point.close), Some(172.9));
        assert_eq!(record.historical_prices.len(), 2);
        assert_eq!(record.financial_statements.len(), 2);
        // overview, three statements, one daily series
        assert_eq!(client.urls().len(), 5);
    }

    #[tokio::test]
    async fn search_and_treasury_yield_parse() {
        let client = Arc::new(
            FunctionHttpClient::default()
                .with("SYMBOL_SEARCH", SEARCH)
                .with(
                    "TREASURY_YIELD",
                    r#"{"name":"10-Year Treasury","data":[{"date":"2024-06-28","value":"4.36"},{"date":"2024-06-27","value":"4.29"}]}"#,
                ),
        );
        let adapter = adapter(&client);

        let matches = adapter.search_symbols("ibm").await.expect("search");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].symbol, "IBM");
        assert_eq!(matches[0].match_score, Some(1.0));
        assert_eq!(matches[1].instrument_type.as_deref(), Some("ETF"));

        let indicators = adapter.fetch_market_indicators().await.expect("indicators");
        assert_eq!(indicators.treasury_yield, Some(4.36));
        assert_eq!(indicators.vix, None);
    }

    #[tokio::test]
    async fn offline_adapter_serves_compact_fixtures() {
        let adapter = AlphaVantageAdapter::offline();
        let record = adapter.fetch_record(&symbol("AAPL")).await.expect("record");

        assert_eq!(record.historical_prices.len(), COMPACT_POINTS);
        assert_eq!(record.current_price, record.historical_prices.first().cloned());
        assert!(record
            .financial_statements
            .iter()
            .all(|period| period.source == ProviderId::Alphavantage));
        assert!(adapter.health_check().await.expect("health"));
    }
}
