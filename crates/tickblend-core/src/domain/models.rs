use serde::{Deserialize, Serialize};

use crate::{ProviderId, QualityReport, Symbol, TradingDate, UtcDateTime};

/// One daily price observation.
///
/// Values are stored as received from the provider; range and sign checks are
/// scored by the quality assessor instead of being rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: Symbol,
    pub date: TradingDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub adjusted_close: Option<f64>,
    pub volume: Option<i64>,
}

impl PricePoint {
    pub fn new(symbol: Symbol, date: TradingDate, close: f64) -> Self {
        Self {
            symbol,
            date,
            open: None,
            high: None,
            low: None,
            close,
            adjusted_close: None,
            volume: None,
        }
    }

    pub fn with_ohlc(mut self, open: Option<f64>, high: Option<f64>, low: Option<f64>) -> Self {
        self.open = open;
        self.high = high;
        self.low = low;
        self
    }

    pub fn with_adjusted_close(mut self, adjusted_close: Option<f64>) -> Self {
        self.adjusted_close = adjusted_close;
        self
    }

    pub fn with_volume(mut self, volume: Option<i64>) -> Self {
        self.volume = volume;
        self
    }
}

/// Descriptive and valuation data for a listed company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: Option<Symbol>,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub beta: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub employees: Option<i64>,
}

impl CompanyProfile {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol: Some(symbol),
            ..Self::default()
        }
    }

    /// Drops negative size figures, which no provider reports legitimately.
    pub fn sanitize(mut self) -> Self {
        self.market_cap = self.market_cap.filter(|value| *value >= 0.0);
        self.enterprise_value = self.enterprise_value.filter(|value| *value >= 0.0);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Annual,
    Quarterly,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub revenue: Option<f64>,
    pub cost_of_revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_expenses: Option<f64>,
    pub operating_income: Option<f64>,
    pub interest_expense: Option<f64>,
    pub income_before_tax: Option<f64>,
    pub income_tax_expense: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
}

impl IncomeStatement {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub total_assets: Option<f64>,
    pub current_assets: Option<f64>,
    pub cash_and_equivalents: Option<f64>,
    pub inventory: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub long_term_debt: Option<f64>,
    pub shareholders_equity: Option<f64>,
    pub retained_earnings: Option<f64>,
}

impl BalanceSheet {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Relative gap between assets and liabilities plus equity, when all three are known.
    pub fn imbalance_ratio(&self) -> Option<f64> {
        let assets = self.total_assets.filter(|value| *value != 0.0)?;
        let liabilities = self.total_liabilities?;
        let equity = self.shareholders_equity?;
        Some((assets - (liabilities + equity)).abs() / assets.abs())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub operating_cash_flow: Option<f64>,
    pub investing_cash_flow: Option<f64>,
    pub financing_cash_flow: Option<f64>,
    pub capital_expenditures: Option<f64>,
    pub depreciation: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub net_cash_flow: Option<f64>,
}

impl CashFlowStatement {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fills the derived totals from raw lines. Missing inputs leave the total unset.
    ///
    /// Providers disagree on the sign of capital expenditures, so its magnitude
    /// is always subtracted.
    pub fn with_derived_totals(mut self) -> Self {
        self.free_cash_flow = match (self.operating_cash_flow, self.capital_expenditures) {
            (Some(operating), Some(capex)) => Some(operating - capex.abs()),
            _ => None,
        };
        self.net_cash_flow = match (
            self.operating_cash_flow,
            self.investing_cash_flow,
            self.financing_cash_flow,
        ) {
            (Some(operating), Some(investing), Some(financing)) => {
                Some(operating + investing + financing)
            }
            _ => None,
        };
        self
    }
}

/// Statements reported for one fiscal period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatementPeriod {
    pub symbol: Symbol,
    pub period_end: TradingDate,
    pub period_type: PeriodType,
    pub income_statement: Option<IncomeStatement>,
    pub balance_sheet: Option<BalanceSheet>,
    pub cash_flow: Option<CashFlowStatement>,
    pub source: ProviderId,
    pub retrieved_at: UtcDateTime,
}

impl FinancialStatementPeriod {
    pub fn new(
        symbol: Symbol,
        period_end: TradingDate,
        period_type: PeriodType,
        source: ProviderId,
    ) -> Self {
        Self {
            symbol,
            period_end,
            period_type,
            income_statement: None,
            balance_sheet: None,
            cash_flow: None,
            source,
            retrieved_at: UtcDateTime::now(),
        }
    }

    pub fn has_any_statement(&self) -> bool {
        self.income_statement.is_some() || self.balance_sheet.is_some() || self.cash_flow.is_some()
    }
}

/// Everything known about one symbol, blended from a single provider.
///
/// This is the unit cached by the orchestrator and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub symbol: Symbol,
    pub source: Option<ProviderId>,
    pub profile: Option<CompanyProfile>,
    pub current_price: Option<PricePoint>,
    /// Daily history, newest first.
    pub historical_prices: Vec<PricePoint>,
    /// Statement periods, newest first.
    pub financial_statements: Vec<FinancialStatementPeriod>,
    pub quality: Option<QualityReport>,
    pub last_updated: UtcDateTime,
}

impl StockRecord {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            source: None,
            profile: None,
            current_price: None,
            historical_prices: Vec::new(),
            financial_statements: Vec::new(),
            quality: None,
            last_updated: UtcDateTime::now(),
        }
    }

    pub fn with_source(mut self, source: ProviderId) -> Self {
        self.source = Some(source);
        self
    }

    /// True when at least one data section was populated.
    pub fn has_data(&self) -> bool {
        self.profile.is_some()
            || self.current_price.is_some()
            || !self.historical_prices.is_empty()
            || !self.financial_statements.is_empty()
    }

    /// Orders history and statements newest first.
    pub fn normalize_order(mut self) -> Self {
        self.historical_prices
            .sort_by(|left, right| right.date.cmp(&left.date));
        self.financial_statements
            .sort_by(|left, right| right.period_end.cmp(&left.period_end));
        self
    }
}

/// One instrument returned by a symbol search.
///
/// The symbol is kept verbatim because search endpoints list foreign tickers
/// that are not valid [`Symbol`] values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: Option<String>,
    pub instrument_type: Option<String>,
    pub exchange: Option<String>,
    pub region: Option<String>,
    pub currency: Option<String>,
    pub match_score: Option<f64>,
    pub source: ProviderId,
}

/// Market-wide figures a single provider can contribute to a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketIndicators {
    pub sp500_change_percent: Option<f64>,
    pub vix: Option<f64>,
    /// Ten-year treasury yield in percent.
    pub treasury_yield: Option<f64>,
}

impl MarketIndicators {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Keeps existing values and fills the gaps from `other`.
    pub fn merge(&mut self, other: MarketIndicators) {
        self.sp500_change_percent = self.sp500_change_percent.or(other.sp500_change_percent);
        self.vix = self.vix.or(other.vix);
        self.treasury_yield = self.treasury_yield.or(other.treasury_yield);
    }
}

/// Historical equity premium used when no forward-looking estimate is available.
pub const DEFAULT_MARKET_RISK_PREMIUM: f64 = 0.06;

/// Market-wide conditions used as valuation inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub date: TradingDate,
    /// Decimal fraction, e.g. `0.043` for 4.3%.
    pub risk_free_rate: Option<f64>,
    pub market_risk_premium: f64,
    /// Decimal fraction of the S&P 500 daily move.
    pub sp500_return: Option<f64>,
    pub vix: Option<f64>,
    pub sources: Vec<ProviderId>,
    pub last_updated: UtcDateTime,
}

impl MarketSnapshot {
    pub fn from_indicators(indicators: &MarketIndicators, sources: Vec<ProviderId>) -> Self {
        let now = UtcDateTime::now();
        Self {
            date: now.date(),
            risk_free_rate: indicators.treasury_yield.map(|value| value / 100.0),
            market_risk_premium: DEFAULT_MARKET_RISK_PREMIUM,
            sp500_return: indicators.sp500_change_percent.map(|value| value / 100.0),
            vix: indicators.vix,
            sources,
            last_updated: now,
        }
    }
}
