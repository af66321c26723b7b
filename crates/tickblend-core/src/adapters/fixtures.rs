//! Deterministic offline data.
//!
//! Adapters built on a mock transport serve these values instead of calling
//! upstream. Everything is derived from the symbol and today's date, so two
//! runs on the same day agree. Symbols outside [`CATALOG`] are unknown.

use crate::{
    BalanceSheet, CashFlowStatement, CompanyProfile, FinancialStatementPeriod, HistoryRange,
    IncomeStatement, MarketIndicators, PeriodType, PricePoint, ProviderId, Symbol, SymbolMatch,
    TradingDate,
};

pub(crate) struct CatalogEntry {
    pub symbol: &'static str,
    pub name: &'static str,
    pub sector: Option<&'static str>,
    pub industry: Option<&'static str>,
    pub exchange: &'static str,
    pub instrument_type: &'static str,
    pub base_price: f64,
}

impl CatalogEntry {
    fn is_equity(&self) -> bool {
        self.instrument_type == "EQUITY"
    }
}

const fn equity(
    symbol: &'static str,
    name: &'static str,
    sector: &'static str,
    industry: &'static str,
    exchange: &'static str,
    base_price: f64,
) -> CatalogEntry {
    CatalogEntry {
        symbol,
        name,
        sector: Some(sector),
        industry: Some(industry),
        exchange,
        instrument_type: "EQUITY",
        base_price,
    }
}

const fn listed(
    symbol: &'static str,
    name: &'static str,
    exchange: &'static str,
    instrument_type: &'static str,
    base_price: f64,
) -> CatalogEntry {
    CatalogEntry {
        symbol,
        name,
        sector: None,
        industry: None,
        exchange,
        instrument_type,
        base_price,
    }
}

pub(crate) const CATALOG: &[CatalogEntry] = &[
    equity("AAPL", "Apple Inc.", "Technology", "Consumer Electronics", "NMS", 185.0),
    equity("MSFT", "Microsoft Corporation", "Technology", "Software - Infrastructure", "NMS", 410.0),
    equity("GOOGL", "Alphabet Inc.", "Communication Services", "Internet Content & Information", "NMS", 150.0),
    equity("AMZN", "Amazon.com, Inc.", "Consumer Cyclical", "Internet Retail", "NMS", 180.0),
    equity("NVDA", "NVIDIA Corporation", "Technology", "Semiconductors", "NMS", 120.0),
    equity("JPM", "JPMorgan Chase & Co.", "Financial Services", "Banks - Diversified", "NYQ", 200.0),
    listed("SPY", "SPDR S&P 500 ETF Trust", "PCX", "ETF", 520.0),
    listed("QQQ", "Invesco QQQ Trust", "NMS", "ETF", 440.0),
    listed("^GSPC", "S&P 500", "SNP", "INDEX", 5_200.0),
    listed("^VIX", "CBOE Volatility Index", "CXI", "INDEX", 15.0),
    listed("^TNX", "CBOE Interest Rate 10 Year T No", "CXI", "INDEX", 4.2),
];

/// Sessions served for an unbounded range.
const MAX_RANGE_SESSIONS: usize = 2_520;

pub(crate) fn entry(symbol: &Symbol) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|entry| entry.symbol == symbol.as_str())
}

pub(crate) fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol.as_str().bytes().fold(0_u64, |acc, byte| {
        acc.wrapping_mul(33).wrapping_add(u64::from(byte))
    })
}

fn shares_outstanding(seed: u64) -> f64 {
    1_000_000_000.0 + (seed % 15) as f64 * 500_000_000.0
}

pub(crate) fn profile(symbol: &Symbol) -> Option<CompanyProfile> {
    let entry = entry(symbol)?;
    let mut profile = CompanyProfile {
        name: Some(entry.name.to_owned()),
        ..CompanyProfile::new(symbol.clone())
    };
    if !entry.is_equity() {
        return Some(profile);
    }

    let seed = symbol_seed(symbol);
    let market_cap = entry.base_price * shares_outstanding(seed);
    let trailing_pe = 15.0 + (seed % 250) as f64 / 10.0;
    profile.sector = entry.sector.map(str::to_owned);
    profile.industry = entry.industry.map(str::to_owned);
    profile.market_cap = Some(market_cap);
    profile.enterprise_value = Some(market_cap * 1.05);
    profile.trailing_pe = Some(trailing_pe);
    profile.forward_pe = Some(trailing_pe * 0.9);
    profile.peg_ratio = Some(1.0 + (seed % 30) as f64 / 10.0);
    profile.price_to_book = Some(2.0 + (seed % 100) as f64 / 10.0);
    profile.price_to_sales = Some(3.0 + (seed % 60) as f64 / 10.0);
    profile.beta = Some(0.8 + (seed % 90) as f64 / 100.0);
    profile.dividend_yield = Some(0.004 + (seed % 30) as f64 / 1_000.0);
    profile.description = entry
        .industry
        .map(|industry| format!("{} operates in the {industry} industry.", entry.name));
    profile.website = Some(format!(
        "https://www.{}.com",
        symbol.as_str().to_ascii_lowercase()
    ));
    profile.employees = i64::try_from(10_000 + seed % 150_000).ok();
    Some(profile)
}

/// Daily sessions ending at the last weekday on or before `today`, newest first.
pub(crate) fn history(symbol: &Symbol, range: HistoryRange, today: TradingDate) -> Vec<PricePoint> {
    let Some(entry) = entry(symbol) else {
        return Vec::new();
    };
    let seed = symbol_seed(symbol);
    let sessions = range.trading_days().unwrap_or(MAX_RANGE_SESSIONS);
    let phase = (seed % 17) as f64;

    let mut points = Vec::with_capacity(sessions);
    let mut date = today;
    let mut index = 0usize;
    while points.len() < sessions {
        if date.is_weekend() {
            date = date.minus_days(1);
            continue;
        }
        let wave = (phase + index as f64 * 0.21).sin();
        let close = entry.base_price * (1.0 + 0.03 * wave);
        let open = close * (1.0 - 0.004 * (phase + index as f64).cos());
        let high = open.max(close) * 1.008;
        let low = open.min(close) * 0.992;
        let volume = i64::try_from(1_000_000 + (seed + index as u64 * 7_919) % 500_000).ok();

        points.push(
            PricePoint::new(symbol.clone(), date, close)
                .with_ohlc(Some(open), Some(high), Some(low))
                .with_adjusted_close(Some(close))
                .with_volume(volume),
        );
        date = date.minus_days(1);
        index += 1;
    }
    points
}

pub(crate) fn current_price(symbol: &Symbol, today: TradingDate) -> Option<PricePoint> {
    history(symbol, HistoryRange::OneMonth, today).into_iter().next()
}

/// Four annual periods ending on December 31 of the previous years, newest first.
pub(crate) fn statements(
    symbol: &Symbol,
    source: ProviderId,
    today: TradingDate,
) -> Vec<FinancialStatementPeriod> {
    let Some(entry) = entry(symbol) else {
        return Vec::new();
    };
    if !entry.is_equity() {
        return Vec::new();
    }

    let seed = symbol_seed(symbol);
    let shares = shares_outstanding(seed);
    let latest_revenue = 50_000_000_000.0 + (seed % 300) as f64 * 1_000_000_000.0;
    let year = today.into_inner().year();

    (1..=4)
        .filter_map(|years_back| {
            let period_end = TradingDate::from_calendar(year - years_back, 12, 31).ok()?;
            let revenue = latest_revenue * (1.0 - 0.06 * f64::from(years_back - 1));
            let net_income = revenue * 0.22;
            let assets = revenue * 1.4;

            let mut period =
                FinancialStatementPeriod::new(symbol.clone(), period_end, PeriodType::Annual, source);
            period.income_statement = Some(IncomeStatement {
                revenue: Some(revenue),
                cost_of_revenue: Some(revenue * 0.58),
                gross_profit: Some(revenue * 0.42),
                operating_expenses: Some(revenue * 0.15),
                operating_income: Some(revenue * 0.27),
                interest_expense: Some(revenue * 0.01),
                income_before_tax: Some(revenue * 0.26),
                income_tax_expense: Some(revenue * 0.04),
                net_income: Some(net_income),
                eps: Some(net_income / shares),
            });
            period.balance_sheet = Some(BalanceSheet {
                total_assets: Some(assets),
                current_assets: Some(assets * 0.4),
                cash_and_equivalents: Some(assets * 0.1),
                inventory: Some(assets * 0.02),
                total_liabilities: Some(assets * 0.8),
                current_liabilities: Some(assets * 0.3),
                long_term_debt: Some(assets * 0.25),
                shareholders_equity: Some(assets * 0.2),
                retained_earnings: Some(assets * 0.05),
            });
            period.cash_flow = Some(
                CashFlowStatement {
                    operating_cash_flow: Some(revenue * 0.3),
                    investing_cash_flow: Some(revenue * -0.1),
                    financing_cash_flow: Some(revenue * -0.15),
                    capital_expenditures: Some(revenue * -0.04),
                    depreciation: Some(revenue * 0.03),
                    ..CashFlowStatement::default()
                }
                .with_derived_totals(),
            );
            Some(period)
        })
        .collect()
}

/// Case-insensitive substring match on symbol and name.
pub(crate) fn search(query: &str, source: ProviderId) -> Vec<SymbolMatch> {
    let needle = query.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    CATALOG
        .iter()
        .filter(|entry| {
            entry.symbol.to_ascii_lowercase().contains(&needle)
                || entry.name.to_ascii_lowercase().contains(&needle)
        })
        .map(|entry| SymbolMatch {
            symbol: entry.symbol.to_owned(),
            name: Some(entry.name.to_owned()),
            instrument_type: Some(entry.instrument_type.to_owned()),
            exchange: Some(entry.exchange.to_owned()),
            region: Some(String::from("United States")),
            currency: Some(String::from("USD")),
            match_score: Some(if entry.symbol.eq_ignore_ascii_case(&needle) {
                1.0
            } else {
                0.5
            }),
            source,
        })
        .collect()
}

fn latest_close(symbol: &str, today: TradingDate) -> Option<PricePoint> {
    Symbol::parse(symbol)
        .ok()
        .and_then(|symbol| current_price(&symbol, today))
}

/// Indicators derived from the index fixtures.
pub(crate) fn market_indicators(today: TradingDate) -> MarketIndicators {
    let sp500_change_percent = latest_close("^GSPC", today).and_then(|point| {
        let open = point.open.filter(|open| *open != 0.0)?;
        Some((point.close - open) / open * 100.0)
    });
    MarketIndicators {
        sp500_change_percent,
        vix: latest_close("^VIX", today).map(|point| point.close),
        treasury_yield: latest_close("^TNX", today).map(|point| point.close),
    }
}
