//! Tolerant scalar extraction from loosely typed upstream payloads.
//!
//! Providers send numbers as JSON numbers, numeric strings, `{"raw": ..}`
//! wrappers or placeholders such as `"None"` and `"-"`. Every helper maps a
//! value it cannot read to `None`; one bad field never fails a record.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{
    BalanceSheet, CashFlowStatement, FinancialStatementPeriod, IncomeStatement, PeriodType,
    ProviderId, Symbol, TradingDate,
};

pub(crate) type Payload = Map<String, Value>;

/// Writes one converted field into a typed target.
pub(crate) type NumericSetter<T> = fn(&mut T, Option<f64>);

/// Upstream field name paired with the setter for the typed field it feeds.
pub(crate) type FieldTable<T> = [(&'static str, NumericSetter<T>)];

fn is_placeholder(text: &str) -> bool {
    text.is_empty()
        || text == "-"
        || text.eq_ignore_ascii_case("none")
        || text.eq_ignore_ascii_case("n/a")
}

pub(crate) fn parse_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if is_placeholder(text) {
                None
            } else {
                text.trim_end_matches('%').parse::<f64>().ok()
            }
        }
        Value::Object(wrapper) => parse_f64(wrapper.get("raw")),
        _ => None,
    };
    parsed.filter(|value| value.is_finite())
}

pub(crate) fn parse_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(float_to_i64)),
        Value::String(text) => {
            let text = text.trim();
            if is_placeholder(text) {
                return None;
            }
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(float_to_i64))
        }
        Value::Object(wrapper) => parse_i64(wrapper.get("raw")),
        _ => None,
    }
}

fn float_to_i64(value: f64) -> Option<i64> {
    // `as` saturates; reject what would saturate.
    (value.is_finite() && value.abs() < 9.0e18).then_some(value.trunc() as i64)
}

pub(crate) fn parse_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => {
            let text = text.trim();
            (!is_placeholder(text)).then(|| text.to_owned())
        }
        Value::Object(wrapper) => parse_text(wrapper.get("fmt")),
        _ => None,
    }
}

/// Reads `YYYY-MM-DD` strings and `{"raw": <unix seconds>}` wrappers.
pub(crate) fn parse_date(value: Option<&Value>) -> Option<TradingDate> {
    match value? {
        Value::String(text) => TradingDate::parse(text).ok(),
        Value::Number(number) => number.as_i64().and_then(TradingDate::from_unix_timestamp),
        Value::Object(wrapper) => parse_date(wrapper.get("raw")),
        _ => None,
    }
}

/// Applies every entry of `table` to `target`, returning how many fields were populated.
pub(crate) fn fill<T>(target: &mut T, payload: &Payload, table: &FieldTable<T>) -> usize {
    let mut populated = 0;
    for (field, setter) in table {
        let value = parse_f64(payload.get(*field));
        if value.is_some() {
            populated += 1;
        }
        setter(target, value);
    }
    populated
}

/// Builds a typed record from `payload`, or `None` when no mapped field was present.
pub(crate) fn extract<T: Default>(payload: &Payload, table: &FieldTable<T>) -> Option<T> {
    let mut target = T::default();
    (fill(&mut target, payload, table) > 0).then_some(target)
}

/// Collects statement documents reported separately and joins them per period end.
pub(crate) struct StatementBook {
    symbol: Symbol,
    source: ProviderId,
    period_type: PeriodType,
    periods: BTreeMap<TradingDate, FinancialStatementPeriod>,
}

impl StatementBook {
    pub(crate) fn new(symbol: &Symbol, source: ProviderId, period_type: PeriodType) -> Self {
        Self {
            symbol: symbol.clone(),
            source,
            period_type,
            periods: BTreeMap::new(),
        }
    }

    fn period(&mut self, period_end: TradingDate) -> &mut FinancialStatementPeriod {
        let (symbol, source, period_type) = (&self.symbol, self.source, self.period_type);
        self.periods.entry(period_end).or_insert_with(|| {
            FinancialStatementPeriod::new(symbol.clone(), period_end, period_type, source)
        })
    }

    pub(crate) fn add_income(&mut self, period_end: TradingDate, statement: IncomeStatement) {
        self.period(period_end).income_statement = Some(statement);
    }

    pub(crate) fn add_balance_sheet(&mut self, period_end: TradingDate, sheet: BalanceSheet) {
        self.period(period_end).balance_sheet = Some(sheet);
    }

    pub(crate) fn add_cash_flow(&mut self, period_end: TradingDate, statement: CashFlowStatement) {
        self.period(period_end).cash_flow = Some(statement.with_derived_totals());
    }

    /// Periods holding at least one statement, newest first.
    pub(crate) fn into_newest_first(self) -> Vec<FinancialStatementPeriod> {
        self.periods
            .into_values()
            .rev()
            .filter(FinancialStatementPeriod::has_any_statement)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        revenue: Option<f64>,
        income: Option<f64>,
    }

    const SAMPLE_FIELDS: &FieldTable<Sample> = &[
        ("totalRevenue", |target: &mut Sample, value| target.revenue = value),
        ("netIncome", |target: &mut Sample, value| target.income = value),
    ];

    #[test]
    fn numbers_arrive_in_many_shapes() {
        assert_eq!(parse_f64(Some(&json!(1.5))), Some(1.5));
        assert_eq!(parse_f64(Some(&json!("2.25"))), Some(2.25));
        assert_eq!(parse_f64(Some(&json!({"raw": 3.0, "fmt": "3.00"}))), Some(3.0));
        assert_eq!(parse_f64(Some(&json!("0.61%"))), Some(0.61));
        assert_eq!(parse_f64(Some(&json!("None"))), None);
        assert_eq!(parse_f64(Some(&json!(""))), None);
        assert_eq!(parse_f64(Some(&json!("abc"))), None);
        assert_eq!(parse_f64(Some(&Value::Null)), None);
        assert_eq!(parse_f64(None), None);
    }

    #[test]
    fn integers_accept_float_strings() {
        assert_eq!(parse_i64(Some(&json!("164000"))), Some(164_000));
        assert_eq!(parse_i64(Some(&json!("1.2E3"))), Some(1_200));
        assert_eq!(parse_i64(Some(&json!(42.9))), Some(42));
        assert_eq!(parse_i64(Some(&json!("1e30"))), None);
        assert_eq!(parse_i64(Some(&json!({"raw": 7}))), Some(7));
    }

    #[test]
    fn dates_accept_iso_and_unix_wrappers() {
        let expected = TradingDate::from_calendar(2023, 9, 30).expect("valid date");
        assert_eq!(parse_date(Some(&json!("2023-09-30"))), Some(expected));
        assert_eq!(
            parse_date(Some(&json!({"raw": 1_696_032_000, "fmt": "2023-09-30"}))),
            Some(expected)
        );
        assert_eq!(parse_date(Some(&json!("30/09/2023"))), None);
    }

    #[test]
    fn table_extraction_skips_malformed_fields_only() {
        let payload = json!({"totalRevenue": "1000", "netIncome": "None"});
        let Value::Object(payload) = payload else {
            panic!("object literal");
        };

        let sample = extract(&payload, SAMPLE_FIELDS).expect("one field present");
        assert_eq!(
            sample,
            Sample {
                revenue: Some(1000.0),
                income: None
            }
        );

        let empty = Payload::new();
        assert_eq!(extract(&empty, SAMPLE_FIELDS), None);
    }

    #[test]
    fn statement_book_joins_documents_by_period() {
        let symbol = Symbol::parse("AAPL").expect("valid symbol");
        let older = TradingDate::from_calendar(2022, 9, 24).expect("valid date");
        let newer = TradingDate::from_calendar(2023, 9, 30).expect("valid date");

        let mut book = StatementBook::new(&symbol, ProviderId::Alphavantage, PeriodType::Annual);
        book.add_income(
            older,
            IncomeStatement {
                revenue: Some(394.0),
                ..IncomeStatement::default()
            },
        );
        book.add_cash_flow(
            newer,
            CashFlowStatement {
                operating_cash_flow: Some(110.0),
                capital_expenditures: Some(-11.0),
                ..CashFlowStatement::default()
            },
        );
        book.add_balance_sheet(newer, BalanceSheet::default());

        let periods = book.into_newest_first();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].period_end, newer);
        assert!(periods[0].balance_sheet.is_some());
        assert_eq!(
            periods[0].cash_flow.as_ref().and_then(|flow| flow.free_cash_flow),
            Some(99.0)
        );
        assert_eq!(periods[1].source, ProviderId::Alphavantage);
    }
}
