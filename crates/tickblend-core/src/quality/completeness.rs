use crate::{QualityError, StockRecord, UtcDateTime};

use super::ensure_finite;

const PROFILE_FIELDS: usize = 7;
const PRICE_FIELDS: usize = 5;
const FULL_HISTORY_POINTS: usize = 30;
const PARTIAL_HISTORY_POINTS: usize = 7;
const RECENT_STATEMENT_DAYS: i64 = 730;
const STATEMENT_PERIODS_CHECKED: usize = 2;

#[derive(Default)]
struct Tally {
    populated: usize,
    expected: usize,
}

impl Tally {
    fn field(&mut self, present: bool, missing: impl FnOnce() -> String, issues: &mut Vec<String>) {
        self.expected += 1;
        if present {
            self.populated += 1;
        } else {
            issues.push(missing());
        }
    }
}

fn has_text(value: Option<&String>) -> bool {
    value.is_some_and(|text| !text.trim().is_empty())
}

/// Share of expected fields that are populated, in percent.
pub(crate) fn score(
    record: &StockRecord,
    now: UtcDateTime,
    issues: &mut Vec<String>,
) -> Result<f64, QualityError> {
    let mut tally = Tally::default();

    match &record.profile {
        Some(profile) => {
            let fields = [
                ("company name", has_text(profile.name.as_ref())),
                ("sector", has_text(profile.sector.as_ref())),
                ("industry", has_text(profile.industry.as_ref())),
                ("market cap", profile.market_cap.is_some()),
                ("P/E ratio", profile.trailing_pe.is_some()),
                ("beta", profile.beta.is_some()),
                ("description", has_text(profile.description.as_ref())),
            ];
            for (name, present) in fields {
                tally.field(present, || format!("Missing company {name}"), issues);
            }
        }
        None => {
            tally.expected += PROFILE_FIELDS;
            issues.push(String::from("Missing company profile"));
        }
    }

    match &record.current_price {
        Some(price) => {
            let fields = [
                ("open", price.open.is_some()),
                ("high", price.high.is_some()),
                ("low", price.low.is_some()),
                ("close", price.close.is_finite()),
                ("volume", price.volume.is_some()),
            ];
            for (name, present) in fields {
                tally.field(present, || format!("Missing current {name} price"), issues);
            }
        }
        None => {
            tally.expected += PRICE_FIELDS;
            issues.push(String::from("Missing current price data"));
        }
    }

    let history_len = record.historical_prices.len();
    tally.expected += 2;
    if history_len >= FULL_HISTORY_POINTS {
        tally.populated += 2;
    } else if history_len >= PARTIAL_HISTORY_POINTS {
        tally.populated += 1;
        issues.push(format!("Limited historical data: {history_len} points"));
    } else {
        issues.push(format!("Insufficient historical data: {history_len} points"));
    }

    if record.financial_statements.is_empty() {
        tally.expected += 2 + 3 * STATEMENT_PERIODS_CHECKED;
        issues.push(String::from("Missing financial statements"));
    } else {
        let today = now.date();
        let mut recent = record
            .financial_statements
            .iter()
            .filter(|statement| statement.period_end.days_until(today) <= RECENT_STATEMENT_DAYS)
            .collect::<Vec<_>>();
        recent.sort_by(|left, right| right.period_end.cmp(&left.period_end));

        tally.expected += 2;
        match recent.len() {
            0 => issues.push(String::from("No financial statements from the last two years")),
            1 => {
                tally.populated += 1;
                issues.push(String::from("Limited financial statement history"));
            }
            _ => tally.populated += 2,
        }

        for statement in recent.iter().take(STATEMENT_PERIODS_CHECKED) {
            let period = statement.period_end;
            let parts = [
                ("income statement", statement.income_statement.is_some()),
                ("balance sheet", statement.balance_sheet.is_some()),
                ("cash flow statement", statement.cash_flow.is_some()),
            ];
            for (name, present) in parts {
                tally.field(present, || format!("Missing {name} for period {period}"), issues);
            }
        }
    }

    let ratio = tally.populated as f64 / tally.expected as f64;
    ensure_finite("completeness", ratio * 100.0)
}
