use crate::{CompanyProfile, FinancialStatementPeriod, PricePoint, QualityError, StockRecord};

use super::ensure_finite;

const HISTORY_POINTS_CHECKED: usize = 30;
const MAX_REASONABLE_PRICE: f64 = 100_000.0;
const MAX_BALANCE_IMBALANCE: f64 = 0.05;
const MAX_REASONABLE_PE: f64 = 1_000.0;
const MAX_REASONABLE_BETA: f64 = 5.0;

/// Sanity score of one price point with the reasons for each deduction.
pub(crate) fn validate_price(point: &PricePoint) -> (f64, Vec<&'static str>) {
    let mut score: f64 = 100.0;
    let mut problems = Vec::new();

    if !point.close.is_finite() {
        score -= 30.0;
        problems.push("missing close price");
    } else if point.close <= 0.0 || point.close > MAX_REASONABLE_PRICE {
        score -= 25.0;
        problems.push("unreasonable close price");
    }

    // Range checks need the full OHLC set.
    if let (Some(open), Some(high), Some(low), true) =
        (point.open, point.high, point.low, point.close.is_finite())
    {
        if open < low || open > high {
            score -= 20.0;
            problems.push("open outside the high/low range");
        }
        if point.close < low || point.close > high {
            score -= 20.0;
            problems.push("close outside the high/low range");
        }
    }

    if point.volume.is_some_and(|volume| volume < 0) {
        score -= 15.0;
        problems.push("negative volume");
    }

    (score.max(0.0), problems)
}

fn history_score(history: &[PricePoint], issues: &mut Vec<String>) -> Option<f64> {
    if history.is_empty() {
        return None;
    }
    let mut newest = history.iter().collect::<Vec<_>>();
    newest.sort_by(|left, right| right.date.cmp(&left.date));
    newest.truncate(HISTORY_POINTS_CHECKED);

    let mut total = 0.0;
    let mut flawed = 0usize;
    for point in &newest {
        let (score, problems) = validate_price(point);
        total += score;
        if !problems.is_empty() {
            flawed += 1;
        }
    }
    if flawed > 0 {
        issues.push(format!(
            "Historical price validation issues: {flawed} of {} recent points failed checks",
            newest.len()
        ));
    }
    Some(total / newest.len() as f64)
}

fn current_price_score(point: &PricePoint, issues: &mut Vec<String>) -> f64 {
    let (score, problems) = validate_price(point);
    issues.extend(
        problems
            .into_iter()
            .map(|problem| format!("Current price: {problem}")),
    );
    score
}

fn statement_score(statement: &FinancialStatementPeriod, issues: &mut Vec<String>) -> f64 {
    let period = statement.period_end;
    if !statement.has_any_statement() {
        issues.push(format!("Empty financial statement for period {period}"));
        return 0.0;
    }

    let mut score: f64 = 100.0;
    if let Some(revenue) = statement
        .income_statement
        .as_ref()
        .and_then(|income| income.revenue)
    {
        if revenue < 0.0 {
            score -= 20.0;
            issues.push(format!("Negative revenue in period {period}"));
        }
    }
    if let Some(ratio) = statement
        .balance_sheet
        .as_ref()
        .and_then(|sheet| sheet.imbalance_ratio())
    {
        if ratio > MAX_BALANCE_IMBALANCE {
            score -= 30.0;
            issues.push(format!(
                "Balance sheet does not balance in period {period} ({:.1}% gap)",
                ratio * 100.0
            ));
        }
    }
    score.max(0.0)
}

fn profile_score(profile: &CompanyProfile, issues: &mut Vec<String>) -> f64 {
    let mut score: f64 = 100.0;

    if profile
        .name
        .as_ref()
        .is_none_or(|name| name.trim().is_empty())
    {
        score -= 30.0;
        issues.push(String::from("Company name is missing"));
    }
    if profile.market_cap.is_some_and(|cap| cap <= 0.0) {
        score -= 20.0;
        issues.push(String::from("Market cap is not positive"));
    }
    if let Some(pe) = profile.trailing_pe {
        if !(pe > 0.0 && pe <= MAX_REASONABLE_PE) {
            score -= 15.0;
            issues.push(format!("Unreasonable P/E ratio: {pe}"));
        }
    }
    if let Some(beta) = profile.beta {
        if beta.abs() > MAX_REASONABLE_BETA {
            score -= 10.0;
            issues.push(format!("Unreasonable beta: {beta}"));
        }
    }
    score.max(0.0)
}

/// Mean of the sanity sub-scores that have data to check.
pub(crate) fn score(record: &StockRecord, issues: &mut Vec<String>) -> Result<f64, QualityError> {
    let mut scores = Vec::with_capacity(4);

    if let Some(score) = history_score(&record.historical_prices, issues) {
        scores.push(score);
    }
    if let Some(point) = &record.current_price {
        scores.push(current_price_score(point, issues));
    }
    if !record.financial_statements.is_empty() {
        let total: f64 = record
            .financial_statements
            .iter()
            .map(|statement| statement_score(statement, issues))
            .sum();
        scores.push(total / record.financial_statements.len() as f64);
    }
    if let Some(profile) = &record.profile {
        scores.push(profile_score(profile, issues));
    }

    if scores.is_empty() {
        issues.push(String::from("No data available for accuracy checks"));
        return Ok(0.0);
    }
    ensure_finite("accuracy", scores.iter().sum::<f64>() / scores.len() as f64)
}
