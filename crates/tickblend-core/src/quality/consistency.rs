use std::collections::BTreeSet;

use crate::{QualityError, StockRecord, TradingDate};

use super::ensure_finite;

const GAP_WINDOW: usize = 30;
const MAX_GAP_DAYS: i64 = 3;
const OUTLIER_MIN_HISTORY: usize = 10;
const OUTLIER_MIN_CLOSES: usize = 5;
const OUTLIER_SIGMAS: f64 = 3.0;

fn symbol_score(record: &StockRecord, issues: &mut Vec<String>) -> f64 {
    let mut seen = BTreeSet::new();
    seen.insert(record.symbol.as_str());
    if let Some(symbol) = record.profile.as_ref().and_then(|profile| profile.symbol.as_ref()) {
        seen.insert(symbol.as_str());
    }
    if let Some(point) = &record.current_price {
        seen.insert(point.symbol.as_str());
    }
    seen.extend(record.historical_prices.iter().take(5).map(|point| point.symbol.as_str()));
    seen.extend(
        record
            .financial_statements
            .iter()
            .take(3)
            .map(|statement| statement.symbol.as_str()),
    );

    if seen.len() == 1 {
        return 100.0;
    }
    let listed = seen.into_iter().collect::<Vec<_>>().join(", ");
    issues.push(format!("Inconsistent symbols across sections: {listed}"));
    50.0
}

fn gap_score(record: &StockRecord, issues: &mut Vec<String>) -> Option<f64> {
    if record.historical_prices.len() < 2 {
        return None;
    }
    let mut dates = record
        .historical_prices
        .iter()
        .map(|point| point.date)
        .collect::<Vec<TradingDate>>();
    dates.sort_unstable_by(|left, right| right.cmp(left));
    dates.truncate(GAP_WINDOW);

    let gaps = dates
        .windows(2)
        .filter(|pair| pair[1].days_until(pair[0]) > MAX_GAP_DAYS)
        .count();

    Some(match gaps {
        0 => 100.0,
        1..=2 => {
            issues.push(format!("Found {gaps} gaps in recent price history"));
            80.0
        }
        _ => {
            issues.push(format!("Found {gaps} gaps in recent price history"));
            60.0
        }
    })
}

fn interval_score(record: &StockRecord, issues: &mut Vec<String>) -> Option<f64> {
    if record.financial_statements.len() < 2 {
        return None;
    }
    let mut periods = record
        .financial_statements
        .iter()
        .map(|statement| statement.period_end)
        .collect::<Vec<_>>();
    periods.sort_unstable();

    let spans = periods
        .windows(2)
        .map(|pair| pair[0].days_until(pair[1]))
        .collect::<Vec<_>>();
    let average = spans.iter().sum::<i64>() as f64 / spans.len() as f64;

    let regular = (80.0..=100.0).contains(&average)
        || (160.0..=200.0).contains(&average)
        || (350.0..=380.0).contains(&average);
    if regular {
        Some(100.0)
    } else {
        issues.push(format!(
            "Irregular financial statement intervals: {average:.0} days on average"
        ));
        Some(70.0)
    }
}

fn outlier_score(record: &StockRecord, issues: &mut Vec<String>) -> Result<Option<f64>, QualityError> {
    if record.historical_prices.len() <= OUTLIER_MIN_HISTORY {
        return Ok(None);
    }
    let mut newest = record.historical_prices.iter().collect::<Vec<_>>();
    newest.sort_by(|left, right| right.date.cmp(&left.date));
    let closes = newest
        .into_iter()
        .take(GAP_WINDOW)
        .map(|point| point.close)
        .filter(|close| close.is_finite())
        .collect::<Vec<_>>();
    if closes.len() <= OUTLIER_MIN_CLOSES {
        return Ok(None);
    }

    let count = closes.len() as f64;
    let mean = closes.iter().sum::<f64>() / count;
    let variance = closes.iter().map(|close| (close - mean).powi(2)).sum::<f64>() / (count - 1.0);
    let deviation = variance.sqrt();
    if !deviation.is_finite() {
        return Err(QualityError::Invalid {
            dimension: "consistency",
            reason: String::from("price deviation overflowed"),
        });
    }
    if deviation == 0.0 {
        return Ok(Some(100.0));
    }

    let outliers = closes
        .iter()
        .filter(|close| (**close - mean).abs() > OUTLIER_SIGMAS * deviation)
        .count();
    let ratio = outliers as f64 / count;
    let score = if ratio <= 0.05 {
        100.0
    } else if ratio <= 0.10 {
        80.0
    } else {
        60.0
    };
    if outliers > 0 {
        issues.push(format!(
            "{outliers} price outliers beyond three standard deviations"
        ));
    }
    Ok(Some(score))
}

/// Mean of the cross-section checks that have enough data to run.
pub(crate) fn score(record: &StockRecord, issues: &mut Vec<String>) -> Result<f64, QualityError> {
    let mut scores = vec![symbol_score(record, issues)];
    scores.extend(gap_score(record, issues));
    scores.extend(interval_score(record, issues));
    scores.extend(outlier_score(record, issues)?);

    ensure_finite("consistency", scores.iter().sum::<f64>() / scores.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinancialStatementPeriod, PeriodType, PricePoint, ProviderId, Symbol};

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    fn start() -> TradingDate {
        TradingDate::from_calendar(2024, 6, 28).expect("valid date")
    }

    fn daily_history(closes: &[f64]) -> Vec<PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(offset, close)| {
                PricePoint::new(symbol("AAPL"), start().minus_days(offset as i64), *close)
            })
            .collect()
    }

    #[test]
    fn bare_record_is_consistent() {
        let mut issues = Vec::new();
        let score = score(&StockRecord::new(symbol("AAPL")), &mut issues).expect("scores");
        assert_eq!(score, 100.0);
        assert!(issues.is_empty());
    }

    #[test]
    fn mixed_symbols_halve_the_symbol_check() {
        let mut record = StockRecord::new(symbol("AAPL"));
        record.current_price = Some(PricePoint::new(symbol("MSFT"), start(), 1.0));

        let mut issues = Vec::new();
        assert_eq!(symbol_score(&record, &mut issues), 50.0);
        assert_eq!(issues, vec!["Inconsistent symbols across sections: AAPL, MSFT"]);
    }

    #[test]
    fn gaps_over_three_days_are_counted() {
        let mut record = StockRecord::new(symbol("AAPL"));
        record.historical_prices = vec![
            PricePoint::new(symbol("AAPL"), start(), 1.0),
            PricePoint::new(symbol("AAPL"), start().minus_days(3), 1.0),
            PricePoint::new(symbol("AAPL"), start().minus_days(10), 1.0),
        ];

        let mut issues = Vec::new();
        assert_eq!(gap_score(&record, &mut issues), Some(80.0));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn quarterly_and_annual_spacing_is_regular() {
        let statement = |days: i64| {
            FinancialStatementPeriod::new(
                symbol("AAPL"),
                start().minus_days(days),
                PeriodType::Quarterly,
                ProviderId::Alphavantage,
            )
        };
        let mut record = StockRecord::new(symbol("AAPL"));
        record.financial_statements = vec![statement(0), statement(91), statement(182)];
        let mut issues = Vec::new();
        assert_eq!(interval_score(&record, &mut issues), Some(100.0));

        record.financial_statements = vec![statement(0), statement(40)];
        assert_eq!(interval_score(&record, &mut issues), Some(70.0));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn single_spike_in_flat_series_is_an_outlier() {
        let mut closes = vec![100.0; 29];
        closes.push(1_000.0);
        let mut record = StockRecord::new(symbol("AAPL"));
        record.historical_prices = daily_history(&closes);

        let mut issues = Vec::new();
        let score = outlier_score(&record, &mut issues).expect("computes");

        assert_eq!(score, Some(100.0));
        assert_eq!(issues, vec!["1 price outliers beyond three standard deviations"]);
    }

    #[test]
    fn short_history_skips_outlier_check() {
        let mut record = StockRecord::new(symbol("AAPL"));
        record.historical_prices = daily_history(&[1.0, 2.0, 3.0]);
        let mut issues = Vec::new();
        assert_eq!(outlier_score(&record, &mut issues).expect("computes"), None);
    }
}
