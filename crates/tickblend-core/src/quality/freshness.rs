use crate::{QualityError, StockRecord, UtcDateTime};

use super::ensure_finite;

/// Score below which a stale section is reported as an issue.
const STALE_ISSUE_BELOW: f64 = 60.0;

fn current_price_score(age_days: i64) -> f64 {
    match age_days {
        i64::MIN..=0 => 100.0,
        1 => 90.0,
        2..=3 => 70.0,
        4..=7 => 50.0,
        _ => 20.0,
    }
}

fn history_score(age_days: i64) -> f64 {
    match age_days {
        i64::MIN..=1 => 100.0,
        2..=3 => 80.0,
        4..=7 => 60.0,
        _ => 30.0,
    }
}

fn statement_score(age_days: i64) -> f64 {
    match age_days {
        i64::MIN..=90 => 100.0,
        91..=180 => 80.0,
        181..=365 => 60.0,
        366..=730 => 40.0,
        _ => 20.0,
    }
}

fn record_age_score(age_hours: f64) -> f64 {
    if age_hours <= 1.0 {
        100.0
    } else if age_hours <= 6.0 {
        90.0
    } else if age_hours <= 24.0 {
        70.0
    } else if age_hours <= 72.0 {
        50.0
    } else {
        30.0
    }
}

/// Mean of four age staircases. Absent sections contribute zero.
pub(crate) fn score(
    record: &StockRecord,
    now: UtcDateTime,
    issues: &mut Vec<String>,
) -> Result<f64, QualityError> {
    let today = now.date();

    let current = match &record.current_price {
        Some(price) => {
            let age = price.date.days_until(today);
            let score = current_price_score(age);
            if score < STALE_ISSUE_BELOW {
                issues.push(format!("Current price is {age} days old"));
            }
            score
        }
        None => 0.0,
    };

    let history = match record.historical_prices.iter().map(|point| point.date).max() {
        Some(newest) => {
            let age = newest.days_until(today);
            let score = history_score(age);
            if score < STALE_ISSUE_BELOW {
                issues.push(format!("Latest historical price is {age} days old"));
            }
            score
        }
        None => 0.0,
    };

    let statements = match record
        .financial_statements
        .iter()
        .map(|statement| statement.period_end)
        .max()
    {
        Some(newest) => {
            let age = newest.days_until(today);
            let score = statement_score(age);
            if score < STALE_ISSUE_BELOW {
                issues.push(format!("Latest financial statement is {age} days old"));
            }
            score
        }
        None => 0.0,
    };

    let age_hours = now.hours_since(record.last_updated);
    if !age_hours.is_finite() {
        return Err(QualityError::NonFinite {
            dimension: "freshness",
        });
    }
    let overall = record_age_score(age_hours);
    if overall < STALE_ISSUE_BELOW {
        issues.push(format!("Record last updated {age_hours:.0} hours ago"));
    }

    ensure_finite("freshness", (current + history + statements + overall) / 4.0)
}
