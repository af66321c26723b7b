//! Record quality scoring.
//!
//! Four dimensions are scored independently on `[0, 100]`:
//!
//! | Dimension | Weight | Measures |
//! |-----------|--------|----------|
//! | completeness | 0.4 | populated fields across every section |
//! | freshness | 0.3 | age of prices, statements and the record itself |
//! | accuracy | 0.2 | OHLC ranges, statement sanity, profile ratios |
//! | consistency | 0.1 | symbols, price gaps, statement spacing, outliers |
//!
//! A dimension that cannot be evaluated scores zero and leaves an issue
//! behind; the others are unaffected.

mod accuracy;
mod completeness;
mod consistency;
mod freshness;
mod grading;

pub use grading::{QualityGrade, QualitySummary};

use tracing::{debug, warn};

use crate::{DataType, ProviderId, QualityError, QualityReport, StockRecord, UtcDateTime};

/// Relative weights of the four dimensions. They should sum to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityWeights {
    pub completeness: f64,
    pub freshness: f64,
    pub accuracy: f64,
    pub consistency: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.4,
            freshness: 0.3,
            accuracy: 0.2,
            consistency: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityAssessor {
    weights: QualityWeights,
}

impl QualityAssessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: QualityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> QualityWeights {
        self.weights
    }

    pub fn assess(&self, record: &StockRecord, source: ProviderId) -> QualityReport {
        self.assess_at(record, source, UtcDateTime::now())
    }

    /// Scores `record` as of `now`.
    pub fn assess_at(
        &self,
        record: &StockRecord,
        source: ProviderId,
        now: UtcDateTime,
    ) -> QualityReport {
        let mut issues = Vec::new();

        let completeness = settle(
            "completeness",
            completeness::score(record, now, &mut issues),
            &mut issues,
        );
        let freshness = settle(
            "freshness",
            freshness::score(record, now, &mut issues),
            &mut issues,
        );
        let accuracy = settle("accuracy", accuracy::score(record, &mut issues), &mut issues);
        let consistency = settle(
            "consistency",
            consistency::score(record, &mut issues),
            &mut issues,
        );

        let weights = self.weights;
        let overall = round2(
            (completeness * weights.completeness
                + freshness * weights.freshness
                + accuracy * weights.accuracy
                + consistency * weights.consistency)
                .clamp(0.0, 100.0),
        );

        debug!(
            symbol = %record.symbol,
            source = %source,
            overall,
            completeness,
            freshness,
            accuracy,
            consistency,
            issues = issues.len(),
            "assessed record quality"
        );

        QualityReport {
            symbol: record.symbol.clone(),
            source,
            data_type: DataType::StockPrice,
            quality_score: overall,
            completeness_score: completeness,
            freshness_score: freshness,
            accuracy_score: accuracy,
            issues,
            assessed_at: now,
        }
    }
}

fn settle(dimension: &str, result: Result<f64, QualityError>, issues: &mut Vec<String>) -> f64 {
    match result {
        Ok(score) => round2(score.clamp(0.0, 100.0)),
        Err(error) => {
            warn!(dimension, error = %error, "quality dimension failed");
            issues.push(format!("{dimension} assessment failed: {error}"));
            0.0
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn ensure_finite(dimension: &'static str, score: f64) -> Result<f64, QualityError> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(QualityError::NonFinite { dimension })
    }
}
