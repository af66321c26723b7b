use serde::{Deserialize, Serialize};

use crate::{ProviderId, Symbol, UtcDateTime};

/// Category of dataset a quality report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    StockPrice,
    FinancialStatement,
    MarketData,
    CompanyInfo,
}

/// Scored assessment attached to a [`crate::StockRecord`].
///
/// All scores are in `[0, 100]`. The consistency dimension contributes to
/// `quality_score` but is not stored separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub symbol: Symbol,
    pub source: ProviderId,
    pub data_type: DataType,
    pub quality_score: f64,
    pub completeness_score: f64,
    pub freshness_score: f64,
    pub accuracy_score: f64,
    pub issues: Vec<String>,
    pub assessed_at: UtcDateTime,
}
