use serde::{Deserialize, Serialize};

use crate::{ProviderId, QualityReport, Symbol, UtcDateTime};

/// Letter grade derived from the overall quality score.
///
/// Variants are declared worst to best so `Ord` follows quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityGrade {
    F,
    D,
    C,
    B,
    A,
}

impl QualityGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::A
        } else if score >= 75.0 {
            Self::B
        } else if score >= 60.0 {
            Self::C
        } else if score >= 40.0 {
            Self::D
        } else {
            Self::F
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }

    pub const fn level(self) -> &'static str {
        match self {
            Self::A => "Excellent",
            Self::B => "Good",
            Self::C => "Fair",
            Self::D => "Poor",
            Self::F => "Very Poor",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::A => "Excellent - Data is highly reliable and complete",
            Self::B => "Good - Data is reliable with minor issues",
            Self::C => "Fair - Data is usable but has some quality concerns",
            Self::D => "Poor - Data has significant quality issues",
            Self::F => "Very Poor - Data quality is unacceptable for analysis",
        }
    }
}

impl std::fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QualityReport {
    pub fn grade(&self) -> QualityGrade {
        QualityGrade::from_score(self.quality_score)
    }

    /// Suggested follow-ups, in a fixed order.
    pub fn recommendations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.completeness_score < 80.0 {
            out.push("Improve data completeness by fetching missing fields");
        }
        if self.freshness_score < 70.0 {
            out.push("Update data more frequently to improve freshness");
        }
        if self.accuracy_score < 80.0 {
            out.push("Implement additional data validation checks");
        }
        if self.issues.len() > 5 {
            out.push("Address data quality issues systematically");
        }
        if self.quality_score < 60.0 {
            out.push("Consider using alternative data sources");
        }
        out.into_iter().map(String::from).collect()
    }

    pub fn summary(&self) -> QualitySummary {
        let grade = self.grade();
        QualitySummary {
            symbol: self.symbol.clone(),
            source: self.source,
            overall_score: self.quality_score,
            grade,
            level: grade.level(),
            description: grade.description(),
            completeness_score: self.completeness_score,
            freshness_score: self.freshness_score,
            accuracy_score: self.accuracy_score,
            issues_count: self.issues.len(),
            issues: self.issues.clone(),
            recommendations: self.recommendations(),
            assessed_at: self.assessed_at,
        }
    }
}

/// Human-facing view of a [`QualityReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub symbol: Symbol,
    pub source: ProviderId,
    pub overall_score: f64,
    pub grade: QualityGrade,
    pub level: &'static str,
    pub description: &'static str,
    pub completeness_score: f64,
    pub freshness_score: f64,
    pub accuracy_score: f64,
    pub issues_count: usize,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub assessed_at: UtcDateTime,
}
