//! Behavior-driven tests for record quality scoring
//!
//! These tests verify that scores stay bounded, grades follow the score,
//! and that every deduction leaves a readable issue behind.

mod support;

use support::{rich_record, symbol, thin_record};
use tickblend_core::{
    DataType, ProviderId, QualityAssessor, QualityGrade, QualityReport, QualityWeights,
    StockRecord, UtcDateTime,
};

fn report_with(scores: (f64, f64, f64, f64), issues: usize) -> QualityReport {
    let (overall, completeness, freshness, accuracy) = scores;
    QualityReport {
        symbol: symbol("AAPL"),
        source: ProviderId::Yahoo,
        data_type: DataType::StockPrice,
        quality_score: overall,
        completeness_score: completeness,
        freshness_score: freshness,
        accuracy_score: accuracy,
        issues: (0..issues).map(|index| format!("issue {index}")).collect(),
        assessed_at: UtcDateTime::now(),
    }
}

// =============================================================================
// Quality: Score Bounds
// =============================================================================

#[test]
fn when_record_is_empty_scores_stay_within_bounds() {
    // Given: A record with nothing but a symbol
    let record = StockRecord::new(symbol("AAPL"));

    // When: It is assessed
    let report = QualityAssessor::new().assess(&record, ProviderId::Yahoo);

    // Then: Every score is bounded and the record fails
    for score in [
        report.quality_score,
        report.completeness_score,
        report.freshness_score,
        report.accuracy_score,
    ] {
        assert!((0.0..=100.0).contains(&score), "score {score}");
    }
    assert_eq!(report.grade(), QualityGrade::F);
    assert!(!report.issues.is_empty());
}

#[test]
fn when_record_is_complete_and_fresh_it_grades_well() {
    let record = rich_record(&symbol("AAPL"), ProviderId::Yahoo);

    let report = QualityAssessor::new().assess(&record, ProviderId::Yahoo);

    assert!(report.quality_score >= 75.0, "score {}", report.quality_score);
    assert!(report.grade() >= QualityGrade::B);
    assert_eq!(report.accuracy_score, 100.0);
    assert_eq!(report.symbol, symbol("AAPL"));
}

#[test]
fn when_record_only_has_a_name_it_scores_below_fair() {
    let record = thin_record(&symbol("THIN"), ProviderId::Alphavantage);

    let report = QualityAssessor::new().assess(&record, ProviderId::Alphavantage);

    assert!(report.quality_score < 60.0);
    assert_eq!(report.source, ProviderId::Alphavantage);
}

#[test]
fn when_weights_favour_one_dimension_overall_follows_it() {
    let record = rich_record(&symbol("AAPL"), ProviderId::Yahoo);
    let accuracy_only = QualityAssessor::with_weights(QualityWeights {
        completeness: 0.0,
        freshness: 0.0,
        accuracy: 1.0,
        consistency: 0.0,
    });

    let report = accuracy_only.assess(&record, ProviderId::Yahoo);

    assert_eq!(report.quality_score, report.accuracy_score);
}

// =============================================================================
// Quality: Deductions And Issues
// =============================================================================

#[test]
fn when_close_is_outside_the_daily_range_accuracy_drops_with_an_issue() {
    // Given: A clean record and a copy whose current close exceeds the high
    let clean = rich_record(&symbol("AAPL"), ProviderId::Yahoo);
    let mut broken = clean.clone();
    let current = broken.current_price.as_mut().expect("current price");
    current.close = current.high.expect("high") + 10.0;

    // When: Both are assessed
    let assessor = QualityAssessor::new();
    let clean_report = assessor.assess(&clean, ProviderId::Yahoo);
    let broken_report = assessor.assess(&broken, ProviderId::Yahoo);

    // Then: Accuracy falls and the reason is recorded
    assert!(broken_report.accuracy_score < clean_report.accuracy_score);
    assert!(broken_report
        .issues
        .iter()
        .any(|issue| issue == "Current price: close outside the high/low range"));
}

#[test]
fn when_several_sections_are_flawed_issues_accumulate() {
    // Given: Negative revenue, an unreasonable beta and a bad current price
    let mut record = rich_record(&symbol("AAPL"), ProviderId::Yahoo);
    if let Some(income) = record.financial_statements[0].income_statement.as_mut() {
        income.revenue = Some(-5.0);
    }
    if let Some(profile) = record.profile.as_mut() {
        profile.beta = Some(9.0);
    }
    if let Some(current) = record.current_price.as_mut() {
        current.volume = Some(-1);
    }

    // When: It is assessed
    let report = QualityAssessor::new().assess(&record, ProviderId::Yahoo);

    // Then: Each flaw is listed
    let has = |needle: &str| report.issues.iter().any(|issue| issue.contains(needle));
    assert!(has("Negative revenue"));
    assert!(has("Unreasonable beta"));
    assert!(has("negative volume"));
    assert!(report.accuracy_score < 100.0);
}

// =============================================================================
// Quality: Grades And Summaries
// =============================================================================

#[test]
fn when_score_crosses_a_boundary_grade_changes_monotonically() {
    let cases = [
        (100.0, QualityGrade::A),
        (90.0, QualityGrade::A),
        (89.99, QualityGrade::B),
        (75.0, QualityGrade::B),
        (74.99, QualityGrade::C),
        (60.0, QualityGrade::C),
        (59.99, QualityGrade::D),
        (40.0, QualityGrade::D),
        (39.99, QualityGrade::F),
        (0.0, QualityGrade::F),
    ];

    for (score, expected) in cases {
        assert_eq!(QualityGrade::from_score(score), expected, "score {score}");
    }
    let mut previous = QualityGrade::A;
    for (score, _) in cases {
        let grade = QualityGrade::from_score(score);
        assert!(grade <= previous);
        previous = grade;
    }
}

#[test]
fn when_every_dimension_is_weak_every_recommendation_applies() {
    let report = report_with((30.0, 50.0, 40.0, 20.0), 7);

    let recommendations = report.recommendations();

    assert_eq!(
        recommendations,
        vec![
            "Improve data completeness by fetching missing fields",
            "Update data more frequently to improve freshness",
            "Implement additional data validation checks",
            "Address data quality issues systematically",
            "Consider using alternative data sources",
        ]
    );
}

#[test]
fn when_report_is_strong_no_recommendation_is_made() {
    let report = report_with((95.0, 100.0, 90.0, 100.0), 1);

    assert!(report.recommendations().is_empty());
}

#[test]
fn when_report_is_summarised_grade_level_and_counts_are_derived() {
    let report = report_with((76.5, 85.0, 65.0, 90.0), 2);

    let summary = report.summary();

    assert_eq!(summary.grade, QualityGrade::B);
    assert_eq!(summary.level, "Good");
    assert_eq!(summary.description, "Good - Data is reliable with minor issues");
    assert_eq!(summary.overall_score, 76.5);
    assert_eq!(summary.issues_count, 2);
    assert_eq!(
        summary.recommendations,
        vec!["Update data more frequently to improve freshness"]
    );
}
