use std::collections::BTreeMap;
use std::time::Duration;

use crate::rate_limit::RateBudgetConfig;
use crate::ProviderId;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Record TTL before the quality adjustment.
    pub base_ttl: Duration,
    pub search_ttl: Duration,
    pub market_ttl: Duration,
    pub warm_ttl: Duration,
    pub default_max_concurrent: usize,
    /// Upper bound on a single batch lookup.
    pub lookup_timeout: Duration,
    pub enable_caching: bool,
    pub enable_quality: bool,
    /// Fallback order when the caller has no preferred source.
    pub source_priority: Vec<ProviderId>,
    pub rate_budgets: BTreeMap<ProviderId, RateBudgetConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_ttl: Duration::from_secs(900),
            search_ttl: Duration::from_secs(3_600),
            market_ttl: Duration::from_secs(1_800),
            warm_ttl: Duration::from_secs(3_600),
            default_max_concurrent: 5,
            lookup_timeout: Duration::from_secs(30),
            enable_caching: true,
            enable_quality: true,
            source_priority: ProviderId::ALL.to_vec(),
            rate_budgets: ProviderId::ALL
                .into_iter()
                .map(|source| (source, RateBudgetConfig::default_for(source)))
                .collect(),
        }
    }
}

impl ServiceConfig {
    pub fn with_rate_budget(mut self, source: ProviderId, budget: RateBudgetConfig) -> Self {
        self.rate_budgets.insert(source, budget);
        self
    }

    pub fn with_source_priority(mut self, priority: Vec<ProviderId>) -> Self {
        self.source_priority = priority;
        self
    }

    pub fn without_caching(mut self) -> Self {
        self.enable_caching = false;
        self
    }

    /// TTL for a record with the given overall quality score.
    pub fn record_ttl(&self, quality_score: Option<f64>) -> Duration {
        match quality_score {
            Some(score) => cache_ttl_for_score(self.base_ttl, score),
            None => self.base_ttl,
        }
    }
}

/// Stretches trusted records and shortens doubtful ones.
///
/// | Score | TTL |
/// |-------|-----|
/// | ≥ 90 | 2 × base |
/// | ≥ 75 | base |
/// | ≥ 60 | base / 2 |
/// | < 60 | base / 4 |
pub fn cache_ttl_for_score(base: Duration, score: f64) -> Duration {
    if score >= 90.0 {
        base.saturating_mul(2)
    } else if score >= 75.0 {
        base
    } else if score >= 60.0 {
        base / 2
    } else {
        base / 4
    }
}
