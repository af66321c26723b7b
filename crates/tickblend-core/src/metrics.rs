use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Orchestrator counters, shared by every concurrent lookup.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests_made: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    api_errors: AtomicU64,
    quality_assessments: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_made: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub api_errors: u64,
    pub quality_assessments: u64,
}

impl ServiceMetrics {
    pub(crate) fn request_made(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn api_error(&self) {
        self.api_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn quality_assessed(&self) {
        self.quality_assessments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_made: self.requests_made.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            api_errors: self.api_errors.load(Ordering::Relaxed),
            quality_assessments: self.quality_assessments.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = ServiceMetrics::default();
        metrics.request_made();
        metrics.request_made();
        metrics.cache_miss();
        metrics.api_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_made, 2);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.api_errors, 1);
        assert_eq!(snapshot.cache_hits, 0);
    }
}
