//! Per-source request budgets owned by the orchestrator.
//!
//! A budget is a counter with a fixed window. The window rolls lazily: the
//! first check after `reset_at` zeroes the counter and advances `reset_at` by
//! whole periods. Check and increment happen under one lock so concurrent
//! callers cannot overshoot the limit.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::{ProviderId, UtcDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudgetConfig {
    pub limit: u32,
    pub period: Duration,
}

impl RateBudgetConfig {
    pub const fn new(limit: u32, period: Duration) -> Self {
        Self { limit, period }
    }

    /// Bulk quote endpoint: 2000 requests per hour.
    pub const fn yahoo_default() -> Self {
        Self::new(2_000, Duration::from_secs(60 * 60))
    }

    /// Strictly quota-limited endpoint: 500 requests per day.
    pub const fn alphavantage_default() -> Self {
        Self::new(500, Duration::from_secs(24 * 60 * 60))
    }

    pub const fn default_for(source: ProviderId) -> Self {
        match source {
            ProviderId::Yahoo => Self::yahoo_default(),
            ProviderId::Alphavantage => Self::alphavantage_default(),
        }
    }
}

#[derive(Debug)]
struct RateBudget {
    config: RateBudgetConfig,
    requests_made: u32,
    reset_at: Instant,
}

impl RateBudget {
    fn new(config: RateBudgetConfig, now: Instant) -> Self {
        Self {
            config,
            requests_made: 0,
            reset_at: now + config.period,
        }
    }

    fn roll_window(&mut self, now: Instant) {
        if now <= self.reset_at {
            return;
        }
        self.requests_made = 0;
        if self.config.period.is_zero() {
            self.reset_at = now;
            return;
        }
        while self.reset_at < now {
            self.reset_at += self.config.period;
        }
    }

    fn has_capacity(&self) -> bool {
        self.requests_made < self.config.limit
    }

    fn snapshot(&self, source: ProviderId, now: Instant) -> RateBudgetSnapshot {
        let until_reset = self.reset_at.saturating_duration_since(now);
        RateBudgetSnapshot {
            source,
            limit: self.config.limit,
            requests_made: self.requests_made,
            requests_remaining: self.config.limit.saturating_sub(self.requests_made),
            is_limit_exceeded: !self.has_capacity(),
            resets_in_secs: until_reset.as_secs(),
            reset_at: reset_timestamp(until_reset),
        }
    }
}

fn reset_timestamp(until_reset: Duration) -> UtcDateTime {
    let now = UtcDateTime::now();
    let shifted = now.into_inner() + until_reset;
    UtcDateTime::from_offset_datetime(shifted).unwrap_or(now)
}

/// Point-in-time view of one source's budget, reported by health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateBudgetSnapshot {
    pub source: ProviderId,
    pub limit: u32,
    pub requests_made: u32,
    pub requests_remaining: u32,
    pub is_limit_exceeded: bool,
    pub resets_in_secs: u64,
    pub reset_at: UtcDateTime,
}

/// Budget tracker for every configured source.
#[derive(Debug)]
pub struct RateLimiter {
    budgets: Mutex<HashMap<ProviderId, RateBudget>>,
}

impl RateLimiter {
    pub fn new(configs: impl IntoIterator<Item = (ProviderId, RateBudgetConfig)>) -> Self {
        let now = Instant::now();
        let budgets = configs
            .into_iter()
            .map(|(source, config)| (source, RateBudget::new(config, now)))
            .collect();
        Self {
            budgets: Mutex::new(budgets),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProviderId, RateBudget>> {
        self.budgets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether `source` may be called now. Sources without a budget are unlimited.
    pub fn check_allowed(&self, source: ProviderId) -> bool {
        let mut budgets = self.lock();
        match budgets.get_mut(&source) {
            Some(budget) => {
                budget.roll_window(Instant::now());
                budget.has_capacity()
            }
            None => true,
        }
    }

    /// Counts one attempted call against `source`.
    pub fn record_request(&self, source: ProviderId) {
        let mut budgets = self.lock();
        if let Some(budget) = budgets.get_mut(&source) {
            budget.roll_window(Instant::now());
            budget.requests_made = budget.requests_made.saturating_add(1);
        }
    }

    /// Checks and counts in one step; `false` means the call must be skipped.
    pub fn try_acquire(&self, source: ProviderId) -> bool {
        let mut budgets = self.lock();
        let Some(budget) = budgets.get_mut(&source) else {
            return true;
        };
        budget.roll_window(Instant::now());
        if !budget.has_capacity() {
            debug!(
                source = %source,
                requests_made = budget.requests_made,
                limit = budget.config.limit,
                "rate budget exhausted"
            );
            return false;
        }
        budget.requests_made += 1;
        true
    }

    pub fn snapshot(&self, source: ProviderId) -> Option<RateBudgetSnapshot> {
        let mut budgets = self.lock();
        let now = Instant::now();
        budgets.get_mut(&source).map(|budget| {
            budget.roll_window(now);
            budget.snapshot(source, now)
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(
            ProviderId::ALL
                .into_iter()
                .map(|source| (source, RateBudgetConfig::default_for(source))),
        )
    }
}
