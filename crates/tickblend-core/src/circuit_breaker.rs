//! Per-provider circuit breaker.
//!
//! Adapters ask the breaker before every upstream call ([`CircuitBreaker::guard`])
//! and report the retried outcome afterwards ([`CircuitBreaker::observe`]).
//! Once open, calls are refused until the cool-down has elapsed; the next call
//! is then let through as a probe that either closes or re-opens the circuit.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::data_source::{SourceError, SourceErrorKind};
use crate::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures that open the circuit.
    pub failure_threshold: u32,
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { until: Instant },
    Probing,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    source: ProviderId,
    config: CircuitBreakerConfig,
    phase: Mutex<Phase>,
}

impl CircuitBreaker {
    pub fn new(source: ProviderId, config: CircuitBreakerConfig) -> Self {
        Self {
            source,
            config,
            phase: Mutex::new(Phase::Closed { failures: 0 }),
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Refuses the call while open. The first call after the cool-down becomes
    /// the probe.
    pub fn guard(&self) -> Result<(), SourceError> {
        let mut phase = self.phase();
        match *phase {
            Phase::Closed { .. } | Phase::Probing => Ok(()),
            Phase::Open { until } => {
                let now = Instant::now();
                if now >= until {
                    *phase = Phase::Probing;
                    return Ok(());
                }
                Err(SourceError::unavailable(format!(
                    "{} circuit breaker is open for another {}s",
                    self.source,
                    until.saturating_duration_since(now).as_secs().max(1)
                )))
            }
        }
    }

    /// Feeds the final outcome of a retried upstream call.
    ///
    /// "Not found" proves the upstream is answering. Only unavailability and
    /// upstream throttling count as failures; request and parse errors are
    /// neutral.
    pub fn observe<T>(&self, result: &Result<T, SourceError>) {
        match result.as_ref().map_err(SourceError::kind) {
            Ok(_) | Err(SourceErrorKind::NotFound) => self.succeeded(),
            Err(SourceErrorKind::Unavailable | SourceErrorKind::RateLimited) => self.failed(),
            Err(_) => {}
        }
    }

    fn succeeded(&self) {
        let mut phase = self.phase();
        if matches!(*phase, Phase::Probing) {
            info!(source = %self.source, "circuit closed after successful probe");
        }
        *phase = Phase::Closed { failures: 0 };
    }

    fn failed(&self) {
        let mut phase = self.phase();
        let failures = match *phase {
            Phase::Closed { failures } => failures.saturating_add(1),
            Phase::Probing => self.config.failure_threshold,
            Phase::Open { .. } => return,
        };
        if failures < self.config.failure_threshold {
            *phase = Phase::Closed { failures };
            return;
        }
        warn!(
            source = %self.source,
            failures,
            cool_down_secs = self.config.cool_down.as_secs(),
            "circuit opened"
        );
        *phase = Phase::Open {
            until: Instant::now() + self.config.cool_down,
        };
    }

    pub fn state(&self) -> CircuitState {
        match *self.phase() {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::Probing => CircuitState::HalfOpen,
        }
    }
}
