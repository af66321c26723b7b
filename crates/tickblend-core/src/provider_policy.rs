use std::time::Duration;

use crate::retry::RetryConfig;
use crate::ProviderId;

/// A hard request ceiling imposed by the upstream contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    pub window: Duration,
    pub limit: u32,
}

/// Provider-side call discipline applied inside an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    /// Every window must have capacity before a call is sent.
    pub quotas: Vec<QuotaWindow>,
    pub retry: RetryConfig,
}

impl ProviderPolicy {
    /// Free tier: 5 calls per minute and 500 per day.
    pub fn alphavantage_default() -> Self {
        Self {
            provider_id: ProviderId::Alphavantage,
            quotas: vec![
                QuotaWindow {
                    window: Duration::from_secs(60),
                    limit: 5,
                },
                QuotaWindow {
                    window: Duration::from_secs(24 * 60 * 60),
                    limit: 500,
                },
            ],
            retry: RetryConfig::exponential(3, Duration::from_secs(1)),
        }
    }

    /// No published hard quota; the orchestrator's budget applies instead.
    pub fn yahoo_default() -> Self {
        Self {
            provider_id: ProviderId::Yahoo,
            quotas: Vec::new(),
            retry: RetryConfig::exponential(3, Duration::from_secs(1)),
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::Yahoo => Self::yahoo_default(),
            ProviderId::Alphavantage => Self::alphavantage_default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_quotas(mut self, quotas: Vec<QuotaWindow>) -> Self {
        self.quotas = quotas;
        self
    }
}
