//! Consumer-facing entry point.
//!
//! [`MarketDataService`] composes the provider adapters, the rate limiter,
//! the cache store and the quality assessor:
//!
//! ```text
//! get_record ─▶ cache ──hit──▶ record
//!                 │miss
//!                 ▼
//!        for source in candidates
//!          rate budget ─denied─▶ skip
//!          adapter.fetch_record ─failed/empty─▶ skip
//!                 │data
//!                 ▼
//!        quality ─▶ cache write (quality-adjusted TTL) ─▶ record
//! ```
//!
//! Expected absence is never an error. [`MarketDataService::lookup`] keeps the
//! per-source [`SkipReason`]s for callers that need to tell "unknown symbol"
//! apart from "every source was throttled".

use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::adapters::{AlphaVantageAdapter, YahooAdapter};
use crate::cache::{CacheNamespace, CacheStats, CacheStore};
use crate::config::ServiceConfig;
use crate::data_source::{MarketDataSource, SourceErrorKind};
use crate::http_client::{HttpClient, NoopHttpClient, ReqwestHttpClient};
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::quality::QualityAssessor;
use crate::rate_limit::{RateBudgetConfig, RateBudgetSnapshot, RateLimiter};
use crate::{
    CacheError, MarketIndicators, MarketSnapshot, ProviderId, QualityReport, StockRecord, Symbol,
    SymbolMatch, UtcDateTime, ValidationError,
};

const MARKET_SNAPSHOT_KEY: &str = "market_data";

/// Per-call switches for [`MarketDataService::get_record`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOptions {
    /// Skip the cache read; the fresh record still replaces the cached one.
    pub force_refresh: bool,
    /// Only this source is tried.
    pub preferred_source: Option<ProviderId>,
}

impl RecordOptions {
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
            preferred_source: None,
        }
    }

    pub fn from_source(source: ProviderId) -> Self {
        Self {
            force_refresh: false,
            preferred_source: Some(source),
        }
    }
}

/// Why a candidate source did not produce the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    RateLimited,
    NotRegistered,
    Failed(String),
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSkip {
    pub source: ProviderId,
    pub reason: SkipReason,
}

/// Result of one record lookup, with the fallback trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupOutcome {
    pub symbol: Symbol,
    pub record: Option<StockRecord>,
    pub from_cache: bool,
    /// Candidates that were passed over, in the order they were tried.
    pub skipped: Vec<SourceSkip>,
}

impl LookupOutcome {
    fn cached(symbol: Symbol, record: StockRecord) -> Self {
        Self {
            symbol,
            record: Some(record),
            from_cache: true,
            skipped: Vec::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.record.is_some()
    }

    pub fn into_record(self) -> Option<StockRecord> {
        self.record
    }

    /// No data, and every candidate was skipped for lack of budget.
    pub fn is_rate_limited(&self) -> bool {
        self.record.is_none()
            && !self.skipped.is_empty()
            && self
                .skipped
                .iter()
                .all(|skip| skip.reason == SkipReason::RateLimited)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn from_probe<E: std::fmt::Display>(probe: Result<bool, E>) -> Self {
        match probe {
            Ok(true) => Self {
                status: ServiceStatus::Healthy,
                error: None,
            },
            Ok(false) => Self {
                status: ServiceStatus::Unhealthy,
                error: None,
            },
            Err(error) => Self {
                status: ServiceStatus::Error,
                error: Some(error.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    /// Keyed by source id, plus `cache` when caching is enabled.
    pub services: BTreeMap<String, ServiceHealth>,
    pub rate_limits: Vec<RateBudgetSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_stats: Option<CacheStats>,
    pub metrics: MetricsSnapshot,
    pub checked_at: UtcDateTime,
}

struct ServiceInner {
    sources: HashMap<ProviderId, Arc<dyn MarketDataSource>>,
    cache: Option<CacheStore>,
    rate_limiter: RateLimiter,
    assessor: QualityAssessor,
    config: ServiceConfig,
    metrics: ServiceMetrics,
}

/// Multi-source record service.
///
/// Clones share adapters, cache, rate budgets and metrics.
#[derive(Clone)]
pub struct MarketDataService {
    inner: Arc<ServiceInner>,
}

impl MarketDataService {
    pub fn builder() -> MarketDataServiceBuilder {
        MarketDataServiceBuilder::new()
    }

    /// Wires the given adapters with an in-memory cache.
    pub fn new(sources: Vec<Arc<dyn MarketDataSource>>, config: ServiceConfig) -> Self {
        let cache = config.enable_caching.then(CacheStore::in_memory);
        Self::from_parts(sources, cache, config)
    }

    fn from_parts(
        sources: Vec<Arc<dyn MarketDataSource>>,
        cache: Option<CacheStore>,
        config: ServiceConfig,
    ) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| (source.id(), source))
            .collect();
        let rate_limiter = RateLimiter::new(
            config
                .rate_budgets
                .iter()
                .map(|(source, budget)| (*source, *budget)),
        );
        Self {
            inner: Arc::new(ServiceInner {
                sources,
                cache: cache.filter(|_| config.enable_caching),
                rate_limiter,
                assessor: QualityAssessor::new(),
                config,
                metrics: ServiceMetrics::default(),
            }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.inner.cache.as_ref()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Registered sources in priority order.
    pub fn sources(&self) -> Vec<ProviderId> {
        let mut registered = self.candidates(None);
        registered.retain(|source| self.inner.sources.contains_key(source));
        registered
    }

    /// Cached or freshly fetched record; `None` when no source had data.
    pub async fn get_record(&self, symbol: &Symbol, options: RecordOptions) -> Option<StockRecord> {
        self.lookup(symbol, options).await.into_record()
    }

    pub async fn lookup(&self, symbol: &Symbol, options: RecordOptions) -> LookupOutcome {
        self.resolve(symbol, options, None).await
    }

    async fn resolve(
        &self,
        symbol: &Symbol,
        options: RecordOptions,
        ttl_override: Option<Duration>,
    ) -> LookupOutcome {
        if !options.force_refresh {
            if let Some(record) = self.cached_record(symbol).await {
                return LookupOutcome::cached(symbol.clone(), record);
            }
        }

        let mut skipped = Vec::new();
        let mut found = None;
        for source in self.candidates(options.preferred_source) {
            match self.try_fetch(source, symbol).await {
                Ok(record) => {
                    found = Some(record);
                    break;
                }
                Err(reason) => {
                    debug!(symbol = %symbol, source = %source, ?reason, "skipping source");
                    skipped.push(SourceSkip { source, reason });
                }
            }
        }

        let Some(mut record) = found else {
            info!(symbol = %symbol, tried = skipped.len(), "no source returned data");
            return LookupOutcome {
                symbol: symbol.clone(),
                record: None,
                from_cache: false,
                skipped,
            };
        };

        if self.inner.config.enable_quality {
            record.quality = self.assess(&record).await;
        }

        let ttl = ttl_override.unwrap_or_else(|| {
            self.inner
                .config
                .record_ttl(record.quality.as_ref().map(|report| report.quality_score))
        });
        self.store(symbol.as_str(), &record, ttl, CacheNamespace::StockData)
            .await;

        LookupOutcome {
            symbol: symbol.clone(),
            record: Some(record),
            from_cache: false,
            skipped,
        }
    }

    async fn cached_record(&self, symbol: &Symbol) -> Option<StockRecord> {
        let cache = self.inner.cache.as_ref()?;
        match cache
            .get::<StockRecord>(symbol.as_str(), CacheNamespace::StockData)
            .await
        {
            Ok(Some(record)) => {
                debug!(symbol = %symbol, "record cache hit");
                self.inner.metrics.cache_hit();
                Some(record)
            }
            Ok(None) => {
                self.inner.metrics.cache_miss();
                None
            }
            Err(error) => {
                warn!(symbol = %symbol, %error, "cache read failed, treating as miss");
                self.inner.metrics.cache_miss();
                None
            }
        }
    }

    fn candidates(&self, preferred: Option<ProviderId>) -> Vec<ProviderId> {
        if let Some(source) = preferred {
            return vec![source];
        }
        let mut seen = HashSet::new();
        self.inner
            .config
            .source_priority
            .iter()
            .copied()
            .filter(|source| seen.insert(*source))
            .collect()
    }

    async fn try_fetch(&self, source: ProviderId, symbol: &Symbol) -> Result<StockRecord, SkipReason> {
        let Some(adapter) = self.inner.sources.get(&source) else {
            return Err(SkipReason::NotRegistered);
        };
        if !self.inner.rate_limiter.try_acquire(source) {
            return Err(SkipReason::RateLimited);
        }
        self.inner.metrics.request_made();

        match adapter.fetch_record(symbol).await {
            Ok(record) if record.has_data() => Ok(record.with_source(source)),
            Ok(_) => Err(SkipReason::NoData),
            Err(error) if error.is_not_found() => Err(SkipReason::NoData),
            Err(error) => {
                warn!(symbol = %symbol, source = %source, %error, "source fetch failed");
                self.inner.metrics.api_error();
                if error.kind() == SourceErrorKind::RateLimited {
                    Err(SkipReason::RateLimited)
                } else {
                    Err(SkipReason::Failed(error.to_string()))
                }
            }
        }
    }

    /// Scores off the async workers; a panic leaves the record unscored.
    async fn assess(&self, record: &StockRecord) -> Option<QualityReport> {
        let source = record.source?;
        let assessor = self.inner.assessor.clone();
        let snapshot = record.clone();
        match tokio::task::spawn_blocking(move || assessor.assess(&snapshot, source)).await {
            Ok(report) => {
                self.inner.metrics.quality_assessed();
                Some(report)
            }
            Err(error) => {
                warn!(symbol = %record.symbol, %error, "quality assessment failed");
                None
            }
        }
    }

    /// Best-effort write; failures are logged and dropped.
    async fn store<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        namespace: CacheNamespace,
    ) {
        let Some(cache) = self.inner.cache.as_ref() else {
            return;
        };
        match cache.set(key, value, ttl, namespace).await {
            Ok(()) => debug!(key, namespace = %namespace, ttl_secs = ttl.as_secs(), "cached"),
            Err(error) => warn!(key, namespace = %namespace, %error, "cache write failed"),
        }
    }

    /// Fetches every symbol with at most `max_concurrent` lookups in flight.
    ///
    /// The map holds every requested symbol; failed, empty and timed-out
    /// lookups map to `None`.
    pub async fn get_batch(
        &self,
        symbols: &[Symbol],
        max_concurrent: Option<usize>,
    ) -> BTreeMap<Symbol, Option<StockRecord>> {
        let limit = max_concurrent
            .unwrap_or(self.inner.config.default_max_concurrent)
            .max(1);
        let timeout = self.inner.config.lookup_timeout;
        let semaphore = Arc::new(Semaphore::new(limit));

        let mut results: BTreeMap<Symbol, Option<StockRecord>> =
            symbols.iter().map(|symbol| (symbol.clone(), None)).collect();
        let mut tasks = JoinSet::new();
        for symbol in results.keys().cloned().collect::<Vec<_>>() {
            let service = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (symbol, None);
                };
                let fetched = tokio::time::timeout(
                    timeout,
                    service.get_record(&symbol, RecordOptions::default()),
                )
                .await;
                match fetched {
                    Ok(record) => (symbol, record),
                    Err(_) => {
                        warn!(symbol = %symbol, timeout_secs = timeout.as_secs(), "batch lookup timed out");
                        (symbol, None)
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, record)) => {
                    results.insert(symbol, record);
                }
                Err(error) => warn!(%error, "batch lookup task failed"),
            }
        }

        info!(
            requested = results.len(),
            found = results.values().filter(|record| record.is_some()).count(),
            "batch lookup finished"
        );
        results
    }

    /// Merged matches from every source with budget left, deduplicated by symbol.
    pub async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, ValidationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        let cache_key = query.to_lowercase();

        if let Some(cache) = self.inner.cache.as_ref() {
            match cache
                .get::<Vec<SymbolMatch>>(&cache_key, CacheNamespace::SearchResults)
                .await
            {
                Ok(Some(matches)) => {
                    self.inner.metrics.cache_hit();
                    return Ok(matches);
                }
                Ok(None) => self.inner.metrics.cache_miss(),
                Err(error) => {
                    warn!(query, %error, "search cache read failed");
                    self.inner.metrics.cache_miss();
                }
            }
        }

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for source in self.sources() {
            let Some(adapter) = self.inner.sources.get(&source) else {
                continue;
            };
            if !self.inner.rate_limiter.try_acquire(source) {
                debug!(query, source = %source, "search skipped, rate budget exhausted");
                continue;
            }
            self.inner.metrics.request_made();
            match adapter.search_symbols(query).await {
                Ok(matches) => merged.extend(
                    matches
                        .into_iter()
                        .filter(|found| seen.insert(found.symbol.to_ascii_uppercase())),
                ),
                Err(error) => {
                    warn!(query, source = %source, %error, "search failed");
                    self.inner.metrics.api_error();
                }
            }
        }

        if !merged.is_empty() {
            self.store(
                &cache_key,
                &merged,
                self.inner.config.search_ttl,
                CacheNamespace::SearchResults,
            )
            .await;
        }
        Ok(merged)
    }

    /// Market-wide indicators merged across sources; `None` when nobody had any.
    pub async fn get_market_snapshot(&self) -> Option<MarketSnapshot> {
        if let Some(cache) = self.inner.cache.as_ref() {
            match cache
                .get::<MarketSnapshot>(MARKET_SNAPSHOT_KEY, CacheNamespace::MarketData)
                .await
            {
                Ok(Some(snapshot)) => {
                    self.inner.metrics.cache_hit();
                    return Some(snapshot);
                }
                Ok(None) => self.inner.metrics.cache_miss(),
                Err(error) => {
                    warn!(%error, "market snapshot cache read failed");
                    self.inner.metrics.cache_miss();
                }
            }
        }

        let mut indicators = MarketIndicators::default();
        let mut contributors = Vec::new();
        for source in self.sources() {
            let Some(adapter) = self.inner.sources.get(&source) else {
                continue;
            };
            if !self.inner.rate_limiter.try_acquire(source) {
                debug!(source = %source, "market indicators skipped, rate budget exhausted");
                continue;
            }
            self.inner.metrics.request_made();
            match adapter.fetch_market_indicators().await {
                Ok(found) if !found.is_empty() => {
                    indicators.merge(found);
                    contributors.push(source);
                }
                Ok(_) => {}
                Err(error) if error.kind() == SourceErrorKind::Unsupported => {
                    debug!(source = %source, "source has no market indicators");
                }
                Err(error) => {
                    warn!(source = %source, %error, "market indicators failed");
                    self.inner.metrics.api_error();
                }
            }
        }

        if indicators.is_empty() {
            return None;
        }
        let snapshot = MarketSnapshot::from_indicators(&indicators, contributors);
        self.store(
            MARKET_SNAPSHOT_KEY,
            &snapshot,
            self.inner.config.market_ttl,
            CacheNamespace::MarketData,
        )
        .await;
        Some(snapshot)
    }

    /// Refreshes and caches each symbol with the warm-up TTL.
    pub async fn warm_cache(&self, symbols: &[Symbol]) -> BTreeMap<Symbol, bool> {
        let ttl = self.inner.config.warm_ttl;
        let mut warmed = BTreeMap::new();
        for symbol in symbols {
            let outcome = self.resolve(symbol, RecordOptions::refresh(), Some(ttl)).await;
            warmed.insert(symbol.clone(), outcome.is_found());
        }
        info!(
            requested = warmed.len(),
            warmed = warmed.values().filter(|ok| **ok).count(),
            "cache warm-up finished"
        );
        warmed
    }

    /// Drops the cached record for `symbol`. `Ok(false)` when nothing was cached.
    pub async fn invalidate(&self, symbol: &Symbol) -> Result<bool, CacheError> {
        match self.inner.cache.as_ref() {
            Some(cache) => cache.delete(symbol.as_str(), CacheNamespace::StockData).await,
            None => Ok(false),
        }
    }

    /// Probes every adapter and the cache independently.
    pub async fn get_health(&self) -> HealthReport {
        let mut services = BTreeMap::new();
        for source in self.sources() {
            let Some(adapter) = self.inner.sources.get(&source) else {
                continue;
            };
            let health = ServiceHealth::from_probe(adapter.health_check().await);
            if health.status != ServiceStatus::Healthy {
                warn!(source = %source, status = ?health.status, "source health check failed");
            }
            services.insert(source.to_string(), health);
        }

        let cache_stats = match self.inner.cache.as_ref() {
            Some(cache) => {
                let health = ServiceHealth::from_probe(cache.health_check().await);
                services.insert(String::from("cache"), health);
                Some(cache.stats())
            }
            None => None,
        };

        let status = if services
            .values()
            .all(|service| service.status == ServiceStatus::Healthy)
        {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        };

        HealthReport {
            status,
            services,
            rate_limits: ProviderId::ALL
                .into_iter()
                .filter_map(|source| self.inner.rate_limiter.snapshot(source))
                .collect(),
            cache_stats,
            metrics: self.metrics(),
            checked_at: UtcDateTime::now(),
        }
    }
}

/// Assembles a [`MarketDataService`].
///
/// | Provider | Primary Env Var | Fallback Env Var |
/// |----------|----------------|------------------|
/// | Alpha Vantage | `TICKBLEND_ALPHAVANTAGE_API_KEY` | `ALPHAVANTAGE_API_KEY` |
/// | Yahoo | (no key required) | - |
///
/// ```rust,ignore
/// let service = MarketDataServiceBuilder::new().with_mock_mode().build();
/// let record = service.get_record(&symbol, RecordOptions::default()).await;
/// ```
pub struct MarketDataServiceBuilder {
    use_mock: bool,
    alphavantage_api_key: Option<String>,
    sources: Vec<Arc<dyn MarketDataSource>>,
    cache: Option<CacheStore>,
    config: ServiceConfig,
}

impl Default for MarketDataServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataServiceBuilder {
    pub fn new() -> Self {
        Self {
            use_mock: false,
            alphavantage_api_key: env::var("TICKBLEND_ALPHAVANTAGE_API_KEY")
                .or_else(|_| env::var("ALPHAVANTAGE_API_KEY"))
                .ok()
                .filter(|key| !key.trim().is_empty()),
            sources: Vec::new(),
            cache: None,
            config: ServiceConfig::default(),
        }
    }

    /// Deterministic offline adapters for every provider.
    pub fn with_mock_mode(mut self) -> Self {
        self.use_mock = true;
        self
    }

    pub fn with_alphavantage_key(mut self, key: impl Into<String>) -> Self {
        self.alphavantage_api_key = Some(key.into());
        self
    }

    /// Registers `source`, replacing the built-in adapter with the same id.
    pub fn with_source(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        self.sources.retain(|existing| existing.id() != source.id());
        self.sources.push(source);
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_rate_budget(mut self, source: ProviderId, budget: RateBudgetConfig) -> Self {
        self.config = self.config.with_rate_budget(source, budget);
        self
    }

    pub fn build(self) -> MarketDataService {
        let mut sources = self.sources;
        let http_client: Arc<dyn HttpClient> = if self.use_mock {
            Arc::new(NoopHttpClient)
        } else {
            Arc::new(ReqwestHttpClient::new())
        };

        if !sources.iter().any(|source| source.id() == ProviderId::Yahoo) {
            sources.push(Arc::new(YahooAdapter::new(Arc::clone(&http_client))));
        }

        if !sources
            .iter()
            .any(|source| source.id() == ProviderId::Alphavantage)
        {
            sources.push(match &self.alphavantage_api_key {
                Some(key) => Arc::new(AlphaVantageAdapter::new(http_client, key.clone())),
                None => {
                    if !self.use_mock {
                        warn!("no Alpha Vantage API key configured, serving offline data for alphavantage");
                    }
                    Arc::new(AlphaVantageAdapter::offline())
                }
            });
        }

        let cache = self.cache.or_else(|| {
            self.config
                .enable_caching
                .then(CacheStore::in_memory)
        });
        MarketDataService::from_parts(sources, cache, self.config)
    }
}
