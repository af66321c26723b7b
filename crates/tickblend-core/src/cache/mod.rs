//! Namespaced cache store with transparent compression and hit/miss accounting.
//!
//! [`CacheStore`] sits on top of any [`CacheBackend`]. It connects lazily on
//! first use, retries connection failures with backoff and an explicit
//! reconnect, and never lets a decode failure escape as anything other than a
//! [`CacheError`].

mod backend;
pub mod codec;

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use backend::{
    glob_match, BackendError, BackendErrorKind, BackendFuture, CacheBackend, CacheRecord,
    MemoryBackend,
};

use crate::retry::{RetryConfig, Retryable};
use crate::CacheError;

/// Data category; each maps to a distinct key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    StockData,
    CompanyInfo,
    FinancialStatements,
    MarketData,
    SearchResults,
    RateLimits,
    DataQuality,
}

impl CacheNamespace {
    pub const ALL: [Self; 7] = [
        Self::StockData,
        Self::CompanyInfo,
        Self::FinancialStatements,
        Self::MarketData,
        Self::SearchResults,
        Self::RateLimits,
        Self::DataQuality,
    ];

    pub const fn prefix(self) -> &'static str {
        match self {
            Self::StockData => "stock:",
            Self::CompanyInfo => "company:",
            Self::FinancialStatements => "financials:",
            Self::MarketData => "market:",
            Self::SearchResults => "search:",
            Self::RateLimits => "rate_limit:",
            Self::DataQuality => "quality:",
        }
    }

    pub fn key(self, key: &str) -> String {
        format!("{}{key}", self.prefix())
    }
}

impl Display for CacheNamespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix().trim_end_matches(':'))
    }
}

const HEALTH_PROBE_KEY: &str = "health:probe";

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub compression_threshold: usize,
    pub default_ttl: Duration,
    pub retry: RetryConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            compression_threshold: codec::DEFAULT_COMPRESSION_THRESHOLD,
            default_ttl: Duration::from_secs(900),
            retry: RetryConfig::exponential(3, Duration::from_secs(1)),
        }
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of the running cache counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub total_requests: u64,
    /// `hits / (hits + misses)` as a percentage rounded to 2 decimals; 0 with no reads.
    pub hit_rate_percent: f64,
}

/// Namespaced, compressing front end over a [`CacheBackend`].
///
/// Clones share the backend connection and the statistics.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    stats: Arc<StatsCounters>,
    connected: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    reconnect_lock: Arc<tokio::sync::Mutex<()>>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            stats: Arc::new(StatsCounters::default()),
            connected: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            reconnect_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Reads and decodes a value. `Ok(None)` is a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        namespace: CacheNamespace,
    ) -> Result<Option<T>, CacheError> {
        let Some(stored) = self.read_stored(key, namespace).await? else {
            return Ok(None);
        };
        match codec::decode(&stored) {
            Ok(value) => {
                StatsCounters::bump(&self.stats.hits);
                Ok(Some(value))
            }
            Err(error) => {
                warn!(key, namespace = %namespace, %error, "undecodable cache entry");
                StatsCounters::bump(&self.stats.misses);
                StatsCounters::bump(&self.stats.errors);
                Err(error)
            }
        }
    }

    /// Reads the serialized bytes of a value with the compression envelope removed.
    pub async fn get_bytes(
        &self,
        key: &str,
        namespace: CacheNamespace,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let Some(stored) = self.read_stored(key, namespace).await? else {
            return Ok(None);
        };
        match codec::unpack(&stored) {
            Ok(bytes) => {
                StatsCounters::bump(&self.stats.hits);
                Ok(Some(bytes))
            }
            Err(error) => {
                StatsCounters::bump(&self.stats.misses);
                StatsCounters::bump(&self.stats.errors);
                Err(error)
            }
        }
    }

    async fn read_stored(
        &self,
        key: &str,
        namespace: CacheNamespace,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let full_key = namespace.key(key);
        let stored = self
            .run("get", move |backend| backend.get(full_key.clone()))
            .await?;
        if stored.is_none() {
            debug!(key, namespace = %namespace, "cache miss");
            StatsCounters::bump(&self.stats.misses);
        }
        Ok(stored)
    }

    /// Serializes and stores a value for `ttl`.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        namespace: CacheNamespace,
    ) -> Result<(), CacheError> {
        let encoded = codec::encode(value, self.config.compression_threshold).inspect_err(|_| {
            StatsCounters::bump(&self.stats.errors);
        })?;
        self.write_stored(key, encoded, ttl, namespace).await
    }

    /// Stores already-serialized bytes, compressing them past the threshold.
    pub async fn set_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        ttl: Duration,
        namespace: CacheNamespace,
    ) -> Result<(), CacheError> {
        let packed = codec::pack(bytes, self.config.compression_threshold).inspect_err(|_| {
            StatsCounters::bump(&self.stats.errors);
        })?;
        self.write_stored(key, packed, ttl, namespace).await
    }

    async fn write_stored(
        &self,
        key: &str,
        stored: Vec<u8>,
        ttl: Duration,
        namespace: CacheNamespace,
    ) -> Result<(), CacheError> {
        let full_key = namespace.key(key);
        self.run("set", move |backend| {
            backend.set(full_key.clone(), stored.clone(), ttl)
        })
        .await?;
        StatsCounters::bump(&self.stats.sets);
        Ok(())
    }

    pub async fn delete(&self, key: &str, namespace: CacheNamespace) -> Result<bool, CacheError> {
        let full_key = namespace.key(key);
        let removed = self
            .run("delete", move |backend| backend.delete(full_key.clone()))
            .await?;
        if removed {
            StatsCounters::bump(&self.stats.deletes);
        }
        Ok(removed)
    }

    pub async fn exists(&self, key: &str, namespace: CacheNamespace) -> Result<bool, CacheError> {
        let full_key = namespace.key(key);
        self.run("exists", move |backend| backend.exists(full_key.clone()))
            .await
    }

    /// Remaining lifetime; `None` when the key is missing or already expired.
    pub async fn ttl(
        &self,
        key: &str,
        namespace: CacheNamespace,
    ) -> Result<Option<Duration>, CacheError> {
        let full_key = namespace.key(key);
        let ttl = self
            .run("ttl", move |backend| backend.ttl(full_key.clone()))
            .await?;
        Ok(ttl.filter(|remaining| !remaining.is_zero()))
    }

    /// Adds `extra` to the remaining lifetime. `false` when the key is missing.
    pub async fn extend_ttl(
        &self,
        key: &str,
        extra: Duration,
        namespace: CacheNamespace,
    ) -> Result<bool, CacheError> {
        let Some(current) = self.ttl(key, namespace).await? else {
            return Ok(false);
        };
        let full_key = namespace.key(key);
        let extended = current + extra;
        self.run("expire", move |backend| {
            backend.expire(full_key.clone(), extended)
        })
        .await
    }

    /// Keys in `namespace` matching a glob `pattern`, with the prefix stripped.
    pub async fn keys_matching(
        &self,
        pattern: &str,
        namespace: CacheNamespace,
    ) -> Result<Vec<String>, CacheError> {
        let full_pattern = namespace.key(pattern);
        let keys = self
            .run("keys", move |backend| backend.keys(full_pattern.clone()))
            .await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(namespace.prefix()).map(str::to_owned))
            .collect())
    }

    /// Set/get/delete round trip on a probe key. Does not touch the statistics.
    pub async fn health_check(&self) -> Result<bool, CacheError> {
        let probe = b"ok".to_vec();
        self.run("health.set", |backend| {
            backend.set(
                HEALTH_PROBE_KEY.to_owned(),
                probe.clone(),
                Duration::from_secs(10),
            )
        })
        .await?;
        let read = self
            .run("health.get", |backend| backend.get(HEALTH_PROBE_KEY.to_owned()))
            .await?;
        self.run("health.delete", |backend| {
            backend.delete(HEALTH_PROBE_KEY.to_owned())
        })
        .await?;
        Ok(read.as_deref() == Some(probe.as_slice()))
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate_percent = if total_requests == 0 {
            0.0
        } else {
            ((hits as f64 / total_requests as f64) * 10_000.0).round() / 100.0
        };
        CacheStats {
            hits,
            misses,
            sets: self.stats.sets.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            total_requests,
            hit_rate_percent,
        }
    }

    pub fn reset_stats(&self) {
        for counter in [
            &self.stats.hits,
            &self.stats.misses,
            &self.stats.sets,
            &self.stats.deletes,
            &self.stats.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Runs one backend command with lazy connect, retry and reconnect.
    async fn run<T, F>(&self, operation: &'static str, mut call: F) -> Result<T, CacheError>
    where
        F: for<'a> FnMut(&'a dyn CacheBackend) -> BackendFuture<'a, T>,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let generation = self.generation.load(Ordering::Acquire);
            let outcome = match self.ensure_connected().await {
                Ok(()) => call(self.backend.as_ref()).await,
                Err(error) => Err(error),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && retry.allows_retry_after(attempt) => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "cache connection error, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                    self.reconnect(generation).await;
                    attempt += 1;
                }
                Err(error) => {
                    StatsCounters::bump(&self.stats.errors);
                    warn!(operation, %error, "cache operation failed");
                    return Err(match error.kind() {
                        BackendErrorKind::Connection => CacheError::Unavailable(error.to_string()),
                        BackendErrorKind::Command => CacheError::Command(error.to_string()),
                    });
                }
            }
        }
    }

    async fn ensure_connected(&self) -> Result<(), BackendError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.reconnect_lock.lock().await;
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        self.backend.connect().await?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.connected.store(true, Ordering::Release);
        info!("cache backend connected");
        Ok(())
    }

    /// Reconnects unless another caller already did since `seen_generation`.
    async fn reconnect(&self, seen_generation: u64) {
        let _guard = self.reconnect_lock.lock().await;
        if self.generation.load(Ordering::Acquire) != seen_generation {
            debug!("reconnect already performed by another caller");
            return;
        }
        self.connected.store(false, Ordering::Release);
        match self.backend.connect().await {
            Ok(()) => {
                self.generation.fetch_add(1, Ordering::AcqRel);
                self.connected.store(true, Ordering::Release);
                info!("cache backend reconnected");
            }
            Err(error) => warn!(%error, "cache reconnect failed"),
        }
    }
}
