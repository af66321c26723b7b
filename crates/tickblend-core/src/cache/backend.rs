use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::retry::Retryable;
use crate::UtcDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The connection is gone; reconnecting may help.
    Connection,
    /// The backend rejected the command.
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    kind: BackendErrorKind,
    message: String,
}

impl BackendError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Connection,
            message: message.into(),
        }
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Command,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BackendError {}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        self.kind == BackendErrorKind::Connection
    }
}

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// Primitive key-value operations of a TTL-aware store.
///
/// Keys arrive fully namespaced. Expiry is the backend's job: an expired key
/// must read as absent.
pub trait CacheBackend: Send + Sync {
    /// Establishes or re-establishes the connection.
    fn connect<'a>(&'a self) -> BackendFuture<'a, ()>;

    fn get<'a>(&'a self, key: String) -> BackendFuture<'a, Option<Vec<u8>>>;

    fn set<'a>(&'a self, key: String, value: Vec<u8>, ttl: Duration) -> BackendFuture<'a, ()>;

    fn delete<'a>(&'a self, key: String) -> BackendFuture<'a, bool>;

    fn exists<'a>(&'a self, key: String) -> BackendFuture<'a, bool>;

    /// Remaining lifetime; `None` for a missing key.
    fn ttl<'a>(&'a self, key: String) -> BackendFuture<'a, Option<Duration>>;

    /// Replaces the lifetime of an existing key; `false` when the key is missing.
    fn expire<'a>(&'a self, key: String, ttl: Duration) -> BackendFuture<'a, bool>;

    /// Keys matching a glob pattern (`*` and `?`).
    fn keys<'a>(&'a self, pattern: String) -> BackendFuture<'a, Vec<String>>;

    fn ping<'a>(&'a self) -> BackendFuture<'a, ()>;
}

/// Writes between two sweeps of expired entries.
const SWEEP_EVERY: usize = 64;

/// Stored entry of the in-memory backend.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub key: String,
    /// Namespace the key was written under (`stock`, `search`, ...).
    pub source_tag: Option<String>,
    pub payload: Vec<u8>,
    pub created_at: UtcDateTime,
    pub expires_at: Instant,
}

impl CacheRecord {
    fn new(key: String, payload: Vec<u8>, ttl: Duration) -> Self {
        let source_tag = key
            .split_once(':')
            .map(|(namespace, _)| namespace.to_owned());
        Self {
            key,
            source_tag,
            payload,
            created_at: UtcDateTime::now(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local backend.
///
/// Expired entries are dropped when a read finds them and swept in bulk every
/// [`SWEEP_EVERY`] writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<tokio::sync::RwLock<HashMap<String, CacheRecord>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, record| record.is_live(now));
        before - entries.len()
    }

    /// Live entry as seen by readers, dropping it when it has expired.
    async fn live<T>(&self, key: &str, read: impl FnOnce(&CacheRecord, Instant) -> T) -> Option<T> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(record) if record.is_live(now) => return Some(read(record, now)),
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|record| !record.is_live(now)) {
            entries.remove(key);
        }
        None
    }

    /// Entry count including not-yet-purged expired entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Raw stored entry, for inspection.
    pub async fn record(&self, key: &str) -> Option<CacheRecord> {
        self.live(key, |record, _| record.clone()).await
    }
}

impl CacheBackend for MemoryBackend {
    fn connect<'a>(&'a self) -> BackendFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn get<'a>(&'a self, key: String) -> BackendFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move { Ok(self.live(&key, |record, _| record.payload.clone()).await) })
    }

    fn set<'a>(&'a self, key: String, value: Vec<u8>, ttl: Duration) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            if ttl.is_zero() {
                return Err(BackendError::command("ttl must be greater than zero"));
            }
            if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
                self.purge_expired().await;
            }
            let record = CacheRecord::new(key.clone(), value, ttl);
            self.entries.write().await.insert(key, record);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: String) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let now = Instant::now();
            let removed = self.entries.write().await.remove(&key);
            Ok(removed.is_some_and(|record| record.is_live(now)))
        })
    }

    fn exists<'a>(&'a self, key: String) -> BackendFuture<'a, bool> {
        Box::pin(async move { Ok(self.live(&key, |_, _| ()).await.is_some()) })
    }

    fn ttl<'a>(&'a self, key: String) -> BackendFuture<'a, Option<Duration>> {
        Box::pin(async move {
            Ok(self
                .live(&key, |record, now| record.expires_at.saturating_duration_since(now))
                .await)
        })
    }

    fn expire<'a>(&'a self, key: String, ttl: Duration) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let now = Instant::now();
            let mut entries = self.entries.write().await;
            match entries.get_mut(&key) {
                Some(record) if record.is_live(now) => {
                    record.expires_at = now + ttl;
                    Ok(true)
                }
                Some(_) => {
                    entries.remove(&key);
                    Ok(false)
                }
                None => Ok(false),
            }
        })
    }

    fn keys<'a>(&'a self, pattern: String) -> BackendFuture<'a, Vec<String>> {
        Box::pin(async move {
            let now = Instant::now();
            let entries = self.entries.read().await;
            let mut keys = entries
                .iter()
                .filter(|(key, record)| record.is_live(now) && glob_match(&pattern, key))
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            keys.sort();
            Ok(keys)
        })
    }

    fn ping<'a>(&'a self) -> BackendFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Glob matching with `*` (any run) and `?` (one character).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.chars().collect::<Vec<_>>();
    let text = text.chars().collect::<Vec<_>>();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_text = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_text = t;
            p += 1;
        } else if let Some(star_at) = star {
            p = star_at + 1;
            star_text += 1;
            t = star_text;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|ch| *ch == '*')
}
