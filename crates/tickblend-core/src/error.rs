use thiserror::Error;

/// Validation and contract errors exposed by `tickblend-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid source '{value}', expected one of yahoo, alphavantage")]
    InvalidSource { value: String },
    #[error("invalid history range '{value}', expected one of 1mo, 3mo, 6mo, 1y, 2y, 5y, max")]
    InvalidRange { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("trading date must be formatted YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },

    #[error("search query cannot be empty")]
    EmptyQuery,
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure surfaced by the cache store once its own retries are exhausted.
///
/// Callers on the read path treat every variant as a miss; callers on the write
/// path log and continue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache command failed: {0}")]
    Command(String),
    #[error("failed to encode cache payload: {0}")]
    Encode(String),
    #[error("failed to decode cache payload: {0}")]
    Decode(String),
}

/// A single quality dimension could not produce a usable score.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QualityError {
    #[error("{dimension} produced a non-finite score")]
    NonFinite { dimension: &'static str },
    #[error("{dimension} could not be evaluated: {reason}")]
    Invalid {
        dimension: &'static str,
        reason: String,
    },
}
