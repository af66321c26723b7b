//! Provider adapters.
//!
//! Each adapter serves deterministic fixtures when built on a mock transport
//! (see [`HttpClient::is_mock`](crate::http_client::HttpClient::is_mock)) and
//! talks to the real upstream otherwise.

mod alphavantage;
mod convert;
mod fixtures;
mod yahoo;

pub use alphavantage::AlphaVantageAdapter;
pub use yahoo::{YahooAdapter, YahooAuthManager};

use crate::data_source::SourceError;
use crate::http_client::HttpError;

/// Maps "the provider does not know this symbol" to an empty result.
pub(crate) fn absent_on_not_found<T: Default>(
    result: Result<T, SourceError>,
) -> Result<T, SourceError> {
    match result {
        Err(error) if error.is_not_found() => Ok(T::default()),
        other => other,
    }
}

pub(crate) fn transport_error(provider: &str, error: &HttpError) -> SourceError {
    if error.retryable() {
        SourceError::unavailable(format!("{provider} transport error: {}", error.message()))
    } else {
        SourceError::internal(format!("{provider} transport error: {}", error.message()))
    }
}
