//! External exchange-rate sources and the failover chain in front of them.

pub mod chain;
pub mod frankfurter;
pub mod open_er_api;

pub use chain::ProviderChain;
pub use frankfurter::FrankfurterProvider;
pub use open_er_api::OpenErApiProvider;

use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One external rate source, normalized by a per-provider adapter. Feeds
/// publish rates against a single base currency, so `fetch_current_rates`
/// returns the full table for `base` in one call.
#[async_trait]
pub trait RateProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Current rates: 1 unit of `base` = rate units of each returned quote.
    async fn fetch_current_rates(
        &self,
        base: &str,
    ) -> Result<HashMap<String, Decimal>, ProviderError>;

    /// The rate for `base`/`quote` as observed on `date`.
    async fn fetch_historical_rate(
        &self,
        base: &str,
        quote: &str,
        date: NaiveDate,
    ) -> Result<Decimal, ProviderError>;
}

pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent("fx-engine/0.1")
        .build()
        .map_err(|e| ProviderError::Network(e.to_string()))
}

/// Maps a response status into the typed error space: 429 means the remote
/// quota is gone, anything else non-2xx is a transport-level failure.
pub(crate) fn check_status(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::QuotaExhausted(format!(
            "HTTP 429 for {context}"
        )));
    }
    if !status.is_success() {
        return Err(ProviderError::Network(format!(
            "HTTP {status} for {context}"
        )));
    }
    Ok(response)
}
