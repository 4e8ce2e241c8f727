//! Priority-ordered provider failover, gated by the rate limiter.

use super::RateProvider;
use crate::error::{EngineError, ProviderError, ProviderFailure};
use crate::limiter::RateLimiter;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tries providers strictly in priority order. A limiter denial skips the
/// provider without counting as a provider failure; any other failure is
/// recorded and the chain advances. A provider is never re-tried within one
/// call. Only when every provider was skipped or failed does the chain fail,
/// with an aggregate error enumerating each provider's cause.
pub struct ProviderChain {
    providers: Vec<Arc<dyn RateProvider>>,
    limiter: Arc<RateLimiter>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn RateProvider>>, limiter: Arc<RateLimiter>) -> Self {
        ProviderChain { providers, limiter }
    }

    pub async fn fetch_current_rates(
        &self,
        base: &str,
    ) -> Result<(String, HashMap<String, Decimal>), EngineError> {
        self.try_each(|provider| {
            let base = base.to_string();
            async move { provider.fetch_current_rates(&base).await }
        })
        .await
    }

    pub async fn fetch_historical_rate(
        &self,
        base: &str,
        quote: &str,
        date: NaiveDate,
    ) -> Result<(String, Decimal), EngineError> {
        self.try_each(|provider| {
            let base = base.to_string();
            let quote = quote.to_string();
            async move { provider.fetch_historical_rate(&base, &quote, date).await }
        })
        .await
    }

    async fn try_each<T, F, Fut>(&self, mut fetch: F) -> Result<(String, T), EngineError>
    where
        F: FnMut(Arc<dyn RateProvider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut failures = Vec::new();
        let mut denied = 0usize;
        let mut min_wait: Option<Duration> = None;

        for provider in &self.providers {
            let name = provider.name();
            if let Err(wait) = self.limiter.try_acquire(name) {
                debug!(provider = name, ?wait, "provider quota exhausted, skipping");
                denied += 1;
                min_wait = Some(min_wait.map_or(wait, |w| w.min(wait)));
                failures.push(ProviderFailure {
                    provider: name.to_string(),
                    cause: ProviderError::QuotaExhausted(format!(
                        "local quota; retry in {wait:?}"
                    )),
                });
                continue;
            }

            match fetch(Arc::clone(provider)).await {
                Ok(value) => {
                    debug!(provider = name, "provider responded");
                    return Ok((name.to_string(), value));
                }
                Err(cause) => {
                    warn!(provider = name, error = %cause, "provider failed, advancing");
                    failures.push(ProviderFailure {
                        provider: name.to_string(),
                        cause,
                    });
                }
            }
        }

        // Every source quota-gated: surface the wait hint instead of a
        // provider failure so callers know when to come back.
        if denied == self.providers.len() {
            if let Some(retry_after) = min_wait {
                return Err(EngineError::RateLimitExceeded { retry_after });
            }
        }
        Err(EngineError::AllProvidersFailed { failures })
    }
}
