//! Typed errors for the calculation engine.

use chrono::NaiveDate;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a single rate provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),
}

/// One provider's cause inside an aggregate chain failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub cause: ProviderError,
}

impl Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.cause)
    }
}

/// Engine error surface. Clone so batch paths can report the same failure
/// against every request that shared the failed currency pair.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("no exchange rate available for {base}/{quote}")]
    RateUnavailable { base: String, quote: String },

    #[error("no exchange rate available for {base}/{quote} on {date}")]
    HistoricalRateUnavailable {
        base: String,
        quote: String,
        date: NaiveDate,
    },

    #[error("rate limit exceeded; retry in {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("all rate providers failed: [{}]", format_failures(.failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },
}

fn format_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_error_enumerates_causes() {
        let err = EngineError::AllProvidersFailed {
            failures: vec![
                ProviderFailure {
                    provider: "frankfurter".to_string(),
                    cause: ProviderError::Network("connection refused".to_string()),
                },
                ProviderFailure {
                    provider: "open-er-api".to_string(),
                    cause: ProviderError::InvalidResponse("empty rates".to_string()),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("frankfurter: network error: connection refused"));
        assert!(msg.contains("open-er-api: invalid response: empty rates"));
    }

    #[test]
    fn test_rate_limit_error_carries_wait() {
        let err = EngineError::RateLimitExceeded {
            retry_after: Duration::from_secs(42),
        };
        assert!(err.to_string().contains("retry in"));
    }
}
