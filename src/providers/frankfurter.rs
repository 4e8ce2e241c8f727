use super::{RateProvider, check_status, http_client};
use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Adapter for the frankfurter.dev reference-rate feed. Publishes all quotes
/// against one base currency per request.
pub struct FrankfurterProvider {
    base_url: String,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str) -> Self {
        FrankfurterProvider {
            base_url: base_url.to_string(),
        }
    }

    async fn fetch_table(&self, url: &str) -> Result<FrankfurterResponse, ProviderError> {
        debug!("Requesting rates from {}", url);
        let client = http_client()?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("request error: {e} for URL: {url}")))?;
        let response = check_status(response, url)?;

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("unparseable payload: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    rates: HashMap<String, Decimal>,
}

#[async_trait]
impl RateProvider for FrankfurterProvider {
    fn name(&self) -> &'static str {
        "frankfurter"
    }

    #[instrument(name = "FrankfurterCurrentRates", skip(self), fields(base = %base))]
    async fn fetch_current_rates(
        &self,
        base: &str,
    ) -> Result<HashMap<String, Decimal>, ProviderError> {
        let url = format!("{}/v1/latest?base={}", self.base_url, base);
        let data = self.fetch_table(&url).await?;
        if data.rates.is_empty() {
            return Err(ProviderError::InvalidResponse(format!(
                "no rates returned for base {base}"
            )));
        }
        Ok(data.rates)
    }

    #[instrument(
        name = "FrankfurterHistoricalRate",
        skip(self),
        fields(base = %base, quote = %quote, date = %date)
    )]
    async fn fetch_historical_rate(
        &self,
        base: &str,
        quote: &str,
        date: NaiveDate,
    ) -> Result<Decimal, ProviderError> {
        let url = format!(
            "{}/v1/{}?base={}&symbols={}",
            self.base_url,
            date.format("%Y-%m-%d"),
            base,
            quote
        );
        let data = self.fetch_table(&url).await?;
        data.rates.get(quote).copied().ok_or_else(|| {
            ProviderError::InvalidResponse(format!("no rate for {quote} on {date}"))
        })
    }
}
