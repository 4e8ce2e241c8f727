use super::{RateProvider, check_status, http_client};
use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Adapter for the open.er-api.com rate feed. Responses carry a `result`
/// field that must be `success`; errors arrive as 200s with an error type.
pub struct OpenErApiProvider {
    base_url: String,
}

impl OpenErApiProvider {
    pub fn new(base_url: &str) -> Self {
        OpenErApiProvider {
            base_url: base_url.to_string(),
        }
    }

    async fn fetch_table(&self, url: &str) -> Result<HashMap<String, Decimal>, ProviderError> {
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
        let data: ErApiResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("unparseable payload: {e}")))?;

        if data.result != "success" {
            let kind = data.error_type.unwrap_or_else(|| "unknown".to_string());
            if kind == "quota-reached" {
                return Err(ProviderError::QuotaExhausted(kind));
            }
            return Err(ProviderError::InvalidResponse(format!(
                "provider reported failure: {kind}"
            )));
        }
        data.rates
            .filter(|rates| !rates.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no rates in payload".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ErApiResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    rates: Option<HashMap<String, Decimal>>,
}

#[async_trait]
impl RateProvider for OpenErApiProvider {
    fn name(&self) -> &'static str {
        "open-er-api"
    }

    #[instrument(name = "OpenErApiCurrentRates", skip(self), fields(base = %base))]
    async fn fetch_current_rates(
        &self,
        base: &str,
    ) -> Result<HashMap<String, Decimal>, ProviderError> {
        let url = format!("{}/v6/latest/{}", self.base_url, base);
        self.fetch_table(&url).await
    }

    #[instrument(
        name = "OpenErApiHistoricalRate",
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
            "{}/v6/history/{}/{}/{}/{}",
            self.base_url,
            base,
            date.year(),
            date.month(),
            date.day()
        );
        let rates = self.fetch_table(&url).await?;
        rates.get(quote).copied().ok_or_else(|| {
            ProviderError::InvalidResponse(format!("no rate for {quote} on {date}"))
        })
    }
}
