//! Currency conversion orchestration: cache first, then the provider chain,
//! with concurrent requests for the same refresh coalesced into one fetch.
//!
//! Conversion routes through a fixed pivot currency: public feeds publish
//! their whole table against one reference currency, so `rate(s -> t)` is
//! derived as `rate(pivot -> t) / rate(pivot -> s)` instead of keeping an
//! N x N matrix.

use crate::cache::{CachedRate, Freshness, RateCache};
use crate::error::{EngineError, Result};
use crate::money::{Money, RoundingMode};
use crate::providers::ProviderChain;
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Outcome of a single conversion. `stale` marks a best-effort result that
/// used a rate past its TTL because no provider could refresh it.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub amount: Money,
    pub rate: Decimal,
    pub stale: bool,
}

/// One item of a batch conversion. The source currency is the amount's own.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub amount: Money,
    pub target: String,
    pub as_of: Option<NaiveDate>,
}

impl ConversionRequest {
    pub fn current(amount: Money, target: &str) -> Self {
        ConversionRequest { amount, target: target.to_string(), as_of: None }
    }

    pub fn as_of(amount: Money, target: &str, date: NaiveDate) -> Self {
        ConversionRequest { amount, target: target.to_string(), as_of: Some(date) }
    }

    fn pair_key(&self) -> PairKey {
        (self.amount.currency.clone(), self.target.clone(), self.as_of)
    }
}

type PairKey = (String, String, Option<NaiveDate>);

pub struct ConversionService {
    chain: ProviderChain,
    cache: Arc<RateCache>,
    pivot: String,
    rounding: RoundingMode,
    // One async guard per refresh key so concurrent cache misses share a
    // single provider call without stalling unrelated keys.
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    // When the pivot table was last refreshed. A fresh table that lacks a
    // quote means the feed does not publish it; refetching will not help.
    table_refreshed_at: Mutex<Option<chrono::DateTime<Utc>>>,
}

impl ConversionService {
    pub fn new(
        chain: ProviderChain,
        cache: Arc<RateCache>,
        pivot: &str,
        rounding: RoundingMode,
    ) -> Self {
        ConversionService {
            chain,
            cache,
            pivot: pivot.to_string(),
            rounding,
            inflight: Mutex::new(HashMap::new()),
            table_refreshed_at: Mutex::new(None),
        }
    }

    fn table_is_fresh(&self) -> bool {
        let refreshed = self.table_refreshed_at.lock().unwrap();
        refreshed.is_some_and(|at| Utc::now() - at <= self.cache.ttl())
    }

    pub fn pivot(&self) -> &str {
        &self.pivot
    }

    /// Converts `amount` into `target` at the current rate.
    pub async fn convert(&self, amount: &Money, target: &str) -> Result<Conversion> {
        if amount.currency == target {
            return Ok(Conversion {
                amount: amount.clone(),
                rate: Decimal::ONE,
                stale: false,
            });
        }
        let (rate, stale) = self.current_rate(&amount.currency, target).await?;
        let converted = amount.converted(rate, target, self.rounding)?;
        debug!(%amount, %converted, %rate, stale, "converted");
        Ok(Conversion { amount: converted, rate, stale })
    }

    /// Converts `amount` into `target` at the rate observed on `date`.
    pub async fn convert_as_of(
        &self,
        amount: &Money,
        target: &str,
        date: NaiveDate,
    ) -> Result<Conversion> {
        if amount.currency == target {
            return Ok(Conversion {
                amount: amount.clone(),
                rate: Decimal::ONE,
                stale: false,
            });
        }
        let rate = self.historical_rate(&amount.currency, target, date).await?;
        let converted = amount.converted(rate, target, self.rounding)?;
        Ok(Conversion { amount: converted, rate, stale: false })
    }

    /// Resolves each distinct (source, target, date) pair exactly once and
    /// applies it to every request sharing the pair. Pairs are fetched
    /// independently, so one slow or failed pair never stalls the rest, and
    /// each request reports its own success or failure in input order.
    pub async fn batch_convert(&self, requests: &[ConversionRequest]) -> Vec<Result<Conversion>> {
        let mut seen = HashSet::new();
        let pairs: Vec<PairKey> = requests
            .iter()
            .map(ConversionRequest::pair_key)
            .filter(|key| seen.insert(key.clone()))
            .collect();

        let rate_futures = pairs.iter().map(|key| async {
            let resolved = match key.2 {
                None => self.pair_rate(&key.0, &key.1).await,
                Some(date) => self
                    .historical_rate(&key.0, &key.1, date)
                    .await
                    .map(|rate| (rate, false)),
            };
            (key.clone(), resolved)
        });
        let rates: HashMap<PairKey, Result<(Decimal, bool)>> =
            join_all(rate_futures).await.into_iter().collect();

        requests
            .iter()
            .map(|request| match &rates[&request.pair_key()] {
                Ok((rate, stale)) => request
                    .amount
                    .converted(*rate, &request.target, self.rounding)
                    .map(|amount| Conversion { amount, rate: *rate, stale: *stale }),
                Err(e) => Err(e.clone()),
            })
            .collect()
    }

    /// Current cross rate for `source`/`target`, with a staleness flag.
    pub async fn current_rate(&self, source: &str, target: &str) -> Result<(Decimal, bool)> {
        self.pair_rate(source, target).await
    }

    async fn pair_rate(&self, source: &str, target: &str) -> Result<(Decimal, bool)> {
        if source == target {
            return Ok((Decimal::ONE, false));
        }
        let (to_source, source_stale) = self.pivot_rate_to(source).await?;
        let (to_target, target_stale) = self.pivot_rate_to(target).await?;
        let rate = cross_rate(to_source, to_target).ok_or_else(|| {
            EngineError::RateUnavailable {
                base: source.to_string(),
                quote: target.to_string(),
            }
        })?;
        Ok((rate, source_stale || target_stale))
    }

    /// Cross rate for `source`/`target` as observed on `date`. Dated rates
    /// are immutable facts: cached forever, never stale.
    pub async fn historical_rate(
        &self,
        source: &str,
        target: &str,
        date: NaiveDate,
    ) -> Result<Decimal> {
        if source == target {
            return Ok(Decimal::ONE);
        }
        let to_source = self.historical_pivot_rate_to(source, date).await?;
        let to_target = self.historical_pivot_rate_to(target, date).await?;
        cross_rate(to_source, to_target).ok_or_else(|| EngineError::HistoricalRateUnavailable {
            base: source.to_string(),
            quote: target.to_string(),
            date,
        })
    }

    /// Current pivot -> `quote` rate from the cache, refreshing the whole
    /// pivot table through the chain when stale or absent. The refresh is
    /// coalesced: whoever holds the guard fetches, everyone else re-reads
    /// the now-fresh cache.
    async fn pivot_rate_to(&self, quote: &str) -> Result<(Decimal, bool)> {
        if quote == self.pivot {
            return Ok((Decimal::ONE, false));
        }
        if let Some((entry, Freshness::Fresh)) = self.cache.get_current(&self.pivot, quote) {
            return Ok((entry.rate, false));
        }

        let guard = self.refresh_guard("current");
        let _held = guard.lock().await;
        if let Some((entry, Freshness::Fresh)) = self.cache.get_current(&self.pivot, quote) {
            return Ok((entry.rate, false));
        }
        if self.table_is_fresh() {
            return Err(EngineError::RateUnavailable {
                base: self.pivot.clone(),
                quote: quote.to_string(),
            });
        }

        match self.chain.fetch_current_rates(&self.pivot).await {
            Ok((source, rates)) => {
                let observed_at = Utc::now();
                *self.table_refreshed_at.lock().unwrap() = Some(observed_at);
                let entries: Vec<CachedRate> = rates
                    .into_iter()
                    .filter(|(_, rate)| rate.is_sign_positive() && !rate.is_zero())
                    .map(|(currency, rate)| CachedRate {
                        base: self.pivot.clone(),
                        quote: currency,
                        rate,
                        observed_at,
                        source: source.clone(),
                    })
                    .collect();
                self.cache.put_current_bulk(entries);

                match self.cache.get_current(&self.pivot, quote) {
                    Some((entry, _)) => Ok((entry.rate, false)),
                    // Feed refreshed fine but does not quote this currency.
                    None => Err(EngineError::RateUnavailable {
                        base: self.pivot.clone(),
                        quote: quote.to_string(),
                    }),
                }
            }
            Err(err) => {
                if let Some((entry, _)) = self.cache.get_current(&self.pivot, quote) {
                    warn!(quote, error = %err, "refresh failed, using stale rate");
                    Ok((entry.rate, true))
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn historical_pivot_rate_to(&self, quote: &str, date: NaiveDate) -> Result<Decimal> {
        if quote == self.pivot {
            return Ok(Decimal::ONE);
        }
        if let Some(entry) = self.cache.get_historical(&self.pivot, quote, date) {
            return Ok(entry.rate);
        }

        let guard = self.refresh_guard(&format!("hist:{quote}:{date}"));
        let _held = guard.lock().await;
        if let Some(entry) = self.cache.get_historical(&self.pivot, quote, date) {
            return Ok(entry.rate);
        }

        let (source, rate) = self.chain.fetch_historical_rate(&self.pivot, quote, date).await?;
        if !rate.is_sign_positive() || rate.is_zero() {
            return Err(EngineError::HistoricalRateUnavailable {
                base: self.pivot.clone(),
                quote: quote.to_string(),
                date,
            });
        }
        self.cache.put_historical(
            date,
            CachedRate {
                base: self.pivot.clone(),
                quote: quote.to_string(),
                rate,
                observed_at: Utc::now(),
                source,
            },
        );
        Ok(rate)
    }

    fn refresh_guard(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap();
        Arc::clone(
            inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

/// `rate(s -> t)` from the pivot legs; 1 pivot = `to_source` s = `to_target` t.
fn cross_rate(to_source: Decimal, to_target: Decimal) -> Option<Decimal> {
    if to_source.is_zero() {
        return None;
    }
    to_target.checked_div(to_source)
}
