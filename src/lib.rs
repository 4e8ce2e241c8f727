pub mod balance;
pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod limiter;
pub mod log;
pub mod money;
pub mod networth;
pub mod providers;
pub mod stats;

pub use crate::balance::{Account, Direction, Transaction, account_balance, batch_account_balances};
pub use crate::config::{EngineConfig, ProviderConfig, ProviderKind};
pub use crate::convert::{Conversion, ConversionRequest, ConversionService};
pub use crate::error::{EngineError, ProviderError, Result};
pub use crate::money::{Money, RoundingMode};
pub use crate::networth::{NetWorth, net_worth};
pub use crate::stats::{CategoryShare, MonthlyStat, category_breakdown, monthly_stats};

use crate::cache::RateCache;
use crate::limiter::{RateLimiter, RateWindow};
use crate::providers::{
    RateProvider, chain::ProviderChain, frankfurter::FrankfurterProvider,
    open_er_api::OpenErApiProvider,
};
use chrono::Duration;
use rust_decimal::Decimal;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Everything wired together: provider chain behind the limiter, the shared
/// rate cache, and the conversion service that routes through the pivot.
pub struct FinanceEngine {
    conversion: ConversionService,
}

impl FinanceEngine {
    pub fn new(config: &EngineConfig) -> Self {
        debug!("Building engine: {config:#?}");

        let ttl = Duration::seconds(config.cache_ttl_secs as i64);
        let cache = match &config.cache_path {
            Some(path) => Arc::new(RateCache::with_persistence(ttl, path)),
            None => Arc::new(RateCache::new(ttl)),
        };

        let mut limits: HashMap<String, Vec<RateWindow>> = HashMap::new();
        let mut sources: Vec<Arc<dyn RateProvider>> = Vec::new();
        for provider in &config.providers {
            let source: Arc<dyn RateProvider> = match provider.kind {
                ProviderKind::Frankfurter => {
                    Arc::new(FrankfurterProvider::new(provider.base_url()))
                }
                ProviderKind::OpenErApi => Arc::new(OpenErApiProvider::new(provider.base_url())),
            };
            if !provider.limits.is_empty() {
                limits.insert(source.name().to_string(), provider.limits.clone());
            }
            sources.push(source);
        }

        let chain = ProviderChain::new(sources, Arc::new(RateLimiter::new(limits)));
        let conversion =
            ConversionService::new(chain, cache, &config.pivot_currency, config.rounding);

        FinanceEngine { conversion }
    }

    pub fn conversion(&self) -> &ConversionService {
        &self.conversion
    }

    pub async fn convert(&self, amount: &Money, target: &str) -> Result<Conversion> {
        self.conversion.convert(amount, target).await
    }

    pub async fn batch_convert(&self, requests: &[ConversionRequest]) -> Vec<Result<Conversion>> {
        self.conversion.batch_convert(requests).await
    }

    pub async fn current_rate(&self, source: &str, target: &str) -> Result<(Decimal, bool)> {
        self.conversion.current_rate(source, target).await
    }

    pub async fn net_worth(
        &self,
        accounts: &[Account],
        transactions: &[Transaction],
        reporting_currency: &str,
    ) -> NetWorth {
        net_worth(accounts, transactions, reporting_currency, &self.conversion).await
    }
}
