//! Cross-currency portfolio valuation.

use crate::balance::{Account, Transaction, batch_account_balances};
use crate::convert::{ConversionRequest, ConversionService};
use crate::money::Money;
use tracing::warn;

/// An account left out of the total because its balance could not be
/// converted into the reporting currency.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedAccount {
    pub account_id: String,
    pub currency: String,
    pub reason: String,
}

/// Best-effort portfolio total. `stale` is set when any contributing rate
/// was past its TTL, so callers can render a staleness indicator instead of
/// failing the whole view.
#[derive(Debug, Clone, PartialEq)]
pub struct NetWorth {
    pub total: Money,
    pub excluded: Vec<ExcludedAccount>,
    pub stale: bool,
}

/// Derives every account's balance in one batch pass, converts each into
/// `reporting_currency`, and sums. A failed conversion excludes that account
/// and records the reason rather than failing the computation.
pub async fn net_worth(
    accounts: &[Account],
    transactions: &[Transaction],
    reporting_currency: &str,
    conversion: &ConversionService,
) -> NetWorth {
    let balances = batch_account_balances(accounts, transactions);

    let requests: Vec<ConversionRequest> = accounts
        .iter()
        .map(|account| ConversionRequest::current(balances[&account.id].clone(), reporting_currency))
        .collect();
    let conversions = conversion.batch_convert(&requests).await;

    let mut total = Money::zero(reporting_currency);
    let mut excluded = Vec::new();
    let mut stale = false;

    for (account, result) in accounts.iter().zip(conversions) {
        match result {
            Ok(converted) => {
                stale |= converted.stale;
                // Same reporting currency throughout, so this cannot fail.
                if let Ok(sum) = total.checked_add(&converted.amount) {
                    total = sum;
                }
            }
            Err(e) => {
                warn!(account = %account.id, currency = %account.currency(), error = %e, "excluding account from net worth");
                excluded.push(ExcludedAccount {
                    account_id: account.id.clone(),
                    currency: account.currency().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    NetWorth { total, excluded, stale }
}
