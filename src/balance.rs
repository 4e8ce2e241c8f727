//! Account balance derivation over immutable transaction snapshots.
//!
//! Pure functions: the engine never mutates accounts or transactions, and
//! these paths cannot fail. Amounts are assumed normalized upstream into
//! each account's native currency.

use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

/// One ledger entry, owned by the surrounding application. Treated as part
/// of an immutable snapshot for the duration of a computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub account_id: String,
    pub direction: Direction,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub initial_balance: Money,
}

impl Account {
    pub fn new(id: &str, initial_balance: Money) -> Self {
        Account { id: id.to_string(), initial_balance }
    }

    pub fn currency(&self) -> &str {
        &self.initial_balance.currency
    }
}

fn signed_minor(transaction: &Transaction) -> i64 {
    match transaction.direction {
        Direction::Credit => transaction.amount.minor,
        Direction::Debit => -transaction.amount.minor,
    }
}

/// Balance of one account: a single O(T) pass from the initial balance,
/// credits added and debits subtracted in order.
pub fn account_balance(account: &Account, transactions: &[Transaction]) -> Money {
    let minor = transactions
        .iter()
        .filter(|t| t.account_id == account.id)
        .fold(account.initial_balance.minor, |acc, t| acc + signed_minor(t));
    Money::new(minor, account.currency())
}

/// Balances for many accounts in one pass over the full transaction list:
/// O(A + T) instead of running the single-account pass once per account.
/// Transactions referencing unknown accounts are ignored.
pub fn batch_account_balances(
    accounts: &[Account],
    transactions: &[Transaction],
) -> HashMap<String, Money> {
    let mut minors: HashMap<&str, i64> = accounts
        .iter()
        .map(|a| (a.id.as_str(), a.initial_balance.minor))
        .collect();

    for transaction in transactions {
        if let Some(minor) = minors.get_mut(transaction.account_id.as_str()) {
            *minor += signed_minor(transaction);
        }
    }

    accounts
        .iter()
        .map(|a| {
            let minor = minors[a.id.as_str()];
            (a.id.clone(), Money::new(minor, a.currency()))
        })
        .collect()
}
