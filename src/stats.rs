//! Trailing-period summaries and category breakdowns over a transaction
//! snapshot. Single-currency: these paths never convert and never fail.

use crate::balance::{Direction, Transaction};
use crate::money::Money;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One calendar month of activity plus the balance at the end of it.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyStat {
    pub year: i32,
    pub month: u32,
    pub income: Money,
    pub expense: Money,
    pub net: Money,
    pub balance: Money,
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 { (year - 1, 12) } else { (year, month - 1) }
}

/// Income/expense/net/balance for the `periods` trailing calendar months
/// ending at `as_of`, oldest first.
///
/// `ending_balance` is taken as ground truth for the most recent period (it
/// may include adjustments outside the transaction log); earlier balances
/// are derived by reversing each period's net flow out of it, so any drift
/// between the log and reality is absorbed into the oldest period shown.
pub fn monthly_stats(
    transactions: &[Transaction],
    periods: usize,
    ending_balance: &Money,
    as_of: NaiveDate,
) -> Vec<MonthlyStat> {
    if periods == 0 {
        return Vec::new();
    }
    let currency = &ending_balance.currency;

    // Trailing months, newest first.
    let mut months = Vec::with_capacity(periods);
    let (mut year, mut month) = (as_of.year(), as_of.month());
    for _ in 0..periods {
        months.push((year, month));
        (year, month) = previous_month(year, month);
    }

    // Each period's own flows, summed independently of the balance walk.
    let mut income: HashMap<(i32, u32), i64> = HashMap::new();
    let mut expense: HashMap<(i32, u32), i64> = HashMap::new();
    for transaction in transactions {
        let date = transaction.timestamp.date_naive();
        let key = (date.year(), date.month());
        match transaction.direction {
            Direction::Credit => *income.entry(key).or_default() += transaction.amount.minor,
            Direction::Debit => *expense.entry(key).or_default() += transaction.amount.minor,
        }
    }

    // Walk newest -> oldest, anchoring the newest balance to reality.
    let mut balance_minor = ending_balance.minor;
    let mut stats = Vec::with_capacity(periods);
    for (i, key) in months.iter().enumerate() {
        let month_income = income.get(key).copied().unwrap_or(0);
        let month_expense = expense.get(key).copied().unwrap_or(0);
        let net = month_income - month_expense;

        if i > 0 {
            // Reverse the newer period's net out to get this period's close.
            balance_minor -= stats
                .last()
                .map(|s: &MonthlyStat| s.net.minor)
                .unwrap_or(0);
        }

        stats.push(MonthlyStat {
            year: key.0,
            month: key.1,
            income: Money::new(month_income, currency),
            expense: Money::new(month_expense, currency),
            net: Money::new(net, currency),
            balance: Money::new(balance_minor, currency),
        });
    }

    stats.reverse();
    stats
}

/// One category's share of a direction-filtered total.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryShare {
    pub category: String,
    pub total: Money,
    pub share_pct: Decimal,
}

const UNCATEGORIZED: &str = "uncategorized";

/// Groups transactions of `direction` by category in one pass and computes
/// each category's percentage of the filtered total, largest first.
pub fn category_breakdown(transactions: &[Transaction], direction: Direction) -> Vec<CategoryShare> {
    let mut totals: HashMap<&str, i64> = HashMap::new();
    let mut currency: Option<&str> = None;
    let mut grand_total: i64 = 0;

    for transaction in transactions.iter().filter(|t| t.direction == direction) {
        let category = transaction.category.as_deref().unwrap_or(UNCATEGORIZED);
        *totals.entry(category).or_default() += transaction.amount.minor;
        grand_total += transaction.amount.minor;
        currency.get_or_insert(&transaction.amount.currency);
    }

    let Some(currency) = currency else {
        return Vec::new();
    };

    let mut shares: Vec<CategoryShare> = totals
        .into_iter()
        .map(|(category, minor)| {
            let share_pct = if grand_total == 0 {
                Decimal::ZERO
            } else {
                (Decimal::from(minor) / Decimal::from(grand_total) * Decimal::ONE_HUNDRED)
                    .round_dp(2)
            };
            CategoryShare {
                category: category.to_string(),
                total: Money::new(minor, currency),
                share_pct,
            }
        })
        .collect();
    shares.sort_by(|a, b| b.total.minor.cmp(&a.total.minor).then(a.category.cmp(&b.category)));
    shares
}
