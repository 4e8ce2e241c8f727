//! Exact monetary values: integer minor-unit amounts tagged with a currency.

use crate::error::EngineError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Immutable reference data for a currency: ISO code, minor-unit exponent
/// and display symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyInfo {
    pub code: &'static str,
    pub exponent: u32,
    pub symbol: &'static str,
}

static CURRENCIES: &[CurrencyInfo] = &[
    CurrencyInfo { code: "USD", exponent: 2, symbol: "$" },
    CurrencyInfo { code: "EUR", exponent: 2, symbol: "€" },
    CurrencyInfo { code: "GBP", exponent: 2, symbol: "£" },
    CurrencyInfo { code: "INR", exponent: 2, symbol: "₹" },
    CurrencyInfo { code: "JPY", exponent: 0, symbol: "¥" },
    CurrencyInfo { code: "KRW", exponent: 0, symbol: "₩" },
    CurrencyInfo { code: "VND", exponent: 0, symbol: "₫" },
    CurrencyInfo { code: "KWD", exponent: 3, symbol: "KD" },
    CurrencyInfo { code: "BHD", exponent: 3, symbol: "BD" },
    CurrencyInfo { code: "OMR", exponent: 3, symbol: "R.O." },
    CurrencyInfo { code: "CHF", exponent: 2, symbol: "Fr" },
    CurrencyInfo { code: "CAD", exponent: 2, symbol: "C$" },
    CurrencyInfo { code: "AUD", exponent: 2, symbol: "A$" },
    CurrencyInfo { code: "NZD", exponent: 2, symbol: "NZ$" },
    CurrencyInfo { code: "SGD", exponent: 2, symbol: "S$" },
    CurrencyInfo { code: "HKD", exponent: 2, symbol: "HK$" },
    CurrencyInfo { code: "CNY", exponent: 2, symbol: "¥" },
    CurrencyInfo { code: "SEK", exponent: 2, symbol: "kr" },
    CurrencyInfo { code: "NOK", exponent: 2, symbol: "kr" },
    CurrencyInfo { code: "DKK", exponent: 2, symbol: "kr" },
    CurrencyInfo { code: "AED", exponent: 2, symbol: "د.إ" },
    CurrencyInfo { code: "BRL", exponent: 2, symbol: "R$" },
    CurrencyInfo { code: "ZAR", exponent: 2, symbol: "R" },
];

/// Looks up a currency in the static registry.
pub fn currency_info(code: &str) -> Option<&'static CurrencyInfo> {
    CURRENCIES.iter().find(|c| c.code == code)
}

/// Minor-unit exponent for a currency code. Unknown codes default to 2, the
/// most common subdivision.
pub fn minor_exponent(code: &str) -> u32 {
    currency_info(code).map_or(2, |c| c.exponent)
}

/// Display symbol for a currency code, falling back to the code itself.
pub fn currency_symbol(code: &str) -> &str {
    match currency_info(code) {
        Some(info) => info.symbol,
        None => code,
    }
}

/// Rounding applied whenever an amount is scaled to minor units. The same
/// mode is used at every rounding site so repeated application of the same
/// operation is reproducible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingMode {
    /// Round half away from zero (the conventional monetary default).
    #[default]
    HalfUp,
    /// Banker's rounding.
    HalfEven,
    /// Truncate toward zero.
    Down,
    /// Round away from zero.
    Up,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::Down => RoundingStrategy::ToZero,
            RoundingMode::Up => RoundingStrategy::AwayFromZero,
        }
    }
}

/// A monetary amount as an integer count of minor units in a currency.
/// Never a float at any stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub minor: i64,
    pub currency: String,
}

impl Money {
    pub fn new(minor: i64, currency: &str) -> Self {
        Money {
            minor,
            currency: currency.to_string(),
        }
    }

    pub fn zero(currency: &str) -> Self {
        Money::new(0, currency)
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), EngineError> {
        if self.currency != other.currency {
            return Err(EngineError::CurrencyMismatch {
                expected: self.currency.clone(),
                found: other.currency.clone(),
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, EngineError> {
        self.require_same_currency(other)?;
        let minor = self.minor.checked_add(other.minor).ok_or_else(|| {
            EngineError::InvalidAmount(format!(
                "overflow adding {} and {} {}",
                self.minor, other.minor, self.currency
            ))
        })?;
        Ok(Money::new(minor, &self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, EngineError> {
        self.require_same_currency(other)?;
        let minor = self.minor.checked_sub(other.minor).ok_or_else(|| {
            EngineError::InvalidAmount(format!(
                "overflow subtracting {} from {} {}",
                other.minor, self.minor, self.currency
            ))
        })?;
        Ok(Money::new(minor, &self.currency))
    }

    /// Scalar multiply, rounded to the nearest minor unit under `rounding`.
    pub fn mul_decimal(&self, factor: Decimal, rounding: RoundingMode) -> Result<Money, EngineError> {
        let product = Decimal::from(self.minor)
            .checked_mul(factor)
            .ok_or_else(|| EngineError::InvalidAmount(format!("overflow multiplying by {factor}")))?;
        let minor = round_to_minor(product, rounding)?;
        Ok(Money::new(minor, &self.currency))
    }

    /// Scalar divide, rounded to the nearest minor unit under `rounding`.
    pub fn div_decimal(&self, divisor: Decimal, rounding: RoundingMode) -> Result<Money, EngineError> {
        if divisor.is_zero() {
            return Err(EngineError::InvalidAmount("division by zero".to_string()));
        }
        let quotient = Decimal::from(self.minor)
            .checked_div(divisor)
            .ok_or_else(|| EngineError::InvalidAmount(format!("overflow dividing by {divisor}")))?;
        let minor = round_to_minor(quotient, rounding)?;
        Ok(Money::new(minor, &self.currency))
    }

    /// Re-denominates this amount into `target` at `rate` (1 unit of this
    /// currency = `rate` units of target), honouring both currencies'
    /// minor-unit exponents.
    pub fn converted(
        &self,
        rate: Decimal,
        target: &str,
        rounding: RoundingMode,
    ) -> Result<Money, EngineError> {
        let major = Decimal::new(self.minor, minor_exponent(&self.currency));
        let scale = Decimal::from(10_i64.pow(minor_exponent(target)));
        let minor_out = major
            .checked_mul(rate)
            .and_then(|v| v.checked_mul(scale))
            .ok_or_else(|| {
                EngineError::InvalidAmount(format!(
                    "overflow converting {} {} at rate {rate}",
                    self.minor, self.currency
                ))
            })?;
        Ok(Money::new(round_to_minor(minor_out, rounding)?, target))
    }

    /// Renders the amount as a plain decimal string with exactly the
    /// currency's minor-unit exponent of fractional digits, e.g. `123.45`.
    pub fn to_display_string(&self) -> String {
        Decimal::new(self.minor, minor_exponent(&self.currency)).to_string()
    }

    /// Parses a display decimal string back into minor units. Rejects values
    /// with more fractional digits than the currency supports, so
    /// `from_display_string(x.to_display_string())` is the identity.
    pub fn from_display_string(value: &str, currency: &str) -> Result<Money, EngineError> {
        let parsed = Decimal::from_str(value.trim())
            .map_err(|e| EngineError::InvalidAmount(format!("unparseable amount '{value}': {e}")))?
            .normalize();
        let exponent = minor_exponent(currency);
        if parsed.scale() > exponent {
            return Err(EngineError::InvalidAmount(format!(
                "'{value}' has more than {exponent} fractional digits for {currency}"
            )));
        }
        let minor = parsed
            .checked_mul(Decimal::from(10_i64.pow(exponent)))
            .and_then(|v| v.to_i64())
            .ok_or_else(|| EngineError::InvalidAmount(format!("'{value}' out of range for {currency}")))?;
        Ok(Money::new(minor, currency))
    }

    /// Human-facing rendering with the registry symbol, e.g. `$123.45`.
    pub fn formatted(&self) -> String {
        format!("{}{}", currency_symbol(&self.currency), self.to_display_string())
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.to_display_string(), self.currency)
    }
}

fn round_to_minor(value: Decimal, rounding: RoundingMode) -> Result<i64, EngineError> {
    value
        .round_dp_with_strategy(0, rounding.strategy())
        .to_i64()
        .ok_or_else(|| EngineError::InvalidAmount(format!("{value} out of minor-unit range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sub_same_currency() {
        let a = Money::new(10_000, "USD");
        let b = Money::new(5_000, "USD");
        assert_eq!(a.checked_add(&b).unwrap(), Money::new(15_000, "USD"));
        assert_eq!(a.checked_sub(&b).unwrap(), Money::new(5_000, "USD"));
    }

    #[test]
    fn test_add_currency_mismatch() {
        let a = Money::new(100, "USD");
        let b = Money::new(100, "EUR");
        let err = a.checked_add(&b).unwrap_err();
        assert!(matches!(err, EngineError::CurrencyMismatch { .. }));
    }

    #[test]
    fn test_mul_rounds_half_up() {
        // 100.01 * 0.5 = 50.005 -> 50.01 under half-up
        let m = Money::new(10_001, "USD");
        let half = Decimal::new(5, 1);
        assert_eq!(m.mul_decimal(half, RoundingMode::HalfUp).unwrap().minor, 5_001);
        assert_eq!(m.mul_decimal(half, RoundingMode::Down).unwrap().minor, 5_000);
    }

    #[test]
    fn test_div_by_zero() {
        let m = Money::new(100, "USD");
        let err = m.div_decimal(Decimal::ZERO, RoundingMode::HalfUp).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }

    #[test]
    fn test_display_string_round_trip() {
        for (minor, currency) in [
            (12_345_i64, "USD"),
            (-12_345, "USD"),
            (0, "EUR"),
            (7, "USD"),
            (12_000, "JPY"),
            (1_234_567, "KWD"),
        ] {
            let m = Money::new(minor, currency);
            let display = m.to_display_string();
            let back = Money::from_display_string(&display, currency).unwrap();
            assert_eq!(back, m, "round trip failed for {display} {currency}");
        }
    }

    #[test]
    fn test_display_string_exponents() {
        assert_eq!(Money::new(12_345, "USD").to_display_string(), "123.45");
        assert_eq!(Money::new(12_000, "JPY").to_display_string(), "12000");
        assert_eq!(Money::new(1_500, "KWD").to_display_string(), "1.500");
    }

    #[test]
    fn test_parse_rejects_excess_precision() {
        assert!(Money::from_display_string("1.234", "USD").is_err());
        assert!(Money::from_display_string("1.5", "JPY").is_err());
        assert!(Money::from_display_string("not-a-number", "USD").is_err());
    }

    #[test]
    fn test_parse_accepts_shorter_precision() {
        assert_eq!(Money::from_display_string("1.2", "USD").unwrap().minor, 120);
        assert_eq!(Money::from_display_string("1.20", "USD").unwrap().minor, 120);
        assert_eq!(Money::from_display_string("-3", "USD").unwrap().minor, -300);
    }

    #[test]
    fn test_converted_respects_exponents() {
        // 120.00 USD at 150 JPY/USD = 18000 JPY = 18000 minor units
        let usd = Money::new(12_000, "USD");
        let jpy = usd
            .converted(Decimal::from(150), "JPY", RoundingMode::HalfUp)
            .unwrap();
        assert_eq!(jpy, Money::new(18_000, "JPY"));

        // 120.00 USD at 83.12 INR/USD = 9974.40 INR = 997440 minor units
        let inr = usd
            .converted(Decimal::new(8_312, 2), "INR", RoundingMode::HalfUp)
            .unwrap();
        assert_eq!(inr, Money::new(997_440, "INR"));
    }

    #[test]
    fn test_formatted_uses_symbol() {
        assert_eq!(Money::new(12_345, "USD").formatted(), "$123.45");
        assert_eq!(Money::new(500, "XXX").formatted(), "XXX5.00");
    }
}
