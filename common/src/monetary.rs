//! Monetary types for the exchange-rate cache.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CurrencyError, Result};

/// ISO 4217 currency code, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a currency from a code, trimming and uppercasing it.
    pub fn new(code: impl AsRef<str>) -> Result<Self> {
        let code = code.as_ref().trim();
        if code.is_empty() {
            return Err(CurrencyError::Empty);
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CurrencyError::Invalid(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// The stable ISO code, e.g. `"USD"`.
    pub fn iso_code(&self) -> &str {
        &self.0
    }

    fn known(code: &'static str) -> Self {
        Self(code.to_string())
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self::known("USD")
    }

    pub fn eur() -> Self {
        Self::known("EUR")
    }

    pub fn gbp() -> Self {
        Self::known("GBP")
    }

    pub fn jpy() -> Self {
        Self::known("JPY")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Directional currency pair used as the cache index.
///
/// `USD/EUR` and `EUR/USD` are distinct keys. Nothing derives one from the
/// other implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RateKey {
    base: Currency,
    quote: Currency,
}

impl RateKey {
    /// Create a key for converting `base` into `quote`.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// Build a key from raw codes.
    pub fn from_codes(base: &str, quote: &str) -> Result<Self> {
        Ok(Self::new(Currency::new(base)?, Currency::new(quote)?))
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    pub fn quote(&self) -> &Currency {
        &self.quote
    }

    /// The key pointing the other way.
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    /// True when base and quote are the same currency.
    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// A strictly positive conversion rate.
///
/// One unit of the base currency is worth `value` units of the quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Rate(Decimal);

impl Rate {
    /// The identity rate.
    pub const ONE: Rate = Rate(Decimal::ONE);

    /// Wrap a magnitude, rejecting zero and negative values.
    pub fn new(value: Decimal) -> Option<Self> {
        (value > Decimal::ZERO).then_some(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// `1 / self`, or `None` if the division overflows or underflows to zero.
    pub fn reciprocal(&self) -> Option<Self> {
        Decimal::ONE.checked_div(self.0).and_then(Self::new)
    }

    /// `self / other`, staying within the positive domain.
    pub fn checked_div(&self, other: Rate) -> Option<Self> {
        self.0.checked_div(other.0).and_then(Self::new)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Rate::new(value).ok_or_else(|| serde::de::Error::custom("rate must be positive"))
    }
}

/// A monetary amount with currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value (high precision decimal).
    pub value: Decimal,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Create from a string value.
    pub fn from_str(value: &str, currency: Currency) -> std::result::Result<Self, rust_decimal::Error> {
        Ok(Self {
            value: value.parse()?,
            currency,
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}
