//! Currencies a cache is permitted to ingest.

use std::collections::BTreeSet;

use fxcache_common::{Currency, CurrencyError, RateKey};

/// Widely quoted ISO 4217 codes accepted when no list is configured.
pub const DEFAULT_CURRENCIES: &[&str] = &[
    "AED", "ARS", "AUD", "BGN", "BRL", "CAD", "CHF", "CLP", "CNY", "COP", "CZK", "DKK", "EGP",
    "EUR", "GBP", "HKD", "HUF", "IDR", "ILS", "INR", "ISK", "JPY", "KRW", "MXN", "MYR", "NOK",
    "NZD", "PEN", "PHP", "PKR", "PLN", "RON", "RUB", "SAR", "SEK", "SGD", "THB", "TRY", "TWD",
    "UAH", "USD", "VND", "ZAR",
];

/// Immutable set of currencies; anything else is dropped on ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyAllowList {
    currencies: BTreeSet<Currency>,
}

impl CurrencyAllowList {
    pub fn new(currencies: impl IntoIterator<Item = Currency>) -> Self {
        Self {
            currencies: currencies.into_iter().collect(),
        }
    }

    /// Build from raw codes, failing on the first invalid one.
    pub fn from_codes<S: AsRef<str>>(codes: &[S]) -> Result<Self, CurrencyError> {
        let currencies = codes
            .iter()
            .map(|code| Currency::new(code.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { currencies })
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.currencies.contains(currency)
    }

    /// Both sides of the pair are allowed.
    pub fn permits(&self, key: &RateKey) -> bool {
        self.contains(key.base()) && self.contains(key.quote())
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.iter()
    }
}

impl Default for CurrencyAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_CURRENCIES.iter().filter_map(|code| Currency::new(code).ok()))
    }
}

impl FromIterator<Currency> for CurrencyAllowList {
    fn from_iter<I: IntoIterator<Item = Currency>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_list() {
        let list = CurrencyAllowList::default();

        assert_eq!(list.len(), DEFAULT_CURRENCIES.len());
        assert!(list.contains(&Currency::usd()));
        assert!(list.contains(&Currency::jpy()));
    }

    #[test]
    fn test_from_codes_normalizes() {
        let list = CurrencyAllowList::from_codes(&["usd", " eur"]).unwrap();

        assert!(list.contains(&Currency::usd()));
        assert!(list.contains(&Currency::eur()));
        assert!(!list.contains(&Currency::gbp()));
    }

    #[test]
    fn test_from_codes_rejects_invalid() {
        assert!(CurrencyAllowList::from_codes(&["USD", ""]).is_err());
    }

    #[test]
    fn test_permits_requires_both_sides() {
        let list = CurrencyAllowList::from_codes(&["USD", "EUR"]).unwrap();

        assert!(list.permits(&RateKey::from_codes("USD", "EUR").unwrap()));
        assert!(!list.permits(&RateKey::from_codes("USD", "JPY").unwrap()));
        assert!(!list.permits(&RateKey::from_codes("JPY", "EUR").unwrap()));
    }

    proptest! {
        #[test]
        fn prop_permits_matches_membership(base in "[A-Z]{3}", quote in "[A-Z]{3}") {
            let list = CurrencyAllowList::default();
            let key = RateKey::from_codes(&base, &quote).unwrap();
            let expected = DEFAULT_CURRENCIES.contains(&base.as_str())
                && DEFAULT_CURRENCIES.contains(&quote.as_str());
            prop_assert_eq!(list.permits(&key), expected);
        }
    }
}
