//! Turning successful payloads into store writes.
//!
//! Extraction is not transactional: entries written before a bad entry is
//! met stay in the store.

use std::str::FromStr;

use fxcache_common::{Currency, Rate, RateKey};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::allow_list::CurrencyAllowList;
use crate::error::ExtractError;
use crate::store::RateStore;

/// Parses a provider payload and writes the allowed, positive rates.
pub trait ResponseExtractor: Send + Sync {
    /// Returns how many entries were stored.
    fn extract(
        &self,
        body: &str,
        allow_list: &CurrencyAllowList,
        store: &dyn RateStore,
    ) -> Result<usize, ExtractError>;
}

/// Key for an entry the allow-list admits, or `None` if the entry must be
/// skipped. Runs before the magnitude is read, so a skipped entry can never
/// fail extraction. A code that is not a currency is never allow-listed.
pub(crate) fn allowed_key(
    base: &str,
    quote: &str,
    allow_list: &CurrencyAllowList,
) -> Option<RateKey> {
    let key = Currency::new(base)
        .and_then(|base| Currency::new(quote).map(|quote| RateKey::new(base, quote)));

    match key {
        Ok(key) if allow_list.permits(&key) => Some(key),
        _ => {
            debug!(base, quote, "Skipping currency outside allow-list");
            None
        }
    }
}

/// Read a magnitude given as a JSON number or a numeric string.
///
/// Numbers are converted from their textual form so no binary floating
/// point rounding leaks into the decimal.
pub fn parse_magnitude(code: &str, value: &Value) -> Result<Decimal, ExtractError> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        other => {
            return Err(ExtractError::InvalidMagnitude {
                code: code.to_string(),
                value: other.to_string(),
            })
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| ExtractError::InvalidMagnitude {
            code: code.to_string(),
            value: text,
        })
}

/// Write one admitted rate unless it is not positive. Returns whether it
/// was stored.
pub(crate) fn store_positive(key: RateKey, magnitude: Option<Rate>, store: &dyn RateStore) -> bool {
    match magnitude {
        Some(rate) => {
            store.set(key, rate);
            true
        }
        None => {
            debug!(pair = %key, "Skipping non-positive rate");
            false
        }
    }
}
