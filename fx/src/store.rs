//! In-memory rate storage.
//!
//! The store knows nothing about expiry; the cache decides when to flush it.

use std::sync::Arc;

use dashmap::DashMap;
use fxcache_common::{Rate, RateKey};
use tracing::debug;

/// Mapping from directional pair to rate.
pub trait RateStore: Send + Sync {
    /// Look up a rate. Absence is not an error.
    fn get(&self, key: &RateKey) -> Option<Rate>;

    /// Insert or overwrite a rate.
    fn set(&self, key: RateKey, rate: Rate);

    /// Remove a rate; no-op if absent.
    fn remove(&self, key: &RateKey);

    /// Remove every rate.
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all entries, in no particular order.
    fn snapshot(&self) -> Vec<(RateKey, Rate)>;
}

/// Shared rate store.
pub type SharedRateStore = Arc<dyn RateStore>;

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    rates: DashMap<RateKey, Rate>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind an `Arc`, ready to inject.
    pub fn shared() -> SharedRateStore {
        Arc::new(Self::new())
    }
}

impl RateStore for MemoryRateStore {
    fn get(&self, key: &RateKey) -> Option<Rate> {
        self.rates.get(key).map(|entry| *entry.value())
    }

    fn set(&self, key: RateKey, rate: Rate) {
        debug!(pair = %key, rate = %rate, "Storing rate");
        self.rates.insert(key, rate);
    }

    fn remove(&self, key: &RateKey) {
        self.rates.remove(key);
    }

    fn clear(&self) {
        self.rates.clear();
    }

    fn len(&self) -> usize {
        self.rates.len()
    }

    fn snapshot(&self) -> Vec<(RateKey, Rate)> {
        self.rates
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}
