//! Rate fetcher capability.

use async_trait::async_trait;
use fxcache_common::RateKey;

use crate::error::{FxResult, Provider};

/// Obtains a raw successful payload for a requested pair.
///
/// Implementations own their retry rules and classify every failure into
/// [`crate::FxError`]. A fetcher may return more pairs than requested.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    fn provider(&self) -> Provider;

    async fn fetch(&self, key: &RateKey) -> FxResult<String>;
}

/// Fetcher returning a fixed body, counting calls.
#[cfg(any(test, feature = "test-utils"))]
pub struct StaticFetcher {
    provider: Provider,
    body: parking_lot::RwLock<String>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticFetcher {
    pub fn new(provider: Provider, body: impl Into<String>) -> Self {
        Self {
            provider,
            body: parking_lot::RwLock::new(body.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Replace the body served from now on.
    pub fn set_body(&self, body: impl Into<String>) {
        *self.body.write() = body.into();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateFetcher for StaticFetcher {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch(&self, _key: &RateKey) -> FxResult<String> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.body.read().clone())
    }
}
