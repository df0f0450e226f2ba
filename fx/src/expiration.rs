//! TTL-based expiration policy.
//!
//! A policy holds an optional TTL and the absolute instant of the next
//! flush. Policies are plain values owned by one cache unless the caller
//! shares the `Arc`, or asks for the process-wide policy of a provider.

use std::sync::{Arc, OnceLock};

use chrono::Duration;
use dashmap::DashMap;
use fxcache_common::{expires_in, Timestamp};
use parking_lot::RwLock;

use crate::error::Provider;

#[derive(Debug, Clone, Copy, Default)]
struct PolicyState {
    ttl: Option<Duration>,
    expires_at: Option<Timestamp>,
    /// Bumped on every expiration so each sharer can tell it must flush.
    generation: u64,
}

/// Decides when cached rates must be flushed.
#[derive(Debug, Default)]
pub struct ExpirationPolicy {
    state: RwLock<PolicyState>,
}

/// Shared expiration policy.
pub type SharedExpirationPolicy = Arc<ExpirationPolicy>;

static PROCESS_WIDE: OnceLock<DashMap<Provider, SharedExpirationPolicy>> = OnceLock::new();

impl ExpirationPolicy {
    /// A policy that never expires.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy with a TTL counted from `now`.
    pub fn with_ttl(ttl: Duration, now: Timestamp) -> Self {
        let policy = Self::new();
        policy.configure(Some(ttl), now);
        policy
    }

    /// The opt-in policy shared by every cache bound to `provider` in this
    /// process. Setting its TTL affects all of them.
    pub fn process_wide(provider: Provider) -> SharedExpirationPolicy {
        PROCESS_WIDE
            .get_or_init(DashMap::new)
            .entry(provider)
            .or_insert_with(|| Arc::new(Self::new()))
            .clone()
    }

    /// Set or clear the TTL. A new TTL restarts the countdown from `now`.
    pub fn configure(&self, ttl: Option<Duration>, now: Timestamp) {
        let mut state = self.state.write();
        state.ttl = ttl;
        state.expires_at = ttl.map(|ttl| expires_in(now, ttl));
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.state.read().ttl
    }

    /// Next flush instant; `None` when rates never expire.
    pub fn expires_at(&self) -> Option<Timestamp> {
        let state = self.state.read();
        state.ttl.and(state.expires_at)
    }

    /// True iff a TTL is set and `now` has reached the expiry instant.
    pub fn is_due(&self, now: Timestamp) -> bool {
        Self::due(&self.state.read(), now)
    }

    /// Restart the countdown from `now`. Returns the new expiry, or `None`
    /// without touching anything when no TTL is set.
    pub fn refresh(&self, now: Timestamp) -> Option<Timestamp> {
        let mut state = self.state.write();
        Self::restart(&mut state, now)
    }

    /// Check and refresh in one step. Returns true for the one caller that
    /// observed the expiry; others learn about it through [`Self::generation`].
    pub fn expire_if_due(&self, now: Timestamp) -> bool {
        let mut state = self.state.write();
        if !Self::due(&state, now) {
            return false;
        }
        Self::restart(&mut state, now);
        state.generation += 1;
        true
    }

    /// Number of expirations so far.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    fn due(state: &PolicyState, now: Timestamp) -> bool {
        match (state.ttl, state.expires_at) {
            (Some(_), Some(expires_at)) => now >= expires_at,
            _ => false,
        }
    }

    fn restart(state: &mut PolicyState, now: Timestamp) -> Option<Timestamp> {
        let ttl = state.ttl?;
        let expires_at = expires_in(now, ttl);
        state.expires_at = Some(expires_at);
        Some(expires_at)
    }
}
