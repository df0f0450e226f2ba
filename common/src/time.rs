//! Time sources for expiration decisions.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Source of the current time.
///
/// Expiration logic never calls `Utc::now()` directly so tests can move
/// time forward deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Calculate `from + duration`, saturating at the maximum representable time.
pub fn expires_in(from: Timestamp, duration: Duration) -> Timestamp {
    from.checked_add_signed(duration)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Clock whose time only moves when told to.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug)]
pub struct ManualClock {
    now: parking_lot::RwLock<Timestamp>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ManualClock {
    /// Start the clock at the given instant.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: parking_lot::RwLock::new(start),
        }
    }

    /// Start the clock at the current wall time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn set(&self, at: Timestamp) {
        *self.now.write() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now = expires_in(*now, by);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read()
    }
}
