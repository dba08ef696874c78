//! Process-local TTL cache for provider-side state (bearer token, product id).
//!
//! Kept behind a small component with an injectable clock so tests can drive
//! expiry deterministically and a distributed cache can replace it later
//! without touching call sites.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Single-entry cache holding a value and its expiry instant.
pub struct TtlCache<T> {
    entry: Mutex<Option<(T, Instant)>>,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: Mutex::new(None),
            clock,
        }
    }

    /// Returns the cached value unless it is absent or within `margin` of
    /// its expiry.
    pub fn get(&self, margin: Duration) -> Option<T> {
        let now = self.clock.now();
        let guard = self.entry.lock().unwrap();
        match guard.as_ref() {
            Some((value, expires_at)) if now + margin < *expires_at => Some(value.clone()),
            _ => None,
        }
    }

    pub fn put(&self, value: T, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        *self.entry.lock().unwrap() = Some((value, expires_at));
    }

    pub fn invalidate(&self) {
        *self.entry.lock().unwrap() = None;
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
