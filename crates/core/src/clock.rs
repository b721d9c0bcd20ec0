// SPDX-License-Identifier: MIT

//! A small `Clock` seam so timestamps in persisted state are fakeable in tests.

use atomic_offset::AtomicAdvance;
use chrono::{DateTime, Utc};

/// Source of the current time, injected into anything that stamps persisted state.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since the Unix epoch, for compact on-wire timestamps.
    fn epoch_ms(&self) -> u64 {
        self.now().timestamp_millis().max(0) as u64
    }
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only advances when told to. Used by automation runtime tests
/// that assert on timeout/duration behavior without real sleeps.
#[derive(Debug, Clone)]
pub struct FakeClock {
    base: DateTime<Utc>,
    offset_ms: AtomicAdvance,
}

impl FakeClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self { base, offset_ms: AtomicAdvance::new(0) }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.offset_ms.add(ms);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::milliseconds(self.offset_ms.get())
    }
}

/// Tiny atomic-i64 wrapper so `FakeClock` stays `Clone` + `Send + Sync` without
/// pulling in a new dependency just for one counter.
mod atomic_offset {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct AtomicAdvance(Arc<AtomicI64>);

    impl AtomicAdvance {
        pub fn new(v: i64) -> Self {
            Self(Arc::new(AtomicI64::new(v)))
        }
        pub fn add(&self, delta: i64) {
            self.0.fetch_add(delta, Ordering::SeqCst);
        }
        pub fn get(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
