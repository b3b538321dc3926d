//! Clock abstraction and stable hashing
//!
//! Every time-dependent computation in the engine reads the clock through
//! the `Clock` trait so tests can inject a `FakeClock` and step it forward
//! deterministically. Wall-clock values are ISO-8601 UTC.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests
///
/// Starts at a fixed instant and only moves when `advance` is called.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    /// Create a fake clock pinned to the given instant
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }

    /// Jump the clock to an absolute instant
    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().expect("clock lock");
        *now = to;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Fractional days elapsed between two instants
///
/// Negative differences clamp to zero; the engine never decays backwards.
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let millis = (later - earlier).num_milliseconds();
    if millis <= 0 {
        return 0.0;
    }
    millis as f64 / 86_400_000.0
}

// ============================================================================
// STABLE HASH
// ============================================================================

/// FNV-1a 64-bit hash over a string
///
/// Used for context-change detection and cache keys. Unlike `DefaultHasher`
/// this is stable across processes and releases, so persisted context hashes
/// stay comparable.
pub fn stable_hash(text: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hex rendering of a stable hash, used where hashes are persisted as text
pub fn stable_hash_hex(text: &str) -> String {
    format!("{:016x}", stable_hash(text))
}

// ============================================================================
// TESTS
// ============================================================================
