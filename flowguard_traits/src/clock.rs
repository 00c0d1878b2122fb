use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds from a free-running counter that wraps at `u32::MAX`.
///
/// Durations between two readings must be computed with
/// [`Millis::wrapping_sub`] (see [`elapsed`]).
pub type Millis = u32;

/// Wrap-tolerant elapsed time from `since` to `now`.
#[inline]
pub fn elapsed(now: Millis, since: Millis) -> Millis {
    now.wrapping_sub(since)
}

/// Monotonic clock abstraction for the tick loop.
///
/// - millis(): wrapping millisecond counter
/// - unix_secs(): wall-clock seconds, only used for outbound frame timestamps
/// - sleep(): sleeps for the provided duration (implementations may simulate)
pub trait Clock {
    fn millis(&self) -> Millis;
    fn sleep(&self, d: Duration);

    fn unix_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Default, real-time clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn millis(&self) -> Millis {
        // Truncation is the wrap.
        self.epoch.elapsed().as_millis() as u64 as Millis
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time is advanced by hand.
///
/// Clones share the same counter, so a test can keep one handle and give the
/// other to the engine. `sleep(d)` advances the counter without sleeping.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU32>,
    unix_secs: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the counter at `start`; useful for wraparound tests.
    pub fn starting_at(start: Millis) -> Self {
        let clock = Self::default();
        clock.set(start);
        clock
    }

    pub fn advance(&self, ms: Millis) {
        self.now_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn set(&self, ms: Millis) {
        self.now_ms.store(ms, Ordering::Relaxed);
    }

    pub fn set_unix_secs(&self, secs: u64) {
        self.unix_secs.store(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> Millis {
        self.now_ms.load(Ordering::Relaxed)
    }

    fn sleep(&self, d: Duration) {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as Millis;
        self.advance(ms);
    }

    fn unix_secs(&self) -> u64 {
        self.unix_secs.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_survives_counter_wrap() {
        let before = u32::MAX - 99;
        let after = 400;
        assert_eq!(elapsed(after, before), 500);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::starting_at(u32::MAX - 10);
        let handle = clock.clone();
        handle.advance(20);
        assert_eq!(clock.millis(), 9);
        clock.sleep(Duration::from_millis(1));
        assert_eq!(handle.millis(), 10);
    }
}
