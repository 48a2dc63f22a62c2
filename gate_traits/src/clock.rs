use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction for the periodic loops and the stop settle delay.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - ms_since(): helper to compute elapsed milliseconds from an epoch Instant
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time only moves when advanced.
///
/// now() = origin + offset
/// sleep(d) advances internal time by d without actually sleeping, so a
/// `stop()` settle delay completes instantly under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    /// Total time slept or advanced since construction.
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_without_blocking() {
        let clock = ManualClock::new();
        let epoch = clock.now();
        let wall = Instant::now();
        clock.sleep(Duration::from_secs(5));
        assert_eq!(clock.ms_since(epoch), 5_000);
        assert!(wall.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        a.advance(Duration::from_millis(250));
        assert_eq!(b.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn monotonic_zero_sleep_returns() {
        MonotonicClock::new().sleep(Duration::ZERO);
    }
}
