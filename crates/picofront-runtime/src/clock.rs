//! Wrapping microsecond clock and the waits built on it.
//!
//! Clock readings are `u32` microseconds since an arbitrary epoch and wrap
//! roughly every 71 minutes. Never compare two readings directly; use
//! [`ticks_diff`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

pub const US_PER_SEC: u32 = 1_000_000;
pub const US_PER_MS: u32 = 1_000;

// Hybrid wait tuning:
// - Sleep in small chunks until we're close to the target.
// - Spin for the final window for tighter frame pacing.
const MAX_SLEEP_CHUNK: Duration = Duration::from_millis(4);
const SPIN_THRESHOLD: Duration = Duration::from_micros(300);
const SPIN_YIELD_EVERY: u32 = 512;
// A target further away than this is treated as a clock glitch.
const MAX_WAIT_US: i32 = 100_000;

/// Signed distance from `earlier` to `later`, tolerant of wraparound.
#[inline]
pub fn ticks_diff(later: u32, earlier: u32) -> i32 {
    later.wrapping_sub(earlier) as i32
}

pub trait Clock {
    fn now_us(&self) -> u32;
    fn now_ms(&self) -> u32;
    /// Blocks until `now_us()` has reached `target`. Returns immediately if it
    /// already has.
    fn sleep_until_us(&self, target: u32);
}

/// Monotonic host clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> u32 {
        self.epoch.elapsed().as_micros() as u32
    }

    fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    fn sleep_until_us(&self, target: u32) {
        let remaining = ticks_diff(target, self.now_us());
        if remaining <= 0 {
            return;
        }
        let deadline = Instant::now() + Duration::from_micros(remaining.min(MAX_WAIT_US) as u64);

        loop {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let remaining = deadline - now;

            // Coarse phase: sleep in chunks while still far from the deadline,
            // but always keep a final spin window.
            if remaining > SPIN_THRESHOLD {
                thread::sleep((remaining - SPIN_THRESHOLD).min(MAX_SLEEP_CHUNK));
                continue;
            }

            let mut spins: u32 = 0;
            while Instant::now() < deadline {
                std::hint::spin_loop();
                spins = spins.wrapping_add(1);
                if spins.is_multiple_of(SPIN_YIELD_EVERY) {
                    thread::yield_now();
                }
            }
            return;
        }
    }
}

/// Deterministic clock for tests and simulations.
///
/// Clones share the same time. Sleeping advances time instead of blocking.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            us: Arc::new(AtomicU64::new(start_us)),
        }
    }

    pub fn advance_us(&self, us: u64) {
        self.us.fetch_add(us, Ordering::AcqRel);
    }

    /// Full, non-wrapping time in microseconds.
    pub fn total_us(&self) -> u64 {
        self.us.load(Ordering::Acquire)
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u32 {
        self.total_us() as u32
    }

    fn now_ms(&self) -> u32 {
        (self.total_us() / US_PER_MS as u64) as u32
    }

    fn sleep_until_us(&self, target: u32) {
        let remaining = ticks_diff(target, self.now_us());
        if remaining > 0 {
            self.advance_us(remaining as u64);
        }
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now_us(&self) -> u32 {
        (**self).now_us()
    }

    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn sleep_until_us(&self, target: u32) {
        (**self).sleep_until_us(target)
    }
}
