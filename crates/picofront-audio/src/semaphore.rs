use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Counting semaphore shared between the sound producer and the drain thread.
///
/// The producer signals once a full block is queued; the drain thread parks
/// in [`Semaphore::wait`] while it is starved.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<u32>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    pub fn signal(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_add(1);
        self.cond.notify_one();
    }

    /// Blocks until the count is non-zero, then decrements it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cond.wait(&mut count);
        }
        *count -= 1;
    }

    /// Like [`Semaphore::wait`], but gives up after `timeout`.
    ///
    /// Returns `true` when a permit was taken.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            let result = self.cond.wait_for(&mut count, timeout);
            if result.timed_out() && *count == 0 {
                return false;
            }
        }
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    pub fn available(&self) -> u32 {
        *self.count.lock()
    }
}
