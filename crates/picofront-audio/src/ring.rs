//! Fixed-size sample ring between the emulation thread and the sound pump.
//!
//! The emulation thread is the single producer. It never blocks: when the
//! ring is full the newest samples are dropped and counted. The pump thread
//! is the single consumer and parks on a [`Semaphore`] until a whole block is
//! queued.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};

use crate::semaphore::Semaphore;

#[derive(Debug, Default)]
struct Shared {
    sem: Semaphore,
    made: AtomicU64,
    done: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
    clear_upto: AtomicU64,
}

/// Sample counters, all in interleaved `i16` units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub made: u64,
    pub done: u64,
    pub dropped: u64,
}

pub struct SoundProducer {
    prod: HeapProd<i16>,
    shared: Arc<Shared>,
    block: usize,
}

pub struct SoundConsumer {
    cons: HeapCons<i16>,
    shared: Arc<Shared>,
    block: usize,
}

/// Wakes and shuts down the consumer side from another thread.
#[derive(Clone)]
pub struct RingCloser {
    shared: Arc<Shared>,
}

/// Creates a ring holding `block_count` blocks of `block_len` samples each.
pub fn sound_ring(block_len: usize, block_count: usize) -> (SoundProducer, SoundConsumer) {
    let block = block_len.max(1);
    let capacity = block * block_count.max(2);
    let (prod, cons) = HeapRb::<i16>::new(capacity).split();
    let shared = Arc::new(Shared::default());

    (
        SoundProducer {
            prod,
            shared: Arc::clone(&shared),
            block,
        },
        SoundConsumer {
            cons,
            shared,
            block,
        },
    )
}

impl SoundProducer {
    /// Queues samples and signals the consumer once a full block is waiting.
    ///
    /// Returns the number of samples accepted.
    pub fn write(&mut self, samples: &[i16]) -> usize {
        if samples.is_empty() {
            return 0;
        }

        let pushed = self.prod.push_slice(samples);
        let shortfall = samples.len() - pushed;
        if shortfall > 0 {
            self.shared
                .dropped
                .fetch_add(shortfall as u64, Ordering::Relaxed);
        }
        self.shared.made.fetch_add(pushed as u64, Ordering::Release);

        if self.prod.occupied_len() >= self.block {
            self.shared.sem.signal();
        }
        pushed
    }

    /// Asks the consumer to discard everything queued so far.
    pub fn clear(&self) {
        let made = self.shared.made.load(Ordering::Acquire);
        self.shared.clear_upto.store(made, Ordering::Release);
    }

    pub fn block_len(&self) -> usize {
        self.block
    }

    pub fn stats(&self) -> RingStats {
        stats(&self.shared)
    }
}

impl SoundConsumer {
    /// Blocks until a full block is available and copies it into `out`.
    ///
    /// Returns `false` once the ring has been closed.
    pub fn next_block(&mut self, out: &mut [i16]) -> bool {
        let want = out.len().min(self.block).max(1);
        loop {
            if self.shared.closed.load(Ordering::Acquire) {
                return false;
            }
            let upto = self.shared.clear_upto.load(Ordering::Acquire);
            let done = self.shared.done.load(Ordering::Acquire);
            if upto > done {
                let stale = ((upto - done) as usize).min(self.cons.occupied_len());
                let skipped = self.cons.skip(stale);
                self.shared
                    .done
                    .fetch_add(skipped as u64, Ordering::Release);
            }
            if self.cons.occupied_len() >= want {
                let n = self.cons.pop_slice(&mut out[..want]);
                self.shared.done.fetch_add(n as u64, Ordering::Release);
                return true;
            }
            self.shared.sem.wait();
        }
    }

    pub fn block_len(&self) -> usize {
        self.block
    }

    pub fn closer(&self) -> RingCloser {
        RingCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> RingStats {
        stats(&self.shared)
    }
}

impl RingCloser {
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.sem.signal();
    }
}

fn stats(shared: &Shared) -> RingStats {
    RingStats {
        made: shared.made.load(Ordering::Acquire),
        done: shared.done.load(Ordering::Acquire),
        dropped: shared.dropped.load(Ordering::Relaxed),
    }
}
