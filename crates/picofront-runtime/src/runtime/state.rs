use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

/// Top-level state of the emulation thread. The loop runs only while
/// `Running`; any other value makes it leave at the next iteration.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running = 0,
    Paused = 1,
    Menu = 2,
    Quit = 3,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Paused,
            2 => Self::Menu,
            _ => Self::Quit,
        }
    }
}

/// Counters published by the loop thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeStats {
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub timing_resets: u64,
    pub fast_forward: bool,
}

pub(crate) struct RuntimeState {
    engine: AtomicU8,
    pub(crate) frames_rendered: AtomicU64,
    pub(crate) frames_skipped: AtomicU64,
    pub(crate) timing_resets: AtomicU64,
    pub(crate) fast_forward: AtomicBool,
}

impl RuntimeState {
    pub(crate) fn new(engine: EngineState) -> Self {
        Self {
            engine: AtomicU8::new(engine as u8),
            frames_rendered: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            timing_resets: AtomicU64::new(0),
            fast_forward: AtomicBool::new(false),
        }
    }

    pub(crate) fn engine(&self) -> EngineState {
        EngineState::from_u8(self.engine.load(Ordering::Acquire))
    }

    pub(crate) fn set_engine(&self, state: EngineState) {
        self.engine.store(state as u8, Ordering::Release);
    }

    /// Sets `next` unless the thread is already quitting.
    pub(crate) fn transition(&self, next: EngineState) {
        let _ = self
            .engine
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != EngineState::Quit as u8).then_some(next as u8)
            });
    }

    pub(crate) fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            timing_resets: self.timing_resets.load(Ordering::Relaxed),
            fast_forward: self.fast_forward.load(Ordering::Relaxed),
        }
    }
}
