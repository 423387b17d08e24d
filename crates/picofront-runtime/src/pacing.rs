//! Frame pacing: render/skip decisions against a rolling one-second window.
//!
//! The scheduler accounts every produced frame, rendered or skipped, against
//! the wall time elapsed since `base_timestamp`. Each frame is allowed one
//! `frame_time` of budget. Once a second the window rolls forward by exactly
//! one second and the target rate is subtracted from the committed count, so
//! drift never compounds. Falling behind is clamped to a small slack; falling
//! further behind than the stall thresholds discards all timing history.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::{Clock, US_PER_SEC, ticks_diff};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoStandard {
    #[default]
    Ntsc,
    Pal,
}

impl VideoStandard {
    pub fn from_pal(is_pal: bool) -> Self {
        if is_pal { Self::Pal } else { Self::Ntsc }
    }

    pub fn is_pal(self) -> bool {
        self == Self::Pal
    }

    pub fn fps(self) -> u32 {
        match self {
            Self::Ntsc => 60,
            Self::Pal => 50,
        }
    }

    /// Microseconds per frame. NTSC rounds up so 60 frames slightly overrun
    /// a second instead of underrunning it.
    pub fn frame_time_us(self) -> u32 {
        match self {
            Self::Ntsc => US_PER_SEC / 60 + 1,
            Self::Pal => US_PER_SEC / 50,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameskipPolicy {
    /// Skip only when behind the clock.
    #[default]
    Auto,
    /// Render one frame after every `n` skipped frames.
    Fixed(u32),
}

/// Catch-up slack and stall thresholds.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingLimits {
    /// Largest frame deficit carried across a window rollover.
    pub catchup_slack_frames: u32,
    /// A rollover deficit beyond this many frames resets timing.
    pub stall_backlog_frames: u32,
    /// An auto-skip deficit of at least this many microseconds resets timing.
    pub stall_deficit_us: u32,
}

impl Default for PacingLimits {
    fn default() -> Self {
        Self {
            catchup_slack_frames: 2,
            stall_backlog_frames: 5,
            stall_deficit_us: 200_000,
        }
    }
}

/// What the frame producer should output for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    Full,
    /// No video, audio still produced.
    SkipVideo,
    /// Neither video nor audio.
    SkipAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Render,
    Skip(FrameMode),
    /// Timing was reset; sample the clock again before deciding.
    ResetAndRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Rendered,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    LoopStart,
    /// Auto-skip deficit crossed the stall threshold.
    Stall,
    /// Window rollover left too many frames uncommitted.
    Backlog,
    ClockBackwards,
    StandardChange,
    FastForward,
    Persistence,
    GameReset,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacingState {
    pub base_timestamp: u32,
    pub frames_committed: i32,
    pub frames_shown: u32,
    pub frames_done: u32,
    pub fps_timestamp: u32,
    pub last_sample: u32,
    pub fixed_skipped: u32,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    state: PacingState,
    standard: VideoStandard,
    frame_time: u32,
    policy: FrameskipPolicy,
    frame_limit: bool,
    limits: PacingLimits,
    show_fps: bool,
    fps_text: String,
    pending_reset: Option<ResetCause>,
}

impl Scheduler {
    pub fn new(standard: VideoStandard, policy: FrameskipPolicy, limits: PacingLimits) -> Self {
        Self {
            state: PacingState::default(),
            standard,
            frame_time: standard.frame_time_us(),
            policy,
            frame_limit: true,
            limits,
            show_fps: false,
            fps_text: String::new(),
            pending_reset: None,
        }
    }

    /// Starts the accounting and FPS windows at `now`.
    pub fn start(&mut self, now: u32) {
        self.state = PacingState {
            fps_timestamp: now,
            ..PacingState::default()
        };
        self.fps_text.clear();
        self.reset(now);
        self.pending_reset = Some(ResetCause::LoopStart);
    }

    pub fn reset(&mut self, now: u32) {
        self.state.frames_committed = 0;
        self.state.fixed_skipped = 0;
        self.state.base_timestamp = now;
        self.state.last_sample = now;
    }

    /// Asks for a timing reset at the next clock sample. Repeated requests
    /// before that sample coalesce; the first cause is kept.
    pub fn request_reset(&mut self, cause: ResetCause) {
        if self.pending_reset.is_none() {
            self.pending_reset = Some(cause);
        }
    }

    pub fn reset_pending(&self) -> bool {
        self.pending_reset.is_some()
    }

    /// Top-of-iteration clock sample: detects a backwards clock and applies
    /// any pending reset. Returns the cause of the reset that was applied.
    pub fn sample(&mut self, now: u32) -> Option<ResetCause> {
        if ticks_diff(now, self.state.last_sample) < 0 {
            self.request_reset(ResetCause::ClockBackwards);
        }
        self.state.last_sample = now;

        let cause = self.pending_reset.take()?;
        self.reset(now);
        debug!(?cause, now, "timing reset");
        Some(cause)
    }

    /// Rolls the FPS counters once a second. Returns `true` on rollover.
    pub fn roll_fps_window(&mut self, now: u32) -> bool {
        if ticks_diff(now, self.state.fps_timestamp) < US_PER_SEC as i32 {
            return false;
        }
        if self.show_fps {
            self.fps_text = format!(
                "{:02}/{:02}",
                self.state.frames_shown, self.state.frames_done
            );
            while self.fps_text.len() < 7 {
                self.fps_text.push(' ');
            }
        }
        self.state.frames_shown = 0;
        self.state.frames_done = 0;
        self.state.fps_timestamp = self.state.fps_timestamp.wrapping_add(US_PER_SEC);
        true
    }

    pub fn tick_decision(&mut self, now: u32) -> Decision {
        if ticks_diff(now, self.state.base_timestamp) >= US_PER_SEC as i32 {
            if !self.frame_limit && matches!(self.policy, FrameskipPolicy::Fixed(_)) {
                self.state.frames_committed = 0;
            } else {
                self.state.frames_committed -= self.standard.fps() as i32;
                if self.state.frames_committed < -(self.limits.stall_backlog_frames as i32) {
                    debug!(
                        committed = self.state.frames_committed,
                        "frame backlog too large, resetting timing"
                    );
                    self.request_reset(ResetCause::Backlog);
                    return Decision::ResetAndRetry;
                }
                let floor = -(self.limits.catchup_slack_frames as i32);
                if self.state.frames_committed < floor {
                    self.state.frames_committed = floor;
                }
            }
            self.state.base_timestamp = self.state.base_timestamp.wrapping_add(US_PER_SEC);
        }

        let elapsed = ticks_diff(now, self.state.base_timestamp) as i64;
        let budget = self.frame_budget();

        let decision = match self.policy {
            FrameskipPolicy::Fixed(n) => {
                if self.state.fixed_skipped < n {
                    self.state.fixed_skipped += 1;
                    Decision::Skip(FrameMode::SkipVideo)
                } else {
                    self.state.fixed_skipped = 0;
                    Decision::Render
                }
            }
            FrameskipPolicy::Auto if elapsed > budget => {
                let deficit = elapsed - budget;
                if deficit >= self.limits.stall_deficit_us as i64 {
                    debug!(deficit_us = deficit, "stall detected, resetting timing");
                    self.request_reset(ResetCause::Stall);
                    Decision::ResetAndRetry
                } else if elapsed < budget + 2 * self.frame_time as i64 {
                    Decision::Skip(FrameMode::SkipVideo)
                } else {
                    Decision::Skip(FrameMode::SkipAll)
                }
            }
            FrameskipPolicy::Auto => Decision::Render,
        };
        trace!(?decision, elapsed, budget, "pacing decision");
        decision
    }

    pub fn commit(&mut self, kind: CommitKind) {
        self.state.frames_committed += 1;
        self.state.frames_done += 1;
        if kind == CommitKind::Rendered {
            self.state.frames_shown += 1;
        }
    }

    /// Wall time, relative to `base_timestamp`, by which the next uncommitted
    /// frame should be finished.
    pub fn frame_budget(&self) -> i64 {
        (self.state.frames_committed as i64 + 1) * self.frame_time as i64
    }

    /// Blocks until `base_timestamp + budget - lead_us` when `now` is still
    /// inside `budget`. Returns whether a wait happened.
    pub fn wait_if_ahead<C: Clock + ?Sized>(
        &self,
        clock: &C,
        now: u32,
        budget: i64,
        lead_us: u32,
    ) -> bool {
        let elapsed = ticks_diff(now, self.state.base_timestamp) as i64;
        if elapsed >= budget {
            return false;
        }
        let offset = (budget - lead_us as i64) as i32;
        clock.sleep_until_us(self.state.base_timestamp.wrapping_add_signed(offset));
        true
    }

    /// Switches the target rate. Returns `true` if it changed.
    pub fn set_standard(&mut self, standard: VideoStandard) -> bool {
        if self.standard == standard {
            return false;
        }
        self.standard = standard;
        self.frame_time = standard.frame_time_us();
        true
    }

    pub fn set_policy(&mut self, policy: FrameskipPolicy) {
        self.policy = policy;
        self.state.fixed_skipped = 0;
    }

    pub fn set_frame_limit(&mut self, on: bool) {
        self.frame_limit = on;
    }

    pub fn set_show_fps(&mut self, on: bool) {
        self.show_fps = on;
        if !on {
            self.fps_text.clear();
        }
    }

    pub fn standard(&self) -> VideoStandard {
        self.standard
    }

    pub fn policy(&self) -> FrameskipPolicy {
        self.policy
    }

    pub fn frame_limit(&self) -> bool {
        self.frame_limit
    }

    pub fn frame_time_us(&self) -> u32 {
        self.frame_time
    }

    pub fn fps_text(&self) -> Option<&str> {
        (!self.fps_text.is_empty()).then_some(self.fps_text.as_str())
    }

    pub fn state(&self) -> &PacingState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut PacingState {
        &mut self.state
    }
}
