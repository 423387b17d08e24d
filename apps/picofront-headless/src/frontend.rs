//! Video and input collaborators for running without a window.

use std::ops::Range;

use picofront_runtime::{
    InputSource, VideoMode, VideoOut,
    input::{EmuEvents, InputFrame, MenuKeys, PadButtons},
};
use tracing::{debug, info};

/// Discards frames and reports status text through tracing.
#[derive(Default)]
pub struct LogVideo {
    frames: u64,
    last_fps: String,
    last_notice: String,
}

impl VideoOut for LogVideo {
    fn update_display(&mut self, fps: Option<&str>, notice: Option<&str>) {
        self.frames += 1;
        if let Some(fps) = fps.filter(|f| *f != self.last_fps) {
            self.last_fps = fps.to_string();
            info!(fps = fps.trim_end(), "fps");
        }
        let notice = notice.unwrap_or_default();
        if notice != self.last_notice {
            self.last_notice = notice.to_string();
            if !notice.is_empty() {
                info!(notice = notice.trim_end(), "notice");
            }
        }
    }

    fn wait_vsync(&mut self) {}

    fn status_clear(&mut self) {}

    fn status_busy(&mut self, msg: &str) {
        info!(status = msg, "busy");
    }

    fn video_mode_change(&mut self, mode: VideoMode) {
        let (w, h) = (
            if mode.h40 { 320 } else { 256 },
            if mode.v30 { 240 } else { 224 },
        );
        info!(width = w, height = h, "video mode");
    }

    fn toggle_renderer(&mut self) {}

    fn loop_end(&mut self) {
        debug!(frames = self.frames, "display loop end");
    }
}

const PEN_SWITCH_AT: u32 = 30;

/// Holds the fast-forward key for a range of polls; otherwise idle.
///
/// With `pen` set it switches a Pico to pen input early on and then sweeps
/// the pen across the tablet.
pub struct ScriptedInput {
    polls: u32,
    fast_forward: Option<Range<u32>>,
    pen: bool,
    back_held: bool,
}

impl ScriptedInput {
    pub fn new(fast_forward: Option<Range<u32>>, pen: bool) -> Self {
        Self {
            polls: 0,
            fast_forward,
            pen,
            back_held: false,
        }
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) -> InputFrame {
        self.polls = self.polls.wrapping_add(1);
        let mut frame = InputFrame::default();
        if self
            .fast_forward
            .as_ref()
            .is_some_and(|r| r.contains(&self.polls))
        {
            frame.events |= EmuEvents::FAST_FORWARD;
        }
        if self.pen {
            if self.polls == PEN_SWITCH_AT {
                frame.events |= EmuEvents::PICO_SWINP;
            }
            frame.pads[0] |= if (self.polls / 300) % 2 == 0 {
                PadButtons::RIGHT
            } else {
                PadButtons::LEFT
            };
        }
        frame
    }

    /// No one is there to answer a dialog, so every prompt is declined by
    /// tapping back.
    fn menu_keys(&mut self, _timeout_ms: u32) -> MenuKeys {
        self.back_held = !self.back_held;
        if self.back_held {
            MenuKeys::BACK
        } else {
            MenuKeys::empty()
        }
    }
}
