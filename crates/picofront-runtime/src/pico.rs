//! Sega Pico pen and storyware page input.
//!
//! The Pico has no joypad of its own. In the pen modes the first pad's
//! direction buttons steer the pen instead of reaching the core.

use crate::input::{EmuEvents, PadButtons};

pub const PEN_ADJUST_X: i32 = 4;
pub const PEN_ADJUST_Y: i32 = 2;
pub const LAST_PAGE: u8 = 6;
/// Pen position reported while the pen is off the tablet.
pub const PEN_RELEASED: [u16; 2] = [0x8000, 0x8000];

const PEN_START: (i32, i32) = (160, 120);
const PEN_MIN_Y: i32 = 8;
const PEN_MAX_Y: i32 = 224 - PEN_ADJUST_Y;
const PEN_OFFSET_X: i32 = 0x3c;
const STORYWARE_OFFSET_Y: i32 = 0x2f8;
const PAD_OFFSET_Y: i32 = 0x1fc;

const DIRECTIONS: PadButtons = PadButtons::UP
    .union(PadButtons::DOWN)
    .union(PadButtons::LEFT)
    .union(PadButtons::RIGHT);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PicoInputMode {
    /// Pad input goes to the core unchanged.
    #[default]
    Joystick,
    /// The pen points at the storyware book.
    Storyware,
    /// The pen points at the drawing pad.
    Pad,
}

impl PicoInputMode {
    fn next(self) -> Self {
        match self {
            Self::Joystick => Self::Storyware,
            Self::Storyware => Self::Pad,
            Self::Pad => Self::Joystick,
        }
    }

    fn notice(self) -> &'static str {
        match self {
            Self::Joystick => "Input: Joystick",
            Self::Storyware => "Input: Pen on Storyware",
            Self::Pad => "Input: Pen on Pad",
        }
    }
}

/// What the core sees of the Pico peripherals each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PicoInput {
    pub page: u8,
    pub pen_pos: [u16; 2],
}

impl Default for PicoInput {
    fn default() -> Self {
        Self {
            page: 0,
            pen_pos: PEN_RELEASED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PicoPen {
    mode: PicoInputMode,
    x: i32,
    y: i32,
    input: PicoInput,
}

impl Default for PicoPen {
    fn default() -> Self {
        Self {
            mode: PicoInputMode::default(),
            x: PEN_START.0,
            y: PEN_START.1,
            input: PicoInput::default(),
        }
    }
}

impl PicoPen {
    pub fn mode(&self) -> PicoInputMode {
        self.mode
    }

    pub fn input(&self) -> PicoInput {
        self.input
    }

    /// Applies one frame: `pressed` holds this frame's new events, `pad` is
    /// the first pad. Returns the notice to show, if any.
    ///
    /// Outside joystick mode the direction bits are consumed and cleared
    /// from `pad`.
    pub fn update(
        &mut self,
        pressed: EmuEvents,
        pad: &mut PadButtons,
        h40: bool,
    ) -> Option<String> {
        let mut notice = None;

        if pressed.contains(EmuEvents::PICO_SWINP) {
            self.mode = self.mode.next();
            if self.mode == PicoInputMode::Joystick {
                self.input.pen_pos = PEN_RELEASED;
            }
            notice = Some(self.mode.notice().to_string());
        }
        if pressed.contains(EmuEvents::PICO_PPREV) {
            self.input.page = self.input.page.saturating_sub(1);
            notice = Some(format!("Page {}", self.input.page));
        }
        if pressed.contains(EmuEvents::PICO_PNEXT) {
            self.input.page = (self.input.page + 1).min(LAST_PAGE);
            notice = Some(format!("Page {}", self.input.page));
        }

        if self.mode == PicoInputMode::Joystick {
            return notice;
        }

        if pad.contains(PadButtons::UP) {
            self.y -= 1;
        }
        if pad.contains(PadButtons::DOWN) {
            self.y += 1;
        }
        if pad.contains(PadButtons::LEFT) {
            self.x -= 1;
        }
        if pad.contains(PadButtons::RIGHT) {
            self.x += 1;
        }
        pad.remove(DIRECTIONS);

        let max_x = (if h40 { 319 } else { 255 }) - PEN_ADJUST_X;
        self.y = self.y.clamp(PEN_MIN_Y, PEN_MAX_Y);
        self.x = self.x.clamp(0, max_x);

        // Narrow mode is stretched onto the same tablet width.
        let x = if h40 { self.x } else { self.x + self.x / 4 };
        let y = match self.mode {
            PicoInputMode::Storyware => STORYWARE_OFFSET_Y + self.y,
            _ => PAD_OFFSET_Y + self.y,
        };
        self.input.pen_pos = [(x + PEN_OFFSET_X) as u16, y as u16];

        notice
    }
}
