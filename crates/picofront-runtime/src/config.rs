#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use crate::pacing::{FrameskipPolicy, PacingLimits};

pub const DEFAULT_SOUND_RATE: u32 = 44_100;
pub const DEFAULT_TURBO_RATE: u8 = 15;

/// User-facing emulator options the loop consults.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmuConfig {
    pub frameskip: FrameskipPolicy,
    pub frame_limit: bool,
    pub vsync: bool,
    pub sound: bool,
    pub sound_rate: u32,
    pub stereo: bool,
    pub show_fps: bool,
    pub confirm_save: bool,
    pub confirm_load: bool,
    /// Write battery RAM at loop exit when it changed.
    pub sram_autosave: bool,
    pub compress_saves: bool,
    /// 0..=100.
    pub volume: u8,
    pub turbo_rate: u8,
    pub pacing: PacingLimits,
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self {
            frameskip: FrameskipPolicy::Auto,
            frame_limit: true,
            vsync: false,
            sound: true,
            sound_rate: DEFAULT_SOUND_RATE,
            stereo: true,
            show_fps: false,
            confirm_save: false,
            confirm_load: false,
            sram_autosave: true,
            compress_saves: false,
            volume: 50,
            turbo_rate: DEFAULT_TURBO_RATE,
            pacing: PacingLimits::default(),
        }
    }
}

/// Options fast-forward overrides while active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FastForwardSaved {
    pub frameskip: FrameskipPolicy,
    pub frame_limit: bool,
    pub sound: bool,
}

pub(crate) const FAST_FORWARD_SKIP: u32 = 8;
