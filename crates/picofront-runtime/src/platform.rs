//! Collaborator interfaces the emulation loop drives.

use picofront_audio::{AudioError, BlockSink, SoundOutput, SoundSettings};
use tracing::info;

use crate::{
    clock::Clock,
    error::CoreError,
    input::{InputFrame, MenuKeys, PadButtons},
    pacing::FrameMode,
    pico::PicoInput,
};

/// Single-method hook for short status text coming out of the core, such as
/// the CD tray notification.
pub trait StatusSink {
    fn status(&mut self, msg: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMode {
    /// 40-column (320 px) mode; 32 columns otherwise.
    pub h40: bool,
    /// 240-line mode; 224 lines otherwise.
    pub v30: bool,
}

impl Default for VideoMode {
    fn default() -> Self {
        Self {
            h40: true,
            v30: false,
        }
    }
}

/// Battery-backed RAM flavour, which decides where it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Cartridge SRAM.
    Sram,
    /// Mega CD backup RAM. May carry cart RAM data past its used area, so
    /// trailing zeros are kept.
    Bram,
}

pub trait EmuCore {
    /// Emulates one frame. Returns the audio produced by it, which is empty
    /// for [`FrameMode::SkipAll`].
    fn run_frame(
        &mut self,
        mode: FrameMode,
        status: &mut dyn StatusSink,
    ) -> Result<&[i16], CoreError>;

    fn is_pal(&self) -> bool;
    fn video_mode(&self) -> VideoMode;
    fn set_pads(&mut self, pads: [PadButtons; 2]);
    fn reset(&mut self);

    /// Pico titles also take pen and storyware page input.
    fn is_pico(&self) -> bool {
        false
    }
    fn set_pico_input(&mut self, _input: PicoInput) {}

    fn save_state(&mut self) -> Result<Vec<u8>, CoreError>;
    fn load_state(&mut self, data: &[u8]) -> Result<(), CoreError>;

    /// `None` when the loaded game has no battery RAM.
    fn backup_ram(&self) -> Option<(BackupKind, &[u8])>;
    fn load_backup_ram(&mut self, data: &[u8]);
    fn backup_ram_changed(&self) -> bool;
    fn clear_backup_ram_changed(&mut self);
}

pub trait VideoOut {
    fn update_display(&mut self, fps: Option<&str>, notice: Option<&str>);
    fn wait_vsync(&mut self);
    fn status_clear(&mut self);
    /// Blocking message shown while the loop is busy or about to stop.
    fn status_busy(&mut self, msg: &str);
    fn video_mode_change(&mut self, mode: VideoMode);
    fn toggle_renderer(&mut self);
    fn loop_prep(&mut self) {}
    fn loop_end(&mut self) {}
}

pub trait InputSource {
    fn poll(&mut self) -> InputFrame;
    /// Waits up to `timeout_ms` for menu keys and returns those held.
    fn menu_keys(&mut self, timeout_ms: u32) -> MenuKeys;
}

pub trait SoundSink {
    fn start(&mut self, settings: SoundSettings) -> Result<(), AudioError>;
    fn write(&mut self, samples: &[i16]);
    fn set_volume(&mut self, volume: u8);
    fn clear(&mut self);
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

pub type BlockSinkFactory =
    Box<dyn FnMut(SoundSettings) -> Result<Box<dyn BlockSink>, AudioError> + Send>;

/// [`SoundSink`] backed by the ring and pump thread of `picofront-audio`.
pub struct PumpedSound {
    open: BlockSinkFactory,
    output: Option<SoundOutput>,
    volume: u8,
}

impl PumpedSound {
    pub fn new(open: BlockSinkFactory) -> Self {
        Self {
            open,
            output: None,
            volume: 100,
        }
    }
}

impl SoundSink for PumpedSound {
    fn start(&mut self, settings: SoundSettings) -> Result<(), AudioError> {
        if self
            .output
            .as_ref()
            .is_some_and(|out| out.settings() == settings)
        {
            return Ok(());
        }
        self.stop();
        let sink = (self.open)(settings)?;
        let mut output = SoundOutput::start(settings, sink)?;
        output.set_volume(self.volume);
        self.output = Some(output);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) {
        if let Some(out) = &mut self.output {
            out.write(samples);
        }
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
        if let Some(out) = &mut self.output {
            out.set_volume(volume);
        }
    }

    fn clear(&mut self) {
        if let Some(out) = &self.output {
            out.clear();
        }
    }

    fn stop(&mut self) {
        if let Some(out) = self.output.take() {
            let stats = out.stats();
            info!(
                made = stats.made,
                done = stats.done,
                dropped = stats.dropped,
                "stopping audio"
            );
            out.stop();
        }
    }

    fn is_running(&self) -> bool {
        self.output.is_some()
    }
}

/// Everything platform-specific the loop needs, bundled.
pub struct Platform {
    pub clock: Box<dyn Clock>,
    pub video: Box<dyn VideoOut>,
    pub input: Box<dyn InputSource>,
    pub sound: Box<dyn SoundSink>,
}
