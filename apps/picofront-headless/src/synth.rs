//! A stand-in emulation core: burns a configurable amount of CPU per frame and
//! synthesizes a test tone on an offload worker.

use std::{
    f32::consts::TAU,
    thread,
    time::{Duration, Instant},
};

use picofront_runtime::{
    BackupKind, CoreError, EmuCore, FrameMode, PicoInput, StatusSink, VideoMode,
    input::PadButtons,
    offload::{DEFAULT_WORKER_TIMEOUT, OffloadWorker},
};
use tracing::debug;

const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 4000.0;
const SRAM_SIZE: usize = 0x2000;
const STATE_LEN: usize = 12;

#[derive(Debug, Clone, Copy)]
pub struct ToneJob {
    /// Index of the first sample frame, for phase continuity.
    start: u64,
    frames: usize,
    channels: usize,
    rate: u32,
}

fn synthesize(job: ToneJob) -> Vec<i16> {
    let mut out = Vec::with_capacity(job.frames * job.channels);
    for i in 0..job.frames {
        let t = (job.start + i as u64) as f32 / job.rate as f32;
        let s = ((TAU * TONE_HZ * t).sin() * TONE_AMPLITUDE) as i16;
        for _ in 0..job.channels {
            out.push(s);
        }
    }
    out
}

pub struct CoreOptions {
    pub pal: bool,
    pub cost: Duration,
    pub stall_at: Option<u32>,
    pub stall: Duration,
    pub sound_rate: u32,
    pub stereo: bool,
    /// Report as a Pico so the loop feeds pen input.
    pub pico: bool,
}

pub struct SyntheticCore {
    opts: CoreOptions,
    tone: OffloadWorker<ToneJob, Vec<i16>>,
    samples: Vec<i16>,
    sample_pos: u64,
    frame: u32,
    pads: [PadButtons; 2],
    pico_input: PicoInput,
    sram: Vec<u8>,
    sram_changed: bool,
}

impl SyntheticCore {
    pub fn new(opts: CoreOptions) -> Result<Self, CoreError> {
        let tone = OffloadWorker::spawn("tone", DEFAULT_WORKER_TIMEOUT, synthesize)?;
        Ok(Self {
            opts,
            tone,
            samples: Vec::new(),
            sample_pos: 0,
            frame: 0,
            pads: [PadButtons::empty(); 2],
            pico_input: PicoInput::default(),
            sram: vec![0; SRAM_SIZE],
            sram_changed: false,
        })
    }

    fn fps(&self) -> u32 {
        if self.opts.pal { 50 } else { 60 }
    }

    fn burn(cost: Duration) {
        let start = Instant::now();
        while start.elapsed() < cost {
            std::hint::spin_loop();
        }
    }
}

impl EmuCore for SyntheticCore {
    fn run_frame(
        &mut self,
        mode: FrameMode,
        status: &mut dyn StatusSink,
    ) -> Result<&[i16], CoreError> {
        self.frame = self.frame.wrapping_add(1);

        let job = (mode != FrameMode::SkipAll).then(|| ToneJob {
            start: self.sample_pos,
            frames: (self.opts.sound_rate / self.fps()) as usize,
            channels: if self.opts.stereo { 2 } else { 1 },
            rate: self.opts.sound_rate,
        });
        if let Some(job) = job {
            self.tone.submit(job)?;
            self.sample_pos += job.frames as u64;
        }

        Self::burn(match mode {
            FrameMode::Full => self.opts.cost,
            FrameMode::SkipVideo => self.opts.cost / 2,
            FrameMode::SkipAll => self.opts.cost / 4,
        });

        if self.opts.stall_at == Some(self.frame) {
            debug!(frame = self.frame, stall = ?self.opts.stall, "simulated stall");
            status.status("SIMULATED STALL");
            thread::sleep(self.opts.stall);
        }

        if self.pads[0].contains(PadButtons::START) && !self.sram_changed {
            self.sram[0] = self.sram[0].wrapping_add(1);
            self.sram_changed = true;
        }

        match job {
            Some(_) => self.samples = self.tone.wait()?,
            None => self.samples.clear(),
        }
        Ok(self.samples.as_slice())
    }

    fn is_pal(&self) -> bool {
        self.opts.pal
    }

    fn video_mode(&self) -> VideoMode {
        VideoMode {
            h40: true,
            v30: self.opts.pal,
        }
    }

    fn set_pads(&mut self, pads: [PadButtons; 2]) {
        self.pads = pads;
    }

    fn reset(&mut self) {
        self.frame = 0;
        self.sample_pos = 0;
    }

    fn is_pico(&self) -> bool {
        self.opts.pico
    }

    fn set_pico_input(&mut self, input: PicoInput) {
        if input != self.pico_input {
            debug!(page = input.page, pen = ?input.pen_pos, "pico input");
            self.pico_input = input;
        }
    }

    fn save_state(&mut self) -> Result<Vec<u8>, CoreError> {
        let mut out = Vec::with_capacity(STATE_LEN);
        out.extend_from_slice(&self.frame.to_le_bytes());
        out.extend_from_slice(&self.sample_pos.to_le_bytes());
        Ok(out)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<(), CoreError> {
        let (frame, pos) = match data {
            [f0, f1, f2, f3, rest @ ..] if rest.len() == 8 => {
                let mut pos = [0u8; 8];
                pos.copy_from_slice(rest);
                (u32::from_le_bytes([*f0, *f1, *f2, *f3]), u64::from_le_bytes(pos))
            }
            _ => {
                return Err(CoreError::BadState(format!(
                    "expected {STATE_LEN} bytes, got {}",
                    data.len()
                )));
            }
        };
        self.frame = frame;
        self.sample_pos = pos;
        Ok(())
    }

    fn backup_ram(&self) -> Option<(BackupKind, &[u8])> {
        Some((BackupKind::Sram, &self.sram))
    }

    fn load_backup_ram(&mut self, data: &[u8]) {
        let n = data.len().min(self.sram.len());
        self.sram[..n].copy_from_slice(&data[..n]);
    }

    fn backup_ram_changed(&self) -> bool {
        self.sram_changed
    }

    fn clear_backup_ram_changed(&mut self) {
        self.sram_changed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl StatusSink for Quiet {
        fn status(&mut self, _msg: &str) {}
    }

    fn core(stereo: bool) -> SyntheticCore {
        SyntheticCore::new(CoreOptions {
            pal: false,
            cost: Duration::ZERO,
            stall_at: None,
            stall: Duration::ZERO,
            sound_rate: 48_000,
            stereo,
            pico: false,
        })
        .unwrap()
    }

    #[test]
    fn one_frame_of_tone_per_frame() {
        let mut core = core(true);
        assert_eq!(core.run_frame(FrameMode::Full, &mut Quiet).unwrap().len(), 1600);
        assert_eq!(core.run_frame(FrameMode::SkipVideo, &mut Quiet).unwrap().len(), 1600);
        assert!(core.run_frame(FrameMode::SkipAll, &mut Quiet).unwrap().is_empty());
    }

    #[test]
    fn state_restores_tone_phase() {
        let mut core = core(false);
        core.run_frame(FrameMode::Full, &mut Quiet).unwrap();
        let saved = core.save_state().unwrap();
        let next = core.run_frame(FrameMode::Full, &mut Quiet).unwrap().to_vec();

        core.load_state(&saved).unwrap();
        assert_eq!(core.run_frame(FrameMode::Full, &mut Quiet).unwrap(), &next[..]);
        assert!(matches!(core.load_state(&[1, 2]), Err(CoreError::BadState(_))));
    }
}
