#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use picofront_audio::{AudioError, SoundSettings};
use picofront_runtime::{
    BackupKind, CoreError, EmuConfig, EmuCore, FrameMode, InputSource, ManualClock, Movie,
    PicoInput, Platform, Session, SoundSink, StatusSink, VideoMode, VideoOut,
    input::{EmuEvents, InputFrame, MenuKeys, PadButtons},
    offload::OffloadWorker,
    persist::SaveStore,
};

pub const SAMPLES_PER_FRAME: usize = 8;

#[derive(Debug, Default)]
pub struct Log {
    pub modes: Vec<FrameMode>,
    pub displays: u32,
    pub notices: Vec<String>,
    pub status_busy: Vec<String>,
    pub status_clears: u32,
    pub mode_changes: Vec<VideoMode>,
    pub renderer_toggles: u32,
    pub samples_written: usize,
    pub sound_cleared: u32,
    pub pads: Vec<PadButtons>,
    pub pads2: Vec<PadButtons>,
    pub pico: Vec<PicoInput>,
    pub loop_ends: u32,
}

pub type SharedLog = Arc<Mutex<Log>>;

pub struct FakeCore {
    pub clock: ManualClock,
    pub log: SharedLog,
    pub cost_us: u64,
    pub stall_at: Option<(u32, u64)>,
    pub tray_at: Option<u32>,
    pub pal: Arc<AtomicBool>,
    pub pal_at: Option<u32>,
    pub ntsc_at: Option<u32>,
    pub pico: bool,
    pub worker: Option<OffloadWorker<u32, u32>>,
    pub state: Vec<u8>,
    pub sram: Vec<u8>,
    pub sram_changed: bool,
    frames: u32,
    samples: Vec<i16>,
}

impl FakeCore {
    pub fn new(clock: ManualClock, log: SharedLog, cost_us: u64) -> Self {
        Self {
            clock,
            log,
            cost_us,
            stall_at: None,
            tray_at: None,
            pal: Arc::new(AtomicBool::new(false)),
            pal_at: None,
            ntsc_at: None,
            pico: false,
            worker: None,
            state: b"core state".to_vec(),
            sram: vec![0; 32],
            sram_changed: false,
            frames: 0,
            samples: vec![100; SAMPLES_PER_FRAME],
        }
    }
}

impl EmuCore for FakeCore {
    fn run_frame(
        &mut self,
        mode: FrameMode,
        status: &mut dyn StatusSink,
    ) -> Result<&[i16], CoreError> {
        self.frames += 1;
        self.log.lock().modes.push(mode);

        let cost = match mode {
            FrameMode::Full => self.cost_us,
            FrameMode::SkipVideo => self.cost_us / 2,
            FrameMode::SkipAll => self.cost_us / 4,
        };
        self.clock.advance_us(cost);

        match self.stall_at {
            Some((frame, us)) if frame == self.frames => self.clock.advance_us(us),
            _ => {}
        }
        if self.tray_at == Some(self.frames) {
            status.status("CD tray opened");
        }
        if self.pal_at == Some(self.frames) {
            self.pal.store(true, Ordering::Release);
        }
        if self.ntsc_at == Some(self.frames) {
            self.pal.store(false, Ordering::Release);
        }
        if let Some(worker) = &mut self.worker {
            worker.call(self.frames)?;
        }
        if self.frames % 7 == 0 {
            self.sram[0] = self.frames as u8;
            self.sram_changed = true;
        }

        Ok(match mode {
            FrameMode::SkipAll => &[][..],
            _ => &self.samples[..],
        })
    }

    fn is_pal(&self) -> bool {
        self.pal.load(Ordering::Acquire)
    }

    fn video_mode(&self) -> VideoMode {
        VideoMode::default()
    }

    fn set_pads(&mut self, pads: [PadButtons; 2]) {
        let mut log = self.log.lock();
        log.pads.push(pads[0]);
        log.pads2.push(pads[1]);
    }

    fn reset(&mut self) {}

    fn is_pico(&self) -> bool {
        self.pico
    }

    fn set_pico_input(&mut self, input: PicoInput) {
        self.log.lock().pico.push(input);
    }

    fn save_state(&mut self) -> Result<Vec<u8>, CoreError> {
        Ok(self.state.clone())
    }

    fn load_state(&mut self, data: &[u8]) -> Result<(), CoreError> {
        self.state = data.to_vec();
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

pub struct FakeVideo {
    pub log: SharedLog,
}

impl VideoOut for FakeVideo {
    fn update_display(&mut self, _fps: Option<&str>, notice: Option<&str>) {
        let mut log = self.log.lock();
        log.displays += 1;
        if let Some(text) = notice {
            let text = text.trim_end().to_string();
            if log.notices.last() != Some(&text) {
                log.notices.push(text);
            }
        }
    }

    fn wait_vsync(&mut self) {}

    fn status_clear(&mut self) {
        self.log.lock().status_clears += 1;
    }

    fn status_busy(&mut self, msg: &str) {
        self.log.lock().status_busy.push(msg.to_string());
    }

    fn video_mode_change(&mut self, mode: VideoMode) {
        self.log.lock().mode_changes.push(mode);
    }

    fn toggle_renderer(&mut self) {
        self.log.lock().renderer_toggles += 1;
    }

    fn loop_end(&mut self) {
        self.log.lock().loop_ends += 1;
    }
}

/// Scripted input. Poll `n` (1-based) returns `events[n]` if scripted; the
/// menu event is raised on poll `menu_at`.
pub struct FakeInput {
    pub events: Vec<(u32, EmuEvents)>,
    pub pads: Vec<(u32, PadButtons)>,
    pub menu_keys: VecDeque<MenuKeys>,
    pub menu_at: Option<u32>,
    polls: u32,
}

impl FakeInput {
    pub fn new(menu_at: Option<u32>) -> Self {
        Self {
            events: Vec::new(),
            pads: Vec::new(),
            menu_keys: VecDeque::new(),
            menu_at,
            polls: 0,
        }
    }

    pub fn hold(mut self, from: u32, to: u32, events: EmuEvents) -> Self {
        self.events.extend((from..=to).map(|n| (n, events)));
        self
    }

    pub fn hold_pad(mut self, from: u32, to: u32, pad: PadButtons) -> Self {
        self.pads.extend((from..=to).map(|n| (n, pad)));
        self
    }
}

impl InputSource for FakeInput {
    fn poll(&mut self) -> InputFrame {
        self.polls += 1;
        let n = self.polls;
        let mut frame = InputFrame::default();
        for (at, ev) in &self.events {
            if *at == n {
                frame.events |= *ev;
            }
        }
        for (at, pad) in &self.pads {
            if *at == n {
                frame.pads[0] |= *pad;
            }
        }
        if self.menu_at.is_some_and(|m| n >= m) {
            frame.events |= EmuEvents::MENU;
        }
        frame
    }

    fn menu_keys(&mut self, _timeout_ms: u32) -> MenuKeys {
        self.menu_keys.pop_front().unwrap_or_default()
    }
}

pub struct FakeSound {
    pub log: SharedLog,
    pub fail: bool,
    /// The device disappears after this many writes.
    pub lost_after: Option<usize>,
    running: bool,
    writes: usize,
}

impl FakeSound {
    pub fn new(log: SharedLog, fail: bool) -> Self {
        Self {
            log,
            fail,
            lost_after: None,
            running: false,
            writes: 0,
        }
    }
}

impl SoundSink for FakeSound {
    fn start(&mut self, _settings: SoundSettings) -> Result<(), AudioError> {
        if self.fail {
            return Err(AudioError::NoDevice);
        }
        self.running = true;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) {
        self.log.lock().samples_written += samples.len();
        self.writes += 1;
        if self.lost_after.is_some_and(|n| self.writes >= n) {
            self.running = false;
        }
    }

    fn set_volume(&mut self, _volume: u8) {}

    fn clear(&mut self) {
        self.log.lock().sound_cleared += 1;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "picofront-it-{}-{name}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

pub struct Rig {
    pub clock: ManualClock,
    pub log: SharedLog,
    pub core: FakeCore,
    pub input: FakeInput,
    pub sound_fails: bool,
    pub sound_lost_after: Option<usize>,
    pub movie: Option<Movie>,
    pub root: PathBuf,
}

impl Rig {
    pub fn new(name: &str, cost_us: u64, menu_at: Option<u32>) -> Self {
        let clock = ManualClock::new(0);
        let log = SharedLog::default();
        Self {
            core: FakeCore::new(clock.clone(), Arc::clone(&log), cost_us),
            clock,
            log,
            input: FakeInput::new(menu_at),
            sound_fails: false,
            sound_lost_after: None,
            movie: None,
            root: scratch_dir(name),
        }
    }

    pub fn with_worker_timeout(mut self, hang_at: u32, timeout: Duration) -> Self {
        let worker = OffloadWorker::spawn("snd", timeout, move |frame: u32| {
            if frame == hang_at {
                std::thread::sleep(timeout * 10);
            }
            frame
        })
        .expect("spawn worker");
        self.core.worker = Some(worker);
        self
    }

    pub fn session(self) -> (Session, ManualClock, SharedLog, PathBuf) {
        let platform = Platform {
            clock: Box::new(self.clock.clone()),
            video: Box::new(FakeVideo {
                log: Arc::clone(&self.log),
            }),
            input: Box::new(self.input),
            sound: Box::new(FakeSound {
                lost_after: self.sound_lost_after,
                ..FakeSound::new(Arc::clone(&self.log), self.sound_fails)
            }),
        };
        let store = SaveStore::new(&self.root, "game", false);
        let session = Session {
            core: Box::new(self.core),
            platform,
            persistence: Box::new(store),
            movie: self.movie,
        };
        (session, self.clock, self.log, self.root)
    }
}

pub fn config() -> EmuConfig {
    EmuConfig {
        sram_autosave: false,
        ..EmuConfig::default()
    }
}
