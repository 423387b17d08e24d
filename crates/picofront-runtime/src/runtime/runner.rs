use std::{
    collections::VecDeque,
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use picofront_audio::SoundSettings;
use tracing::{debug, error, info, warn};

use crate::{
    config::{EmuConfig, FAST_FORWARD_SKIP, FastForwardSaved},
    error::{PersistError, RuntimeError, Severity},
    input::{EmuEvents, InputSampler, PadButtons, VolumeStep, wait_confirm},
    movie::Movie,
    notice::{NoticeBoard, NoticeUpdate, Notifier},
    pacing::{CommitKind, Decision, FrameMode, FrameskipPolicy, ResetCause, Scheduler, VideoStandard},
    persist::{PersistKind, Persistence, SLOT_COUNT},
    pico::PicoPen,
    platform::{EmuCore, Platform, VideoMode},
};

use super::{
    control::{ControlMessage, ControlReplySender},
    state::{EngineState, RuntimeState, RuntimeStats},
};

const IDLE_POLL: Duration = Duration::from_millis(10);

/// Everything one emulation session runs against.
pub struct Session {
    pub core: Box<dyn EmuCore>,
    pub platform: Platform,
    pub persistence: Box<dyn Persistence>,
    /// Recorded input replayed in place of the pads until it runs out.
    pub movie: Option<Movie>,
}

struct PendingOp {
    kind: PersistKind,
    slot: u8,
    /// Ask before overwriting or loading when the slot is occupied.
    confirm: bool,
    reply: Option<ControlReplySender>,
}

/// The emulation loop and all state it owns.
///
/// Each iteration samples the clock, applies a pending timing reset, updates
/// the notice, checks for video mode and standard changes, rolls the FPS
/// window, then renders or skips one frame according to the scheduler.
/// Persistence requests are queued and run between iterations.
pub struct EmuLoop {
    core: Box<dyn EmuCore>,
    platform: Platform,
    persistence: Box<dyn Persistence>,
    config: EmuConfig,
    scheduler: Scheduler,
    notice: NoticeBoard,
    sampler: InputSampler,
    pico: PicoPen,
    movie: Option<Movie>,
    movie_frame: u32,
    state: Arc<RuntimeState>,
    ctrl_rx: Option<Receiver<ControlMessage>>,
    pending: VecDeque<PendingOp>,
    slot: u8,
    volume: u8,
    sound_ok: bool,
    fast_forward: Option<FastForwardSaved>,
    last_mode: Option<VideoMode>,
}

impl EmuLoop {
    pub fn new(session: Session, config: EmuConfig) -> Self {
        Self::with_state(
            session,
            config,
            Arc::new(RuntimeState::new(EngineState::Running)),
            None,
        )
    }

    pub(crate) fn with_state(
        session: Session,
        config: EmuConfig,
        state: Arc<RuntimeState>,
        ctrl_rx: Option<Receiver<ControlMessage>>,
    ) -> Self {
        let standard = VideoStandard::from_pal(session.core.is_pal());
        let mut emu = Self {
            core: session.core,
            platform: session.platform,
            persistence: session.persistence,
            scheduler: Scheduler::new(standard, config.frameskip, config.pacing),
            notice: NoticeBoard::new(),
            sampler: InputSampler::new(config.turbo_rate),
            pico: PicoPen::default(),
            movie: None,
            movie_frame: 0,
            state,
            ctrl_rx,
            pending: VecDeque::new(),
            slot: 0,
            volume: config.volume.min(100),
            sound_ok: false,
            fast_forward: None,
            last_mode: None,
            config,
        };
        if let Some(movie) = session.movie {
            emu.play_movie(movie);
        }
        emu
    }

    pub fn engine_state(&self) -> EngineState {
        self.state.engine()
    }

    /// Re-arms the loop after it left for the menu.
    pub fn resume(&mut self) {
        self.state.transition(EngineState::Running);
    }

    pub fn stats(&self) -> RuntimeStats {
        self.state.stats()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn notice_text(&self) -> Option<&str> {
        self.notice.text()
    }

    pub fn config(&self) -> &EmuConfig {
        &self.config
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn core(&self) -> &dyn EmuCore {
        &*self.core
    }

    pub fn pico(&self) -> &PicoPen {
        &self.pico
    }

    pub fn movie_playing(&self) -> bool {
        self.movie.is_some()
    }

    /// Replays `movie` from its first frame, replacing pad input.
    pub fn play_movie(&mut self, movie: Movie) {
        let title = movie.title();
        info!(
            title = %title,
            frames = movie.frames(),
            six_button = movie.six_button(),
            region = ?movie.region(),
            "movie loaded"
        );
        let now_ms = self.platform.clock.now_ms();
        self.notice.post(now_ms, &format!("MOVIE: {title}"));
        self.movie = Some(movie);
        self.movie_frame = 0;
    }

    /// Loads battery RAM for the current game. A missing file is not an error.
    pub fn restore_backup(&mut self) {
        match self
            .persistence
            .save_or_load(&mut *self.core, PersistKind::LoadBackup, 0)
        {
            Ok(()) => {}
            Err(PersistError::MissingFile { .. }) => debug!("no backup RAM file"),
            Err(e) => warn!("failed to load backup RAM: {e}"),
        }
    }

    /// Runs the loop until the engine leaves `Running`. Returns the state it
    /// left for.
    pub fn run(&mut self) -> EngineState {
        if self.state.engine() != EngineState::Running {
            return self.state.engine();
        }

        self.prepare();
        info!(
            standard = ?self.scheduler.standard(),
            policy = ?self.scheduler.policy(),
            "entering emulation loop"
        );

        loop {
            if self.drain_control() {
                break;
            }
            self.run_pending_ops();
            if self.state.engine() != EngineState::Running {
                break;
            }
            self.iteration();
        }

        self.finish();
        let exit = self.state.engine();
        info!(?exit, stats = ?self.state.stats(), "left emulation loop");
        exit
    }

    /// Thread body: runs the loop while `Running` and idles on the control
    /// channel otherwise, until `Quit`.
    pub(crate) fn drive(&mut self) {
        loop {
            match self.state.engine() {
                EngineState::Running => {
                    self.run();
                }
                EngineState::Quit => return,
                EngineState::Paused | EngineState::Menu => {
                    self.run_pending_ops();
                    let Some(rx) = &self.ctrl_rx else {
                        return;
                    };
                    match rx.recv_timeout(IDLE_POLL) {
                        Ok(msg) => {
                            if self.handle_control(msg) {
                                return;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
            }
        }
    }

    fn prepare(&mut self) {
        let standard = VideoStandard::from_pal(self.core.is_pal());
        self.scheduler.set_standard(standard);
        self.scheduler.set_policy(self.config.frameskip);
        self.scheduler.set_frame_limit(self.config.frame_limit);
        self.scheduler.set_show_fps(self.config.show_fps);
        self.sampler.set_turbo_rate(self.config.turbo_rate);
        self.last_mode = None;

        self.start_sound();
        self.platform.video.loop_prep();

        let now = self.platform.clock.now_us();
        self.scheduler.start(now);
        self.platform.video.wait_vsync();
    }

    fn start_sound(&mut self) {
        self.sound_ok = false;
        if !self.config.sound {
            self.platform.sound.stop();
            return;
        }

        let settings = SoundSettings {
            rate: self.config.sound_rate,
            stereo: self.config.stereo,
        };
        match self.platform.sound.start(settings) {
            Ok(()) => {
                self.platform.sound.set_volume(self.volume);
                self.sound_ok = true;
            }
            Err(e) => self.report(RuntimeError::Sound(e)),
        }
    }

    fn finish(&mut self) {
        self.set_fast_forward(false);

        if self.config.sram_autosave && self.core.backup_ram_changed() {
            self.platform.video.status_busy("Writing SRAM/BRAM...");
            if let Err(e) =
                self.persistence
                    .save_or_load(&mut *self.core, PersistKind::SaveBackup, 0)
            {
                warn!("failed to write backup RAM: {e}");
            }
            self.core.clear_backup_ram_changed();
        }

        self.platform.video.loop_end();
    }

    fn iteration(&mut self) {
        let clock = &self.platform.clock;
        let now = clock.now_us();
        let now_ms = clock.now_ms();

        if let Some(cause) = self.scheduler.sample(now) {
            self.state.timing_resets.fetch_add(1, Ordering::Relaxed);
            if matches!(cause, ResetCause::Stall | ResetCause::Backlog) {
                self.report(RuntimeError::Stall { cause });
            }
        }

        self.update_notice(now_ms);
        self.check_video_mode();
        if self.check_standard(now_ms) {
            // Retimed on the next pass, before any frame is scheduled.
            return;
        }
        self.scheduler.roll_fps_window(now);

        match self.scheduler.tick_decision(now) {
            Decision::ResetAndRetry => return,
            Decision::Skip(mode) => {
                self.update_input();
                self.produce(mode);
                self.scheduler.commit(CommitKind::Skipped);
                self.state.frames_skipped.fetch_add(1, Ordering::Relaxed);

                // Fixed skipping still keeps skipped frames on the clock.
                if matches!(self.scheduler.policy(), FrameskipPolicy::Fixed(_))
                    && self.scheduler.frame_limit()
                {
                    let clock = &*self.platform.clock;
                    let budget = self.scheduler.frame_budget();
                    self.scheduler
                        .wait_if_ahead(clock, clock.now_us(), budget, 0);
                }
                return;
            }
            Decision::Render => {}
        }

        let budget = self.scheduler.frame_budget();
        self.update_input();
        self.produce(FrameMode::Full);

        if !self.scheduler.reset_pending() && self.scheduler.frame_limit() {
            let clock = &*self.platform.clock;
            let lead = self.scheduler.frame_time_us() / 4;
            if self
                .scheduler
                .wait_if_ahead(clock, clock.now_us(), budget, lead)
                && self.config.vsync
            {
                self.platform.video.wait_vsync();
            }
        }

        self.platform
            .video
            .update_display(self.scheduler.fps_text(), self.notice.text());
        self.scheduler.commit(CommitKind::Rendered);
        self.state.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    fn update_notice(&mut self, now_ms: u32) {
        match self.notice.poll(now_ms) {
            NoticeUpdate::Expired | NoticeUpdate::Visible { redraw: true } => {
                self.platform.video.status_clear();
            }
            NoticeUpdate::Idle | NoticeUpdate::Visible { redraw: false } => {}
        }
    }

    fn check_video_mode(&mut self) {
        let mode = self.core.video_mode();
        if self.last_mode != Some(mode) {
            debug!(h40 = mode.h40, v30 = mode.v30, "video mode change");
            self.last_mode = Some(mode);
            self.platform.video.video_mode_change(mode);
        }
    }

    /// Returns `true` when the standard changed and a timing reset is queued.
    fn check_standard(&mut self, now_ms: u32) -> bool {
        let standard = VideoStandard::from_pal(self.core.is_pal());
        if !self.scheduler.set_standard(standard) {
            return false;
        }
        info!(?standard, fps = standard.fps(), "video standard changed");
        let msg = if standard.is_pal() {
            "PAL SYSTEM / 50 FPS"
        } else {
            "NTSC SYSTEM / 60 FPS"
        };
        self.notice.post(now_ms, msg);
        self.scheduler.request_reset(ResetCause::StandardChange);
        true
    }

    fn produce(&mut self, mode: FrameMode) {
        let now_ms = self.platform.clock.now_ms();
        let sound_on = self.sound_active();
        let sound = &mut self.platform.sound;
        let mut status = Notifier::new(&mut self.notice, now_ms);

        let produced = self.core.run_frame(mode, &mut status).map(|samples| {
            if sound_on && !samples.is_empty() {
                sound.write(samples);
            }
        });
        if let Err(e) = produced {
            self.report(RuntimeError::Core(e));
        }
    }

    fn sound_active(&self) -> bool {
        self.sound_ok && self.fast_forward.is_none() && self.platform.sound.is_running()
    }

    fn update_input(&mut self) {
        let frame = self.platform.input.poll();
        let mut input = self.sampler.sample(frame);

        if let Some(step) = input.volume {
            self.step_volume(step);
        }
        if let Some(on) = input.fast_forward {
            self.set_fast_forward(on);
        }
        if self.core.is_pico() {
            let h40 = self.core.video_mode().h40;
            if let Some(msg) = self.pico.update(input.pressed, &mut input.pads[0], h40) {
                let now_ms = self.platform.clock.now_ms();
                self.notice.post(now_ms, &msg);
            }
            self.core.set_pico_input(self.pico.input());
        }
        if !input.pressed.is_empty() {
            self.run_events(input.pressed);
        }
        self.replay_movie(&mut input.pads);
        self.core.set_pads(input.pads);
    }

    fn replay_movie(&mut self, pads: &mut [PadButtons; 2]) {
        let Some(movie) = &self.movie else {
            return;
        };
        match movie.pads(self.movie_frame) {
            Some(recorded) => {
                *pads = recorded;
                self.movie_frame += 1;
            }
            None => {
                info!(frames = self.movie_frame, "end of movie");
                self.movie = None;
                let now_ms = self.platform.clock.now_ms();
                self.notice.post(now_ms, "END OF MOVIE.");
            }
        }
    }

    fn step_volume(&mut self, step: VolumeStep) {
        if !self.sound_active() {
            return;
        }
        self.volume = match step {
            VolumeStep::Up => (self.volume + 1).min(100),
            VolumeStep::Down => self.volume.saturating_sub(1),
        };
        self.platform.sound.set_volume(self.volume);
        let now_ms = self.platform.clock.now_ms();
        self.notice.post(now_ms, &format!("VOL: {:02} ", self.volume));
    }

    /// Fast-forward overrides frameskip, the frame limiter and sound until
    /// switched off again. Either edge resets timing.
    fn set_fast_forward(&mut self, on: bool) {
        match (on, self.fast_forward) {
            (true, None) => {
                self.fast_forward = Some(FastForwardSaved {
                    frameskip: self.scheduler.policy(),
                    frame_limit: self.scheduler.frame_limit(),
                    sound: self.sound_ok,
                });
                self.scheduler
                    .set_policy(FrameskipPolicy::Fixed(FAST_FORWARD_SKIP));
                self.scheduler.set_frame_limit(false);
                let now_ms = self.platform.clock.now_ms();
                self.notice.post(now_ms, "FAST FORWARD");
                info!("fast forward on");
            }
            (false, Some(saved)) => {
                self.fast_forward = None;
                self.scheduler.set_policy(saved.frameskip);
                self.scheduler.set_frame_limit(saved.frame_limit);
                if saved.sound {
                    self.platform.sound.clear();
                }
                info!("fast forward off");
            }
            _ => return,
        }
        self.state
            .fast_forward
            .store(self.fast_forward.is_some(), Ordering::Relaxed);
        self.scheduler.request_reset(ResetCause::FastForward);
    }

    fn run_events(&mut self, events: EmuEvents) {
        if events.intersects(EmuEvents::STATE_SAVE | EmuEvents::STATE_LOAD) {
            let kind = if events.contains(EmuEvents::STATE_LOAD) {
                PersistKind::LoadState
            } else {
                PersistKind::SaveState
            };
            self.pending.push_back(PendingOp {
                kind,
                slot: self.slot,
                confirm: true,
                reply: None,
            });
        }
        if events.contains(EmuEvents::SWITCH_RENDERER) {
            self.platform.video.toggle_renderer();
        }
        if events.intersects(EmuEvents::SLOT_PREV | EmuEvents::SLOT_NEXT) {
            self.slot = if events.contains(EmuEvents::SLOT_PREV) {
                self.slot.checked_sub(1).unwrap_or(SLOT_COUNT - 1)
            } else {
                (self.slot + 1) % SLOT_COUNT
            };
            let used = if self.persistence.slot_used(self.slot) {
                "USED"
            } else {
                "FREE"
            };
            let now_ms = self.platform.clock.now_ms();
            self.notice
                .post(now_ms, &format!("SAVE SLOT {} [{used}]", self.slot));
        }
        if events.contains(EmuEvents::RESET) {
            self.reset_game();
        }
        if events.contains(EmuEvents::MENU) {
            self.state.transition(EngineState::Menu);
        }
    }

    fn reset_game(&mut self) {
        info!("game reset");
        self.core.reset();
        self.scheduler.request_reset(ResetCause::GameReset);
    }

    fn run_pending_ops(&mut self) {
        while let Some(op) = self.pending.pop_front() {
            let result = self.run_persist(op.kind, op.slot, op.confirm);
            match op.reply {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(e) = result {
                        warn!("{e}");
                    }
                }
            }
        }
    }

    fn run_persist(
        &mut self,
        kind: PersistKind,
        slot: u8,
        confirm: bool,
    ) -> Result<(), RuntimeError> {
        let load = kind.is_load();
        let wants_confirm = if load {
            self.config.confirm_load
        } else {
            self.config.confirm_save
        };

        if confirm && wants_confirm && self.persistence.slot_used(slot) {
            self.platform.video.status_busy(if load {
                "LOAD STATE? (confirm=yes, back=no)"
            } else {
                "OVERWRITE SAVE? (confirm=yes, back=no)"
            });
            let state = &self.state;
            let accepted = wait_confirm(&mut *self.platform.input, || {
                state.engine() == EngineState::Quit
            });
            self.scheduler.request_reset(ResetCause::Persistence);
            if !accepted {
                debug!(?kind, slot, "persistence declined");
                return Ok(());
            }
        }

        self.platform
            .video
            .status_busy(if load { "LOADING STATE" } else { "SAVING STATE" });
        let result = self.persistence.save_or_load(&mut *self.core, kind, slot);
        self.scheduler.request_reset(ResetCause::Persistence);

        let now_ms = self.platform.clock.now_ms();
        let msg = match (&result, load) {
            (Ok(()), true) => "STATE LOADED",
            (Ok(()), false) => "STATE SAVED",
            (Err(PersistError::MissingFile { .. }), true) => "LOAD FAILED (missing file)",
            (Err(_), true) => "LOAD FAILED",
            (Err(_), false) => "SAVE FAILED",
        };
        self.notice.post(now_ms, msg);
        if load && result.is_ok() {
            self.platform.sound.clear();
        }
        result.map_err(RuntimeError::from)
    }

    /// Routes an error by severity: transient ones are only logged,
    /// recoverable ones become a notice, fatal ones block and leave for the
    /// menu.
    fn report(&mut self, err: RuntimeError) {
        match err.severity() {
            Severity::Transient => debug!("{err}"),
            Severity::Recoverable => {
                warn!("{err}");
                let now_ms = self.platform.clock.now_ms();
                self.notice.post(now_ms, &err.to_string());
            }
            Severity::Fatal => {
                error!("{err}");
                self.platform.video.status_busy(&err.to_string());
                self.state.transition(EngineState::Menu);
            }
        }
    }

    /// Handles queued control messages. Returns `true` when the thread
    /// should stop.
    fn drain_control(&mut self) -> bool {
        while let Some(msg) = self.ctrl_rx.as_ref().and_then(|rx| rx.try_recv().ok()) {
            if self.handle_control(msg) {
                return true;
            }
        }
        false
    }

    fn handle_control(&mut self, msg: ControlMessage) -> bool {
        match msg {
            ControlMessage::Stop => {
                self.state.set_engine(EngineState::Quit);
                return true;
            }
            ControlMessage::SaveState(slot, reply) | ControlMessage::LoadState(slot, reply)
                if slot >= SLOT_COUNT =>
            {
                let _ = reply.send(Err(RuntimeError::InvalidSlot(slot)));
            }
            ControlMessage::SaveState(slot, reply) => self.pending.push_back(PendingOp {
                kind: PersistKind::SaveState,
                slot,
                confirm: false,
                reply: Some(reply),
            }),
            ControlMessage::LoadState(slot, reply) => self.pending.push_back(PendingOp {
                kind: PersistKind::LoadState,
                slot,
                confirm: false,
                reply: Some(reply),
            }),
            ControlMessage::SelectSlot(slot, reply) => {
                let res = if slot < SLOT_COUNT {
                    self.slot = slot;
                    Ok(())
                } else {
                    Err(RuntimeError::InvalidSlot(slot))
                };
                let _ = reply.send(res);
            }
            ControlMessage::ResetGame(reply) => {
                self.reset_game();
                let _ = reply.send(Ok(()));
            }
            ControlMessage::SetFastForward(on, reply) => {
                self.set_fast_forward(on);
                let _ = reply.send(Ok(()));
            }
            ControlMessage::SetFrameskip(policy, reply) => {
                self.config.frameskip = policy;
                match &mut self.fast_forward {
                    Some(saved) => saved.frameskip = policy,
                    None => self.scheduler.set_policy(policy),
                }
                let _ = reply.send(Ok(()));
            }
            ControlMessage::Pause(reply) => {
                self.state.transition(EngineState::Paused);
                let _ = reply.send(Ok(()));
            }
            ControlMessage::Resume(reply) => {
                self.state.transition(EngineState::Running);
                self.scheduler.request_reset(ResetCause::Resume);
                let _ = reply.send(Ok(()));
            }
            ControlMessage::Menu(reply) => {
                self.state.transition(EngineState::Menu);
                let _ = reply.send(Ok(()));
            }
        }
        false
    }
}
