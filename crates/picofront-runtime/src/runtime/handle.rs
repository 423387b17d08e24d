use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Sender, bounded, unbounded};
use tracing::{error, info};

use crate::{config::EmuConfig, error::RuntimeError, pacing::FrameskipPolicy};

use super::{
    control::{ControlMessage, ControlReplySender},
    runner::{EmuLoop, Session},
    state::{EngineState, RuntimeState, RuntimeStats},
    util::try_raise_current_thread_priority,
};

pub(crate) const CONTROL_REPLY_TIMEOUT: Duration = Duration::from_secs(2);
pub(crate) const PERSIST_REPLY_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const START_TIMEOUT: Duration = Duration::from_secs(10);

struct RuntimeInner {
    ctrl_tx: Sender<ControlMessage>,
    state: Arc<RuntimeState>,
}

/// Owns the emulation thread. Dropping it stops the thread.
pub struct Runtime {
    inner: Arc<RuntimeInner>,
    join: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Spawns the emulation thread. `build` runs on that thread and creates
    /// the session, so platform objects never cross threads.
    pub fn start<F>(config: EmuConfig, build: F) -> Result<Self, RuntimeError>
    where
        F: FnOnce() -> Result<Session, RuntimeError> + Send + 'static,
    {
        let (ctrl_tx, ctrl_rx) = unbounded::<ControlMessage>();
        let (ready_tx, ready_rx) = bounded::<Result<(), RuntimeError>>(1);

        let state = Arc::new(RuntimeState::new(EngineState::Running));
        let thread_state = Arc::clone(&state);

        let join = thread::Builder::new()
            .name("picofront-emu".to_string())
            .spawn(move || {
                try_raise_current_thread_priority();
                let session = match build() {
                    Ok(session) => session,
                    Err(e) => {
                        error!("failed to build session: {e}");
                        thread_state.set_engine(EngineState::Quit);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let sram = config.sram_autosave;
                let mut emu = EmuLoop::with_state(session, config, thread_state, Some(ctrl_rx));
                if sram {
                    emu.restore_backup();
                }
                let _ = ready_tx.send(Ok(()));
                emu.drive();
                info!("emulation thread exit");
            })
            .map_err(RuntimeError::Spawn)?;

        let ready = match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(res) => res,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                Err(RuntimeError::ControlTimeout { op: "start" })
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(RuntimeError::ControlChannelDisconnected)
            }
        };

        let inner = Arc::new(RuntimeInner { ctrl_tx, state });
        let mut runtime = Self {
            inner,
            join: Some(join),
        };
        match ready {
            Ok(()) => Ok(runtime),
            Err(e) => {
                runtime.shutdown();
                Err(e)
            }
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Waits for the emulation thread to finish on its own, e.g. after
    /// [`RuntimeHandle::quit`].
    pub fn join(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    fn shutdown(&mut self) {
        self.inner.state.set_engine(EngineState::Quit);
        let _ = self.inner.ctrl_tx.send(ControlMessage::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl RuntimeHandle {
    fn send_with_reply(
        &self,
        op: &'static str,
        timeout: Duration,
        build: impl FnOnce(ControlReplySender) -> ControlMessage,
    ) -> Result<(), RuntimeError> {
        let (reply_tx, reply_rx) = bounded::<Result<(), RuntimeError>>(1);
        self.inner
            .ctrl_tx
            .send(build(reply_tx))
            .map_err(|_| RuntimeError::ControlChannelDisconnected)?;
        match reply_rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                Err(RuntimeError::ControlTimeout { op })
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(RuntimeError::ControlChannelDisconnected)
            }
        }
    }

    pub fn save_state(&self, slot: u8) -> Result<(), RuntimeError> {
        self.send_with_reply("save_state", PERSIST_REPLY_TIMEOUT, |reply| {
            ControlMessage::SaveState(slot, reply)
        })
    }

    pub fn load_state(&self, slot: u8) -> Result<(), RuntimeError> {
        self.send_with_reply("load_state", PERSIST_REPLY_TIMEOUT, |reply| {
            ControlMessage::LoadState(slot, reply)
        })
    }

    pub fn select_slot(&self, slot: u8) -> Result<(), RuntimeError> {
        self.send_with_reply("select_slot", CONTROL_REPLY_TIMEOUT, |reply| {
            ControlMessage::SelectSlot(slot, reply)
        })
    }

    pub fn reset_game(&self) -> Result<(), RuntimeError> {
        self.send_with_reply("reset_game", CONTROL_REPLY_TIMEOUT, ControlMessage::ResetGame)
    }

    pub fn set_fast_forward(&self, on: bool) -> Result<(), RuntimeError> {
        self.send_with_reply("set_fast_forward", CONTROL_REPLY_TIMEOUT, |reply| {
            ControlMessage::SetFastForward(on, reply)
        })
    }

    pub fn set_frameskip(&self, policy: FrameskipPolicy) -> Result<(), RuntimeError> {
        self.send_with_reply("set_frameskip", CONTROL_REPLY_TIMEOUT, |reply| {
            ControlMessage::SetFrameskip(policy, reply)
        })
    }

    pub fn pause(&self) -> Result<(), RuntimeError> {
        self.send_with_reply("pause", CONTROL_REPLY_TIMEOUT, ControlMessage::Pause)
    }

    pub fn resume(&self) -> Result<(), RuntimeError> {
        self.send_with_reply("resume", CONTROL_REPLY_TIMEOUT, ControlMessage::Resume)
    }

    pub fn menu(&self) -> Result<(), RuntimeError> {
        self.send_with_reply("menu", CONTROL_REPLY_TIMEOUT, ControlMessage::Menu)
    }

    /// Asks the emulation thread to exit. Also interrupts a pending
    /// confirmation dialog.
    pub fn quit(&self) {
        self.inner.state.set_engine(EngineState::Quit);
        let _ = self.inner.ctrl_tx.send(ControlMessage::Stop);
    }

    pub fn state(&self) -> EngineState {
        self.inner.state.engine()
    }

    pub fn stats(&self) -> RuntimeStats {
        self.inner.state.stats()
    }
}
