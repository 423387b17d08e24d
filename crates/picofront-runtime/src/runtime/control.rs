use crossbeam_channel::Sender;

use crate::{error::RuntimeError, pacing::FrameskipPolicy};

pub(crate) type ControlReplySender = Sender<Result<(), RuntimeError>>;

/// Requests from [`super::RuntimeHandle`]. Drained once per loop iteration,
/// before the clock is sampled.
pub(crate) enum ControlMessage {
    Stop,
    SaveState(u8, ControlReplySender),
    LoadState(u8, ControlReplySender),
    SelectSlot(u8, ControlReplySender),
    ResetGame(ControlReplySender),
    SetFastForward(bool, ControlReplySender),
    SetFrameskip(FrameskipPolicy, ControlReplySender),
    Pause(ControlReplySender),
    Resume(ControlReplySender),
    Menu(ControlReplySender),
}
