use std::{io, path::PathBuf};

use picofront_audio::AudioError;

use crate::pacing::ResetCause;

/// How far an error is allowed to travel out of the emulation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Absorbed by a timing reset; never shown.
    Transient,
    /// Shown as a notice; the loop keeps running with the feature degraded.
    Recoverable,
    /// Shown as a blocking message; the loop leaves for the menu.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum OffloadError {
    #[error("worker {name} did not answer within {waited_ms} ms")]
    Unresponsive { name: &'static str, waited_ms: u64 },
    #[error("worker {name} has crashed")]
    Crashed { name: &'static str },
    #[error("failed to spawn worker {name}: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("core offload failed: {0}")]
    Offload(#[from] OffloadError),
    #[error("invalid save state: {0}")]
    BadState(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("no save file for slot {slot}")]
    MissingFile { slot: u8 },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: corrupt compressed data: {error}")]
    Decompress { path: PathBuf, error: String },
    #[error("core rejected state: {0}")]
    Core(#[from] CoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum MovieError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("movie is {len} bytes, too short for a GMV header")]
    TooShort { len: usize },
    #[error("not a Gens movie")]
    BadMagic,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime control channel disconnected")]
    ControlChannelDisconnected,
    #[error("runtime did not respond in time for {op}")]
    ControlTimeout { op: &'static str },
    #[error("timing stall ({cause:?}), timing reset")]
    Stall { cause: ResetCause },
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("sound init failed ({0}), snd disabled")]
    Sound(#[from] AudioError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("invalid save slot {0}")]
    InvalidSlot(u8),
    #[error("failed to build platform: {0}")]
    Platform(String),
    #[error("failed to spawn runtime thread: {0}")]
    Spawn(#[source] io::Error),
}

impl RuntimeError {
    pub fn severity(&self) -> Severity {
        match self {
            RuntimeError::Stall { .. } => Severity::Transient,
            RuntimeError::Persist(_) | RuntimeError::Sound(_) | RuntimeError::InvalidSlot(_) => {
                Severity::Recoverable
            }
            RuntimeError::Core(CoreError::Offload(_)) => Severity::Fatal,
            RuntimeError::Core(_) => Severity::Recoverable,
            RuntimeError::ControlChannelDisconnected
            | RuntimeError::ControlTimeout { .. }
            | RuntimeError::Platform(_)
            | RuntimeError::Spawn(_) => Severity::Fatal,
        }
    }
}
