pub mod clock;
pub mod config;
pub mod error;
pub mod input;
pub mod movie;
pub mod notice;
pub mod offload;
pub mod pacing;
pub mod persist;
pub mod pico;
pub mod platform;
pub mod runtime;

pub use clock::{Clock, ManualClock, SystemClock, ticks_diff};
pub use config::EmuConfig;
pub use error::{CoreError, MovieError, OffloadError, PersistError, RuntimeError, Severity};
pub use movie::Movie;
pub use pacing::{
    CommitKind, Decision, FrameMode, FrameskipPolicy, PacingLimits, ResetCause, Scheduler,
    VideoStandard,
};
pub use platform::{
    BackupKind, EmuCore, InputSource, Platform, PumpedSound, SoundSink, StatusSink, VideoMode,
    VideoOut,
};
pub use pico::{PicoInput, PicoInputMode};
pub use runtime::{EmuLoop, EngineState, Runtime, RuntimeHandle, RuntimeStats, Session};
