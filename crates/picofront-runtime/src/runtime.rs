//! Emulation loop and the thread that hosts it.

mod control;
mod handle;
mod runner;
mod state;
mod util;

pub use handle::{Runtime, RuntimeHandle};
pub use runner::{EmuLoop, Session};
pub use state::{EngineState, RuntimeStats};
