//! Sound output path: a fixed-size sample ring filled by the emulation thread
//! and drained by a dedicated pump thread into a blocking sink.

pub mod pump;
pub mod ring;
pub mod semaphore;
pub mod sink;

use tracing::info;

pub use pump::SoundPump;
pub use ring::{RingStats, SoundConsumer, SoundProducer, sound_ring};
pub use semaphore::Semaphore;
#[cfg(feature = "host-audio")]
pub use sink::CpalSink;
pub use sink::{BlockSink, NullSink};

/// Number of blocks the ring can hold.
pub const BLOCK_COUNT: usize = 4;
const DEFAULT_BLOCK_LEN: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("unsupported sample rate {0}")]
    UnsupportedRate(u32),
    #[error("failed to spawn sound thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("no default output device")]
    NoDevice,
    #[error("audio device error: {0}")]
    Device(String),
}

/// Block length in interleaved samples for a given output rate.
pub fn block_len_for_rate(rate: u32) -> usize {
    if rate >= 44_100 {
        DEFAULT_BLOCK_LEN
    } else if rate >= 22_050 {
        DEFAULT_BLOCK_LEN / 2
    } else {
        DEFAULT_BLOCK_LEN / 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundSettings {
    pub rate: u32,
    pub stereo: bool,
}

impl SoundSettings {
    pub fn channels(self) -> u32 {
        if self.stereo { 2 } else { 1 }
    }
}

/// A running sound path: ring producer on the caller's side, pump thread on
/// the other.
pub struct SoundOutput {
    producer: SoundProducer,
    pump: SoundPump,
    settings: SoundSettings,
    volume: u8,
    scratch: Vec<i16>,
}

impl SoundOutput {
    pub fn start(settings: SoundSettings, sink: Box<dyn BlockSink>) -> Result<Self, AudioError> {
        if settings.rate == 0 {
            return Err(AudioError::UnsupportedRate(settings.rate));
        }

        let block = block_len_for_rate(settings.rate);
        let (producer, consumer) = sound_ring(block, BLOCK_COUNT);
        let pump = SoundPump::spawn(consumer, sink)?;
        info!(
            rate = settings.rate,
            stereo = settings.stereo,
            block,
            "starting audio"
        );

        Ok(Self {
            producer,
            pump,
            settings,
            volume: 100,
            scratch: Vec::with_capacity(block),
        })
    }

    /// Queues one frame's worth of samples, scaled by the current volume.
    pub fn write(&mut self, samples: &[i16]) {
        if self.volume >= 100 {
            self.producer.write(samples);
            return;
        }

        let vol = self.volume as i32;
        self.scratch.clear();
        self.scratch
            .extend(samples.iter().map(|&s| ((s as i32 * vol) / 100) as i16));
        self.producer.write(&self.scratch);
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn clear(&self) {
        self.producer.clear();
    }

    pub fn settings(&self) -> SoundSettings {
        self.settings
    }

    pub fn stats(&self) -> RingStats {
        self.producer.stats()
    }

    pub fn stop(mut self) {
        self.pump.stop();
        info!("audio stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_len_follows_rate_tiers() {
        assert_eq!(block_len_for_rate(48_000), 1024);
        assert_eq!(block_len_for_rate(44_100), 1024);
        assert_eq!(block_len_for_rate(22_050), 512);
        assert_eq!(block_len_for_rate(11_025), 256);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let settings = SoundSettings {
            rate: 0,
            stereo: true,
        };
        assert!(matches!(
            SoundOutput::start(settings, Box::new(NullSink::unpaced())),
            Err(AudioError::UnsupportedRate(0))
        ));
    }
}
