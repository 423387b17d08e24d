use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::{
    AudioError,
    ring::{RingCloser, SoundConsumer},
    sink::BlockSink,
};

/// Drain thread: waits for whole blocks on the ring and hands them to a
/// blocking sink. Stopped (and joined) on drop.
pub struct SoundPump {
    closer: RingCloser,
    join: Option<JoinHandle<()>>,
}

impl SoundPump {
    pub fn spawn(
        mut consumer: SoundConsumer,
        mut sink: Box<dyn BlockSink>,
    ) -> Result<Self, AudioError> {
        let closer = consumer.closer();
        let join = thread::Builder::new()
            .name("picofront-snd".to_string())
            .spawn(move || {
                debug!(block = consumer.block_len(), "sound pump started");
                let mut block = vec![0i16; consumer.block_len()];
                while consumer.next_block(&mut block) {
                    if let Err(e) = sink.write_block(&block) {
                        warn!("sound output failed, stopping pump: {e}");
                        break;
                    }
                }
                let stats = consumer.stats();
                debug!(
                    made = stats.made,
                    done = stats.done,
                    dropped = stats.dropped,
                    "sound pump exit"
                );
            })
            .map_err(AudioError::Spawn)?;

        Ok(Self {
            closer,
            join: Some(join),
        })
    }

    pub fn stop(&mut self) {
        self.closer.close();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SoundPump {
    fn drop(&mut self) {
        self.stop();
    }
}
