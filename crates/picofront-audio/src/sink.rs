use std::{thread, time::Duration};

use crate::AudioError;

/// Blocking audio output fed one block at a time by the sound pump.
///
/// Implementations may block until the device has room; the pump thread is
/// the only caller.
pub trait BlockSink: Send {
    fn write_block(&mut self, block: &[i16]) -> Result<(), AudioError>;
}

/// Discards samples, optionally sleeping for the block's playback time so the
/// pump drains at the device rate.
#[derive(Debug, Clone)]
pub struct NullSink {
    block_time: Option<(u32, u32)>,
}

impl NullSink {
    /// Consumes blocks at the real-time rate of `rate` Hz with `channels`
    /// interleaved channels.
    pub fn paced(rate: u32, channels: u32) -> Self {
        Self {
            block_time: Some((rate.max(1), channels.max(1))),
        }
    }

    pub fn unpaced() -> Self {
        Self { block_time: None }
    }
}

impl BlockSink for NullSink {
    fn write_block(&mut self, block: &[i16]) -> Result<(), AudioError> {
        if let Some((rate, channels)) = self.block_time {
            let frames = block.len() as u64 / channels as u64;
            thread::sleep(Duration::from_micros(frames * 1_000_000 / rate as u64));
        }
        Ok(())
    }
}

#[cfg(feature = "host-audio")]
pub use host::CpalSink;

#[cfg(feature = "host-audio")]
mod host {
    use std::{
        sync::mpsc,
        thread::{self, JoinHandle},
        time::Duration,
    };

    use cpal::{
        SampleFormat,
        traits::{DeviceTrait, HostTrait, StreamTrait},
    };
    use ringbuf::{
        HeapRb,
        traits::{Consumer, Observer, Producer, Split},
    };

    use super::BlockSink;
    use crate::AudioError;

    const WRITE_RETRY: Duration = Duration::from_millis(1);
    const WRITE_RETRY_LIMIT: u32 = 200;

    /// Host output through cpal's default device, fed by an SPSC ring.
    ///
    /// `write_block` waits for room in the ring, which makes it behave like a
    /// blocking hardware output call. The cpal stream never leaves the
    /// `picofront-audio-host` thread that builds it; the sink only holds the
    /// ring producer and a stop channel, so it is `Send` without help.
    pub struct CpalSink {
        producer: ringbuf::HeapProd<f32>,
        sample_rate: u32,
        stop_tx: Option<mpsc::Sender<()>>,
        join: Option<JoinHandle<()>>,
    }

    impl CpalSink {
        /// Opens the default output device. Only `f32` device formats are
        /// supported.
        pub fn open(block_len: usize) -> Result<Self, AudioError> {
            let capacity = (block_len * 4).max(1);
            let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
            let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, AudioError>>();
            let (stop_tx, stop_rx) = mpsc::channel::<()>();

            let join = thread::Builder::new()
                .name("picofront-audio-host".into())
                .spawn(move || {
                    let stream = match build_stream(consumer) {
                        Ok((stream, rate)) => {
                            let _ = ready_tx.send(Ok(rate));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    // Disconnect and an explicit stop both end playback.
                    let _ = stop_rx.recv();
                    drop(stream);
                })
                .map_err(AudioError::Spawn)?;

            let sample_rate = match ready_rx.recv() {
                Ok(Ok(rate)) => rate,
                Ok(Err(e)) => {
                    let _ = join.join();
                    return Err(e);
                }
                Err(_) => {
                    let _ = join.join();
                    return Err(AudioError::Device("audio host thread exited".into()));
                }
            };

            Ok(Self {
                producer,
                sample_rate,
                stop_tx: Some(stop_tx),
                join: Some(join),
            })
        }

        pub fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
    }

    fn build_stream(
        mut consumer: ringbuf::HeapCons<f32>,
    ) -> Result<(cpal::Stream, u32), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        let sample_format = supported.sample_format();
        if sample_format != SampleFormat::F32 {
            return Err(AudioError::Device(format!(
                "only f32 output format is supported, got {sample_format:?}"
            )));
        }

        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;

        let err_fn = |err| tracing::error!("audio stream error: {err}");
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    for frame in data.chunks_mut(channels) {
                        let left = consumer.try_pop().unwrap_or(0.0);
                        let right = consumer.try_pop().unwrap_or(left);
                        match channels {
                            0 => {}
                            1 => frame[0] = (left + right) * 0.5,
                            _ => {
                                frame[0] = left;
                                frame[1] = right;
                                for ch in &mut frame[2..] {
                                    *ch = right;
                                }
                            }
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::Device(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::Device(e.to_string()))?;
        Ok((stream, sample_rate))
    }

    impl BlockSink for CpalSink {
        fn write_block(&mut self, block: &[i16]) -> Result<(), AudioError> {
            let mut retries = 0;
            while self.producer.vacant_len() < block.len() && retries < WRITE_RETRY_LIMIT {
                thread::sleep(WRITE_RETRY);
                retries += 1;
            }
            for &s in block {
                let _ = self.producer.try_push(s as f32 / 32768.0);
            }
            Ok(())
        }
    }

    impl Drop for CpalSink {
        fn drop(&mut self) {
            self.stop_tx = None;
            if let Some(join) = self.join.take() {
                let _ = join.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn paced_sink_sleeps_for_block_duration() {
        let mut sink = NullSink::paced(1000, 2);
        let started = Instant::now();
        sink.write_block(&[0; 40]).ok();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[cfg(feature = "host-audio")]
    #[test]
    fn host_sink_moves_to_the_pump_thread() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<CpalSink>();
    }
}
