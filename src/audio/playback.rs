//! Blocking playback adapter over cpal
//!
//! Mirror of the capture adapter: the transfer loop pushes whole chunks
//! into a bounded channel, the realtime output callback drains them. An
//! underrun plays silence rather than blocking the callback.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::find_output_device;
use crate::config::AudioFormat;
use crate::constants::CHUNK_CHANNEL_CAPACITY;
use crate::error::DeviceError;

/// Sink for audio chunks produced by the receiver's transfer loop.
pub trait PlaybackStream: Send {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DeviceError>;
}

/// Playback through a cpal output device
pub struct CpalPlayback {
    chunk_tx: Sender<Vec<u8>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalPlayback {
    /// Open the playback device.
    ///
    /// `device_name` selects a device by substring match (e.g. a virtual
    /// cable input); `None` uses the default output device.
    pub fn open(device_name: Option<&str>, format: AudioFormat) -> Result<Self, DeviceError> {
        let device = find_output_device(device_name)?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(CHUNK_CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();

        let handle = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                // Bytes received but not yet played, drained sample by sample
                let mut pending: VecDeque<u8> = VecDeque::new();

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        while let Ok(chunk) = chunk_rx.try_recv() {
                            pending.extend(chunk);
                        }

                        for out in data.iter_mut() {
                            if pending.len() >= 2 {
                                let lo = pending.pop_front().unwrap_or(0);
                                let hi = pending.pop_front().unwrap_or(0);
                                let value = i16::from_le_bytes([lo, hi]);
                                *out = value as f32 / i16::MAX as f32;
                            } else {
                                *out = 0.0;
                            }
                        }
                    },
                    move |err| {
                        tracing::error!("playback stream error: {}", err);
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("failed to start playback stream: {}", e);
                            return;
                        }
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to build playback stream: {}", e);
                    }
                }
            })
            .map_err(|e| DeviceError::StreamError(e.to_string()))?;

        Ok(Self {
            chunk_tx,
            running,
            thread_handle: Some(handle),
        })
    }
}

impl PlaybackStream for CpalPlayback {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DeviceError> {
        // Bounded channel applies backpressure when the device falls behind
        self.chunk_tx
            .send(chunk.to_vec())
            .map_err(|_| DeviceError::Closed)
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}
