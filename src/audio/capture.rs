//! Blocking capture adapter over cpal
//!
//! cpal delivers samples through a realtime callback; the transfer loop
//! wants a blocking `read_chunk`. The adapter bridges the two with a
//! bounded channel of chunk-sized byte buffers, the callback accumulating
//! samples until a full chunk is ready.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::find_input_device;
use crate::config::AudioFormat;
use crate::constants::CHUNK_CHANNEL_CAPACITY;
use crate::error::DeviceError;

/// Source of audio chunks consumed by the sender's transfer loop.
///
/// `read_chunk` blocks until one chunk of `AudioFormat::chunk_bytes()`
/// 16-bit little-endian PCM bytes is available.
pub trait CaptureStream: Send {
    fn read_chunk(&mut self) -> Result<Vec<u8>, DeviceError>;
}

/// Capture from a cpal input device
pub struct CpalCapture {
    chunk_rx: Receiver<Vec<u8>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalCapture {
    /// Open the capture device and start filling chunks.
    ///
    /// `device_name` selects a device by substring match; `None` uses the
    /// default input device.
    pub fn open(device_name: Option<&str>, format: AudioFormat) -> Result<Self, DeviceError> {
        let device = find_input_device(device_name)?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let chunk_bytes = format.chunk_bytes();

        let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(CHUNK_CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();
        let running_for_callback = running.clone();

        // cpal streams are !Send, so the stream lives on its own thread
        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let mut pending: Vec<u8> = Vec::with_capacity(chunk_bytes * 2);

                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running_for_callback.load(Ordering::Relaxed) {
                            return;
                        }

                        for &sample in data {
                            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            pending.extend_from_slice(&value.to_le_bytes());
                        }

                        while pending.len() >= chunk_bytes {
                            let chunk: Vec<u8> = pending.drain(..chunk_bytes).collect();
                            // Consumer stalled on the network; drop the chunk
                            if chunk_tx.try_send(chunk).is_err() {
                                tracing::debug!("capture chunk dropped, consumer behind");
                            }
                        }
                    },
                    move |err| {
                        tracing::error!("capture stream error: {}", err);
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("failed to start capture stream: {}", e);
                            return;
                        }
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                        // Stream is dropped here, stopping capture
                    }
                    Err(e) => {
                        tracing::error!("failed to build capture stream: {}", e);
                    }
                }
            })
            .map_err(|e| DeviceError::StreamError(e.to_string()))?;

        Ok(Self {
            chunk_rx,
            running,
            thread_handle: Some(handle),
        })
    }
}

impl CaptureStream for CpalCapture {
    fn read_chunk(&mut self) -> Result<Vec<u8>, DeviceError> {
        // Sender side dropped means the stream thread died
        self.chunk_rx.recv().map_err(|_| DeviceError::Closed)
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}
