//! Audio playback to an output device
//!
//! Mirror image of capture: [`PlaybackSink`] queues received PCM into a ring
//! buffer and the cpal output callback, running on its own thread, drains
//! it. Gaps are played as silence.

use bytes::Bytes;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::buffer::{create_shared_buffer, PcmChunk, RingBuffer, SharedRingBuffer};
use crate::audio::device::output_device;
use crate::audio::PayloadSink;
use crate::error::AudioError;

/// Running playback stream on a dedicated thread
pub struct AudioPlayback {
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    input_buffer: SharedRingBuffer,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<AudioError>>,
    /// Output samples written as silence because no PCM was queued
    silent_samples: Arc<AtomicU64>,
    config: StreamConfig,
}

impl AudioPlayback {
    pub fn new(
        device_name: Option<&str>,
        sample_rate: u32,
        channels: u16,
        frame_size: u32,
        input_buffer: SharedRingBuffer,
    ) -> Result<Self, AudioError> {
        output_device(device_name)?;

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(frame_size),
        };

        Ok(Self {
            device_name: device_name.map(str::to_string),
            running: Arc::new(AtomicBool::new(false)),
            input_buffer,
            thread_handle: None,
            error_rx: None,
            silent_samples: Arc::new(AtomicU64::new(0)),
            config,
        })
    }

    /// Start playing queued audio
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = output_device(self.device_name.as_deref())?;
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let input_buffer = self.input_buffer.clone();
        let silent_samples = self.silent_samples.clone();
        let config = self.config.clone();

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let mut feeder = SampleFeeder::default();
                let stream = device.build_output_stream(
                    &config,
                    move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        let silent = feeder.fill(&input_buffer, out);
                        if silent > 0 {
                            silent_samples.fetch_add(silent as u64, Ordering::Relaxed);
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("Failed to start playback stream: {}", e);
                            return;
                        }

                        while running.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to build playback stream: {}", e);
                        running.store(false, Ordering::SeqCst);
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn silent_samples(&self) -> u64 {
        self.silent_samples.load(Ordering::Relaxed)
    }

    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Converts queued PCM chunks into the output callback's sample slices
#[derive(Default)]
struct SampleFeeder {
    current: Option<Bytes>,
    offset: usize,
}

impl SampleFeeder {
    /// Fill `out` from the buffer; returns the number of silent samples
    fn fill(&mut self, buffer: &RingBuffer, out: &mut [i16]) -> usize {
        let mut written = 0;

        while written < out.len() {
            let exhausted = self
                .current
                .as_ref()
                .map_or(true, |chunk| self.offset + 1 >= chunk.len());
            if exhausted {
                match buffer.pop() {
                    Some(next) => {
                        self.current = Some(next.data);
                        self.offset = 0;
                        continue;
                    }
                    None => break,
                }
            }

            if let Some(chunk) = &self.current {
                out[written] = i16::from_le_bytes([chunk[self.offset], chunk[self.offset + 1]]);
            }
            self.offset += 2;
            written += 1;
        }

        let silent = out.len() - written;
        out[written..].fill(0);
        silent
    }
}

/// Payload sink that plays received PCM on an output device
pub struct PlaybackSink {
    playback: AudioPlayback,
    buffer: SharedRingBuffer,
}

impl PlaybackSink {
    /// Open and start playback on the named output device
    pub fn open(
        device_name: Option<&str>,
        sample_rate: u32,
        channels: u16,
        frame_size: u32,
        ring_capacity: usize,
    ) -> Result<Self, AudioError> {
        let buffer = create_shared_buffer(ring_capacity);
        let mut playback =
            AudioPlayback::new(device_name, sample_rate, channels, frame_size, buffer.clone())?;
        playback.start()?;
        tracing::info!(
            "Playing to {} at {} Hz, {} channel(s)",
            device_name.unwrap_or("default output"),
            sample_rate,
            channels
        );

        Ok(Self { playback, buffer })
    }
}

impl PayloadSink for PlaybackSink {
    fn play(&mut self, pcm: &[u8]) -> Result<(), AudioError> {
        while let Some(err) = self.playback.check_errors() {
            tracing::warn!("Playback: {}", err);
        }

        if self.buffer.push(PcmChunk::new(Bytes::copy_from_slice(pcm))) {
            Ok(())
        } else {
            Err(AudioError::BufferOverflow)
        }
    }
}

impl Drop for PlaybackSink {
    fn drop(&mut self) {
        tracing::info!(
            "Playback closed: {} samples played as silence",
            self.playback.silent_samples()
        );
    }
}
