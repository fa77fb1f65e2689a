//! Audio capture from an input device
//!
//! The cpal stream lives on its own dedicated thread for low latency and
//! pushes 16-bit PCM chunks into a shared ring buffer. [`CaptureSource`]
//! drains that buffer into fixed-size payloads for the sender.

use bytes::{Bytes, BytesMut};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::buffer::{create_shared_buffer, PcmChunk, RingBuffer, SharedRingBuffer};
use crate::audio::device::input_device;
use crate::audio::PayloadSource;
use crate::error::AudioError;

/// Running capture stream on a dedicated thread
pub struct AudioCapture {
    device_name: Option<String>,

    /// Whether capture is running
    running: Arc<AtomicBool>,

    /// Output buffer for captured chunks
    output_buffer: SharedRingBuffer,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Channel for stream errors
    error_rx: Option<Receiver<AudioError>>,

    /// Total samples captured
    samples_captured: Arc<AtomicU64>,

    config: StreamConfig,
}

impl AudioCapture {
    /// Create a capture for the named device (default input when None)
    pub fn new(
        device_name: Option<&str>,
        sample_rate: u32,
        channels: u16,
        frame_size: u32,
        output_buffer: SharedRingBuffer,
    ) -> Result<Self, AudioError> {
        // Fail early when the device is missing
        input_device(device_name)?;

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(frame_size),
        };

        Ok(Self {
            device_name: device_name.map(str::to_string),
            running: Arc::new(AtomicBool::new(false)),
            output_buffer,
            thread_handle: None,
            error_rx: None,
            samples_captured: Arc::new(AtomicU64::new(0)),
            config,
        })
    }

    /// Start capturing audio
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = input_device(self.device_name.as_deref())?;
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let output_buffer = self.output_buffer.clone();
        let samples_captured = self.samples_captured.clone();
        let config = self.config.clone();

        self.samples_captured.store(0, Ordering::SeqCst);
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let overflow_tx = error_tx.clone();
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }

                        samples_captured.fetch_add(data.len() as u64, Ordering::Relaxed);

                        if !output_buffer.push(PcmChunk::from_i16(data)) {
                            let _ = overflow_tx.try_send(AudioError::BufferOverflow);
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
                            tracing::error!("Failed to start capture stream: {}", e);
                            return;
                        }

                        // Keep thread alive while running
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to build capture stream: {}", e);
                        running_for_loop.store(false, Ordering::SeqCst);
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    /// Check for errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Payload source backed by live microphone input
///
/// Never blocks the send loop: when capture falls behind, the missing tail
/// of the payload is filled with silence.
pub struct CaptureSource {
    capture: AudioCapture,
    buffer: SharedRingBuffer,
    pending: BytesMut,
    silence_padded: u64,
}

impl CaptureSource {
    /// Open and start capture on the named input device
    pub fn open(
        device_name: Option<&str>,
        sample_rate: u32,
        channels: u16,
        frame_size: u32,
        ring_capacity: usize,
    ) -> Result<Self, AudioError> {
        let buffer = create_shared_buffer(ring_capacity);
        let mut capture =
            AudioCapture::new(device_name, sample_rate, channels, frame_size, buffer.clone())?;
        capture.start()?;
        tracing::info!(
            "Capturing from {} at {} Hz, {} channel(s)",
            device_name.unwrap_or("default input"),
            sample_rate,
            channels
        );

        Ok(Self {
            capture,
            buffer,
            pending: BytesMut::new(),
            silence_padded: 0,
        })
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        tracing::info!(
            "Capture closed: {} samples captured, {} payloads padded with silence",
            self.capture.samples_captured(),
            self.silence_padded
        );
    }
}

impl PayloadSource for CaptureSource {
    fn next_payload(&mut self, len: usize) -> Bytes {
        while let Some(err) = self.capture.check_errors() {
            tracing::warn!("Capture: {}", err);
        }

        let (payload, padded) = assemble_payload(&self.buffer, &mut self.pending, len);
        if padded {
            self.silence_padded += 1;
        }
        payload
    }

    fn padded_payloads(&self) -> u64 {
        self.silence_padded
    }
}

/// Take exactly `len` bytes of PCM, padding with silence on underrun
///
/// Bytes beyond `len` stay in `pending` for the next payload. Returns
/// whether padding was needed.
fn assemble_payload(buffer: &RingBuffer, pending: &mut BytesMut, len: usize) -> (Bytes, bool) {
    while pending.len() < len {
        match buffer.pop() {
            Some(chunk) => pending.extend_from_slice(&chunk.data),
            None => break,
        }
    }

    let padded = pending.len() < len;
    if padded {
        pending.resize(len, 0);
    }

    (pending.split_to(len).freeze(), padded)
}
