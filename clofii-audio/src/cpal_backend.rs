//! Microphone capture and speaker playback using cpal
//!
//! `cpal::Stream` is !Send, so each stream lives on a dedicated thread that
//! owns it until told to stop.

use anyhow::Result;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, Sender};
use tracing::{error, info, warn};

use crate::traits::{CaptureStream, MediaCapture, PlaybackSink};
use crate::types::{CAPTURE_SAMPLE_RATE, MediaError, MediaFrame, MediaRequest};
use crate::utils::{Framer, downmix, pcm16le_to_f32, resample};

/// Frames buffered between the audio thread and the orchestrator.
const CAPTURE_CHANNEL_CAPACITY: usize = 64;

/// Handle to a stream thread. Dropping it stops the stream.
struct StreamHandle {
    stop_tx: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn default_input() -> Result<Device, MediaError> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| MediaError::NoDevice("microphone".to_string()))
}

fn default_output() -> Result<Device, MediaError> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| MediaError::NoDevice("speaker".to_string()))
}

/// Converts device samples, downmixes, resamples to 16 kHz and frames.
struct CaptureSink {
    frames: Sender<Result<MediaFrame, MediaError>>,
    framer: Framer,
    channels: u16,
    device_rate: u32,
}

impl CaptureSink {
    fn accept(&mut self, samples: Vec<f32>) {
        let mono = downmix(&samples, self.channels);
        let resampled = resample(&mono, self.device_rate, CAPTURE_SAMPLE_RATE);
        for pcm in self.framer.push(&resampled) {
            if self.frames.try_send(Ok(MediaFrame::audio(pcm))).is_err() {
                warn!("Capture consumer is behind; dropping frame");
            }
        }
    }
}

fn build_input_stream<T, F>(
    device: &Device,
    config: &StreamConfig,
    sink: Arc<Mutex<CaptureSink>>,
    errors: Sender<Result<MediaFrame, MediaError>>,
    convert_fn: F,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    F: Fn(T) -> f32 + Send + 'static,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| convert_fn(s)).collect();
            if let Ok(mut sink) = sink.lock() {
                sink.accept(samples);
            }
        },
        move |err| {
            error!("Audio capture error: {}", err);
            let _ = errors.try_send(Err(MediaError::Device(err.to_string())));
        },
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

fn open_capture(frames: Sender<Result<MediaFrame, MediaError>>) -> Result<cpal::Stream> {
    let device = default_input()?;
    let supported = device.default_input_config()?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    info!(
        "Capturing from {:?} at {} Hz, {} channel(s), {:?}",
        device.name().unwrap_or_default(),
        config.sample_rate.0,
        config.channels,
        sample_format
    );

    let sink = Arc::new(Mutex::new(CaptureSink {
        frames: frames.clone(),
        framer: Framer::new(),
        channels: config.channels,
        device_rate: config.sample_rate.0,
    }));

    macro_rules! handle_format {
        ($sample_type:ty, $converter:expr) => {
            build_input_stream::<$sample_type, _>(&device, &config, sink, frames, $converter)
        };
    }

    match sample_format {
        SampleFormat::I16 => handle_format!(i16, |sample| f32::from(sample) / i16::MAX as f32),
        SampleFormat::I32 => handle_format!(i32, |sample| (sample as f32) / i32::MAX as f32),
        SampleFormat::U16 => handle_format!(u16, |sample| {
            (f32::from(sample) - (1u16 << 15) as f32) / ((1u16 << 15) - 1) as f32
        }),
        SampleFormat::F32 => handle_format!(f32, |sample| sample),
        SampleFormat::F64 => handle_format!(f64, |sample| sample as f32),
        other => Err(anyhow::anyhow!("Unsupported sample format: {:?}", other)),
    }
}

/// Microphone capture from the default input device.
#[derive(Default)]
pub struct CpalCapture {
    granted: bool,
    handle: Option<StreamHandle>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaCapture for CpalCapture {
    async fn request_access(&mut self, request: MediaRequest) -> Result<(), MediaError> {
        if request.video {
            return Err(MediaError::Unavailable(
                "camera capture is not supported by the cpal backend".to_string(),
            ));
        }
        let device = default_input()?;
        device
            .default_input_config()
            .map_err(|e| MediaError::PermissionDenied(format!("microphone ({})", e)))?;
        self.granted = true;
        Ok(())
    }

    async fn start(&mut self) -> Result<CaptureStream, MediaError> {
        if !self.granted {
            return Err(MediaError::NotGranted);
        }
        let (frames_tx, frames_rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<(), String>>();

        let thread = std::thread::spawn(move || {
            let _stream = match open_capture(frames_tx) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let _ = stop_rx.recv();
            info!("Audio capture thread exiting");
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(MediaError::Device(e)),
            Err(_) => return Err(MediaError::Device("audio thread failed to start".to_string())),
        }

        self.handle = Some(StreamHandle {
            stop_tx,
            thread: Some(thread),
        });
        Ok(frames_rx)
    }

    async fn stop(&mut self) {
        if self.handle.take().is_some() {
            info!("Microphone released");
        }
        self.granted = false;
    }
}

/// Samples waiting for the output callback, at the device rate.
type PlaybackQueue = Arc<Mutex<VecDeque<f32>>>;

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    queue: PlaybackQueue,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut queue = match queue.lock() {
                Ok(q) => q,
                Err(poisoned) => poisoned.into_inner(),
            };
            for frame in output.chunks_mut(channels.max(1)) {
                let value = <T as cpal::Sample>::from_sample(queue.pop_front().unwrap_or(0.0));
                for sample in frame.iter_mut() {
                    *sample = value;
                }
            }
        },
        |err| error!("Audio playback error: {}", err),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

/// Speaker playback on the default output device.
pub struct CpalPlayback {
    queue: PlaybackQueue,
    device_rate: u32,
    _handle: StreamHandle,
}

impl CpalPlayback {
    pub fn new() -> Result<Self, MediaError> {
        let device = default_output()?;
        let supported = device
            .default_output_config()
            .map_err(|e| MediaError::Device(e.to_string()))?;
        let device_rate = supported.sample_rate().0;
        let queue: PlaybackQueue = Arc::new(Mutex::new(VecDeque::new()));

        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), String>>();
        let thread_queue = queue.clone();

        let thread = std::thread::spawn(move || {
            let opened = default_output()
                .map_err(anyhow::Error::from)
                .and_then(|device| {
                    let config: StreamConfig = supported.config();
                    match supported.sample_format() {
                        SampleFormat::F32 => build_output_stream::<f32>(&device, &config, thread_queue),
                        SampleFormat::I16 => build_output_stream::<i16>(&device, &config, thread_queue),
                        SampleFormat::U16 => build_output_stream::<u16>(&device, &config, thread_queue),
                        other => Err(anyhow::anyhow!("Unsupported sample format: {:?}", other)),
                    }
                });
            let _stream = match opened {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let _ = stop_rx.recv();
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(MediaError::Device(e)),
            Err(_) => return Err(MediaError::Device("playback thread failed to start".to_string())),
        }
        info!("Playback ready at {} Hz", device_rate);

        Ok(Self {
            queue,
            device_rate,
            _handle: StreamHandle {
                stop_tx,
                thread: Some(thread),
            },
        })
    }
}

impl PlaybackSink for CpalPlayback {
    fn enqueue(&mut self, pcm: &[u8], sample_rate: u32) -> Result<(), MediaError> {
        let samples = resample(&pcm16le_to_f32(pcm), sample_rate, self.device_rate);
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| MediaError::Device("playback queue poisoned".to_string()))?;
        queue.extend(samples);
        Ok(())
    }

    fn flush(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}
