//! Push-driven media backend
//!
//! Provides a `MediaCapture` that emits whatever an external source pushes
//! into its controller (e.g. WebAudio and canvas frames relayed by a
//! front-end), and a `PlaybackSink` that hands agent audio back out through a
//! probe. Both are also what the orchestrator tests run against.

use crate::traits::{CaptureStream, MediaCapture, PlaybackSink};
use crate::types::{CAPTURE_SAMPLE_RATE, MediaError, MediaFrame, MediaRequest};
use crate::utils::{Framer, resample};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, Sender, error::TrySendError};
use tracing::{debug, warn};

struct CaptureState {
    sender: Option<Sender<Result<MediaFrame, MediaError>>>,
    framer: Framer,
    input_sample_rate: u32,
    capacity: usize,
    denial: Option<MediaError>,
    granted: bool,
    requests: Vec<MediaRequest>,
    starts: usize,
    stops: usize,
}

/// Feeds a [`ChannelCapture`] from outside.
#[derive(Clone)]
pub struct ChannelMediaController {
    state: Arc<Mutex<CaptureState>>,
}

impl ChannelMediaController {
    fn new(input_sample_rate: u32, capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState {
                sender: None,
                framer: Framer::new(),
                input_sample_rate,
                capacity: capacity.max(1),
                denial: None,
                granted: false,
                requests: Vec::new(),
                starts: 0,
                stops: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `request_access` fail with `error`.
    pub fn deny_access(&self, error: MediaError) {
        self.lock().denial = Some(error);
    }

    /// Push mono f32 samples at the controller's input rate. Returns the
    /// number of frames delivered.
    pub fn push_samples(&self, samples: &[f32]) -> usize {
        let mut state = self.lock();
        if state.sender.is_none() {
            return 0;
        }
        let resampled = resample(samples, state.input_sample_rate, CAPTURE_SAMPLE_RATE);
        let frames = state.framer.push(&resampled);
        let mut delivered = 0;
        for pcm in frames {
            if deliver(&mut state, Ok(MediaFrame::audio(pcm))) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Push a ready-made frame (a camera still, or pre-framed audio).
    pub fn push_frame(&self, frame: MediaFrame) -> bool {
        let mut state = self.lock();
        deliver(&mut state, Ok(frame))
    }

    /// Report a device failure and end the capture stream.
    pub fn fail(&self, error: MediaError) {
        let mut state = self.lock();
        deliver(&mut state, Err(error));
        state.sender = None;
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().sender.is_some()
    }

    pub fn access_requests(&self) -> Vec<MediaRequest> {
        self.lock().requests.clone()
    }

    pub fn start_count(&self) -> usize {
        self.lock().starts
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stops
    }
}

fn deliver(state: &mut CaptureState, item: Result<MediaFrame, MediaError>) -> bool {
    let Some(sender) = state.sender.as_ref() else {
        return false;
    };
    match sender.try_send(item) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("Capture consumer is behind; dropping frame");
            false
        }
        Err(TrySendError::Closed(_)) => {
            state.sender = None;
            false
        }
    }
}

/// `MediaCapture` fed by a [`ChannelMediaController`].
pub struct ChannelCapture {
    controller: ChannelMediaController,
}

#[async_trait]
impl MediaCapture for ChannelCapture {
    async fn request_access(&mut self, request: MediaRequest) -> Result<(), MediaError> {
        let mut state = self.controller.lock();
        state.requests.push(request);
        if let Some(denial) = state.denial.clone() {
            warn!("Media access denied: {}", denial);
            state.granted = false;
            return Err(denial);
        }
        state.granted = true;
        Ok(())
    }

    async fn start(&mut self) -> Result<CaptureStream, MediaError> {
        let mut state = self.controller.lock();
        if !state.granted {
            return Err(MediaError::NotGranted);
        }
        let (tx, rx) = mpsc::channel(state.capacity);
        state.sender = Some(tx);
        state.framer = Framer::new();
        state.starts += 1;
        Ok(rx)
    }

    async fn stop(&mut self) {
        let mut state = self.controller.lock();
        if state.sender.take().is_some() {
            state.stops += 1;
        }
        state.granted = false;
    }
}

/// Create a paired controller and capture.
pub fn create_channel_backend(
    input_sample_rate: u32,
    capacity: usize,
) -> (ChannelMediaController, ChannelCapture) {
    let controller = ChannelMediaController::new(input_sample_rate, capacity);
    let capture = ChannelCapture {
        controller: controller.clone(),
    };
    (controller, capture)
}

#[derive(Default)]
struct PlaybackLog {
    received: Vec<(Vec<u8>, u32)>,
    queued: usize,
    flushes: usize,
}

/// Read side of a [`ChannelPlayback`].
#[derive(Clone, Default)]
pub struct PlaybackProbe {
    log: Arc<Mutex<PlaybackLog>>,
}

impl PlaybackProbe {
    fn lock(&self) -> MutexGuard<'_, PlaybackLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every chunk enqueued so far, in order, with its sample rate.
    pub fn received(&self) -> Vec<(Vec<u8>, u32)> {
        self.lock().received.clone()
    }

    /// Chunks enqueued since the last flush.
    pub fn queued(&self) -> usize {
        self.lock().queued
    }

    pub fn flushes(&self) -> usize {
        self.lock().flushes
    }
}

/// `PlaybackSink` that records instead of rendering.
#[derive(Default)]
pub struct ChannelPlayback {
    probe: PlaybackProbe,
}

impl ChannelPlayback {
    pub fn new() -> (Self, PlaybackProbe) {
        let sink = Self::default();
        let probe = sink.probe.clone();
        (sink, probe)
    }
}

impl PlaybackSink for ChannelPlayback {
    fn enqueue(&mut self, pcm: &[u8], sample_rate: u32) -> Result<(), MediaError> {
        let mut log = self.probe.lock();
        log.received.push((pcm.to_vec(), sample_rate));
        log.queued += 1;
        Ok(())
    }

    fn flush(&mut self) {
        let mut log = self.probe.lock();
        log.queued = 0;
        log.flushes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AUDIO_FRAME_SAMPLES;

    #[tokio::test]
    async fn test_start_requires_access() {
        let (_controller, mut capture) = create_channel_backend(CAPTURE_SAMPLE_RATE, 4);
        assert_eq!(capture.start().await.unwrap_err(), MediaError::NotGranted);
    }

    #[tokio::test]
    async fn test_denied_access_is_reported() {
        let (controller, mut capture) = create_channel_backend(CAPTURE_SAMPLE_RATE, 4);
        controller.deny_access(MediaError::PermissionDenied("microphone".into()));

        let err = capture.request_access(MediaRequest::audio_only()).await.unwrap_err();
        assert!(matches!(err, MediaError::PermissionDenied(_)));
        assert_eq!(controller.access_requests(), vec![MediaRequest::audio_only()]);
        assert_eq!(controller.start_count(), 0);
    }

    #[tokio::test]
    async fn test_pushed_samples_arrive_as_frames() {
        let (controller, mut capture) = create_channel_backend(32_000, 4);
        capture.request_access(MediaRequest::audio_only()).await.unwrap();
        let mut frames = capture.start().await.unwrap();

        // 32 kHz input halves to one 16 kHz frame
        assert_eq!(controller.push_samples(&vec![0.25; AUDIO_FRAME_SAMPLES * 2]), 1);
        match frames.recv().await.unwrap().unwrap() {
            MediaFrame::Audio { data, sample_rate } => {
                assert_eq!(sample_rate, CAPTURE_SAMPLE_RATE);
                assert_eq!(data.len(), AUDIO_FRAME_SAMPLES * 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_frames() {
        let (controller, mut capture) = create_channel_backend(CAPTURE_SAMPLE_RATE, 1);
        capture.request_access(MediaRequest::with_video(true)).await.unwrap();
        let _frames = capture.start().await.unwrap();

        assert!(controller.push_frame(MediaFrame::jpeg(vec![1])));
        assert!(!controller.push_frame(MediaFrame::jpeg(vec![2])));
    }

    #[tokio::test]
    async fn test_fail_ends_stream_after_error() {
        let (controller, mut capture) = create_channel_backend(CAPTURE_SAMPLE_RATE, 4);
        capture.request_access(MediaRequest::audio_only()).await.unwrap();
        let mut frames = capture.start().await.unwrap();

        controller.fail(MediaError::Device("unplugged".into()));
        assert_eq!(
            frames.recv().await,
            Some(Err(MediaError::Device("unplugged".into())))
        );
        assert_eq!(frames.recv().await, None);
        assert!(!controller.is_capturing());
    }

    #[tokio::test]
    async fn test_stop_counts_only_real_releases() {
        let (controller, mut capture) = create_channel_backend(CAPTURE_SAMPLE_RATE, 4);
        capture.request_access(MediaRequest::audio_only()).await.unwrap();
        let _frames = capture.start().await.unwrap();

        capture.stop().await;
        capture.stop().await;
        assert_eq!(controller.start_count(), 1);
        assert_eq!(controller.stop_count(), 1);
        assert_eq!(controller.push_samples(&[0.0; 10]), 0);
    }

    #[test]
    fn test_playback_probe_tracks_flushes() {
        let (mut sink, probe) = ChannelPlayback::new();
        sink.enqueue(&[1, 2], 24_000).unwrap();
        sink.enqueue(&[3, 4], 24_000).unwrap();
        sink.flush();
        sink.enqueue(&[5, 6], 24_000).unwrap();

        assert_eq!(probe.received().len(), 3);
        assert_eq!(probe.queued(), 1);
        assert_eq!(probe.flushes(), 1);
    }
}
