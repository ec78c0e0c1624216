use async_trait::async_trait;
use tracing::warn;

use crate::traits::{CaptureStream, MediaCapture, PlaybackSink};
use crate::types::{MediaError, MediaRequest};

const MISSING_BACKEND: &str = "this build has no audio backend (missing 'backend-cpal' feature)";

/// Capture that always refuses access.
#[derive(Default)]
pub struct DummyCapture;

impl DummyCapture {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaCapture for DummyCapture {
    async fn request_access(&mut self, _request: MediaRequest) -> Result<(), MediaError> {
        Err(MediaError::Unavailable(MISSING_BACKEND.to_string()))
    }

    async fn start(&mut self) -> Result<CaptureStream, MediaError> {
        Err(MediaError::Unavailable(MISSING_BACKEND.to_string()))
    }

    async fn stop(&mut self) {}
}

/// Playback that discards audio.
#[derive(Default)]
pub struct DummyPlayback {
    warned: bool,
}

impl DummyPlayback {
    /// Never fails; the signature matches the device playback it stands in for.
    pub fn new() -> Result<Self, MediaError> {
        Ok(Self::default())
    }
}

impl PlaybackSink for DummyPlayback {
    fn enqueue(&mut self, _pcm: &[u8], _sample_rate: u32) -> Result<(), MediaError> {
        if !self.warned {
            warn!("Discarding agent audio: {}", MISSING_BACKEND);
            self.warned = true;
        }
        Ok(())
    }

    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dummy_capture_is_unavailable() {
        let mut capture = DummyCapture::new();
        let err = capture.request_access(MediaRequest::audio_only()).await.unwrap_err();
        assert!(matches!(err, MediaError::Unavailable(_)));
    }
}
