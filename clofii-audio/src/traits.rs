use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

use crate::types::{MediaError, MediaFrame, MediaRequest};

/// Frames from a started capture. An `Err` item means the device failed and
/// no further frames will follow.
pub type CaptureStream = Receiver<Result<MediaFrame, MediaError>>;

/// Microphone (and optionally camera) capture.
#[async_trait]
pub trait MediaCapture: Send {
    /// Ask for device access without starting capture.
    async fn request_access(&mut self, request: MediaRequest) -> Result<(), MediaError>;

    /// Start capturing. Requires a prior successful `request_access`.
    async fn start(&mut self) -> Result<CaptureStream, MediaError>;

    /// Stop capturing and release the devices. Safe to call when stopped.
    async fn stop(&mut self);
}

/// Renders agent audio in arrival order.
pub trait PlaybackSink: Send {
    /// Queue mono PCM16LE audio recorded at `sample_rate`.
    fn enqueue(&mut self, pcm: &[u8], sample_rate: u32) -> Result<(), MediaError>;

    /// Drop everything queued but not yet played.
    fn flush(&mut self);
}
