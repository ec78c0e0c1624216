//! Media devices for clofii
//!
//! This crate provides:
//! - `MediaCapture` / `PlaybackSink` contracts the interview orchestrator drives
//! - Microphone capture and speaker playback via `cpal` (feature: `backend-cpal`)
//! - A push-driven channel backend for embedding front-ends and tests
//! - PCM16 framing and resampling helpers

pub mod channel_backend;
pub mod traits;
pub mod types;
pub mod utils;

#[cfg(feature = "backend-cpal")]
pub mod cpal_backend;

#[cfg(not(feature = "backend-cpal"))]
pub mod dummy_backend;

pub use channel_backend::{
    ChannelCapture, ChannelMediaController, ChannelPlayback, PlaybackProbe, create_channel_backend,
};
pub use traits::{CaptureStream, MediaCapture, PlaybackSink};
pub use types::{
    AUDIO_FRAME_SAMPLES, CAPTURE_SAMPLE_RATE, MediaError, MediaFrame, MediaRequest,
};

// Default backend exports
#[cfg(feature = "backend-cpal")]
pub use cpal_backend::{CpalCapture as DeviceCapture, CpalPlayback as DevicePlayback};

#[cfg(not(feature = "backend-cpal"))]
pub use dummy_backend::{DummyCapture as DeviceCapture, DummyPlayback as DevicePlayback};
