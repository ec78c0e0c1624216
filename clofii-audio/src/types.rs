use thiserror::Error;

/// Microphone audio is sent to the agent at this rate.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Samples per outbound audio frame (100 ms at 16 kHz).
pub const AUDIO_FRAME_SAMPLES: usize = 1_600;

/// One unit of captured media, ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaFrame {
    /// Mono PCM16 little-endian
    Audio { data: Vec<u8>, sample_rate: u32 },
    /// A still image, typically `image/jpeg`
    Video { data: Vec<u8>, mime_type: String },
}

impl MediaFrame {
    pub fn audio(data: Vec<u8>) -> Self {
        MediaFrame::Audio {
            data,
            sample_rate: CAPTURE_SAMPLE_RATE,
        }
    }

    pub fn jpeg(data: Vec<u8>) -> Self {
        MediaFrame::Video {
            data,
            mime_type: "image/jpeg".to_string(),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaFrame::Video { .. })
    }

    pub fn mime_type(&self) -> String {
        match self {
            MediaFrame::Audio { sample_rate, .. } => format!("audio/pcm;rate={}", sample_rate),
            MediaFrame::Video { mime_type, .. } => mime_type.clone(),
        }
    }

    /// Split into `(mime_type, payload)`.
    pub fn into_parts(self) -> (String, Vec<u8>) {
        let mime_type = self.mime_type();
        match self {
            MediaFrame::Audio { data, .. } | MediaFrame::Video { data, .. } => (mime_type, data),
        }
    }
}

/// Which devices an interview needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaRequest {
    pub audio: bool,
    pub video: bool,
}

impl MediaRequest {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }

    pub fn with_video(video: bool) -> Self {
        Self { audio: true, video }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission to use the {0} was denied")]
    PermissionDenied(String),
    #[error("no {0} device available")]
    NoDevice(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("media capture is unavailable: {0}")]
    Unavailable(String),
    #[error("capture was started before access was granted")]
    NotGranted,
}
