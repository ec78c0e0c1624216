use crate::types::AUDIO_FRAME_SAMPLES;

/// Nearest-sample resampling between arbitrary rates.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f32 / to_rate as f32;
    let output_len = (samples.len() as f32 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_index = (i as f32 * ratio) as usize;
        output.push(samples.get(src_index).copied().unwrap_or(0.0));
    }

    output
}

/// Average interleaved channels down to mono.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

pub fn f32_to_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// A trailing odd byte is ignored.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Accumulates mono samples and yields fixed-size PCM16 frames.
#[derive(Debug, Default)]
pub struct Framer {
    pending: Vec<f32>,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= AUDIO_FRAME_SAMPLES {
            let rest = self.pending.split_off(AUDIO_FRAME_SAMPLES);
            frames.push(f32_to_pcm16le(&self.pending));
            self.pending = rest;
        }
        frames
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_halves_length() {
        let samples: Vec<f32> = (0..480).map(|i| i as f32).collect();
        let out = resample(&samples, 48_000, 24_000);
        assert_eq!(out.len(), 240);
        assert_eq!(out[1], 2.0);
    }

    #[test]
    fn test_resample_same_rate_is_copy() {
        assert_eq!(resample(&[0.5, -0.5], 16_000, 16_000), vec![0.5, -0.5]);
    }

    #[test]
    fn test_downmix_stereo() {
        assert_eq!(downmix(&[1.0, 0.0, -1.0, -1.0], 2), vec![0.5, -1.0]);
    }

    #[test]
    fn test_pcm16_clamps_and_decodes() {
        let bytes = f32_to_pcm16le(&[2.0, -2.0, 0.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -i16::MAX);

        let back = pcm16le_to_f32(&bytes);
        assert_eq!(back, vec![1.0, -1.0, 0.0]);
        assert_eq!(pcm16le_to_f32(&[0, 0, 7]).len(), 1);
    }

    #[test]
    fn test_framer_emits_whole_frames_only() {
        let mut framer = Framer::new();
        assert!(framer.push(&vec![0.0; AUDIO_FRAME_SAMPLES - 1]).is_empty());

        let frames = framer.push(&vec![0.0; AUDIO_FRAME_SAMPLES / 2 + 1]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), AUDIO_FRAME_SAMPLES * 2);
        assert_eq!(framer.pending(), AUDIO_FRAME_SAMPLES / 2);

        assert_eq!(framer.push(&vec![0.0; AUDIO_FRAME_SAMPLES * 2]).len(), 2);
    }
}
