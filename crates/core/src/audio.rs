//! Audio frame types and PCM conversion helpers

use serde::{Deserialize, Serialize};

/// A fixed-duration slice of mono audio, float samples normalized to [-1, 1].
///
/// Produced by the ingest stage at a fixed frame size (20 ms reference) and
/// consumed by the segmenter. `t_start` is seconds since the first sample of
/// the session.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub t_start: f64,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, t_start: f64) -> Self {
        Self {
            samples,
            sample_rate,
            t_start,
        }
    }

    /// Frame duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// RMS energy of the frame.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum / self.samples.len() as f32).sqrt()
    }
}

/// A bounded span of user speech delimited by silence, ready for ASR.
///
/// Immutable after the segmenter closes it. `pre_roll_ms` records how much
/// pre-speech audio was prepended so downstream consumers can account for it.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub t_start: f64,
    pub t_end: f64,
    pub pre_roll_ms: u32,
}

impl Utterance {
    /// Utterance duration in milliseconds, derived from the sample count.
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Output unit streamed to the client: signed 16-bit mono PCM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub pcm: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(pcm: Vec<i16>, sample_rate: u32) -> Self {
        Self { pcm, sample_rate }
    }

    pub fn duration_ms(&self) -> f64 {
        self.pcm.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Serialize to little-endian bytes for a binary transport frame.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pcm.len() * 2);
        for s in &self.pcm {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }
}

/// Decode Int16LE bytes to normalized f32 samples.
///
/// A trailing odd byte is ignored; transports deliver whole samples but a
/// truncated frame must not panic.
pub fn pcm_i16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect()
}

/// Convert normalized f32 samples to i16, clamping out-of-range values.
pub fn pcm_f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}

/// Apply a linear fade-in over the first `fade_samples` samples in place.
pub fn fade_in(pcm: &mut [i16], fade_samples: usize) {
    let n = fade_samples.min(pcm.len());
    if n == 0 {
        return;
    }
    for i in 0..n {
        let gain = i as f32 / n as f32;
        pcm[i] = (pcm[i] as f32 * gain) as i16;
    }
}

/// Apply a linear fade-out over the last `fade_samples` samples in place.
pub fn fade_out(pcm: &mut [i16], fade_samples: usize) {
    let len = pcm.len();
    let n = fade_samples.min(len);
    if n == 0 {
        return;
    }
    for i in 0..n {
        let gain = (n - 1 - i) as f32 / n as f32;
        let idx = len - n + i;
        pcm[idx] = (pcm[idx] as f32 * gain) as i16;
    }
}
